//! # inference-router
//!
//! Multi-provider AI inference router. Accepts inference requests and
//! dispatches each to exactly one of N heterogeneous upstream providers,
//! enforcing per-provider rate limits, health gating, priority ordering
//! and automatic failover, while recording outcome statistics used both
//! for ranking and for reporting.
//!
//! ## Components
//!
//! - **Clock** — injectable wall/monotonic time source
//! - **Provider Registry** — canonical provider table, per-provider locks,
//!   copy-on-read snapshots
//! - **Rate Limiter** — dual sliding-on-reset windows (per-minute, per-day)
//! - **Selector** — pure candidate ordering over a registry snapshot
//! - **Dispatcher** — outbound calls, outcome classification, cooldowns,
//!   failover
//! - **Failover Log** — append-only transition record
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use inference_router::{Router, RouterConfig};
//! use inference_router::core::{
//!     EnvCredentialStore, InMemoryStateStore, SystemClock, TracingTelemetry,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RouterConfig::load("config/router.yaml").await?;
//!     let router = Router::init(
//!         &config,
//!         Arc::new(EnvCredentialStore),
//!         Arc::new(InMemoryStateStore::new(config.providers.clone())),
//!         Arc::new(TracingTelemetry),
//!         Arc::new(SystemClock::new()),
//!     )
//!     .await?;
//!
//!     let response = router
//!         .analyze(serde_json::json!({
//!             "messages": [{ "role": "user", "content": "BTCUSDT trend?" }]
//!         }))
//!         .await?;
//!     println!("{} answered in {}ms", response.provider_used, response.latency_ms);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod server;
pub mod utils;

pub use config::{ProviderSeed, RouterConfig};
pub use core::router::Router;
pub use core::types::{
    ControlRequest, DispatchContext, DispatchRequest, DispatchResponse, FailoverEvent,
    ProviderStatus, TestReport,
};
pub use core::ProviderSnapshot;
pub use utils::error::{Result, RouterError};

/// Current version of the crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
/// Name of the crate
pub const NAME: &str = env!("CARGO_PKG_NAME");
