//! Router core components
//!
//! Dependency order, leaves first: clock, registry, rate limiter,
//! selector, dispatcher, failover log, and the facade that wires them.

pub mod clock;
pub mod dispatcher;
pub mod failover;
pub mod rate_limiter;
pub mod registry;
pub mod router;
pub mod selector;
pub mod stores;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use dispatcher::{Dispatcher, DispatcherConfig};
pub use failover::FailoverLog;
pub use rate_limiter::{Acquire, DenyReason, RateLimiter};
pub use registry::{CounterDelta, ProviderRecord, ProviderRegistry, ProviderSnapshot, Window};
pub use router::Router;
pub use stores::{
    CredentialStore, EnvCredentialStore, InMemoryStateStore, NoopTelemetry, StateStore,
    StaticCredentialStore, TelemetryEvent, TelemetrySink, TracingTelemetry,
};
pub use types::{
    AttemptError, CancelFlag, ControlRequest, DispatchContext, DispatchRequest, DispatchResponse,
    ErrorKind, FailoverEvent, FailoverReason, ProviderStatus, RequestAction, TestReport,
};
