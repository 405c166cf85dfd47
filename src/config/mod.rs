//! Configuration models
//!
//! YAML-backed configuration with serde defaults, environment overrides
//! and `${VAR}` expansion. See [`loader`] for the loading precedence.

pub mod loader;

use crate::core::dispatcher::DispatcherConfig;
use serde::{Deserialize, Serialize};

/// Top-level router configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Control-surface HTTP server.
    #[serde(default)]
    pub server: ServerConfig,
    /// Dispatch policy knobs.
    #[serde(default)]
    pub dispatch: DispatchSettings,
    /// Statically configured providers. When the external state store is
    /// the in-memory one, these are also its seeds.
    #[serde(default)]
    pub providers: Vec<ProviderSeed>,
}

/// HTTP server binding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Dispatch policy settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchSettings {
    /// Attempt timeout when a provider does not set its own.
    #[serde(default = "default_timeout")]
    pub default_timeout_secs: u64,
    /// First transient cooldown; doubles per consecutive strike.
    #[serde(default = "default_cooldown_base")]
    pub cooldown_base_secs: u64,
    /// Cooldown ceiling.
    #[serde(default = "default_cooldown_cap")]
    pub cooldown_cap_secs: u64,
    /// Default cap for failover history reads.
    #[serde(default = "default_history_limit")]
    pub failover_history_limit: usize,
    /// Bounded queue size for mirror subscriptions.
    #[serde(default = "default_mirror_capacity")]
    pub mirror_queue_capacity: usize,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            default_timeout_secs: default_timeout(),
            cooldown_base_secs: default_cooldown_base(),
            cooldown_cap_secs: default_cooldown_cap(),
            failover_history_limit: default_history_limit(),
            mirror_queue_capacity: default_mirror_capacity(),
        }
    }
}

impl DispatchSettings {
    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            cooldown_base_secs: self.cooldown_base_secs,
            cooldown_cap_secs: self.cooldown_cap_secs,
            default_timeout_secs: self.default_timeout_secs,
        }
    }
}

/// Static configuration for one upstream provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSeed {
    /// Unique, stable identifier.
    pub name: String,
    /// Display label; falls back to `name`.
    #[serde(default)]
    pub display_name: Option<String>,
    /// Model identifier injected into outbound bodies.
    pub model: String,
    /// Endpoint URL for inference calls.
    pub endpoint: String,
    /// Opaque handle consumed by the credential store (for the env-backed
    /// store this is the variable name, e.g. `GROQ_API_KEY`).
    pub credential_ref: String,
    /// Custom auth header name; unset means `Authorization: Bearer`.
    #[serde(default)]
    pub auth_header: Option<String>,
    /// Lower is tried first.
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default = "default_rpm")]
    pub rate_limit_rpm: u32,
    /// Unset means unlimited.
    #[serde(default)]
    pub rate_limit_rpd: Option<u32>,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_timeout() -> u64 {
    30
}

fn default_cooldown_base() -> u64 {
    30
}

fn default_cooldown_cap() -> u64 {
    900
}

fn default_history_limit() -> usize {
    50
}

fn default_mirror_capacity() -> usize {
    256
}

fn default_priority() -> i32 {
    100
}

fn default_rpm() -> u32 {
    60
}

fn default_true() -> bool {
    true
}
