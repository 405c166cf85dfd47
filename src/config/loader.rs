//! Configuration loading
//!
//! Precedence: YAML file, then environment overrides. `${VAR}` references
//! inside the file are expanded before parsing, and providers can be
//! defined entirely from the environment as
//! `PROVIDER_<NAME>_<FIELD>=value`.

use super::{ProviderSeed, RouterConfig};
use crate::utils::error::{Result, RouterError};
use std::collections::HashMap;
use std::env;
use tracing::{debug, warn};

impl RouterConfig {
    /// Load from a YAML file and apply environment overrides.
    pub async fn load(path: &str) -> Result<Self> {
        let mut config = match tokio::fs::read_to_string(path).await {
            Ok(content) => {
                let expanded = expand_env_vars(&content);
                let config: RouterConfig = serde_yaml::from_str(&expanded)
                    .map_err(|e| RouterError::Configuration(format!("parse {}: {}", path, e)))?;
                debug!(path = %path, "configuration loaded from file");
                config
            }
            Err(e) => {
                warn!(path = %path, error = %e, "config file unreadable, starting from defaults");
                RouterConfig::default()
            }
        };
        config.apply_env();
        Ok(config)
    }

    /// Apply `ROUTER_*` and `PROVIDER_*` environment overrides.
    pub fn apply_env(&mut self) {
        if let Ok(host) = env::var("ROUTER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = env::var("ROUTER_PORT") {
            match port.parse() {
                Ok(port) => self.server.port = port,
                Err(e) => warn!(error = %e, "ignoring invalid ROUTER_PORT"),
            }
        }
        if let Ok(timeout) = env::var("ROUTER_DEFAULT_TIMEOUT_SECS") {
            match timeout.parse() {
                Ok(secs) => self.dispatch.default_timeout_secs = secs,
                Err(e) => warn!(error = %e, "ignoring invalid ROUTER_DEFAULT_TIMEOUT_SECS"),
            }
        }

        for seed in load_providers_from_env() {
            match self.providers.iter_mut().find(|p| p.name == seed.name) {
                Some(existing) => *existing = seed,
                None => self.providers.push(seed),
            }
        }
    }
}

/// Collect `PROVIDER_<NAME>_<FIELD>` variables into provider seeds.
/// Required fields: `MODEL`, `ENDPOINT`, `CREDENTIAL_REF`; incomplete
/// definitions are skipped with a warning.
fn load_providers_from_env() -> Vec<ProviderSeed> {
    let mut grouped: HashMap<String, HashMap<String, String>> = HashMap::new();
    for (key, value) in env::vars() {
        let Some(rest) = key.strip_prefix("PROVIDER_") else {
            continue;
        };
        let Some((name, field)) = rest.split_once('_') else {
            continue;
        };
        grouped
            .entry(name.to_lowercase())
            .or_default()
            .insert(field.to_lowercase(), value);
    }

    let mut seeds = Vec::new();
    for (name, fields) in grouped {
        let (Some(model), Some(endpoint), Some(credential_ref)) = (
            fields.get("model"),
            fields.get("endpoint"),
            fields.get("credential").or_else(|| fields.get("credential_ref")),
        ) else {
            warn!(provider = %name, "incomplete provider definition in environment, skipping");
            continue;
        };

        seeds.push(ProviderSeed {
            name: name.clone(),
            display_name: fields.get("display").cloned(),
            model: model.clone(),
            endpoint: endpoint.clone(),
            credential_ref: credential_ref.clone(),
            auth_header: fields.get("header").cloned(),
            priority: fields
                .get("priority")
                .and_then(|v| v.parse().ok())
                .unwrap_or(100),
            rate_limit_rpm: fields
                .get("rpm")
                .and_then(|v| v.parse().ok())
                .unwrap_or(60),
            rate_limit_rpd: fields.get("rpd").and_then(|v| v.parse().ok()),
            timeout_secs: fields
                .get("timeout")
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
            enabled: fields
                .get("enabled")
                .map_or(true, |v| v != "false" && v != "0"),
        });
    }
    seeds.sort_by(|a, b| a.name.cmp(&b.name));
    seeds
}

/// Expand `${VAR}` and `$VAR` references against the process environment.
pub fn expand_env_vars(input: &str) -> String {
    let mut result = input.to_string();
    for (key, value) in env::vars() {
        result = result.replace(&format!("${{{}}}", key), &value);
        result = result.replace(&format!("${}", key), &value);
    }
    result
}
