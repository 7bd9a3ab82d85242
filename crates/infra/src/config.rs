//! Configuration loading.
//!
//! Everything comes from the environment; unset variables fall back to
//! defaults, malformed ones are errors.

use std::time::Duration;

use anyhow::{Context, ensure};

use taxlink_core::TenantId;
use taxlink_observability::LogFormat;
use taxlink_sync::MonitorSettings;

pub const POLL_INTERVAL_VAR: &str = "TAXLINK_POLL_INTERVAL_MS";
pub const MAX_POLL_FAILURES_VAR: &str = "TAXLINK_MAX_POLL_FAILURES";
pub const TENANT_ID_VAR: &str = "TAXLINK_TENANT_ID";
pub const LOG_FORMAT_VAR: &str = "TAXLINK_LOG_FORMAT";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    pub poll_interval: Duration,
    pub max_consecutive_poll_failures: u32,
    /// Tenant the simulator acts for; a fresh one when unset.
    pub tenant_id: Option<TenantId>,
    pub log_format: LogFormat,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        let monitor = MonitorSettings::default();
        Self {
            poll_interval: monitor.poll_interval,
            max_consecutive_poll_failures: monitor.max_consecutive_poll_failures,
            tenant_id: None,
            log_format: LogFormat::Json,
        }
    }
}

impl BridgeConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        match var(POLL_INTERVAL_VAR) {
            Some(raw) => {
                let ms: u64 = raw
                    .trim()
                    .parse()
                    .with_context(|| format!("{POLL_INTERVAL_VAR} must be a number of milliseconds, got {raw:?}"))?;
                ensure!(ms > 0, "{POLL_INTERVAL_VAR} must be greater than zero");
                config.poll_interval = Duration::from_millis(ms);
            }
            None => tracing::warn!(
                default_ms = config.poll_interval.as_millis() as u64,
                "{POLL_INTERVAL_VAR} not set; using default"
            ),
        }

        if let Some(raw) = var(MAX_POLL_FAILURES_VAR) {
            let max: u32 = raw
                .trim()
                .parse()
                .with_context(|| format!("{MAX_POLL_FAILURES_VAR} must be a positive integer, got {raw:?}"))?;
            ensure!(max > 0, "{MAX_POLL_FAILURES_VAR} must be at least 1");
            config.max_consecutive_poll_failures = max;
        }

        if let Some(raw) = var(TENANT_ID_VAR) {
            let tenant: TenantId = raw
                .trim()
                .parse()
                .with_context(|| format!("{TENANT_ID_VAR} is not a valid id"))?;
            config.tenant_id = Some(tenant);
        }

        if let Some(raw) = var(LOG_FORMAT_VAR) {
            config.log_format = LogFormat::parse(&raw)
                .with_context(|| format!("{LOG_FORMAT_VAR} must be `json` or `pretty`, got {raw:?}"))?;
        }

        Ok(config)
    }

    pub fn monitor_settings(&self) -> MonitorSettings {
        MonitorSettings {
            poll_interval: self.poll_interval,
            max_consecutive_poll_failures: self.max_consecutive_poll_failures,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> anyhow::Result<BridgeConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        BridgeConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_match_the_monitor_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.monitor_settings(), MonitorSettings::default());
        assert!(config.tenant_id.is_none());
    }

    #[test]
    fn values_are_read_from_the_environment() {
        let tenant = TenantId::new();
        let config = load(&[
            (POLL_INTERVAL_VAR, "250"),
            (MAX_POLL_FAILURES_VAR, "3"),
            (TENANT_ID_VAR, &tenant.to_string()),
            (LOG_FORMAT_VAR, "pretty"),
        ])
        .unwrap();
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.max_consecutive_poll_failures, 3);
        assert_eq!(config.tenant_id, Some(tenant));
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[test]
    fn malformed_values_name_the_variable() {
        let err = load(&[(POLL_INTERVAL_VAR, "soon")]).unwrap_err();
        assert!(format!("{err:#}").contains(POLL_INTERVAL_VAR));

        let err = load(&[(POLL_INTERVAL_VAR, "0")]).unwrap_err();
        assert!(err.to_string().contains("greater than zero"));

        let err = load(&[(TENANT_ID_VAR, "acme")]).unwrap_err();
        assert!(err.to_string().contains(TENANT_ID_VAR));
    }
}
