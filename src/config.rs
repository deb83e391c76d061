//! Configuration types.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// What the gate does when the verification module cannot be loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadFailurePolicy {
    /// Keep the wizard unmounted and show the error state.
    FailClosed,
    /// Mount the wizard anyway, flagged as degraded.
    FailOpen,
}

impl Default for LoadFailurePolicy {
    fn default() -> Self {
        Self::FailClosed
    }
}

impl std::str::FromStr for LoadFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fail_closed" => Ok(Self::FailClosed),
            "fail_open" => Ok(Self::FailOpen),
            other => Err(format!("expected fail_closed or fail_open, got {other}")),
        }
    }
}

/// Wizard engine configuration.
#[derive(Debug, Clone)]
pub struct WizardConfig {
    /// Upper bound on waiting for the verification module to become ready.
    pub ready_timeout: Duration,
    /// Interval between readiness polls once the module has loaded.
    pub poll_interval: Duration,
    /// Poll attempts before a loaded module counts as not ready.
    pub max_polls: u32,
    /// Behaviour when the module never becomes available.
    pub load_failure_policy: LoadFailurePolicy,
    /// Minimum time a submission keeps the loading state before dispatch.
    pub pacing_delay: Duration,
    /// How long a step-scoped error stays visible.
    pub error_dismiss_after: Duration,
    /// Dwell time of an interstitial step before it advances.
    pub interstitial_dwell: Duration,
    /// Language used when no preference is stored.
    pub default_language: String,
    /// Prefix for the persisted session keys.
    pub storage_namespace: String,
}

impl Default for WizardConfig {
    fn default() -> Self {
        Self {
            ready_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(100),
            max_polls: 50,
            load_failure_policy: LoadFailurePolicy::FailClosed,
            pacing_delay: Duration::from_secs(2),
            error_dismiss_after: Duration::from_secs(5),
            interstitial_dwell: Duration::from_secs(3),
            default_language: "en".to_string(),
            storage_namespace: "wizard".to_string(),
        }
    }
}

impl WizardConfig {
    /// Build from `STAGEGATE_*` environment variables, defaulting anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let millis = |key: &str, default: Duration| -> Result<Duration, ConfigError> {
            match lookup(key) {
                Some(raw) => raw
                    .trim()
                    .parse::<u64>()
                    .map(Duration::from_millis)
                    .map_err(|e| ConfigError::InvalidValue {
                        key: key.to_string(),
                        message: e.to_string(),
                    }),
                None => Ok(default),
            }
        };

        let max_polls = match lookup("STAGEGATE_MAX_POLLS") {
            Some(raw) => raw
                .trim()
                .parse::<u32>()
                .map_err(|e| ConfigError::InvalidValue {
                    key: "STAGEGATE_MAX_POLLS".to_string(),
                    message: e.to_string(),
                })?,
            None => defaults.max_polls,
        };

        let load_failure_policy = match lookup("STAGEGATE_LOAD_FAILURE_POLICY") {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|message| ConfigError::InvalidValue {
                    key: "STAGEGATE_LOAD_FAILURE_POLICY".to_string(),
                    message,
                })?,
            None => defaults.load_failure_policy,
        };

        Ok(Self {
            ready_timeout: millis("STAGEGATE_READY_TIMEOUT_MS", defaults.ready_timeout)?,
            poll_interval: millis("STAGEGATE_POLL_INTERVAL_MS", defaults.poll_interval)?,
            max_polls,
            load_failure_policy,
            pacing_delay: millis("STAGEGATE_PACING_DELAY_MS", defaults.pacing_delay)?,
            error_dismiss_after: millis("STAGEGATE_ERROR_DISMISS_MS", defaults.error_dismiss_after)?,
            interstitial_dwell: millis(
                "STAGEGATE_INTERSTITIAL_DWELL_MS",
                defaults.interstitial_dwell,
            )?,
            default_language: lookup("STAGEGATE_DEFAULT_LANGUAGE")
                .unwrap_or(defaults.default_language),
            storage_namespace: lookup("STAGEGATE_NAMESPACE").unwrap_or(defaults.storage_namespace),
        })
    }
}
