//! Orchestrator configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::provider::RetryPolicy;

/// Tuning for the order lifecycle coordinator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrchestratorConfig {
    /// Chunk size for the `auto` grouping strategy.
    #[serde(default = "default_brackets_per_image")]
    pub brackets_per_image: usize,

    /// Attempts for every retried provider call.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// First backoff delay (milliseconds). Doubles after each failure.
    #[serde(default = "default_retry_base_delay")]
    pub retry_base_delay_ms: u64,

    /// Polls of `get_bracket` after an upload before giving up on verification.
    #[serde(default = "default_verify_attempts")]
    pub verify_attempts: u32,

    /// Pause between verification polls (milliseconds).
    #[serde(default = "default_verify_interval")]
    pub verify_interval_ms: u64,

    /// Deadline for the provider lookup that fills in an unnamed order
    /// while listing or reading (milliseconds).
    #[serde(default = "default_refresh_timeout")]
    pub refresh_timeout_ms: u64,
}

fn default_brackets_per_image() -> usize {
    3
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_base_delay() -> u64 {
    1000
}

fn default_verify_attempts() -> u32 {
    3
}

fn default_verify_interval() -> u64 {
    500
}

fn default_refresh_timeout() -> u64 {
    2000
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            brackets_per_image: default_brackets_per_image(),
            retry_attempts: default_retry_attempts(),
            retry_base_delay_ms: default_retry_base_delay(),
            verify_attempts: default_verify_attempts(),
            verify_interval_ms: default_verify_interval(),
            refresh_timeout_ms: default_refresh_timeout(),
        }
    }
}

impl OrchestratorConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_attempts,
            Duration::from_millis(self.retry_base_delay_ms),
        )
    }

    pub fn verify_interval(&self) -> Duration {
        Duration::from_millis(self.verify_interval_ms)
    }

    pub fn refresh_timeout(&self) -> Duration {
        Duration::from_millis(self.refresh_timeout_ms)
    }
}
