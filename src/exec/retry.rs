// src/exec/retry.rs

//! Retry budget for a single task instance.

use std::time::Duration;

use crate::pipeline::{Asset, PipelineSection};

/// How many extra attempts an instance gets, and how long to wait between
/// them. The delay is fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetryPolicy {
    /// Retries after the first attempt; `0` means run once.
    pub retries: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self::default()
    }

    /// Asset overrides win over pipeline defaults.
    pub fn for_asset(asset: &Asset, defaults: &PipelineSection) -> Self {
        Self {
            retries: asset.effective_retries(defaults),
            delay: Duration::from_secs(asset.effective_retries_delay(defaults)),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    /// Whether another attempt is allowed after `attempt` (1-based) failed.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts()
    }
}
