//! Batching configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::outcome::FailureMode;

/// Configuration for a request queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Debounce window in milliseconds; every arrival restarts it.
    #[serde(default = "default_batch_window_ms")]
    pub batch_window_ms: u64,
    /// Upper bound on total accumulation time under continuous arrival.
    /// `None` keeps pure reset-on-arrival behaviour.
    #[serde(default)]
    pub max_debounce_ms: Option<u64>,
    /// Timeout for one bulk upstream call.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// How per-call and transport failures are presented to callers.
    #[serde(default)]
    pub failure_mode: FailureMode,
}

fn default_batch_window_ms() -> u64 { 50 }
fn default_request_timeout_ms() -> u64 { 30_000 }

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_window_ms: default_batch_window_ms(),
            max_debounce_ms: None,
            request_timeout_ms: default_request_timeout_ms(),
            failure_mode: FailureMode::default(),
        }
    }
}

impl BatchConfig {
    /// Config with a custom debounce window.
    pub fn with_window(window: Duration) -> Self {
        Self {
            batch_window_ms: window.as_millis() as u64,
            ..Self::default()
        }
    }

    pub fn batch_window(&self) -> Duration {
        Duration::from_millis(self.batch_window_ms)
    }

    pub fn max_debounce(&self) -> Option<Duration> {
        self.max_debounce_ms.map(Duration::from_millis)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}
