use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Circuit breaker thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Failures within the window that trip the breaker
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: usize,
    /// Sliding failure window
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
    /// Time spent open before a trial call is allowed
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
}

fn default_failure_threshold() -> usize {
    5
}

fn default_window_ms() -> u64 {
    30_000
}

fn default_cooldown_ms() -> u64 {
    30_000
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            window_ms: default_window_ms(),
            cooldown_ms: default_cooldown_ms(),
        }
    }
}

impl BreakerConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}
