use super::V2xConfig;

impl V2xConfig {
    /// Apply environment overrides on top of file/default values.
    ///
    /// Unparseable values are ignored and the existing value is kept.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|name| std::env::var(name).ok())
    }

    pub(crate) fn with_overrides_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("V2X_HMAC_KEY") {
            if !v.is_empty() {
                self.security.hmac_key = v;
            }
        }
        if let Some(v) = lookup("V2X_STALE_TIMEOUT_MS") {
            if let Ok(n) = v.parse::<u64>() {
                self.security.stale_timeout_ms = n;
            }
        }
        if let Some(v) = lookup("V2X_BROADCAST_RATE_LIMIT") {
            if let Ok(n) = v.parse::<usize>() {
                self.security.broadcast_rate_limit = n;
            }
        }
        if let Some(v) = lookup("V2X_PHASE_DURATION_SECS") {
            if let Ok(n) = v.parse::<f64>() {
                if n.is_finite() && n > 0.0 {
                    self.coordinator.phase_duration_secs = n;
                }
            }
        }
        if let Some(v) = lookup("V2X_GREEN_WAVE_SPEED") {
            if let Ok(n) = v.parse::<f64>() {
                if n.is_finite() && n > 0.0 {
                    self.coordinator.green_wave_speed = n;
                }
            }
        }

        self
    }
}
