// Security guard consumed by the channel on every publish/broadcast:
// signing, sanitizing, broadcast rate limiting and staleness tracking.

mod signing;
mod stale;
mod validation;

pub use signing::{MessageSigner, SignedFields};
pub use stale::StaleDetector;
pub use validation::{
    is_valid_agent_id, validate_and_sanitize, SanitizeLimits, Sanitized, ValidationIssue,
    MAX_ID_LEN, MAX_TEXT_LEN,
};

use crate::config::SecurityConfig;
use crate::message::StateMessage;
use crate::rate_limit::RateLimiter;
use anyhow::Result;
use chrono::Utc;

/// Bundles the per-channel security state
pub struct SecurityGuard {
    signer: MessageSigner,
    limits: SanitizeLimits,
    rate_limiter: RateLimiter,
    stale_detector: StaleDetector,
}

impl SecurityGuard {
    pub fn new(config: &SecurityConfig) -> Result<Self> {
        Ok(Self {
            signer: MessageSigner::new(config.hmac_key.as_bytes())?,
            limits: SanitizeLimits::from(config),
            rate_limiter: RateLimiter::per_second(config.broadcast_rate_limit),
            stale_detector: StaleDetector::new(config.stale_timeout()),
        })
    }

    /// Sanitize against wall-clock now
    pub fn validate_and_sanitize(&self, message: &StateMessage) -> Sanitized {
        validate_and_sanitize(message, &self.limits, Utc::now())
    }

    pub fn sign(&self, message: &StateMessage) -> String {
        self.signer.sign(&SignedFields::of(message))
    }

    /// True when the message's signature matches its signed fields
    pub fn verify(&self, message: &StateMessage) -> bool {
        self.signer
            .verify(&SignedFields::of(message), &message.signature)
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    pub fn stale_detector(&self) -> &StaleDetector {
        &self.stale_detector
    }

    /// Forget all rate-limit windows and last-seen marks
    pub fn reset_trackers(&self) {
        self.rate_limiter.reset();
        self.stale_detector.reset();
    }
}
