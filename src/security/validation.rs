use crate::config::SecurityConfig;
use crate::message::StateMessage;
use chrono::{DateTime, Utc};
use std::fmt;

/// Max agent id length
pub const MAX_ID_LEN: usize = 32;

/// Max length of free-form text fields
pub const MAX_TEXT_LEN: usize = 64;

/// Intention substituted for an unusable one
const DEFAULT_INTENTION: &str = "straight";

/// Clamp bounds applied to every published state
#[derive(Debug, Clone, PartialEq)]
pub struct SanitizeLimits {
    pub coord_bound: f64,
    pub max_speed: f64,
    pub max_clock_skew_ms: i64,
}

impl Default for SanitizeLimits {
    fn default() -> Self {
        Self::from(&SecurityConfig::default())
    }
}

impl From<&SecurityConfig> for SanitizeLimits {
    fn from(config: &SecurityConfig) -> Self {
        Self {
            coord_bound: config.coord_bound,
            max_speed: config.max_speed,
            max_clock_skew_ms: config.max_clock_skew_ms,
        }
    }
}

/// Problems found while sanitizing a state message
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationIssue {
    InvalidAgentId(String),
    NonFinite { field: &'static str },
    OutOfRange { field: &'static str, value: f64 },
    IntentionTooLong(usize),
    SuspiciousTimestamp { skew_ms: i64 },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::InvalidAgentId(id) => write!(f, "bad agent_id: {:?}", id),
            ValidationIssue::NonFinite { field } => write!(f, "{} not finite", field),
            ValidationIssue::OutOfRange { field, value } => {
                write!(f, "{} out of range: {}", field, value)
            }
            ValidationIssue::IntentionTooLong(len) => {
                write!(f, "intention too long: {} chars (max {})", len, MAX_TEXT_LEN)
            }
            ValidationIssue::SuspiciousTimestamp { skew_ms } => {
                write!(f, "timestamp suspicious: {} ms from wall-clock", skew_ms)
            }
        }
    }
}

impl std::error::Error for ValidationIssue {}

/// Sanitized copy of a message plus everything that had to be fixed
#[derive(Debug, Clone)]
pub struct Sanitized {
    pub message: StateMessage,
    pub issues: Vec<ValidationIssue>,
}

impl Sanitized {
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Validates and sanitizes a state message.
///
/// Rules:
/// - agent_id: 1-32 chars, ASCII alphanumerics and underscore (kept as given)
/// - x, y: finite, clamped to [-coord_bound, coord_bound]
/// - speed: finite, clamped to [0, max_speed]
/// - direction: finite, normalized into [0, 360)
/// - intention: at most 64 chars, otherwise replaced by "straight"
/// - timestamp: within max_clock_skew_ms of `now`, otherwise replaced by `now`
///
/// Non-finite numbers fall back to the lower bound (0 for direction).
pub fn validate_and_sanitize(
    message: &StateMessage,
    limits: &SanitizeLimits,
    now: DateTime<Utc>,
) -> Sanitized {
    let mut issues = Vec::new();
    let mut clean = message.clone();

    if !is_valid_agent_id(&message.agent_id) {
        issues.push(ValidationIssue::InvalidAgentId(message.agent_id.clone()));
    }

    clean.x = clamp_field("x", message.x, -limits.coord_bound, limits.coord_bound, &mut issues);
    clean.y = clamp_field("y", message.y, -limits.coord_bound, limits.coord_bound, &mut issues);
    clean.speed = clamp_field("speed", message.speed, 0.0, limits.max_speed, &mut issues);

    clean.direction = if message.direction.is_finite() {
        message.direction.rem_euclid(360.0)
    } else {
        issues.push(ValidationIssue::NonFinite { field: "direction" });
        0.0
    };
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs
    if clean.direction >= 360.0 {
        clean.direction = 0.0;
    }

    let intention_len = message.intention.chars().count();
    if intention_len > MAX_TEXT_LEN {
        issues.push(ValidationIssue::IntentionTooLong(intention_len));
        clean.intention = DEFAULT_INTENTION.to_string();
    }

    let skew_ms = (now - message.timestamp).num_milliseconds();
    if skew_ms.abs() > limits.max_clock_skew_ms {
        issues.push(ValidationIssue::SuspiciousTimestamp { skew_ms });
        clean.timestamp = now;
    }

    Sanitized {
        message: clean,
        issues,
    }
}

fn clamp_field(
    field: &'static str,
    value: f64,
    lo: f64,
    hi: f64,
    issues: &mut Vec<ValidationIssue>,
) -> f64 {
    if !value.is_finite() {
        issues.push(ValidationIssue::NonFinite { field });
        return lo;
    }
    if value < lo || value > hi {
        issues.push(ValidationIssue::OutOfRange { field, value });
    }
    value.clamp(lo, hi)
}

/// Valid agent ids: 1-32 chars of ASCII letters, digits and underscores.
pub fn is_valid_agent_id(agent_id: &str) -> bool {
    !agent_id.is_empty()
        && agent_id.len() <= MAX_ID_LEN
        && agent_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}
