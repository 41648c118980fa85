//! Optional advisory decision source for vehicles.
//!
//! An advisor proposes an action for a vehicle's situation. Calls go through
//! an [`AdvisorGateway`] which rate-limits them, bounds them with a timeout
//! and reports outcomes to a shared [`CircuitBreaker`]. The gateway never
//! surfaces an error: on any failure the vehicle keeps its last known advice
//! (or none) and the rule-based decision stands.

use crate::breaker::{BreakerState, CircuitBreaker};
use crate::config::AgentConfig;
use crate::message::{RiskLevel, VehicleAction};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Highest speed an advisor may recommend (m/s)
pub const MAX_ADVISED_SPEED: f64 = 25.0;

/// Advice reasons are cut to this many characters
const MAX_REASON_LEN: usize = 50;

/// Another agent as seen from the advised vehicle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NearbyAgent {
    pub agent_id: String,
    pub distance: f64,
    /// Seconds (infinite when not closing)
    pub ttc: f64,
    pub risk: RiskLevel,
    pub is_emergency: bool,
}

/// Everything an advisor gets to see about one vehicle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Situation {
    pub agent_id: String,
    pub x: f64,
    pub y: f64,
    pub speed: f64,
    pub direction: f64,
    pub intention: String,
    pub is_emergency: bool,
    pub distance_to_center: f64,
    pub risk_level: RiskLevel,
    /// Decision of the rule-based negotiation for this tick
    pub rule_action: VehicleAction,
    /// Green for this vehicle's axis, when a signal is known
    pub signal_green: Option<bool>,
    pub nearby: Vec<NearbyAgent>,
    /// Messages of alerts received since the last tick
    pub alerts: Vec<String>,
}

/// Advisor proposal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Advice {
    pub action: VehicleAction,
    pub speed: f64,
    #[serde(default)]
    pub reason: String,
}

impl Advice {
    /// Parse the JSON form `{"action": "...", "speed": .., "reason": ".."}`
    pub fn from_json(text: &str) -> Result<Self, AdvisorError> {
        let advice: Advice = serde_json::from_str(text.trim())
            .map_err(|e| AdvisorError::Malformed(e.to_string()))?;
        Ok(advice.sanitized())
    }

    /// Speed clamped to `[0, MAX_ADVISED_SPEED]`, reason shortened
    pub fn sanitized(mut self) -> Self {
        self.speed = if self.speed.is_finite() {
            self.speed.clamp(0.0, MAX_ADVISED_SPEED)
        } else {
            0.0
        };
        if self.reason.chars().count() > MAX_REASON_LEN {
            self.reason = self.reason.chars().take(MAX_REASON_LEN).collect();
        }
        self
    }
}

/// Advisor call errors
#[derive(Debug, Clone, PartialEq)]
pub enum AdvisorError {
    /// Backend could not be reached or refused the call
    Unavailable(String),
    /// Backend answered with something that is not advice
    Malformed(String),
    /// No answer within the gateway timeout
    Timeout,
}

impl std::fmt::Display for AdvisorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AdvisorError::Unavailable(msg) => write!(f, "Advisor unavailable: {}", msg),
            AdvisorError::Malformed(msg) => write!(f, "Malformed advice: {}", msg),
            AdvisorError::Timeout => write!(f, "Advisor timed out"),
        }
    }
}

impl std::error::Error for AdvisorError {}

/// Source of advisory decisions
#[async_trait]
pub trait DecisionAdvisor: Send + Sync {
    async fn advise(&self, situation: &Situation) -> Result<Advice, AdvisorError>;
}

/// Gateway counters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GatewayStats {
    pub calls: u64,
    pub errors: u64,
    pub breaker_state: BreakerState,
    pub last_advice: Option<Advice>,
}

/// Per-vehicle call site of a shared advisor
pub struct AdvisorGateway {
    advisor: Arc<dyn DecisionAdvisor>,
    breaker: Arc<CircuitBreaker>,
    timeout: Duration,
    min_interval: Duration,
    last_call: Option<Instant>,
    last_advice: Option<Advice>,
    calls: u64,
    errors: u64,
}

impl AdvisorGateway {
    pub fn new(
        advisor: Arc<dyn DecisionAdvisor>,
        breaker: Arc<CircuitBreaker>,
        timeout: Duration,
        min_interval: Duration,
    ) -> Self {
        Self {
            advisor,
            breaker,
            timeout,
            min_interval,
            last_call: None,
            last_advice: None,
            calls: 0,
            errors: 0,
        }
    }

    /// Gateway with the timeout and call spacing from `config`
    pub fn from_config(
        advisor: Arc<dyn DecisionAdvisor>,
        breaker: Arc<CircuitBreaker>,
        config: &AgentConfig,
    ) -> Self {
        Self::new(
            advisor,
            breaker,
            Duration::from_millis(config.advisor_timeout_ms),
            Duration::from_millis(config.advisor_min_interval_ms),
        )
    }

    /// Ask the advisor, falling back to the last known advice.
    ///
    /// The call spacing is checked before the breaker so that a half-open
    /// trial is only claimed by a call that actually goes out.
    pub async fn consult(&mut self, agent_id: &str, situation: &Situation) -> Option<Advice> {
        if self
            .last_call
            .is_some_and(|last| last.elapsed() < self.min_interval)
        {
            return self.last_advice.clone();
        }

        if !self.breaker.allow_request() {
            debug!(agent_id = %agent_id, breaker = %self.breaker.name(), "Advisor call skipped, circuit open");
            return self.last_advice.clone();
        }

        self.last_call = Some(Instant::now());
        self.calls += 1;

        let outcome = match tokio::time::timeout(self.timeout, self.advisor.advise(situation)).await {
            Ok(result) => result,
            Err(_) => Err(AdvisorError::Timeout),
        };

        match outcome {
            Ok(advice) => {
                self.breaker.record_success();
                self.last_advice = Some(advice.sanitized());
            }
            Err(e) => {
                self.breaker.record_failure();
                self.errors += 1;
                warn!(agent_id = %agent_id, error = %e, errors = self.errors, "Advisor call failed");
            }
        }

        self.last_advice.clone()
    }

    pub fn last_advice(&self) -> Option<&Advice> {
        self.last_advice.as_ref()
    }

    pub fn stats(&self) -> GatewayStats {
        GatewayStats {
            calls: self.calls,
            errors: self.errors,
            breaker_state: self.breaker.state(),
            last_advice: self.last_advice.clone(),
        }
    }

    /// Forget call history and cached advice
    pub fn reset(&mut self) {
        self.last_call = None;
        self.last_advice = None;
        self.calls = 0;
        self.errors = 0;
    }
}
