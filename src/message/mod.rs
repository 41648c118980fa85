use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[cfg(test)]
mod tests;

/// Kind of agent publishing on the V2X channel
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    Vehicle,
    Infrastructure,
}

/// Four-level collision risk, ordered from safest to most dangerous
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Collision,
}

impl RiskLevel {
    /// High and collision risks trigger priority negotiation
    pub fn is_critical(self) -> bool {
        matches!(self, RiskLevel::High | RiskLevel::Collision)
    }
}

/// Vehicle action, ordered by restrictiveness (go < yield < brake < stop)
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleAction {
    Go,
    Yield,
    Brake,
    Stop,
}

impl VehicleAction {
    /// Returns the more restrictive of the two actions
    pub fn most_restrictive(self, other: VehicleAction) -> VehicleAction {
        self.max(other)
    }
}

/// Movement axis through an intersection
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    #[serde(rename = "NS")]
    NorthSouth,
    #[serde(rename = "EW")]
    EastWest,
}

impl Axis {
    /// Dominant axis of a compass heading (0 = north, clockwise)
    pub fn of_heading(direction: f64) -> Axis {
        let rad = direction.to_radians();
        if rad.cos().abs() >= rad.sin().abs() {
            Axis::NorthSouth
        } else {
            Axis::EastWest
        }
    }
}

/// Traffic-light phase of a two-phase intersection
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LightPhase {
    #[serde(rename = "NS_GREEN")]
    NsGreen,
    #[serde(rename = "EW_GREEN")]
    EwGreen,
}

impl LightPhase {
    pub fn green_axis(self) -> Axis {
        match self {
            LightPhase::NsGreen => Axis::NorthSouth,
            LightPhase::EwGreen => Axis::EastWest,
        }
    }

    pub fn for_axis(axis: Axis) -> LightPhase {
        match axis {
            Axis::NorthSouth => LightPhase::NsGreen,
            Axis::EastWest => LightPhase::EwGreen,
        }
    }

    pub fn toggled(self) -> LightPhase {
        match self {
            LightPhase::NsGreen => LightPhase::EwGreen,
            LightPhase::EwGreen => LightPhase::NsGreen,
        }
    }

    pub fn is_green_for_axis(self, axis: Axis) -> bool {
        self.green_axis() == axis
    }
}

/// What an agent announces it is doing.
///
/// Vehicles carry an action, infrastructure carries the signal it shows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Action(VehicleAction),
    Signal { phase: LightPhase, preempted: bool },
}

impl Decision {
    pub fn action(&self) -> Option<VehicleAction> {
        match self {
            Decision::Action(action) => Some(*action),
            Decision::Signal { .. } => None,
        }
    }

    pub fn signal_phase(&self) -> Option<LightPhase> {
        match self {
            Decision::Signal { phase, .. } => Some(*phase),
            Decision::Action(_) => None,
        }
    }
}

/// Latest known state of one agent, as published on the channel
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StateMessage {
    /// Unique agent identifier (alphanumeric + underscore, max 32 chars)
    pub agent_id: String,

    pub agent_type: AgentType,

    /// Position in meters relative to the demo intersection center
    pub x: f64,
    pub y: f64,

    /// Speed in m/s
    pub speed: f64,

    /// Heading in degrees (0 = north, clockwise)
    pub direction: f64,

    /// Free-form short intention ("straight", "left", ...)
    pub intention: String,

    pub risk_level: RiskLevel,

    pub decision: Decision,

    /// Producer time
    pub timestamp: DateTime<Utc>,

    #[serde(default)]
    pub is_emergency: bool,

    #[serde(default)]
    pub is_police: bool,

    #[serde(default)]
    pub is_drunk: bool,

    /// Integrity signature, attached by the channel on publish
    #[serde(default)]
    pub signature: String,
}

impl StateMessage {
    /// New vehicle state with neutral defaults (straight, low risk, go)
    pub fn vehicle(agent_id: impl Into<String>, x: f64, y: f64, speed: f64, direction: f64) -> Self {
        Self {
            agent_id: agent_id.into(),
            agent_type: AgentType::Vehicle,
            x,
            y,
            speed,
            direction,
            intention: "straight".to_string(),
            risk_level: RiskLevel::Low,
            decision: Decision::Action(VehicleAction::Go),
            timestamp: Utc::now(),
            is_emergency: false,
            is_police: false,
            is_drunk: false,
            signature: String::new(),
        }
    }

    /// New infrastructure state announcing a signal phase
    pub fn infrastructure(
        agent_id: impl Into<String>,
        x: f64,
        y: f64,
        phase: LightPhase,
        preempted: bool,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            agent_type: AgentType::Infrastructure,
            x,
            y,
            speed: 0.0,
            direction: 0.0,
            intention: match phase {
                LightPhase::NsGreen => "NS_GREEN".to_string(),
                LightPhase::EwGreen => "EW_GREEN".to_string(),
            },
            risk_level: RiskLevel::Low,
            decision: Decision::Signal { phase, preempted },
            timestamp: Utc::now(),
            is_emergency: false,
            is_police: false,
            is_drunk: false,
            signature: String::new(),
        }
    }

    pub fn with_intention(mut self, intention: impl Into<String>) -> Self {
        self.intention = intention.into();
        self
    }

    pub fn with_risk(mut self, risk_level: RiskLevel) -> Self {
        self.risk_level = risk_level;
        self
    }

    pub fn with_action(mut self, action: VehicleAction) -> Self {
        self.decision = Decision::Action(action);
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn emergency(mut self, is_emergency: bool) -> Self {
        self.is_emergency = is_emergency;
        self
    }

    pub fn police(mut self, is_police: bool) -> Self {
        self.is_police = is_police;
        self
    }

    pub fn drunk(mut self, is_drunk: bool) -> Self {
        self.is_drunk = is_drunk;
        self
    }

    pub fn position(&self) -> (f64, f64) {
        (self.x, self.y)
    }

    pub fn is_vehicle(&self) -> bool {
        self.agent_type == AgentType::Vehicle
    }

    /// Dominant axis of this agent's heading
    pub fn axis(&self) -> Axis {
        Axis::of_heading(self.direction)
    }
}

/// Kind of broadcast alert
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    CollisionWarning,
    EmergencyApproach,
    Yielding,
    Custom,
}

/// Ephemeral alert broadcast to every agent or addressed to one
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BroadcastAlert {
    /// UUIDv7 identifier (time-ordered)
    pub alert_id: String,

    pub from_id: String,

    pub alert_type: AlertType,

    pub message: String,

    pub timestamp: DateTime<Utc>,

    /// When set, only this agent receives the alert
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
}

impl BroadcastAlert {
    pub fn new(from_id: impl Into<String>, alert_type: AlertType, message: impl Into<String>) -> Self {
        Self {
            alert_id: Uuid::now_v7().to_string(),
            from_id: from_id.into(),
            alert_type,
            message: message.into(),
            timestamp: Utc::now(),
            target_id: None,
        }
    }

    /// Address the alert to a single recipient
    pub fn to(mut self, target_id: impl Into<String>) -> Self {
        self.target_id = Some(target_id.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Whether `agent_id` should see this alert (never its own, honors target)
    pub fn is_visible_to(&self, agent_id: &str) -> bool {
        self.from_id != agent_id
            && self
                .target_id
                .as_deref()
                .map_or(true, |target| target == agent_id)
    }
}
