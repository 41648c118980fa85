//! Priority negotiation between conflicting vehicles.
//!
//! Pairwise conflicts are resolved by a fixed rule ladder: emergency vehicle,
//! first arrival, right-of-way, lower speed, then id. Per-agent decisions only
//! ever escalate across pairs.

use crate::message::{StateMessage, VehicleAction};
use crate::risk::{assess_risk, distance, time_to_center, INTERSECTION_CENTER, INTERSECTION_RADIUS};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;


/// Arrival gap (s) above which the earlier vehicle simply goes first
pub const FIRST_ARRIVAL_GAP: f64 = 2.0;

/// Distance from the center where yielding vehicles must be stopped (m)
pub const STOP_BOUNDARY: f64 = 35.0;

/// Clearance over which a yielding vehicle scales back up to full speed (m)
pub const YIELD_SCALING_DISTANCE: f64 = 40.0;

/// Slowest speed a yielding vehicle keeps while it still has room (m/s)
pub const CREEP_SPEED: f64 = 1.0;

/// Clearance (m) at or below which a yielding vehicle holds still
const HOLD_CLEARANCE: f64 = 1.0;

/// Side of the intersection an agent approaches from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Approach {
    North,
    East,
    South,
    West,
}

impl Approach {
    /// Approach on the right-hand side of a driver coming from `self`
    pub fn right(self) -> Approach {
        match self {
            Approach::North => Approach::East,
            Approach::East => Approach::South,
            Approach::South => Approach::West,
            Approach::West => Approach::North,
        }
    }
}

/// Why a pair was resolved the way it was
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityReason {
    Clear,
    EmergencyVehicle,
    FirstArrival,
    RightOfWay,
    LowerSpeedYields,
    IdTiebreak,
}

impl fmt::Display for PriorityReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PriorityReason::Clear => "clear",
            PriorityReason::EmergencyVehicle => "emergency_vehicle",
            PriorityReason::FirstArrival => "first_arrival",
            PriorityReason::RightOfWay => "right_of_way",
            PriorityReason::LowerSpeedYields => "lower_speed_yields",
            PriorityReason::IdTiebreak => "id_tiebreak",
        };
        f.write_str(name)
    }
}

/// Final decision for one agent
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct AgentDecision {
    pub action: VehicleAction,
    pub reason: PriorityReason,
}

impl Default for AgentDecision {
    fn default() -> Self {
        Self {
            action: VehicleAction::Go,
            reason: PriorityReason::Clear,
        }
    }
}

/// Side of the intersection the agent is on, by dominant offset axis
pub fn approach_direction(agent: &StateMessage) -> Approach {
    let dx = agent.x - INTERSECTION_CENTER.0;
    let dy = agent.y - INTERSECTION_CENTER.1;
    if dx.abs() > dy.abs() {
        if dx > 0.0 {
            Approach::East
        } else {
            Approach::West
        }
    } else if dy > 0.0 {
        Approach::North
    } else {
        Approach::South
    }
}

/// True when `other` approaches from the right of a driver coming from `mine`
pub fn is_on_right(mine: Approach, other: Approach) -> bool {
    mine.right() == other
}

/// Resolve a conflict between two agents.
///
/// Returns `(decision_a, decision_b, reason)`. Swapping the arguments swaps
/// the decisions and keeps the reason.
pub fn resolve_priority(
    a: &StateMessage,
    b: &StateMessage,
) -> (VehicleAction, VehicleAction, PriorityReason) {
    use VehicleAction::{Go, Stop, Yield};

    if a.is_emergency != b.is_emergency {
        return if a.is_emergency {
            (Go, Stop, PriorityReason::EmergencyVehicle)
        } else {
            (Stop, Go, PriorityReason::EmergencyVehicle)
        };
    }

    let t1 = time_to_center(a);
    let t2 = time_to_center(b);
    // Both infinite: no arrival order to speak of
    if t1.is_finite() || t2.is_finite() {
        let gap = if t1.is_finite() && t2.is_finite() {
            (t1 - t2).abs()
        } else {
            f64::INFINITY
        };
        if gap > FIRST_ARRIVAL_GAP {
            return if t1 < t2 {
                (Go, Yield, PriorityReason::FirstArrival)
            } else {
                (Yield, Go, PriorityReason::FirstArrival)
            };
        }
    }

    let approach_a = approach_direction(a);
    let approach_b = approach_direction(b);
    if is_on_right(approach_a, approach_b) {
        return (Yield, Go, PriorityReason::RightOfWay);
    }
    if is_on_right(approach_b, approach_a) {
        return (Go, Yield, PriorityReason::RightOfWay);
    }

    if a.speed < b.speed {
        return (Yield, Go, PriorityReason::LowerSpeedYields);
    }
    if b.speed < a.speed {
        return (Go, Yield, PriorityReason::LowerSpeedYields);
    }

    if a.agent_id < b.agent_id {
        (Go, Yield, PriorityReason::IdTiebreak)
    } else {
        (Yield, Go, PriorityReason::IdTiebreak)
    }
}

fn escalate(current: &mut AgentDecision, action: VehicleAction, reason: PriorityReason) {
    if action > current.action {
        *current = AgentDecision { action, reason };
    }
}

/// Decision for every agent over all high/collision pairs.
///
/// Pairs are visited in id order; a pair can only make an agent's decision
/// more restrictive.
pub fn compute_decisions_for_all<'a, I>(states: I) -> HashMap<String, AgentDecision>
where
    I: IntoIterator<Item = &'a StateMessage>,
{
    let mut agents: Vec<&StateMessage> = states.into_iter().collect();
    agents.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));

    let mut decisions: HashMap<String, AgentDecision> = agents
        .iter()
        .map(|agent| (agent.agent_id.clone(), AgentDecision::default()))
        .collect();

    for (i, a) in agents.iter().enumerate() {
        for b in &agents[i + 1..] {
            if !assess_risk(a, b).is_critical() {
                continue;
            }
            let (action_a, action_b, reason) = resolve_priority(a, b);
            if let Some(current) = decisions.get_mut(&a.agent_id) {
                escalate(current, action_a, reason);
            }
            if let Some(current) = decisions.get_mut(&b.agent_id) {
                escalate(current, action_b, reason);
            }
        }
    }

    decisions
}

/// Speed a vehicle should aim for given its decision.
///
/// A vehicle already inside the intersection box always clears it at full
/// target speed. Yielding and braking vehicles slow down in proportion to
/// their remaining room before the stop boundary.
pub fn compute_recommended_speed(
    agent: &StateMessage,
    action: VehicleAction,
    target_speed: f64,
) -> f64 {
    let dist = distance(agent.position(), INTERSECTION_CENTER);
    if dist < INTERSECTION_RADIUS {
        return target_speed;
    }

    match action {
        VehicleAction::Go => target_speed,
        VehicleAction::Stop => 0.0,
        VehicleAction::Yield | VehicleAction::Brake => {
            let clearance = dist - STOP_BOUNDARY;
            if clearance <= HOLD_CLEARANCE {
                return 0.0;
            }
            let mut speed = target_speed * (clearance / YIELD_SCALING_DISTANCE).min(1.0);
            if action == VehicleAction::Brake {
                speed *= 0.5;
            }
            speed.max(CREEP_SPEED.min(target_speed))
        }
    }
}
