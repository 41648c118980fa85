//! Collision-risk engine.
//!
//! Pure functions over agent states: distances, velocities, time to reach
//! the intersection, time to collision, and a four-level risk classification.
//! Only vehicle pairs are ever classified above `low`.

use crate::message::{Axis, RiskLevel, StateMessage};
use serde::Serialize;


/// Center of the demo intersection
pub const INTERSECTION_CENTER: (f64, f64) = (0.0, 0.0);

/// Radius of the intersection box (m)
pub const INTERSECTION_RADIUS: f64 = 30.0;

/// Radius within which close arrivals count as dangerous (m)
pub const DANGER_ZONE_RADIUS: f64 = 120.0;

pub const TTC_COLLISION: f64 = 3.0;
pub const TTC_HIGH: f64 = 6.0;
pub const TTC_MEDIUM: f64 = 10.0;

pub const GAP_COLLISION: f64 = 2.0;
pub const GAP_HIGH: f64 = 4.0;
pub const GAP_MEDIUM: f64 = 6.0;

/// Below this speed (m/s) an agent is treated as standing still
const MIN_MOVING_SPEED: f64 = 0.1;

/// Separations below this (m) are already a collision
const CONTACT_DISTANCE: f64 = 1.0;

/// Max deviation from 180° for two headings to count as opposite
const OPPOSITE_TOLERANCE_DEG: f64 = 10.0;

/// Max heading difference for two agents to count as following
const FOLLOWING_TOLERANCE_DEG: f64 = 30.0;

/// Max lateral offset for two agents to share a lane (m)
const SAME_LANE_OFFSET: f64 = 25.0;

pub fn distance(p1: (f64, f64), p2: (f64, f64)) -> f64 {
    (p2.0 - p1.0).hypot(p2.1 - p1.1)
}

/// Velocity components for a compass heading (0 = north, clockwise)
pub fn velocity(speed: f64, direction: f64) -> (f64, f64) {
    let rad = direction.to_radians();
    (speed * rad.sin(), speed * rad.cos())
}

/// Seconds until `agent` reaches `center` at its current speed.
///
/// Infinite when the agent stands still or moves away from the center.
pub fn time_to_intersection(agent: &StateMessage, center: (f64, f64)) -> f64 {
    if agent.speed < MIN_MOVING_SPEED {
        return f64::INFINITY;
    }

    let dist = distance(agent.position(), center);
    if dist == 0.0 {
        return 0.0;
    }

    let (vx, vy) = velocity(agent.speed, agent.direction);
    let closing = (vx * (center.0 - agent.x) + vy * (center.1 - agent.y)) / dist;
    if closing <= 0.0 {
        return f64::INFINITY;
    }
    dist / closing
}

/// Time to reach the demo intersection center
pub fn time_to_center(agent: &StateMessage) -> f64 {
    time_to_intersection(agent, INTERSECTION_CENTER)
}

/// Seconds until the two agents meet, from the current closing rate.
///
/// Zero when already in contact, infinite when not closing.
pub fn compute_ttc(a: &StateMessage, b: &StateMessage) -> f64 {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let dist = dx.hypot(dy);
    if dist < CONTACT_DISTANCE {
        return 0.0;
    }

    let (ax, ay) = velocity(a.speed, a.direction);
    let (bx, by) = velocity(b.speed, b.direction);
    let (rvx, rvy) = (bx - ax, by - ay);
    if rvx.hypot(rvy) < MIN_MOVING_SPEED {
        return f64::INFINITY;
    }

    let rate = (dx * rvx + dy * rvy) / dist;
    if rate >= 0.0 {
        return f64::INFINITY;
    }
    dist / -rate
}

/// Absolute heading difference folded into [0, 180]
fn heading_difference(a: f64, b: f64) -> f64 {
    let diff = (a - b).rem_euclid(360.0);
    diff.min(360.0 - diff)
}

fn same_road_opposite(a: &StateMessage, b: &StateMessage) -> bool {
    a.axis() == b.axis()
        && (heading_difference(a.direction, b.direction) - 180.0).abs() <= OPPOSITE_TOLERANCE_DEG
}

fn following_same_direction(a: &StateMessage, b: &StateMessage) -> bool {
    if a.axis() != b.axis()
        || heading_difference(a.direction, b.direction) > FOLLOWING_TOLERANCE_DEG
    {
        return false;
    }
    let lateral = match a.axis() {
        Axis::NorthSouth => (a.x - b.x).abs(),
        Axis::EastWest => (a.y - b.y).abs(),
    };
    lateral < SAME_LANE_OFFSET
}

/// Classify the collision risk between two agents.
///
/// Time to collision and the arrival gap at the intersection are OR-combined
/// per level, so close pairs with near-equal arrival times escalate even when
/// they are not currently closing.
pub fn assess_risk(a: &StateMessage, b: &StateMessage) -> RiskLevel {
    if !a.is_vehicle() || !b.is_vehicle() {
        return RiskLevel::Low;
    }
    if same_road_opposite(a, b) || following_same_direction(a, b) {
        return RiskLevel::Low;
    }

    let t1 = time_to_center(a);
    let t2 = time_to_center(b);
    let gap = if t1.is_finite() && t2.is_finite() {
        Some((t1 - t2).abs())
    } else {
        None
    };
    let dist = distance(a.position(), b.position());
    let ttc = compute_ttc(a, b);

    let gap_below =
        |threshold: f64, radius: f64| gap.is_some_and(|g| g < threshold && dist < radius);

    if ttc <= TTC_COLLISION || gap_below(GAP_COLLISION, DANGER_ZONE_RADIUS) {
        RiskLevel::Collision
    } else if ttc <= TTC_HIGH || gap_below(GAP_HIGH, DANGER_ZONE_RADIUS) {
        RiskLevel::High
    } else if ttc <= TTC_MEDIUM || gap_below(GAP_MEDIUM, 2.0 * DANGER_ZONE_RADIUS) {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

/// Highest risk between `me` and any of `others`
pub fn risk_for_agent<'a, I>(me: &StateMessage, others: I) -> RiskLevel
where
    I: IntoIterator<Item = &'a StateMessage>,
{
    if distance(me.position(), INTERSECTION_CENTER) > 2.0 * DANGER_ZONE_RADIUS {
        return RiskLevel::Low;
    }

    let mut max_risk = RiskLevel::Low;
    for other in others {
        if other.agent_id == me.agent_id {
            continue;
        }
        max_risk = max_risk.max(assess_risk(me, other));
        if max_risk == RiskLevel::Collision {
            break;
        }
    }
    max_risk
}

/// A pair of agents on a high-or-worse collision course
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollisionPair {
    pub agent1: String,
    pub agent2: String,
    pub risk: RiskLevel,
    /// Seconds, rounded to 2 decimals (infinite serializes as null)
    pub ttc: f64,
}

impl CollisionPair {
    pub fn involves(&self, agent_id: &str) -> bool {
        self.agent1 == agent_id || self.agent2 == agent_id
    }
}

/// Every unordered pair classified `high` or `collision`, in id order
pub fn collision_pairs<'a, I>(states: I) -> Vec<CollisionPair>
where
    I: IntoIterator<Item = &'a StateMessage>,
{
    let mut agents: Vec<&StateMessage> = states.into_iter().collect();
    agents.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));

    let mut pairs = Vec::new();
    for (i, a) in agents.iter().enumerate() {
        for b in &agents[i + 1..] {
            let risk = assess_risk(a, b);
            if risk.is_critical() {
                pairs.push(CollisionPair {
                    agent1: a.agent_id.clone(),
                    agent2: b.agent_id.clone(),
                    risk,
                    ttc: round2(compute_ttc(a, b)),
                });
            }
        }
    }
    pairs
}

fn round2(value: f64) -> f64 {
    if value.is_finite() {
        (value * 100.0).round() / 100.0
    } else {
        value
    }
}
