use crate::channel::V2xChannel;
use crate::config::{AgentConfig, SignalConfig};
use crate::coordinator::{SignalController, SignalState};
use crate::message::{RiskLevel, StateMessage};
use crate::risk::{collision_pairs, distance};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::time::Instant;
use tracing::{debug, info};

/// Vehicles closer than this are clearing the box (m)
const CLEARING_RADIUS: f64 = 5.0;

/// Green-phase vehicles slow down inside this distance (m)
const SLOW_ZONE: f64 = 50.0;

/// Speed cap inside the slow zone (m/s)
const SLOW_ZONE_SPEED: f64 = 8.0;

/// Distance of the stop line from the center (m)
const STOP_LINE: f64 = 25.0;

/// Slowest speed recommended to catch the next green (m/s)
const MIN_WAVE_SPEED: f64 = 2.0;

/// Below this speed a vehicle is not considered arriving
const MIN_MOVING_SPEED: f64 = 0.1;

/// What the intersection tells one vehicle
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Advisory {
    ClearIntersection,
    MaintainSpeedGreen,
    AdjustForNextGreen,
    SlowInIntersection,
    StopRedLight,
    DecelerateForRed,
    PrepareToStop,
    EmergencyOverride,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalColor {
    Green,
    Red,
}

/// Per-vehicle speed recommendation
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct SpeedRecommendation {
    /// m/s, rounded to 0.1
    pub recommended_speed: f64,
    pub action: Advisory,
    pub signal: SignalColor,
    /// Seconds until green for the vehicle's axis, rounded to 0.1
    pub time_to_green: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InfrastructureStats {
    pub vehicles_processed: u64,
    pub collisions_prevented: u64,
    pub emergency_preemptions: u64,
    pub phase_changes: u64,
    /// Seconds since the agent was created, rounded to 0.1
    pub uptime: f64,
}

/// Serializable view of the intersection
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InfrastructureState {
    pub agent_id: String,
    #[serde(flatten)]
    pub signal: SignalState,
    pub recommendations: BTreeMap<String, SpeedRecommendation>,
    pub stats: InfrastructureStats,
}

/// Smart traffic light of the demo intersection (V2I)
pub struct InfrastructureAgent {
    id: String,
    position: (f64, f64),
    controller: SignalController,
    max_speed: f64,
    deceleration: f64,
    recommendations: BTreeMap<String, SpeedRecommendation>,
    tracked: HashSet<String>,
    prev_collisions: HashSet<(String, String)>,
    stats: InfrastructureStats,
    started_at: Instant,
}

impl InfrastructureAgent {
    pub fn new(id: impl Into<String>, signal: &SignalConfig, agent: &AgentConfig) -> Self {
        Self {
            id: id.into(),
            position: (0.0, 0.0),
            controller: SignalController::new(signal.clone()),
            max_speed: agent.max_speed,
            deceleration: agent.deceleration,
            recommendations: BTreeMap::new(),
            tracked: HashSet::new(),
            prev_collisions: HashSet::new(),
            stats: InfrastructureStats::default(),
            started_at: Instant::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn controller(&self) -> &SignalController {
        &self.controller
    }

    /// Update the signal, recommendations and stats, then publish
    pub fn tick(&mut self, channel: &V2xChannel, dt: f64) {
        let states = channel.get_all_states();
        let vehicles: Vec<&StateMessage> = states.values().filter(|s| s.is_vehicle()).collect();

        let phase_before = self.controller.phase();
        self.controller.update(vehicles.iter().copied(), dt);
        if self.controller.phase() != phase_before {
            debug!(agent_id = %self.id, phase = ?self.controller.phase(), "Signal phase changed");
        }

        self.recommendations = vehicles
            .iter()
            .map(|v| (v.agent_id.clone(), self.recommend(v)))
            .collect();

        self.update_stats(&vehicles);

        channel.publish(StateMessage::infrastructure(
            self.id.clone(),
            self.position.0,
            self.position.1,
            self.controller.phase(),
            self.controller.is_preempted(),
        ));
    }

    fn stopping_distance(&self, speed: f64) -> f64 {
        if speed > 0.0 && self.deceleration > 0.0 {
            speed * speed / (2.0 * self.deceleration)
        } else {
            0.0
        }
    }

    fn recommend(&self, vehicle: &StateMessage) -> SpeedRecommendation {
        if vehicle.is_emergency {
            return SpeedRecommendation {
                recommended_speed: self.max_speed,
                action: Advisory::EmergencyOverride,
                signal: SignalColor::Green,
                time_to_green: 0.0,
            };
        }

        let dist = distance(vehicle.position(), self.position);
        if dist < CLEARING_RADIUS {
            return SpeedRecommendation {
                recommended_speed: round1(vehicle.speed.min(self.max_speed)),
                action: Advisory::ClearIntersection,
                signal: SignalColor::Green,
                time_to_green: 0.0,
            };
        }

        let axis = vehicle.axis();
        let remaining = self.controller.time_remaining();
        let time_to_arrive = if vehicle.speed > MIN_MOVING_SPEED {
            dist / vehicle.speed
        } else {
            f64::INFINITY
        };

        if self.controller.is_green_for(axis) {
            let (speed, action) = if dist <= SLOW_ZONE {
                (vehicle.speed.min(SLOW_ZONE_SPEED), Advisory::SlowInIntersection)
            } else if time_to_arrive <= remaining {
                (vehicle.speed.min(self.max_speed), Advisory::MaintainSpeedGreen)
            } else {
                // Misses this green; pace the arrival for the next one
                let next_green = remaining + self.controller.normal_phase_duration();
                (
                    (dist / next_green).clamp(MIN_WAVE_SPEED, self.max_speed),
                    Advisory::AdjustForNextGreen,
                )
            };
            return SpeedRecommendation {
                recommended_speed: round1(speed),
                action,
                signal: SignalColor::Green,
                time_to_green: 0.0,
            };
        }

        let time_to_green = self.controller.time_to_green(axis);
        let (speed, action) = if dist <= self.stopping_distance(vehicle.speed) + STOP_LINE {
            (0.0, Advisory::StopRedLight)
        } else if dist <= self.controller.approach_radius() {
            let paced = if time_to_green > 0.0 {
                dist / time_to_green
            } else {
                vehicle.speed
            };
            (paced.min(vehicle.speed * 0.75).max(0.0), Advisory::DecelerateForRed)
        } else {
            (vehicle.speed, Advisory::PrepareToStop)
        };

        SpeedRecommendation {
            recommended_speed: round1(speed),
            action,
            signal: SignalColor::Red,
            time_to_green: round1(time_to_green),
        }
    }

    fn update_stats(&mut self, vehicles: &[&StateMessage]) {
        let present: HashSet<String> = vehicles.iter().map(|v| v.agent_id.clone()).collect();
        for id in &present {
            if !self.tracked.contains(id) {
                self.stats.vehicles_processed += 1;
            }
        }
        self.tracked = present;

        let collisions: HashSet<(String, String)> = collision_pairs(vehicles.iter().copied())
            .into_iter()
            .filter(|p| p.risk == RiskLevel::Collision)
            .map(|p| (p.agent1, p.agent2))
            .collect();
        let resolved = self.prev_collisions.difference(&collisions).count() as u64;
        if resolved > 0 {
            self.stats.collisions_prevented += resolved;
            info!(
                agent_id = %self.id,
                resolved,
                total = self.stats.collisions_prevented,
                "Collision course resolved"
            );
        }
        self.prev_collisions = collisions;

        self.stats.emergency_preemptions = self.controller.preemptions();
        self.stats.phase_changes = self.controller.phase_changes();
        self.stats.uptime = round1(self.started_at.elapsed().as_secs_f64());
    }

    pub fn recommendations(&self) -> &BTreeMap<String, SpeedRecommendation> {
        &self.recommendations
    }

    pub fn stats(&self) -> &InfrastructureStats {
        &self.stats
    }

    pub fn state(&self) -> InfrastructureState {
        InfrastructureState {
            agent_id: self.id.clone(),
            signal: self.controller.state(),
            recommendations: self.recommendations.clone(),
            stats: self.stats.clone(),
        }
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
