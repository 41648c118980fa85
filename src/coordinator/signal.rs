use crate::config::SignalConfig;
use crate::message::{Axis, LightPhase, StateMessage};
use crate::risk::{distance, INTERSECTION_CENTER};
use serde::Serialize;
use tracing::info;

/// Single-intersection signal controller with emergency preemption.
///
/// Rotates phases on a timer advanced by the caller. While an emergency
/// vehicle is within the approach radius the phase is held green for that
/// vehicle's axis with the extended duration.
#[derive(Debug, Clone)]
pub struct SignalController {
    config: SignalConfig,
    phase: LightPhase,
    phase_timer: f64,
    phase_duration: f64,
    emergency_axis: Option<Axis>,
    preemptions: u64,
    phase_changes: u64,
}

/// Serializable view of the controller
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalState {
    pub phase: LightPhase,
    pub phase_timer: f64,
    pub phase_remaining: f64,
    pub phase_duration: f64,
    pub emergency_mode: bool,
    pub emergency_axis: Option<Axis>,
}

impl SignalController {
    pub fn new(config: SignalConfig) -> Self {
        let phase_duration = config.phase_duration_secs;
        Self {
            config,
            phase: LightPhase::NsGreen,
            phase_timer: 0.0,
            phase_duration,
            emergency_axis: None,
            preemptions: 0,
            phase_changes: 0,
        }
    }

    /// Movement axis of the closest emergency vehicle within the approach radius
    pub fn detect_emergency<'a, I>(&self, states: I) -> Option<Axis>
    where
        I: IntoIterator<Item = &'a StateMessage>,
    {
        states
            .into_iter()
            .filter(|s| s.is_vehicle() && s.is_emergency)
            .map(|s| (distance(s.position(), INTERSECTION_CENTER), s))
            .filter(|(dist, _)| *dist < self.config.approach_radius)
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, s)| s.axis())
    }

    /// Advance the controller by `dt` seconds given the current channel states
    pub fn update<'a, I>(&mut self, states: I, dt: f64)
    where
        I: IntoIterator<Item = &'a StateMessage>,
    {
        match self.detect_emergency(states) {
            Some(axis) => {
                if self.emergency_axis.is_none() {
                    self.preemptions += 1;
                    self.phase_timer = 0.0;
                    self.phase_duration = self.config.emergency_phase_secs;
                    info!(axis = ?axis, preemptions = self.preemptions, "Emergency preemption");
                }
                self.emergency_axis = Some(axis);
                self.set_phase(LightPhase::for_axis(axis));
            }
            None => {
                if self.emergency_axis.take().is_some() {
                    self.phase_duration = self.config.phase_duration_secs;
                    self.phase_timer = 0.0;
                    info!("Emergency preemption ended, normal rotation resumed");
                }

                self.phase_timer += dt;
                if self.phase_timer >= self.phase_duration {
                    self.phase_timer = 0.0;
                    self.set_phase(self.phase.toggled());
                }
            }
        }
    }

    fn set_phase(&mut self, phase: LightPhase) {
        if self.phase != phase {
            self.phase = phase;
            self.phase_changes += 1;
        }
    }

    pub fn phase(&self) -> LightPhase {
        self.phase
    }

    pub fn green_axis(&self) -> Axis {
        self.emergency_axis.unwrap_or_else(|| self.phase.green_axis())
    }

    pub fn is_green_for(&self, axis: Axis) -> bool {
        self.green_axis() == axis
    }

    pub fn is_preempted(&self) -> bool {
        self.emergency_axis.is_some()
    }

    /// Seconds left in the current phase
    pub fn time_remaining(&self) -> f64 {
        (self.phase_duration - self.phase_timer).max(0.0)
    }

    /// Seconds until `axis` next turns green (0 when green now)
    pub fn time_to_green(&self, axis: Axis) -> f64 {
        if self.is_green_for(axis) {
            0.0
        } else {
            self.time_remaining()
        }
    }

    pub fn normal_phase_duration(&self) -> f64 {
        self.config.phase_duration_secs
    }

    pub fn approach_radius(&self) -> f64 {
        self.config.approach_radius
    }

    pub fn preemptions(&self) -> u64 {
        self.preemptions
    }

    pub fn phase_changes(&self) -> u64 {
        self.phase_changes
    }

    pub fn state(&self) -> SignalState {
        SignalState {
            phase: self.phase,
            phase_timer: round1(self.phase_timer),
            phase_remaining: round1(self.time_remaining()),
            phase_duration: self.phase_duration,
            emergency_mode: self.is_preempted(),
            emergency_axis: self.emergency_axis,
        }
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
