use crate::message::{Axis, LightPhase};
use serde::Serialize;

/// Phase of a light whose cycle is shifted by `offset` seconds.
///
/// First half of the `2 * phase_duration` cycle is NS green, second half EW.
pub fn phase_at(clock: f64, offset: f64, phase_duration: f64) -> LightPhase {
    let cycle = 2.0 * phase_duration;
    if cycle <= 0.0 {
        return LightPhase::NsGreen;
    }
    if (clock + offset).rem_euclid(cycle) < phase_duration {
        LightPhase::NsGreen
    } else {
        LightPhase::EwGreen
    }
}

/// One coordinated intersection light
#[derive(Debug, Clone, PartialEq)]
pub struct TrafficLight {
    pub x: f64,
    pub y: f64,
    /// Fixed shift into the shared cycle (s)
    pub phase_offset: f64,
    phase: LightPhase,
}

impl TrafficLight {
    pub fn new(x: f64, y: f64, phase_offset: f64, phase_duration: f64) -> Self {
        Self {
            x,
            y,
            phase_offset,
            phase: phase_at(0.0, phase_offset, phase_duration),
        }
    }

    pub fn update(&mut self, clock: f64, phase_duration: f64) {
        self.phase = phase_at(clock, self.phase_offset, phase_duration);
    }

    pub fn phase(&self) -> LightPhase {
        self.phase
    }

    pub fn is_green_for_axis(&self, axis: Axis) -> bool {
        self.phase.is_green_for_axis(axis)
    }

    pub fn state(&self) -> LightState {
        LightState {
            x: self.x,
            y: self.y,
            phase: self.phase,
        }
    }
}

/// Serializable view of one light
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LightState {
    pub x: f64,
    pub y: f64,
    pub phase: LightPhase,
}

impl LightState {
    pub fn is_green_for_axis(&self, axis: Axis) -> bool {
        self.phase.is_green_for_axis(axis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_halves() {
        assert_eq!(phase_at(0.0, 0.0, 12.0), LightPhase::NsGreen);
        assert_eq!(phase_at(11.9, 0.0, 12.0), LightPhase::NsGreen);
        assert_eq!(phase_at(12.0, 0.0, 12.0), LightPhase::EwGreen);
        assert_eq!(phase_at(23.9, 0.0, 12.0), LightPhase::EwGreen);
        assert_eq!(phase_at(24.0, 0.0, 12.0), LightPhase::NsGreen);
    }

    #[test]
    fn test_offset_shifts_cycle() {
        assert_eq!(phase_at(0.0, 12.0, 12.0), LightPhase::EwGreen);
        assert_eq!(phase_at(5.0, 10.0, 12.0), LightPhase::EwGreen);
        assert_eq!(phase_at(14.0, 10.0, 12.0), LightPhase::NsGreen);
    }

    #[test]
    fn test_light_update_is_pure() {
        let mut light = TrafficLight::new(0.0, 0.0, 3.0, 12.0);
        light.update(50.0, 12.0);
        let after_jump = light.phase();

        let mut stepped = TrafficLight::new(0.0, 0.0, 3.0, 12.0);
        for i in 1..=250 {
            stepped.update(i as f64 * 0.2, 12.0);
        }
        assert_eq!(stepped.phase(), after_jump);
        assert_eq!(after_jump, phase_at(50.0, 3.0, 12.0));
    }

    #[test]
    fn test_green_for_axis() {
        let light = TrafficLight::new(0.0, 0.0, 0.0, 12.0);
        assert!(light.is_green_for_axis(Axis::NorthSouth));
        assert!(!light.is_green_for_axis(Axis::EastWest));
        assert!(light.state().is_green_for_axis(Axis::NorthSouth));
    }
}
