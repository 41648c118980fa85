use crate::config::SimulationConfig;
use crate::negotiation::Approach;
use serde::Serialize;
use tracing::warn;

pub const RIGHT_OF_WAY: &str = "right_of_way";
pub const EMERGENCY_VEHICLE: &str = "emergency_vehicle";
pub const EMERGENCY_VEHICLE_NO_LIGHTS: &str = "emergency_vehicle_no_lights";
pub const MULTI_VEHICLE_TRAFFIC_LIGHT: &str = "multi_vehicle_traffic_light";
pub const DRUNK_DRIVER: &str = "drunk_driver";
pub const GREEN_WAVE: &str = "green_wave";

/// Every scenario name accepted by [`build`]
pub const SCENARIOS: [&str; 6] = [
    RIGHT_OF_WAY,
    EMERGENCY_VEHICLE,
    EMERGENCY_VEHICLE_NO_LIGHTS,
    MULTI_VEHICLE_TRAFFIC_LIGHT,
    DRUNK_DRIVER,
    GREEN_WAVE,
];

/// Target speed of vehicles that do not set their own (m/s)
const DEFAULT_TARGET_SPEED: f64 = 10.0;

/// Where vehicles of a scenario read their traffic light from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalSource {
    /// Unsignalled intersection, negotiation only
    None,
    /// Smart light published on the channel by the infrastructure agent
    Infrastructure,
    /// Green-wave grid of the intersection coordinator
    Grid,
}

/// Initial state of one scenario vehicle
#[derive(Clone, Debug, PartialEq)]
pub struct VehicleSpec {
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub direction: f64,
    pub speed: f64,
    pub target_speed: f64,
    pub is_emergency: bool,
    pub is_police: bool,
    pub is_drunk: bool,
}

impl VehicleSpec {
    /// Vehicle in the right-hand lane of the road entering from `from`
    pub fn entering(id: &str, from: Approach, speed: f64, config: &SimulationConfig) -> Self {
        let lane = config.lane_offset;
        let spawn = config.spawn_distance;
        let (x, y, direction) = match from {
            Approach::North => (-lane, spawn, 180.0),
            Approach::East => (spawn, lane, 270.0),
            Approach::South => (lane, -spawn, 0.0),
            Approach::West => (-spawn, -lane, 90.0),
        };

        Self {
            id: id.to_string(),
            x,
            y,
            direction,
            speed,
            target_speed: DEFAULT_TARGET_SPEED,
            is_emergency: false,
            is_police: false,
            is_drunk: false,
        }
    }

    pub fn target(mut self, target_speed: f64) -> Self {
        self.target_speed = target_speed;
        self
    }

    pub fn emergency(mut self) -> Self {
        self.is_emergency = true;
        self
    }

    pub fn police(mut self) -> Self {
        self.is_police = true;
        self
    }

    pub fn drunk(mut self) -> Self {
        self.is_drunk = true;
        self
    }
}

/// A named initial situation at the demo intersection
#[derive(Clone, Debug, PartialEq)]
pub struct Scenario {
    pub name: &'static str,
    pub signals: SignalSource,
    pub vehicles: Vec<VehicleSpec>,
}

/// Build scenario `name`; unknown names fall back to `right_of_way`
pub fn build(name: &str, config: &SimulationConfig) -> Scenario {
    use Approach::{East, North, South, West};
    let v = |id: &str, from: Approach, speed: f64| VehicleSpec::entering(id, from, speed, config);

    match name {
        RIGHT_OF_WAY => Scenario {
            name: RIGHT_OF_WAY,
            signals: SignalSource::None,
            vehicles: vec![
                v("VH_N", North, 18.0),
                v("VH_E", East, 18.0),
                v("VH_S", South, 18.0),
            ],
        },
        EMERGENCY_VEHICLE | EMERGENCY_VEHICLE_NO_LIGHTS => Scenario {
            name: if name == EMERGENCY_VEHICLE {
                EMERGENCY_VEHICLE
            } else {
                EMERGENCY_VEHICLE_NO_LIGHTS
            },
            signals: if name == EMERGENCY_VEHICLE {
                SignalSource::Infrastructure
            } else {
                SignalSource::None
            },
            vehicles: vec![
                v("AMBULANCE", West, 25.2).target(25.2).emergency(),
                v("VH_C", South, 18.0).target(18.0),
            ],
        },
        MULTI_VEHICLE_TRAFFIC_LIGHT => Scenario {
            name: MULTI_VEHICLE_TRAFFIC_LIGHT,
            signals: SignalSource::Infrastructure,
            vehicles: vec![
                v("VH_N", North, 18.0),
                v("VH_S", South, 16.2),
                v("VH_E", East, 19.8),
                v("VH_W", West, 14.4),
            ],
        },
        DRUNK_DRIVER => Scenario {
            name: DRUNK_DRIVER,
            signals: SignalSource::None,
            vehicles: vec![
                v("VH_A", North, 18.0).target(18.0),
                v("DRUNK", East, 14.0).target(14.0).drunk(),
            ],
        },
        GREEN_WAVE => Scenario {
            name: GREEN_WAVE,
            signals: SignalSource::Grid,
            vehicles: vec![
                v("BG_001", North, 13.0).target(13.0),
                v("BG_002", West, 13.0).target(13.0),
                v("POLICE_003", East, 16.0).target(16.0).police(),
            ],
        },
        unknown => {
            warn!(scenario = %unknown, fallback = RIGHT_OF_WAY, "Unknown scenario");
            build(RIGHT_OF_WAY, config)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SimulationConfig {
        SimulationConfig::default()
    }

    #[test]
    fn test_every_scenario_builds() {
        for name in SCENARIOS {
            let scenario = build(name, &config());
            assert_eq!(scenario.name, name);
            assert!(!scenario.vehicles.is_empty());
        }
    }

    #[test]
    fn test_unknown_falls_back_to_right_of_way() {
        let scenario = build("rush_hour", &config());
        assert_eq!(scenario.name, RIGHT_OF_WAY);
        assert_eq!(scenario.vehicles.len(), 3);
    }

    #[test]
    fn test_lane_positions() {
        let scenario = build(MULTI_VEHICLE_TRAFFIC_LIGHT, &config());
        let placed: Vec<(&str, f64, f64, f64)> = scenario
            .vehicles
            .iter()
            .map(|v| (v.id.as_str(), v.x, v.y, v.direction))
            .collect();

        assert_eq!(
            placed,
            vec![
                ("VH_N", -10.0, 120.0, 180.0),
                ("VH_S", 10.0, -120.0, 0.0),
                ("VH_E", 120.0, 10.0, 270.0),
                ("VH_W", -120.0, -10.0, 90.0),
            ]
        );
    }

    #[test]
    fn test_signal_sources() {
        assert_eq!(build(EMERGENCY_VEHICLE, &config()).signals, SignalSource::Infrastructure);
        assert_eq!(build(EMERGENCY_VEHICLE_NO_LIGHTS, &config()).signals, SignalSource::None);
        assert_eq!(build(GREEN_WAVE, &config()).signals, SignalSource::Grid);
    }

    #[test]
    fn test_emergency_scenario_vehicles() {
        let scenario = build(EMERGENCY_VEHICLE_NO_LIGHTS, &config());
        let ambulance = &scenario.vehicles[0];
        assert_eq!(ambulance.id, "AMBULANCE");
        assert!(ambulance.is_emergency);
        assert_eq!(ambulance.target_speed, 25.2);
        assert!(!scenario.vehicles[1].is_emergency);
    }

    #[test]
    fn test_spawn_geometry_follows_config() {
        let config = SimulationConfig {
            lane_offset: 5.0,
            spawn_distance: 80.0,
            ..SimulationConfig::default()
        };
        let spec = VehicleSpec::entering("VH_W", Approach::West, 12.0, &config);
        assert_eq!((spec.x, spec.y, spec.direction), (-80.0, -5.0, 90.0));
        assert_eq!(spec.target_speed, DEFAULT_TARGET_SPEED);
    }
}
