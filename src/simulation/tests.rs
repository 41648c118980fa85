use super::*;
use crate::agent::{Advice, AdvisorError, Situation};
use crate::breaker::{BreakerConfig, BreakerState};
use crate::config::{AgentConfig, SecurityConfig, SimulationConfig};
use crate::message::{Axis, LightPhase, StateMessage, VehicleAction};
use async_trait::async_trait;
use std::time::Duration;

fn config_for(scenario: &str) -> V2xConfig {
    V2xConfig {
        simulation: SimulationConfig {
            default_scenario: scenario.to_string(),
            ..SimulationConfig::default()
        },
        ..V2xConfig::default()
    }
}

fn fast_config() -> V2xConfig {
    let mut config = V2xConfig::default();
    config.agent.tick_interval_ms = 10;
    config.signal.tick_interval_ms = 10;
    config.coordinator.tick_interval_ms = 10;
    config.simulation.monitor_interval_ms = 20;
    config
}

struct OfflineAdvisor;

#[async_trait]
impl DecisionAdvisor for OfflineAdvisor {
    async fn advise(&self, _situation: &Situation) -> Result<Advice, AdvisorError> {
        Err(AdvisorError::Unavailable("offline".to_string()))
    }
}

#[test]
fn test_new_loads_default_scenario() {
    let sim = Simulation::new(V2xConfig::default()).unwrap();

    assert_eq!(sim.scenario().name, "right_of_way");
    assert_eq!(sim.vehicle_ids(), vec!["VH_E", "VH_N", "VH_S"]);
    assert!(sim.infrastructure().is_none());
    assert!(!sim.is_running());
}

#[tokio::test]
async fn test_load_scenario_builds_infrastructure() {
    let mut sim = Simulation::new(V2xConfig::default()).unwrap();

    sim.load_scenario("emergency_vehicle").await;
    assert_eq!(sim.vehicle_ids(), vec!["AMBULANCE", "VH_C"]);
    assert!(sim.infrastructure().is_some());

    sim.load_scenario("emergency_vehicle_no_lights").await;
    assert!(sim.infrastructure().is_none());

    sim.load_scenario("no_such_scenario").await;
    assert_eq!(sim.scenario().name, "right_of_way");
}

#[tokio::test]
async fn test_step_publishes_every_agent() {
    let mut sim = Simulation::new(config_for("emergency_vehicle")).unwrap();
    assert_eq!(sim.channel().agent_count(), 0);

    sim.step().await.unwrap();

    let ids: Vec<String> = sim
        .channel()
        .snapshot()
        .into_iter()
        .map(|s| s.agent_id)
        .collect();
    assert_eq!(ids, vec!["AMBULANCE", INFRASTRUCTURE_ID, "VH_C"]);
    assert_eq!(sim.stats().steps, 1);
    assert_eq!(sim.stats().elapsed_time, 0.1);
}

#[tokio::test]
async fn test_right_of_way_negotiates_and_clears() {
    let mut sim = Simulation::new(config_for("right_of_way")).unwrap();
    let mut negotiated = false;

    for _ in 0..3000 {
        sim.step().await.unwrap();
        for agent_id in sim.vehicle_ids() {
            if let Some(vehicle) = sim.vehicle(&agent_id) {
                if vehicle.lock().await.decision() != VehicleAction::Go {
                    negotiated = true;
                }
            }
        }
        if sim.vehicle_ids().is_empty() {
            break;
        }
    }

    assert!(negotiated);
    assert!(sim.vehicle_ids().is_empty());
    assert_eq!(sim.channel().agent_count(), 0);
    assert_eq!(sim.stats().active_vehicles, 0);
    assert_eq!(sim.stats().total_vehicles, 3);
}

#[tokio::test]
async fn test_ambulance_preempts_signal() {
    let mut sim = Simulation::new(config_for("emergency_vehicle")).unwrap();

    for _ in 0..20 {
        sim.step().await.unwrap();
    }

    let infrastructure = sim.infrastructure().unwrap();
    {
        let infra = infrastructure.lock().unwrap();
        assert!(infra.controller().is_preempted());
        assert_eq!(infra.controller().phase(), LightPhase::EwGreen);
        assert_eq!(infra.stats().emergency_preemptions, 1);
        assert!(!infra.controller().is_green_for(Axis::NorthSouth));
    }

    let ambulance = sim.vehicle("AMBULANCE").unwrap();
    assert_eq!(ambulance.lock().await.decision(), VehicleAction::Go);

    // Cross traffic is held on red
    let crossing = sim.vehicle("VH_C").unwrap();
    assert_ne!(crossing.lock().await.decision(), VehicleAction::Go);
}

#[tokio::test]
async fn test_green_wave_runs_on_grid_clock() {
    let mut sim = Simulation::new(config_for("green_wave")).unwrap();
    let clock_before = sim.coordinator().global_clock();

    for _ in 0..50 {
        sim.step().await.unwrap();
    }

    assert!((sim.coordinator().global_clock() - clock_before - 5.0).abs() < 1e-6);
    assert!(sim.infrastructure().is_none());
    assert_eq!(sim.scenario().signals, SignalSource::Grid);
}

#[tokio::test]
async fn test_stale_agent_evicted_on_step() {
    let config = V2xConfig {
        security: SecurityConfig {
            stale_timeout_ms: 50,
            ..SecurityConfig::default()
        },
        ..V2xConfig::default()
    };
    let mut sim = Simulation::new(config).unwrap();

    sim.channel()
        .publish(StateMessage::vehicle("GHOST", 200.0, 200.0, 0.0, 0.0));
    tokio::time::sleep(Duration::from_millis(80)).await;

    let report = sim.step().await.unwrap();
    assert_eq!(report.evicted, vec!["GHOST".to_string()]);
    assert_eq!(sim.stats().stale_agents_removed, 1);
    assert!(sim.channel().get_agent_state("GHOST").is_none());
    assert_eq!(sim.vehicle_ids().len(), 3);
}

#[tokio::test]
async fn test_failing_advisor_trips_breaker() {
    let config = V2xConfig {
        agent: AgentConfig {
            advisor_min_interval_ms: 0,
            ..AgentConfig::default()
        },
        breaker: BreakerConfig {
            failure_threshold: 3,
            ..BreakerConfig::default()
        },
        ..V2xConfig::default()
    };
    let mut sim = Simulation::new(config)
        .unwrap()
        .with_advisor(Arc::new(OfflineAdvisor));

    for _ in 0..5 {
        sim.step().await.unwrap();
    }

    assert_eq!(sim.breaker().state(), BreakerState::Open);
    let stats = sim.stats().advisor.unwrap();
    assert_eq!(stats.trips, 1);

    // Vehicles keep driving on their own rules
    let vehicle = sim.vehicle("VH_N").unwrap();
    assert!(vehicle.lock().await.position().1 < 120.0);
}

#[tokio::test]
async fn test_full_state_serializes() {
    let mut sim = Simulation::new(config_for("multi_vehicle_traffic_light")).unwrap();
    sim.step().await.unwrap();

    let state = sim.full_state().await;
    assert_eq!(state.agents.len(), 4);
    assert_eq!(state.lights.len(), 25);
    assert!(state.infrastructure.is_some());

    let json = serde_json::to_value(&state).unwrap();
    assert_eq!(json["scenario"], "multi_vehicle_traffic_light");
    assert_eq!(json["signals"], "infrastructure");
    assert_eq!(json["running"], false);
    assert_eq!(json["stats"]["total_vehicles"], 4);
    assert_eq!(json["infrastructure"]["agent_id"], INFRASTRUCTURE_ID);
    assert!(json["stats"].get("advisor").is_none());
    assert_eq!(json["security"]["active_agents"].as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn test_start_and_stop_workers() {
    let mut sim = Simulation::new(fast_config()).unwrap();
    sim.load_scenario("emergency_vehicle").await;

    sim.start();
    assert!(sim.is_running());
    assert!(sim.coordinator().is_running());
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(sim.channel().get_agent_state("AMBULANCE").is_some());
    assert!(sim.channel().get_agent_state(INFRASTRUCTURE_ID).is_some());
    assert!(sim.step().await.is_err());

    sim.stop().await;
    assert!(!sim.is_running());
    assert!(!sim.coordinator().is_running());
    assert_eq!(sim.channel().agent_count(), 0);
    assert!(sim.vehicle_ids().is_empty());
    assert!(sim.stats().elapsed_time > 0.0);

    // Stopped workers no longer publish
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(sim.channel().agent_count(), 0);
}

#[tokio::test]
async fn test_restart_switches_scenario() {
    let mut sim = Simulation::new(fast_config()).unwrap();
    sim.start();
    tokio::time::sleep(Duration::from_millis(30)).await;

    sim.restart("drunk_driver").await;
    assert!(sim.is_running());
    assert_eq!(sim.scenario().name, "drunk_driver");
    assert_eq!(sim.vehicle_ids(), vec!["DRUNK", "VH_A"]);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(sim.channel().get_agent_state("VH_N").is_none());
    assert!(sim.channel().get_agent_state("DRUNK").is_some());

    sim.stop().await;
}
