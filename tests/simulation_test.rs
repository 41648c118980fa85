// End-to-end runs of the simulation through the public API

use std::io::Write;
use v2x::config::{load_config, V2xConfig};
use v2x::message::{AgentType, LightPhase};
use v2x::simulation::{Simulation, SignalSource, INFRASTRUCTURE_ID, SCENARIOS};

// ── Helpers ───────────────────────────────────────────────────────────────────

async fn run_steps(sim: &mut Simulation, steps: usize) {
    for _ in 0..steps {
        sim.step().await.unwrap();
    }
}

/// (id, x, y, speed, direction) of every vehicle still in the scene
async fn kinematics(sim: &Simulation) -> Vec<(String, f64, f64, f64, f64)> {
    sim.full_state()
        .await
        .agents
        .into_iter()
        .map(|a| (a.agent_id, a.x, a.y, a.speed, a.direction))
        .collect()
}

// ── Configuration ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_simulation_from_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        "[simulation]\ndefault_scenario = \"emergency_vehicle\"\n\n[agent]\ntick_interval_ms = 50"
    )
    .unwrap();

    let config = load_config(file.path().to_str().unwrap()).unwrap();
    let mut sim = Simulation::new(config).unwrap();
    assert_eq!(sim.scenario().name, "emergency_vehicle");
    assert_eq!(sim.scenario().signals, SignalSource::Infrastructure);

    run_steps(&mut sim, 10).await;
    assert_eq!(sim.stats().elapsed_time, 0.5);
}

// ── Scenarios ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_every_scenario_steps() {
    let mut sim = Simulation::new(V2xConfig::default()).unwrap();

    for name in SCENARIOS {
        sim.load_scenario(name).await;
        run_steps(&mut sim, 30).await;

        let state = sim.full_state().await;
        assert_eq!(state.scenario, name);
        assert!(!state.agents.is_empty(), "{} lost every vehicle", name);
        for agent in &state.agents {
            assert!(agent.x.is_finite() && agent.y.is_finite());
            assert!(agent.speed >= 0.0);
        }
    }
}

#[tokio::test]
async fn test_drunk_driver_is_reproducible() {
    let mut first = Simulation::new(V2xConfig::default()).unwrap();
    let mut second = Simulation::new(V2xConfig::default()).unwrap();
    first.load_scenario("drunk_driver").await;
    second.load_scenario("drunk_driver").await;

    run_steps(&mut first, 80).await;
    run_steps(&mut second, 80).await;

    assert_eq!(kinematics(&first).await, kinematics(&second).await);
}

#[tokio::test]
async fn test_traffic_light_scene_is_signed_and_observable() {
    let mut sim = Simulation::new(V2xConfig::default()).unwrap();
    sim.load_scenario("multi_vehicle_traffic_light").await;
    let mut observer = sim.channel().subscribe();

    sim.step().await.unwrap();

    // Infrastructure first, then vehicles in id order
    let mut seen = Vec::new();
    while let Ok(state) = observer.try_recv() {
        assert!(!state.signature.is_empty());
        seen.push(state.agent_id);
    }
    assert_eq!(seen, vec![INFRASTRUCTURE_ID, "VH_E", "VH_N", "VH_S", "VH_W"]);

    for agent_id in &seen {
        assert!(sim.channel().verify_message(agent_id));
    }

    let infra = sim.channel().get_agent_state(INFRASTRUCTURE_ID).unwrap();
    assert_eq!(infra.agent_type, AgentType::Infrastructure);
    assert_eq!(infra.decision.signal_phase(), Some(LightPhase::NsGreen));
}

#[tokio::test]
async fn test_state_dump_is_json() {
    let mut sim = Simulation::new(V2xConfig::default()).unwrap();
    sim.load_scenario("green_wave").await;
    run_steps(&mut sim, 5).await;

    let state = sim.full_state().await;
    let json = serde_json::to_string(&state).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();

    assert_eq!(value["scenario"], "green_wave");
    assert_eq!(value["signals"], "grid");
    assert!(value["infrastructure"].is_null());
    assert_eq!(value["coordinator"]["total_intersections"], 25);
    assert_eq!(value["agents"].as_array().unwrap().len(), 3);
}
