use anyhow::{Context, Result};
use std::time::Duration;
use tracing::info;
use v2x::config::{load_config, V2xConfig};
use v2x::simulation::Simulation;

/// Stepped runs stop after this many ticks unless `V2X_STEPS` says otherwise
const DEFAULT_STEPS: u64 = 600;

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "v2x=info".into()),
        )
        .init();

    info!("V2X simulation starting...");

    let config = match std::env::var("V2X_CONFIG") {
        Ok(path) => load_config(&path)
            .with_context(|| format!("Failed to load configuration from {}", path))?,
        Err(_) => V2xConfig::default(),
    }
    .with_env_overrides();

    let scenario = std::env::var("V2X_SCENARIO")
        .unwrap_or_else(|_| config.simulation.default_scenario.clone());

    let mut sim = Simulation::new(config).context("Failed to build simulation")?;
    sim.load_scenario(&scenario).await;

    // V2X_RUN_SECS runs the agents on workers in real time; otherwise the
    // scene is stepped until every vehicle has left
    let state = match env_u64("V2X_RUN_SECS") {
        Some(secs) => {
            sim.start();
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(secs)) => {}
                _ = tokio::signal::ctrl_c() => info!("Interrupted, stopping"),
            }
            let state = sim.full_state().await;
            sim.stop().await;
            state
        }
        None => {
            let steps = env_u64("V2X_STEPS").unwrap_or(DEFAULT_STEPS);
            for _ in 0..steps {
                sim.step().await?;
                if sim.vehicle_ids().is_empty() {
                    break;
                }
            }
            sim.full_state().await
        }
    };

    info!(
        scenario = %state.scenario,
        collisions_prevented = state.stats.collisions_prevented,
        elapsed = state.stats.elapsed_time,
        "Simulation finished"
    );
    println!(
        "{}",
        serde_json::to_string_pretty(&state).context("Failed to serialize simulation state")?
    );

    Ok(())
}
