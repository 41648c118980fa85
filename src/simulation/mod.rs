// Scenario runner
//
// `Simulation` owns the channel, the grid coordinator and the agents of one
// scenario. It is either stepped by hand (deterministic, used by tests and
// the CLI's step mode) or started on tokio workers and stopped cooperatively.

pub mod monitor;
pub mod scenarios;

#[cfg(test)]
mod tests;

pub use monitor::{Monitor, MonitorReport};
pub use scenarios::{Scenario, SignalSource, VehicleSpec, SCENARIOS};

use crate::agent::{
    spawn_infrastructure, spawn_periodic, spawn_vehicle, AdvisorGateway, AgentHandle,
    DecisionAdvisor, InfrastructureAgent, InfrastructureState, SharedInfrastructure,
    SharedVehicle, TickContext, TickOutcome, VehicleAgent, VehicleStatus,
};
use crate::breaker::{BreakerStats, CircuitBreaker};
use crate::channel::{SecurityStats, V2xChannel};
use crate::config::V2xConfig;
use crate::coordinator::{CoordinatorStats, IntersectionCoordinator, LightState};
use crate::risk::{collision_pairs, CollisionPair};
use anyhow::{bail, Result};
use dashmap::DashMap;
use futures::future::join_all;
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Agent id of the demo intersection's smart light
pub const INFRASTRUCTURE_ID: &str = "INFRA_TL_01";

const MONITOR_ID: &str = "MONITOR";

/// Scene-level counters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationStats {
    pub collisions_prevented: u64,
    pub stale_agents_removed: u64,
    /// Vehicles the scenario started with
    pub total_vehicles: usize,
    /// Vehicles still in the scene
    pub active_vehicles: usize,
    /// Manual steps since the scenario was loaded
    pub steps: u64,
    /// Seconds, rounded to 0.1
    pub elapsed_time: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advisor: Option<BreakerStats>,
}

/// Everything an observer needs to render the scene
#[derive(Debug, Clone, Serialize)]
pub struct SimulationState {
    pub scenario: String,
    pub signals: SignalSource,
    pub running: bool,
    pub agents: Vec<VehicleStatus>,
    pub infrastructure: Option<InfrastructureState>,
    pub collision_pairs: Vec<CollisionPair>,
    pub lights: Vec<LightState>,
    pub coordinator: CoordinatorStats,
    pub security: SecurityStats,
    pub stats: SimulationStats,
}

pub struct Simulation {
    config: V2xConfig,
    channel: Arc<V2xChannel>,
    coordinator: Arc<IntersectionCoordinator>,
    breaker: Arc<CircuitBreaker>,
    advisor: Option<Arc<dyn DecisionAdvisor>>,
    monitor: Arc<Monitor>,

    scenario: Scenario,
    vehicles: Arc<DashMap<String, SharedVehicle>>,
    infrastructure: Option<SharedInfrastructure>,

    workers: Arc<DashMap<String, AgentHandle>>,
    monitor_worker: Option<AgentHandle>,
    coordinator_task: Option<JoinHandle<()>>,
    running: bool,
    started_at: Option<Instant>,

    steps: u64,
    /// Seconds simulated by steps and finished runs
    elapsed: f64,
}

impl Simulation {
    /// Build the simulation with the configured default scenario loaded
    pub fn new(config: V2xConfig) -> Result<Self> {
        let channel = Arc::new(V2xChannel::new(&config.security, &config.channel)?);
        let coordinator = Arc::new(IntersectionCoordinator::grid(&config.coordinator));
        let breaker = Arc::new(CircuitBreaker::new("advisor", config.breaker.clone()));
        let scenario = scenarios::build(&config.simulation.default_scenario, &config.simulation);

        let mut simulation = Self {
            config,
            channel,
            coordinator,
            breaker,
            advisor: None,
            monitor: Arc::new(Monitor::new()),
            scenario: scenario.clone(),
            vehicles: Arc::new(DashMap::new()),
            infrastructure: None,
            workers: Arc::new(DashMap::new()),
            monitor_worker: None,
            coordinator_task: None,
            running: false,
            started_at: None,
            steps: 0,
            elapsed: 0.0,
        };
        simulation.populate(scenario);
        Ok(simulation)
    }

    /// Give every vehicle a gateway to `advisor`; reloads the current scenario
    pub fn with_advisor(mut self, advisor: Arc<dyn DecisionAdvisor>) -> Self {
        self.advisor = Some(advisor);
        let scenario = self.scenario.clone();
        self.populate(scenario);
        self
    }

    pub fn channel(&self) -> &Arc<V2xChannel> {
        &self.channel
    }

    pub fn coordinator(&self) -> &Arc<IntersectionCoordinator> {
        &self.coordinator
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn monitor(&self) -> &Monitor {
        &self.monitor
    }

    pub fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn vehicle(&self, agent_id: &str) -> Option<SharedVehicle> {
        self.vehicles
            .get(agent_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    pub fn infrastructure(&self) -> Option<SharedInfrastructure> {
        self.infrastructure.clone()
    }

    /// Ids of the vehicles still in the scene, sorted
    pub fn vehicle_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.vehicles.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Replace the scene with scenario `name`, stopping workers first.
    ///
    /// Unknown names load `right_of_way`.
    pub async fn load_scenario(&mut self, name: &str) {
        if self.running {
            self.stop().await;
        }
        let scenario = scenarios::build(name, &self.config.simulation);
        self.populate(scenario);
    }

    /// Stop, load `name` and start again
    pub async fn restart(&mut self, name: &str) {
        self.stop().await;
        self.load_scenario(name).await;
        self.start();
    }

    /// Advance the scene by one agent tick without workers.
    ///
    /// Order: grid clock, infrastructure, vehicles by id, monitor.
    pub async fn step(&mut self) -> Result<MonitorReport> {
        if self.running {
            bail!("Simulation is running; stop it before stepping");
        }
        let dt = self.config.agent.dt();

        self.coordinator.tick(dt);
        if let Some(infrastructure) = &self.infrastructure {
            infrastructure
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .tick(&self.channel, dt);
        }

        let ctx = TickContext {
            channel: self.channel.as_ref(),
            coordinator: self.grid().map(Arc::as_ref),
        };
        for (agent_id, vehicle) in self.vehicles_in_order() {
            let outcome = vehicle.lock().await.tick(&ctx).await;
            if outcome == TickOutcome::Exited {
                self.channel.remove_agent(&agent_id);
                self.vehicles.remove(&agent_id);
            }
        }

        self.steps += 1;
        self.elapsed += dt;
        Ok(reconcile(
            &self.monitor,
            &self.channel,
            &self.vehicles,
            &self.workers,
        ))
    }

    /// Spawn the grid clock, one worker per agent and the monitor.
    ///
    /// Must be called from within a tokio runtime. No-op when running.
    pub fn start(&mut self) {
        if self.running {
            return;
        }
        self.running = true;
        self.started_at = Some(Instant::now());
        self.coordinator_task = self.coordinator.start();

        if let Some(infrastructure) = &self.infrastructure {
            let handle = spawn_infrastructure(
                Arc::clone(infrastructure),
                INFRASTRUCTURE_ID.to_string(),
                Arc::clone(&self.channel),
                self.config.signal.tick_interval(),
            );
            self.workers.insert(INFRASTRUCTURE_ID.to_string(), handle);
        }

        let period = self.config.agent.tick_interval();
        for (agent_id, vehicle) in self.vehicles_in_order() {
            let handle = spawn_vehicle(
                vehicle,
                agent_id.clone(),
                Arc::clone(&self.channel),
                self.grid().cloned(),
                period,
            );
            self.workers.insert(agent_id, handle);
        }

        let monitor = Arc::clone(&self.monitor);
        let channel = Arc::clone(&self.channel);
        let vehicles = Arc::clone(&self.vehicles);
        let workers = Arc::clone(&self.workers);
        self.monitor_worker = Some(spawn_periodic(
            MONITOR_ID.to_string(),
            self.config.simulation.monitor_interval(),
            move || {
                reconcile(&monitor, &channel, &vehicles, &workers);
            },
        ));

        info!(
            scenario = self.scenario.name,
            vehicles = self.vehicles.len(),
            "Simulation started"
        );
    }

    /// Stop every worker, wait for them and purge the scene.
    ///
    /// Channel states, alerts and security trackers are reset; the scenario
    /// has to be loaded again before the next start.
    pub async fn stop(&mut self) {
        let was_running = std::mem::replace(&mut self.running, false);

        let mut handles: Vec<AgentHandle> = self.monitor_worker.take().into_iter().collect();
        let ids: Vec<String> = self.workers.iter().map(|e| e.key().clone()).collect();
        for agent_id in ids {
            if let Some((_, handle)) = self.workers.remove(&agent_id) {
                handles.push(handle);
            }
        }
        for handle in &handles {
            handle.stop();
        }

        self.coordinator.stop();
        if let Some(task) = self.coordinator_task.take() {
            if let Err(e) = task.await {
                debug!(error = %e, "Coordinator task ended abnormally");
            }
        }
        join_all(handles.into_iter().map(AgentHandle::join)).await;

        if let Some(started) = self.started_at.take() {
            self.elapsed += started.elapsed().as_secs_f64();
        }
        self.vehicles.clear();
        self.infrastructure = None;
        self.channel.clear_all();

        if was_running {
            info!(scenario = self.scenario.name, "Simulation stopped");
        }
    }

    pub fn stats(&self) -> SimulationStats {
        let running_for = self
            .started_at
            .map(|started| started.elapsed().as_secs_f64())
            .unwrap_or(0.0);

        SimulationStats {
            collisions_prevented: self.monitor.collisions_prevented(),
            stale_agents_removed: self.monitor.stale_agents_removed(),
            total_vehicles: self.scenario.vehicles.len(),
            active_vehicles: self.vehicles.len(),
            steps: self.steps,
            elapsed_time: ((self.elapsed + running_for) * 10.0).round() / 10.0,
            advisor: self.advisor.as_ref().map(|_| self.breaker.stats()),
        }
    }

    pub async fn full_state(&self) -> SimulationState {
        let mut agents = Vec::with_capacity(self.vehicles.len());
        for (_, vehicle) in self.vehicles_in_order() {
            agents.push(vehicle.lock().await.status());
        }
        let infrastructure = self.infrastructure.as_ref().map(|infrastructure| {
            infrastructure
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .state()
        });
        let states = self.channel.get_all_states();

        SimulationState {
            scenario: self.scenario.name.to_string(),
            signals: self.scenario.signals,
            running: self.running,
            agents,
            infrastructure,
            collision_pairs: collision_pairs(states.values()),
            lights: self.coordinator.light_states(),
            coordinator: self.coordinator.stats(),
            security: self.channel.security_stats(),
            stats: self.stats(),
        }
    }

    /// Rebuild agents for `scenario` on a clean channel
    fn populate(&mut self, scenario: Scenario) {
        self.channel.clear_all();
        self.monitor.reset();
        self.vehicles.clear();

        self.infrastructure = match scenario.signals {
            SignalSource::Infrastructure => Some(Arc::new(Mutex::new(InfrastructureAgent::new(
                INFRASTRUCTURE_ID,
                &self.config.signal,
                &self.config.agent,
            )))),
            SignalSource::None | SignalSource::Grid => None,
        };

        for (index, spec) in scenario.vehicles.iter().enumerate() {
            let vehicle = self.build_vehicle(spec, index as u64);
            self.vehicles.insert(
                spec.id.clone(),
                Arc::new(tokio::sync::Mutex::new(vehicle)),
            );
        }

        self.steps = 0;
        self.elapsed = 0.0;
        info!(
            scenario = scenario.name,
            vehicles = scenario.vehicles.len(),
            signals = ?scenario.signals,
            "Scenario loaded"
        );
        self.scenario = scenario;
    }

    fn build_vehicle(&self, spec: &VehicleSpec, index: u64) -> VehicleAgent {
        let mut vehicle = VehicleAgent::new(
            spec.id.clone(),
            spec.x,
            spec.y,
            spec.direction,
            spec.speed,
            &self.config.agent,
        )
        .with_target_speed(spec.target_speed);

        if spec.is_emergency {
            vehicle = vehicle.emergency();
        }
        if spec.is_police {
            vehicle = vehicle.police();
        }
        if spec.is_drunk {
            vehicle = vehicle.drunk(self.config.simulation.seed.wrapping_add(index));
        }
        if let Some(advisor) = &self.advisor {
            vehicle = vehicle.with_advisor(AdvisorGateway::from_config(
                Arc::clone(advisor),
                Arc::clone(&self.breaker),
                &self.config.agent,
            ));
        }
        vehicle
    }

    fn grid(&self) -> Option<&Arc<IntersectionCoordinator>> {
        (self.scenario.signals == SignalSource::Grid).then_some(&self.coordinator)
    }

    fn vehicles_in_order(&self) -> Vec<(String, SharedVehicle)> {
        let mut vehicles: Vec<(String, SharedVehicle)> = self
            .vehicles
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();
        vehicles.sort_by(|a, b| a.0.cmp(&b.0));
        vehicles
    }
}

/// Monitor pass plus worker bookkeeping.
///
/// Stale agents lose their worker; vehicles whose worker ended (exited the
/// scene) are dropped.
fn reconcile(
    monitor: &Monitor,
    channel: &V2xChannel,
    vehicles: &DashMap<String, SharedVehicle>,
    workers: &DashMap<String, AgentHandle>,
) -> MonitorReport {
    let report = monitor.pass(channel);

    for agent_id in &report.evicted {
        if let Some((_, handle)) = workers.remove(agent_id) {
            handle.stop();
        }
        vehicles.remove(agent_id);
    }

    let finished: Vec<String> = workers
        .iter()
        .filter(|entry| entry.value().is_finished())
        .map(|entry| entry.key().clone())
        .collect();
    for agent_id in finished {
        workers.remove(&agent_id);
        vehicles.remove(&agent_id);
    }

    report
}
