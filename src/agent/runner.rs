use crate::agent::infrastructure::InfrastructureAgent;
use crate::agent::vehicle::{TickContext, TickOutcome, VehicleAgent};
use crate::channel::V2xChannel;
use crate::coordinator::IntersectionCoordinator;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

/// Vehicle shared between its worker and the simulation
pub type SharedVehicle = Arc<tokio::sync::Mutex<VehicleAgent>>;

/// Infrastructure shared between its worker and the simulation
pub type SharedInfrastructure = Arc<Mutex<InfrastructureAgent>>;

/// Running agent worker.
///
/// Stopping is cooperative: the worker checks its flag once per tick.
pub struct AgentHandle {
    agent_id: String,
    running: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl AgentHandle {
    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the worker to exit
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            debug!(agent_id = %self.agent_id, error = %e, "Agent worker ended abnormally");
        }
    }
}

fn ticker(period: Duration) -> tokio::time::Interval {
    let mut ticker = interval(period);

    // Skip missed ticks to prevent backlog under load
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

/// Drive `vehicle` every `period` until stopped or exited.
///
/// An exited vehicle removes itself from the channel.
pub fn spawn_vehicle(
    vehicle: SharedVehicle,
    agent_id: String,
    channel: Arc<V2xChannel>,
    coordinator: Option<Arc<IntersectionCoordinator>>,
    period: Duration,
) -> AgentHandle {
    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);
    let id = agent_id.clone();

    let task = tokio::spawn(async move {
        let mut ticker = ticker(period);
        info!(agent_id = %id, "Vehicle worker started");

        while flag.load(Ordering::SeqCst) {
            ticker.tick().await;
            if !flag.load(Ordering::SeqCst) {
                break;
            }

            let ctx = TickContext {
                channel: channel.as_ref(),
                coordinator: coordinator.as_deref(),
            };
            let outcome = vehicle.lock().await.tick(&ctx).await;

            if outcome == TickOutcome::Exited {
                channel.remove_agent(&id);
                flag.store(false, Ordering::SeqCst);
            }
        }

        debug!(agent_id = %id, "Vehicle worker stopped");
    });

    AgentHandle {
        agent_id,
        running,
        task,
    }
}

/// Run `tick` every `period` until stopped
pub fn spawn_periodic<F>(agent_id: String, period: Duration, mut tick: F) -> AgentHandle
where
    F: FnMut() + Send + 'static,
{
    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);
    let id = agent_id.clone();

    let task = tokio::spawn(async move {
        let mut ticker = ticker(period);
        info!(agent_id = %id, "Worker started");

        while flag.load(Ordering::SeqCst) {
            ticker.tick().await;
            if !flag.load(Ordering::SeqCst) {
                break;
            }
            tick();
        }

        debug!(agent_id = %id, "Worker stopped");
    });

    AgentHandle {
        agent_id,
        running,
        task,
    }
}

/// Drive the intersection every `period` until stopped
pub fn spawn_infrastructure(
    infrastructure: SharedInfrastructure,
    agent_id: String,
    channel: Arc<V2xChannel>,
    period: Duration,
) -> AgentHandle {
    let dt = period.as_secs_f64();
    spawn_periodic(agent_id, period, move || {
        infrastructure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .tick(&channel, dt);
    })
}
