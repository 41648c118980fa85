use crate::channel::V2xChannel;
use crate::message::RiskLevel;
use crate::risk::{collision_pairs, CollisionPair};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use tracing::info;

/// Outcome of one monitor pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MonitorReport {
    pub collision_pairs: Vec<CollisionPair>,
    /// Collision pairs of the previous pass that are gone now
    pub resolved: u64,
    /// Agents evicted as stale
    pub evicted: Vec<String>,
}

/// Periodic scene supervision: prevented collisions and stale agents
#[derive(Default)]
pub struct Monitor {
    prev_collisions: Mutex<HashSet<(String, String)>>,
    collisions_prevented: AtomicU64,
    stale_agents_removed: AtomicU64,
}

impl Monitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pass(&self, channel: &V2xChannel) -> MonitorReport {
        let states = channel.get_all_states();
        let pairs = collision_pairs(states.values());

        let collisions: HashSet<(String, String)> = pairs
            .iter()
            .filter(|p| p.risk == RiskLevel::Collision)
            .map(|p| (p.agent1.clone(), p.agent2.clone()))
            .collect();

        let resolved = {
            let mut prev = self
                .prev_collisions
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let resolved = prev.difference(&collisions).count() as u64;
            *prev = collisions;
            resolved
        };
        if resolved > 0 {
            let total = self.collisions_prevented.fetch_add(resolved, Ordering::Relaxed) + resolved;
            info!(resolved, total, "Collisions prevented");
        }

        let evicted = channel.cleanup_stale_agents();
        self.stale_agents_removed
            .fetch_add(evicted.len() as u64, Ordering::Relaxed);

        MonitorReport {
            collision_pairs: pairs,
            resolved,
            evicted,
        }
    }

    pub fn collisions_prevented(&self) -> u64 {
        self.collisions_prevented.load(Ordering::Relaxed)
    }

    pub fn stale_agents_removed(&self) -> u64 {
        self.stale_agents_removed.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.prev_collisions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.collisions_prevented.store(0, Ordering::Relaxed);
        self.stale_agents_removed.store(0, Ordering::Relaxed);
    }
}
