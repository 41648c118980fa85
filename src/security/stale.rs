use dashmap::DashMap;
use std::time::{Duration, Instant};

/// Tracks when each agent was last seen on the channel
pub struct StaleDetector {
    timeout: Duration,
    last_seen: DashMap<String, Instant>,
}

impl StaleDetector {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            last_seen: DashMap::new(),
        }
    }

    /// Mark `agent_id` as seen now
    pub fn touch(&self, agent_id: &str) {
        self.last_seen.insert(agent_id.to_string(), Instant::now());
    }

    /// Agents not seen within the timeout, sorted by id
    pub fn stale_ids(&self) -> Vec<String> {
        let now = Instant::now();
        let mut stale: Vec<String> = self
            .last_seen
            .iter()
            .filter(|entry| now.duration_since(*entry.value()) > self.timeout)
            .map(|entry| entry.key().clone())
            .collect();
        stale.sort();
        stale
    }

    pub fn remove(&self, agent_id: &str) {
        self.last_seen.remove(agent_id);
    }

    pub fn is_tracked(&self, agent_id: &str) -> bool {
        self.last_seen.contains_key(agent_id)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn reset(&self) {
        self.last_seen.clear();
    }
}
