use crate::channel::stats::{ChannelStats, SecurityStats};
use crate::config::{ChannelConfig, SecurityConfig};
use crate::message::{BroadcastAlert, StateMessage};
use crate::security::SecurityGuard;
use anyhow::Result;
use chrono::Utc;
use dashmap::DashMap;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Shared V2X channel: latest state per agent, history log and alert queue
pub struct V2xChannel {
    /// Latest state per agent id
    states: DashMap<String, StateMessage>,

    /// Bounded log of published states, oldest first
    history: Mutex<VecDeque<StateMessage>>,
    history_capacity: usize,

    /// Bounded alert queue, oldest first
    alerts: Mutex<VecDeque<BroadcastAlert>>,
    alert_capacity: usize,

    /// Observers of every stored state
    state_tx: broadcast::Sender<StateMessage>,

    guard: SecurityGuard,

    pub stats: ChannelStats,
}

impl V2xChannel {
    pub fn new(security: &SecurityConfig, channel: &ChannelConfig) -> Result<Self> {
        let (state_tx, _) = broadcast::channel(channel.observer_capacity.max(1));

        Ok(Self {
            states: DashMap::new(),
            history: Mutex::new(VecDeque::with_capacity(channel.history_capacity)),
            history_capacity: channel.history_capacity,
            alerts: Mutex::new(VecDeque::with_capacity(channel.broadcast_capacity)),
            alert_capacity: channel.broadcast_capacity,
            state_tx,
            guard: SecurityGuard::new(security)?,
            stats: ChannelStats::new(),
        })
    }

    /// Channel with default security and buffer settings
    pub fn with_defaults() -> Result<Self> {
        Self::new(&SecurityConfig::default(), &ChannelConfig::default())
    }

    /// Sanitize, sign and store an agent state (core state mutation).
    ///
    /// Malformed fields never reject the message: they are replaced by their
    /// sanitized values and counted. Returns the stored, signed message.
    pub fn publish(&self, message: StateMessage) -> StateMessage {
        let sanitized = self.guard.validate_and_sanitize(&message);
        let had_issues = !sanitized.is_valid();
        if had_issues {
            let issues: Vec<String> = sanitized.issues.iter().map(|i| i.to_string()).collect();
            warn!(
                agent_id = %message.agent_id,
                issues = ?issues,
                "Corrupt state message, storing sanitized values"
            );
        }

        let mut stored = sanitized.message;
        stored.signature = self.guard.sign(&stored);

        self.guard.stale_detector().touch(&stored.agent_id);
        self.states.insert(stored.agent_id.clone(), stored.clone());

        {
            let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
            history.push_back(stored.clone());
            while history.len() > self.history_capacity {
                history.pop_front();
            }
        }

        self.stats.record_publish(had_issues);

        // No observers is fine
        let _ = self.state_tx.send(stored.clone());

        stored
    }

    /// Queue an alert, subject to the per-sender rate limit.
    ///
    /// Returns false when the alert was dropped.
    pub fn broadcast(&self, alert: BroadcastAlert) -> bool {
        if !self.guard.rate_limiter().allow(&alert.from_id) {
            self.stats.record_broadcast(false);
            debug!(from_id = %alert.from_id, "Broadcast rate limit exceeded, alert dropped");
            return false;
        }

        {
            let mut alerts = self.alerts.lock().unwrap_or_else(PoisonError::into_inner);
            alerts.push_back(alert);
            while alerts.len() > self.alert_capacity {
                alerts.pop_front();
            }
        }

        self.stats.record_broadcast(true);
        true
    }

    /// Alerts from the last `window` that `agent_id` should see
    pub fn get_broadcasts_for(&self, agent_id: &str, window: Duration) -> Vec<BroadcastAlert> {
        // Unrepresentable windows mean "everything queued"
        let cutoff = chrono::Duration::from_std(window)
            .ok()
            .and_then(|window| Utc::now().checked_sub_signed(window));

        let alerts = self.alerts.lock().unwrap_or_else(PoisonError::into_inner);
        alerts
            .iter()
            .filter(|alert| cutoff.map_or(true, |cutoff| alert.timestamp >= cutoff))
            .filter(|alert| alert.is_visible_to(agent_id))
            .cloned()
            .collect()
    }

    /// Get latest state of one agent
    pub fn get_agent_state(&self, agent_id: &str) -> Option<StateMessage> {
        self.states.get(agent_id).map(|s| s.clone())
    }

    /// Latest states of every agent except `agent_id`
    pub fn get_other_agents(&self, agent_id: &str) -> HashMap<String, StateMessage> {
        self.states
            .iter()
            .filter(|entry| entry.key() != agent_id)
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    pub fn get_all_states(&self) -> HashMap<String, StateMessage> {
        self.states
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Last `last_n` published states, oldest first
    pub fn history(&self, last_n: usize) -> Vec<StateMessage> {
        let history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        let skip = history.len().saturating_sub(last_n);
        history.iter().skip(skip).cloned().collect()
    }

    /// All current states ordered by agent id
    pub fn snapshot(&self) -> Vec<StateMessage> {
        let mut states: Vec<StateMessage> =
            self.states.iter().map(|entry| entry.value().clone()).collect();
        states.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        states
    }

    pub fn agent_count(&self) -> usize {
        self.states.len()
    }

    pub fn security_stats(&self) -> SecurityStats {
        let mut active_agents: Vec<String> =
            self.states.iter().map(|entry| entry.key().clone()).collect();
        active_agents.sort();

        SecurityStats {
            rejected_messages: self.stats.rejected_messages(),
            rejected_broadcasts: self.stats.rejected_broadcasts(),
            stale_agents: self.guard.stale_detector().stale_ids(),
            active_agents,
        }
    }

    /// Subscribe to stored states
    pub fn subscribe(&self) -> broadcast::Receiver<StateMessage> {
        self.state_tx.subscribe()
    }

    /// Remove an agent and stop tracking its liveness
    pub fn remove_agent(&self, agent_id: &str) -> Option<StateMessage> {
        let removed = self.states.remove(agent_id).map(|(_, state)| state);
        self.guard.stale_detector().remove(agent_id);

        if removed.is_some() {
            info!(agent_id = %agent_id, "Agent removed from channel");
        }
        removed
    }

    /// Evict every agent not seen within the stale timeout.
    ///
    /// Returns the ids that were actually removed, sorted.
    pub fn cleanup_stale_agents(&self) -> Vec<String> {
        let mut removed = Vec::new();
        for agent_id in self.guard.stale_detector().stale_ids() {
            if self.states.remove(&agent_id).is_some() {
                removed.push(agent_id.clone());
            }
            self.guard.stale_detector().remove(&agent_id);
        }

        if !removed.is_empty() {
            warn!(agents = ?removed, "Evicted stale agents");
        }
        removed
    }

    /// Recompute the stored signature of `agent_id`'s state.
    ///
    /// False when the agent is unknown or the signature does not match.
    pub fn verify_message(&self, agent_id: &str) -> bool {
        match self.get_agent_state(agent_id) {
            Some(state) => self.guard.verify(&state),
            None => false,
        }
    }

    /// Overwrite a stored state without sanitizing or re-signing
    #[cfg(test)]
    pub(crate) fn insert_raw(&self, state: StateMessage) {
        self.states.insert(state.agent_id.clone(), state);
    }

    /// Purge states, history, alerts and counters; reset security trackers
    pub fn clear_all(&self) {
        self.states.clear();
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.alerts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.stats.reset();
        self.guard.reset_trackers();

        info!("V2X channel cleared");
    }
}
