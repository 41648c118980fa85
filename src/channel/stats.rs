use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

/// Window over which the publish rate is averaged
const RATE_WINDOW: Duration = Duration::from_secs(5);

/// Counters kept by the channel
#[derive(Clone, Default)]
pub struct ChannelStats {
    /// Total publishes (lifetime counter)
    total_published: Arc<AtomicU64>,

    /// Publishes that needed sanitizing
    rejected_messages: Arc<AtomicU64>,

    /// Accepted broadcast alerts
    total_broadcasts: Arc<AtomicU64>,

    /// Alerts dropped by the rate limiter
    rejected_broadcasts: Arc<AtomicU64>,

    /// Publish instants for rate calculation (sliding 5-second window)
    publish_instants: Arc<RwLock<VecDeque<Instant>>>,
}

impl ChannelStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_publish(&self, sanitized: bool) {
        self.total_published.fetch_add(1, Ordering::Relaxed);
        if sanitized {
            self.rejected_messages.fetch_add(1, Ordering::Relaxed);
        }

        let now = Instant::now();
        let mut instants = self
            .publish_instants
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        instants.push_back(now);

        while let Some(&oldest) = instants.front() {
            if now.duration_since(oldest) > RATE_WINDOW {
                instants.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn record_broadcast(&self, accepted: bool) {
        if accepted {
            self.total_broadcasts.fetch_add(1, Ordering::Relaxed);
        } else {
            self.rejected_broadcasts.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Publishes per second over the last 5 seconds
    pub fn publish_rate(&self) -> f64 {
        let instants = self
            .publish_instants
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        instants.len() as f64 / RATE_WINDOW.as_secs_f64()
    }

    pub fn total_published(&self) -> u64 {
        self.total_published.load(Ordering::Relaxed)
    }

    pub fn rejected_messages(&self) -> u64 {
        self.rejected_messages.load(Ordering::Relaxed)
    }

    pub fn total_broadcasts(&self) -> u64 {
        self.total_broadcasts.load(Ordering::Relaxed)
    }

    pub fn rejected_broadcasts(&self) -> u64 {
        self.rejected_broadcasts.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.total_published.store(0, Ordering::Relaxed);
        self.rejected_messages.store(0, Ordering::Relaxed);
        self.total_broadcasts.store(0, Ordering::Relaxed);
        self.rejected_broadcasts.store(0, Ordering::Relaxed);
        self.publish_instants
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// Security counters and agent liveness as reported by the channel
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SecurityStats {
    pub rejected_messages: u64,
    pub rejected_broadcasts: u64,
    pub stale_agents: Vec<String>,
    pub active_agents: Vec<String>,
}
