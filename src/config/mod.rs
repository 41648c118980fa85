pub mod runtime;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

// Re-export section types that live next to their component
pub use crate::breaker::BreakerConfig;

/// Complete V2X simulation configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct V2xConfig {
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub channel: ChannelConfig,
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
    #[serde(default)]
    pub signal: SignalConfig,
    #[serde(default)]
    pub breaker: BreakerConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

/// Security guard configuration (signing, sanitizing, rate limiting, staleness)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Shared HMAC key used to sign every published state
    #[serde(default = "default_hmac_key")]
    pub hmac_key: String,
    /// Agents not seen within this window are evicted by the monitor
    #[serde(default = "default_stale_timeout_ms")]
    pub stale_timeout_ms: u64,
    /// Max broadcast alerts per sender per second
    #[serde(default = "default_broadcast_rate_limit")]
    pub broadcast_rate_limit: usize,
    /// Coordinates are clamped to [-coord_bound, coord_bound]
    #[serde(default = "default_coord_bound")]
    pub coord_bound: f64,
    /// Speed is clamped to [0, max_speed]
    #[serde(default = "default_security_max_speed")]
    pub max_speed: f64,
    /// Timestamps further than this from wall-clock are replaced
    #[serde(default = "default_max_clock_skew_ms")]
    pub max_clock_skew_ms: i64,
}

fn default_hmac_key() -> String {
    "v2x-hmac-secret-change-in-prod".to_string()
}

fn default_stale_timeout_ms() -> u64 {
    5000
}

fn default_broadcast_rate_limit() -> usize {
    10
}

fn default_coord_bound() -> f64 {
    500.0
}

fn default_security_max_speed() -> f64 {
    50.0
}

fn default_max_clock_skew_ms() -> i64 {
    10_000
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            hmac_key: default_hmac_key(),
            stale_timeout_ms: default_stale_timeout_ms(),
            broadcast_rate_limit: default_broadcast_rate_limit(),
            coord_bound: default_coord_bound(),
            max_speed: default_security_max_speed(),
            max_clock_skew_ms: default_max_clock_skew_ms(),
        }
    }
}

impl SecurityConfig {
    pub fn stale_timeout(&self) -> Duration {
        Duration::from_millis(self.stale_timeout_ms)
    }
}

/// Channel buffer sizes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Published states kept in the history log
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    /// Broadcast alerts kept in the queue
    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,
    /// Buffer of the observer channel (lagging observers lose oldest updates)
    #[serde(default = "default_observer_capacity")]
    pub observer_capacity: usize,
}

fn default_history_capacity() -> usize {
    500
}

fn default_broadcast_capacity() -> usize {
    200
}

fn default_observer_capacity() -> usize {
    1000
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            history_capacity: default_history_capacity(),
            broadcast_capacity: default_broadcast_capacity(),
            observer_capacity: default_observer_capacity(),
        }
    }
}

/// Grid traffic-light coordinator (green wave)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Seconds of green per axis
    #[serde(default = "default_grid_phase_duration")]
    pub phase_duration_secs: f64,
    /// Design speed of the green wave (m/s)
    #[serde(default = "default_green_wave_speed")]
    pub green_wave_speed: f64,
    /// Global clock step
    #[serde(default = "default_coordinator_tick_ms")]
    pub tick_interval_ms: u64,
    #[serde(default = "default_grid_cols")]
    pub grid_cols: usize,
    #[serde(default = "default_grid_rows")]
    pub grid_rows: usize,
    /// Distance between adjacent intersections (m)
    #[serde(default = "default_grid_spacing")]
    pub grid_spacing: f64,
}

fn default_grid_phase_duration() -> f64 {
    12.0
}

fn default_green_wave_speed() -> f64 {
    13.0
}

fn default_coordinator_tick_ms() -> u64 {
    200
}

fn default_grid_cols() -> usize {
    5
}

fn default_grid_rows() -> usize {
    5
}

fn default_grid_spacing() -> f64 {
    200.0
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            phase_duration_secs: default_grid_phase_duration(),
            green_wave_speed: default_green_wave_speed(),
            tick_interval_ms: default_coordinator_tick_ms(),
            grid_cols: default_grid_cols(),
            grid_rows: default_grid_rows(),
            grid_spacing: default_grid_spacing(),
        }
    }
}

impl CoordinatorConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

/// Single-intersection signal controller with emergency preemption
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalConfig {
    #[serde(default = "default_signal_phase_duration")]
    pub phase_duration_secs: f64,
    /// Extended phase while an emergency vehicle is served
    #[serde(default = "default_emergency_phase_duration")]
    pub emergency_phase_secs: f64,
    /// Emergency vehicles closer than this preempt the rotation (m)
    #[serde(default = "default_approach_radius")]
    pub approach_radius: f64,
    #[serde(default = "default_signal_tick_ms")]
    pub tick_interval_ms: u64,
}

fn default_signal_phase_duration() -> f64 {
    10.0
}

fn default_emergency_phase_duration() -> f64 {
    15.0
}

fn default_approach_radius() -> f64 {
    100.0
}

fn default_signal_tick_ms() -> u64 {
    100
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            phase_duration_secs: default_signal_phase_duration(),
            emergency_phase_secs: default_emergency_phase_duration(),
            approach_radius: default_approach_radius(),
            tick_interval_ms: default_signal_tick_ms(),
        }
    }
}

impl SignalConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

/// Vehicle agent kinematics and advisor call site
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_agent_tick_ms")]
    pub tick_interval_ms: u64,
    /// Cruise speed cap for non-emergency vehicles (m/s)
    #[serde(default = "default_agent_max_speed")]
    pub max_speed: f64,
    /// m/s^2
    #[serde(default = "default_acceleration")]
    pub acceleration: f64,
    /// m/s^2
    #[serde(default = "default_deceleration")]
    pub deceleration: f64,
    #[serde(default = "default_advisor_timeout_ms")]
    pub advisor_timeout_ms: u64,
    /// Minimum spacing between two advisor calls of the same vehicle
    #[serde(default = "default_advisor_min_interval_ms")]
    pub advisor_min_interval_ms: u64,
}

fn default_agent_tick_ms() -> u64 {
    100
}

fn default_agent_max_speed() -> f64 {
    14.0
}

fn default_acceleration() -> f64 {
    2.0
}

fn default_deceleration() -> f64 {
    4.0
}

fn default_advisor_timeout_ms() -> u64 {
    2000
}

fn default_advisor_min_interval_ms() -> u64 {
    1000
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_agent_tick_ms(),
            max_speed: default_agent_max_speed(),
            acceleration: default_acceleration(),
            deceleration: default_deceleration(),
            advisor_timeout_ms: default_advisor_timeout_ms(),
            advisor_min_interval_ms: default_advisor_min_interval_ms(),
        }
    }
}

impl AgentConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Tick length in simulated seconds
    pub fn dt(&self) -> f64 {
        self.tick_interval_ms as f64 / 1000.0
    }
}

/// Simulation context (scenarios and monitor)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    #[serde(default = "default_scenario")]
    pub default_scenario: String,
    #[serde(default = "default_monitor_interval_ms")]
    pub monitor_interval_ms: u64,
    /// Lateral offset of a lane from the road axis (m)
    #[serde(default = "default_lane_offset")]
    pub lane_offset: f64,
    /// Distance from the center at which scenario vehicles spawn (m)
    #[serde(default = "default_spawn_distance")]
    pub spawn_distance: f64,
    /// Seed for the drunk-driver jitter
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_scenario() -> String {
    "right_of_way".to_string()
}

fn default_monitor_interval_ms() -> u64 {
    500
}

fn default_lane_offset() -> f64 {
    10.0
}

fn default_spawn_distance() -> f64 {
    120.0
}

fn default_seed() -> u64 {
    7
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            default_scenario: default_scenario(),
            monitor_interval_ms: default_monitor_interval_ms(),
            lane_offset: default_lane_offset(),
            spawn_distance: default_spawn_distance(),
            seed: default_seed(),
        }
    }
}

impl SimulationConfig {
    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_interval_ms)
    }
}

/// Load configuration from TOML file
pub fn load_config(path: &str) -> Result<V2xConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path))?;
    let config: V2xConfig =
        toml::from_str(&contents).with_context(|| format!("Failed to parse config file {}", path))?;
    Ok(config)
}
