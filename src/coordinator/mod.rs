// Traffic-light coordination
//
// `IntersectionCoordinator` runs a grid of lights off one global clock with
// green-wave offsets; `SignalController` drives the single demo intersection.

mod light;
mod signal;

pub use light::{phase_at, LightState, TrafficLight};
pub use signal::{SignalController, SignalState};

use crate::config::CoordinatorConfig;
use crate::message::LightPhase;
use crate::risk::distance;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::info;

/// Lookup tolerance for `light_at` (m)
const POSITION_TOLERANCE: f64 = 1.0;

/// Intersections of a `cols` x `rows` grid centered on the origin, row by row
/// from the north-west corner.
pub fn grid_intersections(cols: usize, rows: usize, spacing: f64) -> Vec<(f64, f64)> {
    let half_w = cols.saturating_sub(1) as f64 * spacing / 2.0;
    let half_h = rows.saturating_sub(1) as f64 * spacing / 2.0;

    (0..rows)
        .flat_map(|row| {
            (0..cols).map(move |col| {
                (
                    -half_w + col as f64 * spacing,
                    half_h - row as f64 * spacing,
                )
            })
        })
        .collect()
}

struct Grid {
    clock: f64,
    lights: Vec<TrafficLight>,
}

/// Coordinator statistics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoordinatorStats {
    pub total_intersections: usize,
    pub ns_green_count: usize,
    pub ew_green_count: usize,
    /// Seconds, rounded to 0.1
    pub global_clock: f64,
    pub phase_duration: f64,
    pub green_wave_speed_ms: f64,
    pub green_wave_speed_kmh: f64,
}

pub struct IntersectionCoordinator {
    grid: RwLock<Grid>,
    phase_duration: f64,
    green_wave_speed: f64,
    config: CoordinatorConfig,
    running: AtomicBool,
}

impl IntersectionCoordinator {
    /// Coordinator over `intersections` spaced `config.grid_spacing` apart.
    ///
    /// Column/row indices come from the sorted distinct x / y coordinates.
    pub fn new(intersections: &[(f64, f64)], config: &CoordinatorConfig) -> Self {
        let phase_duration = config.phase_duration_secs;
        let cycle = 2.0 * phase_duration;
        let travel_time = if config.green_wave_speed > 0.0 {
            config.grid_spacing / config.green_wave_speed
        } else {
            0.0
        };

        let xs = distinct_sorted(intersections.iter().map(|p| p.0));
        let ys = distinct_sorted(intersections.iter().map(|p| p.1));

        let lights: Vec<TrafficLight> = intersections
            .iter()
            .map(|&(x, y)| {
                let col = index_of(&xs, x);
                let row = index_of(&ys, y);
                let offset = col as f64 * travel_time + row as f64 * travel_time * 0.5;
                let offset = if cycle > 0.0 { offset.rem_euclid(cycle) } else { 0.0 };
                TrafficLight::new(x, y, offset, phase_duration)
            })
            .collect();

        info!(
            intersections = lights.len(),
            green_wave_speed = config.green_wave_speed,
            phase_duration = phase_duration,
            "Intersection coordinator created"
        );

        Self {
            grid: RwLock::new(Grid { clock: 0.0, lights }),
            phase_duration,
            green_wave_speed: config.green_wave_speed,
            config: config.clone(),
            running: AtomicBool::new(false),
        }
    }

    /// Coordinator over the configured `grid_cols` x `grid_rows` grid
    pub fn grid(config: &CoordinatorConfig) -> Self {
        let intersections =
            grid_intersections(config.grid_cols, config.grid_rows, config.grid_spacing);
        Self::new(&intersections, config)
    }

    /// Advance the global clock and recompute every light
    pub fn tick(&self, dt: f64) {
        let mut grid = self.grid.write().unwrap_or_else(PoisonError::into_inner);
        grid.clock += dt;
        let clock = grid.clock;
        for light in grid.lights.iter_mut() {
            light.update(clock, self.phase_duration);
        }
    }

    /// Tick on the configured interval until `stop` is called
    pub async fn run(self: Arc<Self>) {
        let period = self.config.tick_interval();
        let dt = period.as_secs_f64();
        let mut ticker = interval(period);

        // Skip missed ticks to prevent backlog under load
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        while self.running.load(Ordering::SeqCst) {
            ticker.tick().await;
            if !self.running.load(Ordering::SeqCst) {
                break;
            }
            self.tick(dt);
        }
    }

    /// Spawn the clock worker; no-op handle when already running
    pub fn start(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        if self.running.swap(true, Ordering::SeqCst) {
            return None;
        }
        info!("Intersection coordinator started");
        Some(tokio::spawn(Arc::clone(self).run()))
    }

    pub fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            info!("Intersection coordinator stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn global_clock(&self) -> f64 {
        self.grid
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clock
    }

    /// Light within 1m of `(x, y)`
    pub fn light_at(&self, x: f64, y: f64) -> Option<LightState> {
        let grid = self.grid.read().unwrap_or_else(PoisonError::into_inner);
        grid.lights
            .iter()
            .find(|l| {
                (l.x - x).abs() < POSITION_TOLERANCE && (l.y - y).abs() < POSITION_TOLERANCE
            })
            .map(TrafficLight::state)
    }

    /// Closest light to `(x, y)`, if any lies within `max_distance`
    pub fn nearest_light(&self, x: f64, y: f64, max_distance: f64) -> Option<LightState> {
        let grid = self.grid.read().unwrap_or_else(PoisonError::into_inner);
        grid.lights
            .iter()
            .map(|l| (distance((l.x, l.y), (x, y)), l))
            .filter(|(dist, _)| *dist <= max_distance)
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, l)| l.state())
    }

    pub fn light_states(&self) -> Vec<LightState> {
        let grid = self.grid.read().unwrap_or_else(PoisonError::into_inner);
        grid.lights.iter().map(TrafficLight::state).collect()
    }

    /// Phase offsets in construction order
    pub fn offsets(&self) -> Vec<f64> {
        let grid = self.grid.read().unwrap_or_else(PoisonError::into_inner);
        grid.lights.iter().map(|l| l.phase_offset).collect()
    }

    pub fn stats(&self) -> CoordinatorStats {
        let grid = self.grid.read().unwrap_or_else(PoisonError::into_inner);
        let ns_green_count = grid
            .lights
            .iter()
            .filter(|l| l.phase() == LightPhase::NsGreen)
            .count();

        CoordinatorStats {
            total_intersections: grid.lights.len(),
            ns_green_count,
            ew_green_count: grid.lights.len() - ns_green_count,
            global_clock: (grid.clock * 10.0).round() / 10.0,
            phase_duration: self.phase_duration,
            green_wave_speed_ms: self.green_wave_speed,
            green_wave_speed_kmh: (self.green_wave_speed * 3.6 * 10.0).round() / 10.0,
        }
    }
}

fn distinct_sorted(values: impl Iterator<Item = f64>) -> Vec<f64> {
    let mut values: Vec<f64> = values.collect();
    values.sort_by(f64::total_cmp);
    values.dedup();
    values
}

fn index_of(sorted: &[f64], value: f64) -> usize {
    sorted.iter().position(|&v| v == value).unwrap_or(0)
}
