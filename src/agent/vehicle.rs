use crate::agent::advisor::{AdvisorGateway, GatewayStats, NearbyAgent, Situation};
use crate::channel::V2xChannel;
use crate::config::AgentConfig;
use crate::coordinator::IntersectionCoordinator;
use crate::message::{
    AgentType, AlertType, BroadcastAlert, RiskLevel, StateMessage, VehicleAction,
};
use crate::negotiation::{compute_decisions_for_all, compute_recommended_speed, STOP_BOUNDARY};
use crate::risk::{
    assess_risk, compute_ttc, distance, risk_for_agent, time_to_intersection, velocity,
    INTERSECTION_CENTER, INTERSECTION_RADIUS,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info};

/// Within this distance of the center a vehicle counts as having crossed (m)
pub const PASSED_CENTER_DISTANCE: f64 = 15.0;

/// Crossed vehicles leave the scene beyond this distance (m)
pub const EXIT_DISTANCE: f64 = 120.0;

/// Emergency vehicles announce themselves inside this distance (m)
pub const EMERGENCY_ALERT_RANGE: f64 = 150.0;

/// Signals farther than this are not considered (m)
pub const SIGNAL_RANGE: f64 = 100.0;

/// Alerts older than this are not delivered to a vehicle
const ALERT_WINDOW: Duration = Duration::from_secs(2);

/// Others farther than this are left out of the advisor situation (m)
const NEARBY_RANGE: f64 = 150.0;

/// Per-tick heading jitter of a drunk driver (deg)
const DRUNK_HEADING_JITTER: f64 = 3.0;

/// Max accumulated heading drift of a drunk driver (deg)
const DRUNK_MAX_DRIFT: f64 = 8.0;

/// Per-tick speed jitter of a drunk driver (m/s)
const DRUNK_SPEED_JITTER: f64 = 0.5;

/// Result of one vehicle tick
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    Running,
    /// Crossed the intersection and left the scene
    Exited,
}

/// Shared context of a tick
pub struct TickContext<'a> {
    pub channel: &'a V2xChannel,
    /// Grid lights, when the scenario is signalled by the coordinator
    pub coordinator: Option<&'a IntersectionCoordinator>,
}

/// Serializable view of a vehicle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VehicleStatus {
    pub agent_id: String,
    pub x: f64,
    pub y: f64,
    pub speed: f64,
    pub direction: f64,
    pub intention: String,
    pub risk_level: RiskLevel,
    pub decision: VehicleAction,
    pub reason: String,
    pub recommended_speed: f64,
    pub is_emergency: bool,
    pub is_police: bool,
    pub is_drunk: bool,
    pub passed_center: bool,
    pub alerts_received: u64,
    pub ticks: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advisor: Option<GatewayStats>,
}

/// Autonomous vehicle publishing its state on the V2X channel
pub struct VehicleAgent {
    id: String,
    x: f64,
    y: f64,
    direction: f64,
    base_direction: f64,
    heading_drift: f64,
    speed: f64,
    target_speed: f64,
    intention: String,
    is_emergency: bool,
    is_police: bool,
    is_drunk: bool,

    risk: RiskLevel,
    decision: VehicleAction,
    reason: String,
    recommended_speed: f64,

    passed_center: bool,
    alerts_received: u64,
    seen_alerts: HashSet<String>,
    ticks: u64,

    config: AgentConfig,
    advisor: Option<AdvisorGateway>,
    rng: StdRng,
}

impl VehicleAgent {
    /// Vehicle cruising at `speed`, which is also its target speed
    pub fn new(
        id: impl Into<String>,
        x: f64,
        y: f64,
        direction: f64,
        speed: f64,
        config: &AgentConfig,
    ) -> Self {
        Self {
            id: id.into(),
            x,
            y,
            direction,
            base_direction: direction,
            heading_drift: 0.0,
            speed,
            target_speed: speed,
            intention: "straight".to_string(),
            is_emergency: false,
            is_police: false,
            is_drunk: false,
            risk: RiskLevel::Low,
            decision: VehicleAction::Go,
            reason: "clear".to_string(),
            recommended_speed: speed,
            passed_center: false,
            alerts_received: 0,
            seen_alerts: HashSet::new(),
            ticks: 0,
            config: config.clone(),
            advisor: None,
            rng: StdRng::seed_from_u64(0),
        }
    }

    pub fn with_target_speed(mut self, target_speed: f64) -> Self {
        self.target_speed = target_speed;
        self
    }

    pub fn with_intention(mut self, intention: impl Into<String>) -> Self {
        self.intention = intention.into();
        self
    }

    pub fn emergency(mut self) -> Self {
        self.is_emergency = true;
        self
    }

    pub fn police(mut self) -> Self {
        self.is_police = true;
        self
    }

    /// Drunk driver whose jitter is drawn from an RNG seeded with `seed`
    pub fn drunk(mut self, seed: u64) -> Self {
        self.is_drunk = true;
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn with_advisor(mut self, advisor: AdvisorGateway) -> Self {
        self.advisor = Some(advisor);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn position(&self) -> (f64, f64) {
        (self.x, self.y)
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn direction(&self) -> f64 {
        self.direction
    }

    pub fn decision(&self) -> VehicleAction {
        self.decision
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn risk(&self) -> RiskLevel {
        self.risk
    }

    pub fn recommended_speed(&self) -> f64 {
        self.recommended_speed
    }

    pub fn alerts_received(&self) -> u64 {
        self.alerts_received
    }

    pub fn has_passed_center(&self) -> bool {
        self.passed_center
    }

    pub fn is_emergency(&self) -> bool {
        self.is_emergency
    }

    /// Current state as a channel message
    pub fn message(&self) -> StateMessage {
        StateMessage::vehicle(self.id.clone(), self.x, self.y, self.speed, self.direction)
            .with_intention(self.intention.clone())
            .with_risk(self.risk)
            .with_action(self.decision)
            .emergency(self.is_emergency)
            .police(self.is_police)
            .drunk(self.is_drunk)
    }

    /// One decide-move-publish cycle
    pub async fn tick(&mut self, ctx: &TickContext<'_>) -> TickOutcome {
        self.ticks += 1;

        let others = ctx.channel.get_other_agents(&self.id);
        let current = self.message();
        self.risk = risk_for_agent(&current, others.values());
        let current = current.with_risk(self.risk);

        let own = {
            let mut decisions =
                compute_decisions_for_all(others.values().chain(std::iter::once(&current)));
            decisions.remove(&self.id).unwrap_or_default()
        };
        let mut action = own.action;
        let mut reason = own.reason.to_string();

        let new_alerts = self.receive_alerts(ctx.channel);
        let signal = self.signal_ahead(ctx, &current, others.values());

        let mut advised_speed = None;
        if self.advisor.is_some() {
            let situation = self.situation(&current, others.values(), action, signal, new_alerts);
            if let Some(gateway) = self.advisor.as_mut() {
                if let Some(advice) = gateway.consult(&self.id, &situation).await {
                    // Advice may tighten the rule-based decision, never loosen it
                    if advice.action >= action {
                        action = advice.action;
                        reason = "advisor".to_string();
                        advised_speed = Some(advice.speed);
                    }
                }
            }
        }

        if let Some(light) = signal {
            if !light.green && !self.is_emergency && light.distance > INTERSECTION_RADIUS {
                let braking = self.speed * self.speed / (2.0 * self.config.deceleration);
                let red_action = if light.distance <= braking + STOP_BOUNDARY {
                    VehicleAction::Stop
                } else {
                    VehicleAction::Yield
                };
                if red_action > action {
                    action = red_action;
                    reason = "red_light".to_string();
                }
            }
        }

        if self.is_emergency {
            action = VehicleAction::Go;
            reason = "emergency_vehicle".to_string();
            self.recommended_speed = self.target_speed;
        } else {
            let target = self.target_speed.min(self.config.max_speed);
            let mut recommended = compute_recommended_speed(&current, action, target);
            if let Some(speed) = advised_speed {
                recommended = recommended.min(speed);
            }
            self.recommended_speed = recommended;
        }

        if action != self.decision {
            debug!(
                agent_id = %self.id,
                from = ?self.decision,
                to = ?action,
                reason = %reason,
                "Vehicle decision changed"
            );
        }
        self.decision = action;
        self.reason = reason;

        self.adjust_speed();
        if self.is_drunk {
            self.jitter();
        }
        self.advance();

        ctx.channel.publish(self.message());
        self.announce(ctx.channel);

        self.check_exit()
    }

    fn adjust_speed(&mut self) {
        let dt = self.config.dt();
        if self.speed < self.recommended_speed {
            self.speed = (self.speed + self.config.acceleration * dt).min(self.recommended_speed);
        } else if self.speed > self.recommended_speed {
            self.speed = (self.speed - self.config.deceleration * dt).max(self.recommended_speed);
        }
    }

    /// Bounded heading drift and speed wobble
    fn jitter(&mut self) {
        let swerve = self
            .rng
            .gen_range(-DRUNK_HEADING_JITTER..=DRUNK_HEADING_JITTER);
        self.heading_drift = (self.heading_drift + swerve).clamp(-DRUNK_MAX_DRIFT, DRUNK_MAX_DRIFT);
        self.direction = (self.base_direction + self.heading_drift).rem_euclid(360.0);

        let wobble = self
            .rng
            .gen_range(-DRUNK_SPEED_JITTER..=DRUNK_SPEED_JITTER);
        self.speed = (self.speed + wobble).max(0.0);
    }

    fn advance(&mut self) {
        let dt = self.config.dt();
        let (vx, vy) = velocity(self.speed, self.direction);
        self.x += vx * dt;
        self.y += vy * dt;
    }

    fn announce(&self, channel: &V2xChannel) {
        if self.risk == RiskLevel::Collision {
            channel.broadcast(BroadcastAlert::new(
                self.id.clone(),
                AlertType::CollisionWarning,
                format!("{} on collision course, action {:?}", self.id, self.decision),
            ));
        }

        if self.is_emergency
            && distance(self.position(), INTERSECTION_CENTER) < EMERGENCY_ALERT_RANGE
        {
            channel.broadcast(BroadcastAlert::new(
                self.id.clone(),
                AlertType::EmergencyApproach,
                format!("{} approaching the intersection", self.id),
            ));
        }
    }

    /// Count alerts not seen on a previous tick; returns their messages
    fn receive_alerts(&mut self, channel: &V2xChannel) -> Vec<String> {
        let alerts = channel.get_broadcasts_for(&self.id, ALERT_WINDOW);
        let mut seen = HashSet::with_capacity(alerts.len());
        let mut fresh = Vec::new();

        for alert in alerts {
            if !self.seen_alerts.contains(&alert.alert_id) {
                fresh.push(alert.message.clone());
            }
            seen.insert(alert.alert_id);
        }

        self.alerts_received += fresh.len() as u64;
        self.seen_alerts = seen;
        fresh
    }

    /// Closest light the vehicle is driving toward.
    ///
    /// Infrastructure messages on the channel win over the grid lights.
    fn signal_ahead<'a, I>(
        &self,
        ctx: &TickContext<'_>,
        current: &StateMessage,
        others: I,
    ) -> Option<SignalAhead>
    where
        I: IntoIterator<Item = &'a StateMessage>,
    {
        let axis = current.axis();
        let from_infrastructure = others
            .into_iter()
            .filter(|s| s.agent_type == AgentType::Infrastructure)
            .filter_map(|s| {
                s.decision
                    .signal_phase()
                    .map(|phase| (s.position(), phase.is_green_for_axis(axis)))
            })
            .filter_map(|(at, green)| SignalAhead::toward(current, at, green))
            .min_by(|a, b| a.distance.total_cmp(&b.distance));

        from_infrastructure.or_else(|| {
            let light = ctx
                .coordinator?
                .nearest_light(self.x, self.y, SIGNAL_RANGE)?;
            SignalAhead::toward(current, (light.x, light.y), light.is_green_for_axis(axis))
        })
    }

    fn situation<'a, I>(
        &self,
        current: &StateMessage,
        others: I,
        rule_action: VehicleAction,
        signal: Option<SignalAhead>,
        alerts: Vec<String>,
    ) -> Situation
    where
        I: IntoIterator<Item = &'a StateMessage>,
    {
        let mut nearby: Vec<NearbyAgent> = others
            .into_iter()
            .filter(|s| s.is_vehicle())
            .map(|s| (distance(current.position(), s.position()), s))
            .filter(|(dist, _)| *dist <= NEARBY_RANGE)
            .map(|(dist, s)| NearbyAgent {
                agent_id: s.agent_id.clone(),
                distance: dist,
                ttc: compute_ttc(current, s),
                risk: assess_risk(current, s),
                is_emergency: s.is_emergency,
            })
            .collect();
        nearby.sort_by(|a, b| a.distance.total_cmp(&b.distance));

        Situation {
            agent_id: self.id.clone(),
            x: self.x,
            y: self.y,
            speed: self.speed,
            direction: self.direction,
            intention: self.intention.clone(),
            is_emergency: self.is_emergency,
            distance_to_center: distance(self.position(), INTERSECTION_CENTER),
            risk_level: self.risk,
            rule_action,
            signal_green: signal.map(|s| s.green),
            nearby,
            alerts,
        }
    }

    fn check_exit(&mut self) -> TickOutcome {
        let dist = distance(self.position(), INTERSECTION_CENTER);
        if dist < PASSED_CENTER_DISTANCE {
            self.passed_center = true;
        }
        if self.passed_center && dist > EXIT_DISTANCE {
            info!(agent_id = %self.id, ticks = self.ticks, "Vehicle left the intersection");
            return TickOutcome::Exited;
        }
        TickOutcome::Running
    }

    pub fn status(&self) -> VehicleStatus {
        VehicleStatus {
            agent_id: self.id.clone(),
            x: round2(self.x),
            y: round2(self.y),
            speed: round2(self.speed),
            direction: round2(self.direction),
            intention: self.intention.clone(),
            risk_level: self.risk,
            decision: self.decision,
            reason: self.reason.clone(),
            recommended_speed: round2(self.recommended_speed),
            is_emergency: self.is_emergency,
            is_police: self.is_police,
            is_drunk: self.is_drunk,
            passed_center: self.passed_center,
            alerts_received: self.alerts_received,
            ticks: self.ticks,
            advisor: self.advisor.as_ref().map(AdvisorGateway::stats),
        }
    }
}

/// A light ahead of the vehicle
#[derive(Clone, Copy, Debug, PartialEq)]
struct SignalAhead {
    green: bool,
    /// Distance to the light's intersection center (m)
    distance: f64,
}

impl SignalAhead {
    /// Some when `vehicle` is within range and closing on `at`
    fn toward(vehicle: &StateMessage, at: (f64, f64), green: bool) -> Option<Self> {
        let dist = distance(vehicle.position(), at);
        if dist > SIGNAL_RANGE || !time_to_intersection(vehicle, at).is_finite() {
            return None;
        }
        Some(Self {
            green,
            distance: dist,
        })
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::advisor::{Advice, AdvisorError, DecisionAdvisor};
    use crate::breaker::{BreakerConfig, CircuitBreaker};
    use crate::config::CoordinatorConfig;
    use crate::message::LightPhase;
    use async_trait::async_trait;
    use std::sync::Arc;

    fn config() -> AgentConfig {
        AgentConfig::default()
    }

    fn channel() -> V2xChannel {
        V2xChannel::with_defaults().unwrap()
    }

    struct FixedAdvisor(VehicleAction, f64);

    #[async_trait]
    impl DecisionAdvisor for FixedAdvisor {
        async fn advise(&self, _situation: &Situation) -> Result<Advice, AdvisorError> {
            Ok(Advice {
                action: self.0,
                speed: self.1,
                reason: "fixed".to_string(),
            })
        }
    }

    fn gateway(action: VehicleAction, speed: f64) -> AdvisorGateway {
        AdvisorGateway::new(
            Arc::new(FixedAdvisor(action, speed)),
            Arc::new(CircuitBreaker::new("advisor", BreakerConfig::default())),
            Duration::from_millis(500),
            Duration::ZERO,
        )
    }

    #[tokio::test]
    async fn test_tick_moves_and_publishes() {
        let channel = channel();
        let ctx = TickContext {
            channel: &channel,
            coordinator: None,
        };
        let mut vehicle = VehicleAgent::new("VH_A", -10.0, 120.0, 180.0, 10.0, &config());

        assert_eq!(vehicle.tick(&ctx).await, TickOutcome::Running);

        let (x, y) = vehicle.position();
        assert!((x + 10.0).abs() < 1e-9);
        assert!((y - 119.0).abs() < 1e-9);

        let published = channel.get_agent_state("VH_A").unwrap();
        assert_eq!(published.y, y);
        assert_eq!(published.decision.action(), Some(VehicleAction::Go));
        assert!(!published.signature.is_empty());
    }

    #[tokio::test]
    async fn test_target_speed_capped_for_regular_vehicles() {
        let channel = channel();
        let ctx = TickContext {
            channel: &channel,
            coordinator: None,
        };
        let mut vehicle = VehicleAgent::new("VH_A", -10.0, 120.0, 180.0, 18.0, &config());

        vehicle.tick(&ctx).await;
        assert_eq!(vehicle.recommended_speed(), 14.0);
        assert!((vehicle.speed() - 17.6).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_emergency_vehicle_goes_at_own_target() {
        let channel = channel();
        let ctx = TickContext {
            channel: &channel,
            coordinator: None,
        };
        let mut ambulance = VehicleAgent::new("AMBULANCE", -120.0, -10.0, 90.0, 20.0, &config())
            .with_target_speed(25.2)
            .emergency();

        ambulance.tick(&ctx).await;
        assert_eq!(ambulance.decision(), VehicleAction::Go);
        assert_eq!(ambulance.reason(), "emergency_vehicle");
        assert_eq!(ambulance.recommended_speed(), 25.2);
        assert!((ambulance.speed() - 20.2).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_red_light_from_infrastructure_stops_vehicle() {
        let channel = channel();
        channel.publish(StateMessage::infrastructure(
            "INFRA_TL_01",
            0.0,
            0.0,
            LightPhase::EwGreen,
            false,
        ));
        let ctx = TickContext {
            channel: &channel,
            coordinator: None,
        };

        // Southbound, inside braking distance + stop boundary (12.5 + 35)
        let mut vehicle = VehicleAgent::new("VH_A", -10.0, 45.0, 180.0, 10.0, &config());
        vehicle.tick(&ctx).await;
        assert_eq!(vehicle.decision(), VehicleAction::Stop);
        assert_eq!(vehicle.reason(), "red_light");
        assert_eq!(vehicle.recommended_speed(), 0.0);
        assert!((vehicle.speed() - 9.6).abs() < 1e-9);

        // Farther out the vehicle only prepares to stop
        let mut far = VehicleAgent::new("VH_B", -10.0, 90.0, 180.0, 10.0, &config());
        far.tick(&ctx).await;
        assert_eq!(far.decision(), VehicleAction::Yield);
    }

    #[tokio::test]
    async fn test_green_light_lets_vehicle_go() {
        let channel = channel();
        channel.publish(StateMessage::infrastructure(
            "INFRA_TL_01",
            0.0,
            0.0,
            LightPhase::NsGreen,
            false,
        ));
        let ctx = TickContext {
            channel: &channel,
            coordinator: None,
        };

        let mut vehicle = VehicleAgent::new("VH_A", -10.0, 45.0, 180.0, 10.0, &config());
        vehicle.tick(&ctx).await;
        assert_eq!(vehicle.decision(), VehicleAction::Go);
    }

    #[tokio::test]
    async fn test_red_light_ignored_past_stop_line_and_by_emergency() {
        let channel = channel();
        channel.publish(StateMessage::infrastructure(
            "INFRA_TL_01",
            0.0,
            0.0,
            LightPhase::EwGreen,
            false,
        ));
        let ctx = TickContext {
            channel: &channel,
            coordinator: None,
        };

        let mut committed = VehicleAgent::new("VH_A", -10.0, 20.0, 180.0, 10.0, &config());
        committed.tick(&ctx).await;
        assert_eq!(committed.decision(), VehicleAction::Go);

        let mut ambulance =
            VehicleAgent::new("AMBULANCE", 10.0, 45.0, 180.0, 10.0, &config()).emergency();
        ambulance.tick(&ctx).await;
        assert_eq!(ambulance.decision(), VehicleAction::Go);
    }

    #[tokio::test]
    async fn test_grid_light_applies_without_infrastructure() {
        let channel = channel();
        let coordinator = IntersectionCoordinator::new(&[(0.0, 0.0)], &CoordinatorConfig::default());
        // Clock 0: NS green, so a westbound vehicle faces red
        let ctx = TickContext {
            channel: &channel,
            coordinator: Some(&coordinator),
        };

        let mut vehicle = VehicleAgent::new("VH_W", 45.0, 10.0, 270.0, 10.0, &config());
        vehicle.tick(&ctx).await;
        assert_eq!(vehicle.decision(), VehicleAction::Stop);
        assert_eq!(vehicle.reason(), "red_light");

        // Same vehicle with no signal source drives on
        let bare = TickContext {
            channel: &channel,
            coordinator: None,
        };
        let mut free = VehicleAgent::new("VH_X", 45.0, -10.0, 270.0, 10.0, &config());
        free.tick(&bare).await;
        assert_eq!(free.decision(), VehicleAction::Go);
    }

    #[tokio::test]
    async fn test_advisor_may_only_tighten() {
        let channel = channel();
        let ctx = TickContext {
            channel: &channel,
            coordinator: None,
        };

        let mut cautious = VehicleAgent::new("VH_A", -10.0, 100.0, 180.0, 10.0, &config())
            .with_advisor(gateway(VehicleAction::Brake, 3.0));
        cautious.tick(&ctx).await;
        assert_eq!(cautious.decision(), VehicleAction::Brake);
        assert_eq!(cautious.reason(), "advisor");
        assert!(cautious.recommended_speed() <= 3.0);

        channel.publish(StateMessage::infrastructure(
            "INFRA_TL_01",
            0.0,
            0.0,
            LightPhase::EwGreen,
            false,
        ));
        let mut reckless = VehicleAgent::new("VH_B", 10.0, -45.0, 0.0, 10.0, &config())
            .with_advisor(gateway(VehicleAction::Go, 14.0));
        reckless.tick(&ctx).await;
        assert_eq!(reckless.decision(), VehicleAction::Stop);
        assert_eq!(reckless.status().advisor.unwrap().calls, 1);
    }

    #[tokio::test]
    async fn test_exits_after_crossing() {
        let channel = channel();
        let ctx = TickContext {
            channel: &channel,
            coordinator: None,
        };
        let mut vehicle = VehicleAgent::new("VH_A", -10.0, 10.0, 180.0, 14.0, &config());

        let mut outcome = TickOutcome::Running;
        for _ in 0..200 {
            outcome = vehicle.tick(&ctx).await;
            if outcome == TickOutcome::Exited {
                break;
            }
        }
        assert_eq!(outcome, TickOutcome::Exited);
        assert!(vehicle.has_passed_center());
        assert!(vehicle.position().1 < -100.0);
    }

    #[tokio::test]
    async fn test_far_vehicle_never_exits_without_crossing() {
        let channel = channel();
        let ctx = TickContext {
            channel: &channel,
            coordinator: None,
        };
        // Heading away from the center from the start
        let mut vehicle = VehicleAgent::new("VH_A", -10.0, 130.0, 0.0, 14.0, &config());
        for _ in 0..20 {
            assert_eq!(vehicle.tick(&ctx).await, TickOutcome::Running);
        }
        assert!(!vehicle.has_passed_center());
    }

    #[tokio::test]
    async fn test_drunk_jitter_is_seeded_and_bounded() {
        let run = |seed: u64| async move {
            let channel = channel();
            let ctx = TickContext {
                channel: &channel,
                coordinator: None,
            };
            let mut vehicle =
                VehicleAgent::new("DRUNK", 120.0, 10.0, 270.0, 10.0, &config()).drunk(seed);
            let mut headings = vec![];
            for _ in 0..30 {
                vehicle.tick(&ctx).await;
                headings.push(vehicle.direction());
            }
            headings
        };

        let first = run(7).await;
        assert_eq!(first, run(7).await);
        assert!(first.iter().all(|h| (h - 270.0).abs() <= DRUNK_MAX_DRIFT + 1e-9));
    }

    #[tokio::test]
    async fn test_emergency_alerts_are_received_once() {
        let channel = channel();
        let ctx = TickContext {
            channel: &channel,
            coordinator: None,
        };
        let mut ambulance =
            VehicleAgent::new("AMBULANCE", -100.0, -10.0, 90.0, 14.0, &config()).emergency();
        let mut car = VehicleAgent::new("VH_C", 10.0, -120.0, 0.0, 10.0, &config());

        ambulance.tick(&ctx).await;
        car.tick(&ctx).await;
        assert_eq!(car.alerts_received(), 1);

        // Nothing new since the last tick
        car.tick(&ctx).await;
        assert_eq!(car.alerts_received(), 1);

        // The sender never receives its own alerts
        ambulance.tick(&ctx).await;
        assert_eq!(ambulance.alerts_received(), 0);
    }

    #[test]
    fn test_status_serializes() {
        let vehicle = VehicleAgent::new("VH_A", -10.123, 120.0, 180.0, 18.0, &config()).police();
        let json = serde_json::to_value(vehicle.status()).unwrap();
        assert_eq!(json["agent_id"], "VH_A");
        assert_eq!(json["x"], -10.12);
        assert_eq!(json["decision"], "go");
        assert_eq!(json["is_police"], true);
        assert!(json.get("advisor").is_none());
    }
}
