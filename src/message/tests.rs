use super::*;
use serde_json::json;

#[test]
fn test_action_order_is_restrictiveness() {
    assert!(VehicleAction::Go < VehicleAction::Yield);
    assert!(VehicleAction::Yield < VehicleAction::Brake);
    assert!(VehicleAction::Brake < VehicleAction::Stop);
    assert_eq!(
        VehicleAction::Yield.most_restrictive(VehicleAction::Go),
        VehicleAction::Yield
    );
}

#[test]
fn test_risk_order() {
    assert!(RiskLevel::Low < RiskLevel::Medium);
    assert!(RiskLevel::High < RiskLevel::Collision);
    assert!(RiskLevel::High.is_critical());
    assert!(!RiskLevel::Medium.is_critical());
}

#[test]
fn test_axis_of_heading() {
    assert_eq!(Axis::of_heading(0.0), Axis::NorthSouth);
    assert_eq!(Axis::of_heading(180.0), Axis::NorthSouth);
    assert_eq!(Axis::of_heading(90.0), Axis::EastWest);
    assert_eq!(Axis::of_heading(270.0), Axis::EastWest);
    assert_eq!(Axis::of_heading(20.0), Axis::NorthSouth);
    assert_eq!(Axis::of_heading(100.0), Axis::EastWest);
}

#[test]
fn test_light_phase_axis_mapping() {
    assert!(LightPhase::NsGreen.is_green_for_axis(Axis::NorthSouth));
    assert!(!LightPhase::NsGreen.is_green_for_axis(Axis::EastWest));
    assert_eq!(LightPhase::for_axis(Axis::EastWest), LightPhase::EwGreen);
    assert_eq!(LightPhase::EwGreen.toggled(), LightPhase::NsGreen);
}

#[test]
fn test_decision_accessors() {
    let vehicle = StateMessage::vehicle("VH_A", 0.0, -50.0, 10.0, 0.0);
    assert_eq!(vehicle.decision.action(), Some(VehicleAction::Go));
    assert_eq!(vehicle.decision.signal_phase(), None);

    let infra = StateMessage::infrastructure("INFRA_TL_01", 0.0, 0.0, LightPhase::EwGreen, false);
    assert_eq!(infra.decision.action(), None);
    assert_eq!(infra.decision.signal_phase(), Some(LightPhase::EwGreen));
    assert_eq!(infra.intention, "EW_GREEN");
    assert!(!infra.is_vehicle());
}

#[test]
fn test_state_message_serialization() {
    let msg = StateMessage::vehicle("VH_N", -10.0, 120.0, 18.0, 180.0)
        .with_action(VehicleAction::Yield)
        .with_risk(RiskLevel::High);

    let value = serde_json::to_value(&msg).unwrap();
    assert_eq!(value["agent_type"], json!("vehicle"));
    assert_eq!(value["risk_level"], json!("high"));
    assert_eq!(value["decision"], json!({"action": "yield"}));

    let infra = StateMessage::infrastructure("TL", 0.0, 0.0, LightPhase::NsGreen, true);
    let value = serde_json::to_value(&infra).unwrap();
    assert_eq!(
        value["decision"],
        json!({"signal": {"phase": "NS_GREEN", "preempted": true}})
    );

    let back: StateMessage = serde_json::from_value(value).unwrap();
    assert_eq!(back, infra);
}

#[test]
fn test_alert_visibility() {
    let open = BroadcastAlert::new("VH_A", AlertType::CollisionWarning, "braking");
    assert!(open.is_visible_to("VH_B"));
    assert!(!open.is_visible_to("VH_A"));

    let addressed = BroadcastAlert::new("VH_A", AlertType::Yielding, "after you").to("VH_C");
    assert!(addressed.is_visible_to("VH_C"));
    assert!(!addressed.is_visible_to("VH_B"));
}

#[test]
fn test_alert_ids_are_unique() {
    let a = BroadcastAlert::new("X", AlertType::Custom, "a");
    let b = BroadcastAlert::new("X", AlertType::Custom, "b");
    assert_ne!(a.alert_id, b.alert_id);
    assert!(!a.alert_id.is_empty());
}
