// Agents acting on the V2X channel
//
// Vehicles decide, move and publish once per tick; the infrastructure agent
// runs the demo intersection's signal. `runner` drives either on a tokio
// interval, the simulation can also step them by hand.

pub mod advisor;
pub mod infrastructure;
pub mod runner;
pub mod vehicle;

pub use advisor::{Advice, AdvisorError, AdvisorGateway, DecisionAdvisor, Situation};
pub use infrastructure::{InfrastructureAgent, InfrastructureState, SpeedRecommendation};
pub use runner::{
    spawn_infrastructure, spawn_periodic, spawn_vehicle, AgentHandle, SharedInfrastructure,
    SharedVehicle,
};
pub use vehicle::{TickContext, TickOutcome, VehicleAgent, VehicleStatus};
