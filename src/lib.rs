// Messages, alerts and decision enums shared by every component
pub mod message;

// Configuration (TOML file + environment overrides)
pub mod config;

// Security guard: signing, sanitizing, rate limiting, staleness
pub mod rate_limit;
pub mod security;

// Shared V2X communication channel
pub mod channel;

// Collision risk assessment and priority negotiation
pub mod negotiation;
pub mod risk;

// Circuit breaker for external advisory calls
pub mod breaker;

// Traffic lights: green-wave grid and the demo intersection's signal
pub mod coordinator;

// Vehicle and infrastructure agents
pub mod agent;

// Scenarios, monitor and the simulation runner
pub mod simulation;
