// Shared V2X communication channel

mod engine;
mod stats;

pub use engine::V2xChannel;
pub use stats::{ChannelStats, SecurityStats};
