mod engine;
mod network;
mod player;
mod trainer;

pub use engine::*;
pub use network::*;
pub use player::*;
pub use trainer::*;
