pub mod executor;
pub mod game_record;
pub mod options;
pub mod player;
pub mod self_play;

pub use executor::*;
pub use game_record::*;
pub use options::*;
pub use player::*;
pub use self_play::*;
