mod checkpoint_store;
mod error;
mod loop_state;
mod options;
mod self_learn;

pub use checkpoint_store::*;
pub use error::*;
pub use loop_state::*;
pub use options::*;
pub use self_learn::*;
