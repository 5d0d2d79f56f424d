pub mod checkpoint;
pub mod example;
pub mod model;
pub mod model_info;

pub use checkpoint::*;
pub use example::*;
pub use model::*;
pub use model_info::*;
