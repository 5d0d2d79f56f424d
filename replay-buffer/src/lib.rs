mod buffer_persistance;
mod generation_buffer;
mod split;

pub use buffer_persistance::*;
pub use generation_buffer::*;
pub use split::*;
