use serde::{Deserialize, Serialize};

/// A single labeled training sample taken from a position of a self play game.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Example {
    /// The encoded game state as input to the network.
    pub state: Vec<f32>,
    /// The visit distribution of the search at this position.
    pub policy: Vec<f32>,
    /// Final game result from the perspective of the player to move. In the range -1 to 1.
    pub outcome: f32,
    /// The value estimate of the search at this position, same perspective as `outcome`.
    pub search_value: f32,
}
