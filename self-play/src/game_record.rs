use model::Example;
use serde::{Deserialize, Serialize};

/// A position of a played game together with what the search produced for it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Position {
    pub state: Vec<f32>,
    pub policy: Vec<f32>,
    /// Search value from the perspective of the player to move.
    pub search_value: f32,
}

/// A completed self play game. Players alternate every position and `outcome` is from the
/// perspective of the player who moved first: 1 for a win, -1 for a loss, 0 for a draw.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct GameRecord {
    positions: Vec<Position>,
    outcome: f32,
}

impl GameRecord {
    pub fn new(positions: Vec<Position>, outcome: f32) -> Self {
        Self { positions, outcome }
    }

    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    pub fn outcome(&self) -> f32 {
        self.outcome
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn into_examples(self) -> impl Iterator<Item = Example> {
        let outcome = self.outcome;

        self.positions.into_iter().enumerate().map(move |(i, p)| {
            let is_first_player = i % 2 == 0;

            Example {
                state: p.state,
                policy: p.policy,
                outcome: if is_first_player { outcome } else { -outcome },
                search_value: p.search_value,
            }
        })
    }
}
