pub const INITIAL_COUNT: usize = 5;
pub const WINNING_COUNT: usize = 10;

/// A counter both players move. The first mover wins by reaching `WINNING_COUNT`, the second mover
/// by reaching zero.
#[derive(Hash, PartialEq, Eq, Clone, Debug)]
pub struct CountingGameState {
    pub p1_turn: bool,
    pub count: usize,
    pub move_number: usize,
}

impl CountingGameState {
    pub fn initial() -> Self {
        Self {
            p1_turn: true,
            count: INITIAL_COUNT,
            move_number: 0,
        }
    }

    pub fn take_action(&self, action: CountingAction) -> Self {
        let count = match action {
            CountingAction::Increment => self.count + 1,
            CountingAction::Decrement => self.count - 1,
            CountingAction::Stay => self.count,
        };

        Self {
            p1_turn: !self.p1_turn,
            count,
            move_number: self.move_number + 1,
        }
    }

    /// The outcome from the perspective of the first mover once the game is over.
    pub fn is_terminal_state(&self) -> Option<f32> {
        if self.count >= WINNING_COUNT {
            Some(1.0)
        } else if self.count == 0 {
            Some(-1.0)
        } else {
            None
        }
    }

    /// Heuristic value from the perspective of the player to move.
    pub fn value_feature(&self) -> f32 {
        let count = self.count as f32 / WINNING_COUNT as f32;
        let value = count * 2.0 - 1.0;

        if self.p1_turn {
            value
        } else {
            -value
        }
    }

    pub fn encode(&self) -> Vec<f32> {
        vec![
            self.count as f32 / WINNING_COUNT as f32,
            if self.p1_turn { 1.0 } else { 0.0 },
        ]
    }
}

/// Inverse of `CountingGameState::encode` for the fields that the network reads.
pub fn value_feature_of_encoded(state: &[f32]) -> f32 {
    let value = state[0] * 2.0 - 1.0;

    if state[1] > 0.5 {
        value
    } else {
        -value
    }
}

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum CountingAction {
    Increment,
    Decrement,
    Stay,
}

impl CountingAction {
    pub const ALL: [CountingAction; 3] = [
        CountingAction::Increment,
        CountingAction::Decrement,
        CountingAction::Stay,
    ];
}
