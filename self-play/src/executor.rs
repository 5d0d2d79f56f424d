use common::StopSignal;
use model::Checkpoint;

use super::{FixedSelfPlayOptions, GameRecord, SelfPlayOptions};

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub trait SelfPlayExecutor {
    /// Plays exactly `game_count` games with `checkpoint`, or fails.
    fn generate(
        &self,
        checkpoint: &Checkpoint,
        fixed: &FixedSelfPlayOptions,
        options: &SelfPlayOptions,
        game_count: usize,
        stop: &StopSignal,
    ) -> Result<Vec<GameRecord>, SelfPlayError>;
}

#[derive(Debug, thiserror::Error)]
pub enum SelfPlayError {
    #[error("failed to create the self play player")]
    Player(#[source] BoxError),

    #[error("{failures} self play games failed, more than the {max_failed_games} allowed")]
    TooManyFailures {
        failures: usize,
        max_failed_games: usize,
        #[source]
        source: BoxError,
    },

    #[error("self play was cancelled after {played} of {expected} games")]
    Cancelled { played: usize, expected: usize },

    #[error("self play produced {played} of {expected} games")]
    Incomplete { played: usize, expected: usize },

    #[error("a self play worker panicked")]
    WorkerPanicked,

    #[error("failed to spawn a self play worker")]
    Spawn(#[from] std::io::Error),
}
