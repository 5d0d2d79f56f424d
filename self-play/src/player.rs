use anyhow::Result;
use model::Checkpoint;
use std::future::Future;

use super::{FixedSelfPlayOptions, GameRecord, SelfPlayOptions};

/// Builds a player for one self play invocation. Any search tree or evaluation cache belongs to
/// the player, so nothing carries over between generations once the checkpoint changes.
pub trait GamePlayerFactory {
    type Player: GamePlayer;

    fn create(
        &self,
        checkpoint: &Checkpoint,
        fixed: &FixedSelfPlayOptions,
        options: &SelfPlayOptions,
    ) -> Result<Self::Player>;
}

/// Plays complete games using the search and network it was created with.
pub trait GamePlayer {
    type Future: Future<Output = Result<GameRecord>>;

    fn play_game(&self) -> Self::Future;
}
