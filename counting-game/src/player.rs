use anyhow::{anyhow, Result};
use futures::future;
use model::Checkpoint;
use rand::distributions::WeightedIndex;
use rand::prelude::*;
use rand_distr::Dirichlet;
use self_play::{
    FixedSelfPlayOptions, GamePlayer, GamePlayerFactory, GameRecord, Position, SearchBudget,
    SelfPlayOptions,
};

use super::{CountingAction, CountingGameState, CountingNetwork};

/// Creates counting game players. The game has no symmetries and no search tree worth keeping, so
/// `random_symmetries`, `keep_tree` and `cache_size` have no effect.
#[derive(Default)]
pub struct CountingPlayerFactory {}

impl CountingPlayerFactory {
    pub fn new() -> Self {
        Self {}
    }
}

impl GamePlayerFactory for CountingPlayerFactory {
    type Player = CountingPlayer;

    fn create(
        &self,
        checkpoint: &Checkpoint,
        fixed: &FixedSelfPlayOptions,
        options: &SelfPlayOptions,
    ) -> Result<Self::Player> {
        if fixed.game != "counting" {
            return Err(anyhow!(
                "Expected the counting game but was configured for {}",
                fixed.game
            ));
        }

        Ok(CountingPlayer {
            network: CountingNetwork::from_bytes(checkpoint.network())?,
            options: options.clone(),
        })
    }
}

pub struct CountingPlayer {
    network: CountingNetwork,
    options: SelfPlayOptions,
}

impl CountingPlayer {
    pub fn new(network: CountingNetwork, options: SelfPlayOptions) -> Self {
        Self { network, options }
    }

    pub fn play<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<GameRecord> {
        let mut state = CountingGameState::initial();
        let mut positions = Vec::new();

        let outcome = loop {
            if let Some(outcome) = state.is_terminal_state() {
                break outcome;
            }

            if state.move_number >= self.options.max_game_length {
                break 0.0;
            }

            let budget = self.options.choose_search(rng);
            let policy = self.search(budget, rng)?;
            let temperature = self.options.temperature_for_move(state.move_number);
            let action = CountingAction::ALL[choose_action(&policy, temperature, rng)?];

            positions.push(Position {
                search_value: self.network.value(&state.encode()),
                state: state.encode(),
                policy: policy.to_vec(),
            });

            state = state.take_action(action);
        };

        Ok(GameRecord::new(positions, outcome))
    }

    /// Samples `iterations` actions from the network prior and returns the visit distribution.
    fn search<R: Rng + ?Sized>(&self, budget: SearchBudget, rng: &mut R) -> Result<[f32; 3]> {
        let mut prior = self.network.policy();

        if budget.is_full && self.options.dirichlet_eps > 0.0 {
            let noise = Dirichlet::new_with_size(self.options.dirichlet_alpha, prior.len())
                .map_err(|e| anyhow!("Invalid dirichlet alpha: {}", e))?
                .sample(rng);
            let e = self.options.dirichlet_eps;

            for (p, n) in prior.iter_mut().zip(noise) {
                *p = (1.0 - e) * *p + e * n;
            }
        }

        if budget.iterations == 0 {
            return Ok(prior);
        }

        let dist = WeightedIndex::new(prior)?;
        let mut visits = [0.0f32; 3];
        for _ in 0..budget.iterations {
            visits[dist.sample(rng)] += 1.0;
        }

        Ok(visits.map(|v| v / budget.iterations as f32))
    }
}

fn choose_action<R: Rng + ?Sized>(
    policy: &[f32; 3],
    temperature: f32,
    rng: &mut R,
) -> Result<usize> {
    if temperature <= 0.0 {
        let best = policy
            .iter()
            .enumerate()
            .fold(0, |best, (i, p)| if *p > policy[best] { i } else { best });

        return Ok(best);
    }

    let weights = policy.map(|p| p.powf(1.0 / temperature));
    let dist = WeightedIndex::new(weights)?;

    Ok(dist.sample(rng))
}

impl GamePlayer for CountingPlayer {
    type Future = future::Ready<Result<GameRecord>>;

    fn play_game(&self) -> Self::Future {
        future::ready(self.play(&mut thread_rng()))
    }
}
