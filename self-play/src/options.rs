use anyhow::{anyhow, Result};
use common::Config;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Settings of the self play workers that stay the same for the whole run.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct FixedSelfPlayOptions {
    pub game: String,
    pub devices: usize,
    pub threads_per_device: usize,
    /// Number of games each worker keeps in flight at once.
    pub batch_size: usize,
    pub games_per_gen: usize,
    /// Number of failed games that are replayed before the generation is aborted.
    pub max_failed_games: usize,
}

impl FixedSelfPlayOptions {
    pub fn workers(&self) -> usize {
        self.devices * self.threads_per_device
    }
}

impl Config for FixedSelfPlayOptions {
    fn load(config: &common::ConfigLoader) -> Result<Self> {
        Ok(Self {
            game: config
                .get_string("game")?
                .ok_or_else(|| anyhow!("game must be set"))?,
            devices: config.get_usize("devices")?.unwrap_or(1),
            threads_per_device: config.get_usize("threads_per_device")?.unwrap_or(2),
            batch_size: config.get_usize("self_play_batch_size")?.unwrap_or(512),
            games_per_gen: config.get_usize("games_per_gen")?.unwrap_or(100),
            max_failed_games: config.get_usize("max_failed_games")?.unwrap_or(0),
        })
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SelfPlayOptions {
    pub temperature: f32,
    /// Moves played with `temperature` before switching to picking the most visited move.
    pub zero_temp_move_count: usize,
    pub max_game_length: usize,
    /// Reuse the subtree of the played move for the next search within the same game.
    pub keep_tree: bool,
    pub dirichlet_alpha: f32,
    pub dirichlet_eps: f32,
    pub full_search_prob: f32,
    pub full_iterations: usize,
    pub part_iterations: usize,
    pub exploration_weight: f32,
    pub random_symmetries: bool,
    /// Size of the evaluation cache shared by the games of one self play invocation. `None`
    /// disables it.
    pub cache_size: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchBudget {
    pub iterations: usize,
    /// Only full searches get exploration noise.
    pub is_full: bool,
}

impl SelfPlayOptions {
    pub fn temperature_for_move(&self, move_number: usize) -> f32 {
        if move_number < self.zero_temp_move_count {
            self.temperature
        } else {
            0.0
        }
    }

    pub fn choose_search<R: Rng + ?Sized>(&self, rng: &mut R) -> SearchBudget {
        if rng.gen::<f32>() < self.full_search_prob {
            SearchBudget {
                iterations: self.full_iterations,
                is_full: true,
            }
        } else {
            SearchBudget {
                iterations: self.part_iterations,
                is_full: false,
            }
        }
    }
}

impl Config for SelfPlayOptions {
    fn load(config: &common::ConfigLoader) -> Result<Self> {
        Ok(Self {
            temperature: config.get_f32("temperature")?.unwrap_or(1.0),
            zero_temp_move_count: config.get_usize("zero_temp_move_count")?.unwrap_or(20),
            max_game_length: config.get_usize("max_game_length")?.unwrap_or(500),
            keep_tree: config.get_bool("keep_tree")?.unwrap_or(false),
            dirichlet_alpha: config.get_f32("dirichlet_alpha")?.unwrap_or(0.2),
            dirichlet_eps: config.get_f32("dirichlet_eps")?.unwrap_or(0.25),
            full_search_prob: config.get_f32("full_search_prob")?.unwrap_or(1.0),
            full_iterations: config.get_usize("full_iterations")?.unwrap_or(600),
            part_iterations: config.get_usize("part_iterations")?.unwrap_or(600),
            exploration_weight: config.get_f32("exploration_weight")?.unwrap_or(2.0),
            random_symmetries: config.get_bool("random_symmetries")?.unwrap_or(true),
            cache_size: config.get_usize("cache_size")?.filter(|size| *size > 0),
        })
    }
}
