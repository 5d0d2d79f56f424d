use anyhow::Result;
use common::{Config, ConfigLoader};
use model::TrainOptions;
use self_play::{FixedSelfPlayOptions, SelfPlayOptions};
use std::path::PathBuf;

use super::LoopError;

/// Everything a loop run needs. Loaded once and validated before the first generation starts.
#[derive(Debug, Clone)]
pub struct SelfLearnOptions {
    /// Directory holding checkpoints, buffer snapshots, train logs and the loop state.
    pub root_path: PathBuf,
    /// Number of most recent generations kept in the replay buffer.
    pub buffer_gen_count: usize,
    pub fixed: FixedSelfPlayOptions,
    pub self_play: SelfPlayOptions,
    pub train: TrainOptions,
    pub weight_decay: f32,
    /// Fraction of the buffer held out from training and only used to report a test loss.
    pub test_fraction: f32,
    /// Base seed of the train/test split. Each generation splits with `split_seed + generation`.
    pub split_seed: u64,
    /// Stop once this generation has been committed. Runs until stopped when `None`.
    pub max_generations: Option<usize>,
}

impl SelfLearnOptions {
    pub fn validate(&self) -> Result<(), LoopError> {
        fn positive(name: &str, value: usize) -> Result<(), LoopError> {
            if value == 0 {
                return Err(LoopError::Configuration(format!(
                    "{} must be positive",
                    name
                )));
            }

            Ok(())
        }

        positive("buffer_gen_count", self.buffer_gen_count)?;
        positive("games_per_gen", self.fixed.games_per_gen)?;
        positive("devices", self.fixed.devices)?;
        positive("threads_per_device", self.fixed.threads_per_device)?;
        positive("self_play_batch_size", self.fixed.batch_size)?;
        positive("epochs", self.train.epochs)?;
        positive("train_batch_size", self.train.batch_size)?;

        if !(0.0..1.0).contains(&self.test_fraction) {
            return Err(LoopError::Configuration(format!(
                "test_fraction must be in [0, 1) but was {}",
                self.test_fraction
            )));
        }

        if !(0.0..=1.0).contains(&self.self_play.full_search_prob) {
            return Err(LoopError::Configuration(format!(
                "full_search_prob must be in [0, 1] but was {}",
                self.self_play.full_search_prob
            )));
        }

        if self.weight_decay.is_nan() || self.weight_decay < 0.0 {
            return Err(LoopError::Configuration(format!(
                "weight_decay must not be negative but was {}",
                self.weight_decay
            )));
        }

        Ok(())
    }
}

impl Config for SelfLearnOptions {
    fn load(config: &ConfigLoader) -> Result<Self> {
        Ok(Self {
            root_path: config.get_relative_path("root_path")?,
            buffer_gen_count: config.get_usize("buffer_gen_count")?.unwrap_or(10),
            fixed: config.load()?,
            self_play: config.load()?,
            train: config.load()?,
            weight_decay: config.get_f32("weight_decay")?.unwrap_or(1e-4),
            test_fraction: config.get_f32("test_fraction")?.unwrap_or(0.05),
            split_seed: config.get_u64("split_seed")?.unwrap_or(0),
            max_generations: config.get_usize("max_generations")?,
        })
    }
}
