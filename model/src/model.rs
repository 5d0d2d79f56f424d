use anyhow::{anyhow, Result};
use common::{Config, ConfigLoader};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{Checkpoint, Example, ModelInfo};

/// Creates the untrained network that seeds generation 0.
pub trait NetworkFactory {
    fn create(&self) -> Result<Vec<u8>>;
}

impl<F> NetworkFactory for F
where
    F: Fn() -> Result<Vec<u8>>,
{
    fn create(&self) -> Result<Vec<u8>> {
        self()
    }
}

pub trait Trainer {
    /// Trains `checkpoint` on `train` and returns the checkpoint for `target`. `test` is only used to
    /// report a held out loss and must never contribute to weight updates.
    fn train(
        &self,
        checkpoint: &Checkpoint,
        train: &[Arc<Example>],
        test: &[Arc<Example>],
        options: &TrainOptions,
        weight_decay: f32,
        target: ModelInfo,
    ) -> Result<TrainOutcome>;
}

pub struct TrainOutcome {
    pub checkpoint: Checkpoint,
    pub log: TrainLog,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub enum ValueTarget {
    /// Train towards the final result of the game.
    Final,
    /// Train towards the value estimated by the search at the position.
    Searched,
    /// Interpolate between the search estimate (0.0) and the final result (1.0).
    Mixed(f32),
}

impl ValueTarget {
    pub fn target(&self, example: &Example) -> f32 {
        match self {
            ValueTarget::Final => example.outcome,
            ValueTarget::Searched => example.search_value,
            ValueTarget::Mixed(final_weight) => {
                final_weight * example.outcome + (1.0 - final_weight) * example.search_value
            }
        }
    }

    fn parse(name: &str, mix: f32) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "final" => Ok(ValueTarget::Final),
            "searched" | "search" => Ok(ValueTarget::Searched),
            "mixed" => Ok(ValueTarget::Mixed(mix)),
            other => Err(anyhow!(
                "value_target must be one of final, searched or mixed but was {}",
                other
            )),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TrainOptions {
    pub epochs: usize,
    pub value_target: ValueTarget,
    pub policy_weight: f32,
    pub batch_size: usize,
    /// Number of loss samples kept in the training log.
    pub plot_points: usize,
    /// Moving average window applied to the logged train loss.
    pub plot_smooth_points: usize,
}

impl Config for TrainOptions {
    fn load(config: &ConfigLoader) -> Result<Self> {
        let value_target_mix = config.get_f32("value_target_mix")?.unwrap_or(0.5);

        let value_target = config
            .get_string("value_target")?
            .map(|v| ValueTarget::parse(&v, value_target_mix))
            .transpose()?
            .unwrap_or(ValueTarget::Final);

        Ok(Self {
            epochs: config.get_usize("epochs")?.unwrap_or(1),
            value_target,
            policy_weight: config.get_f32("policy_weight")?.unwrap_or(1.0),
            batch_size: config.get_usize("train_batch_size")?.unwrap_or(128),
            plot_points: config.get_usize("plot_points")?.unwrap_or(100),
            plot_smooth_points: config.get_usize("plot_smooth_points")?.unwrap_or(50),
        })
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TrainLogEntry {
    pub batch: usize,
    pub train_loss: f32,
    pub test_loss: Option<f32>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct TrainLog {
    entries: Vec<TrainLogEntry>,
}

impl TrainLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// The batch interval at which to record entries so that about `plot_points` entries are kept.
    pub fn record_interval(total_batches: usize, plot_points: usize) -> usize {
        if plot_points == 0 {
            return usize::MAX;
        }

        (total_batches / plot_points).max(1)
    }

    pub fn push(&mut self, entry: TrainLogEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[TrainLogEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&TrainLogEntry> {
        self.entries.last()
    }

    /// Train loss averaged over a trailing window of `window` entries.
    pub fn smoothed_train_loss(&self, window: usize) -> Vec<f32> {
        let window = window.max(1);

        (0..self.entries.len())
            .map(|i| {
                let start = (i + 1).saturating_sub(window);
                let slice = &self.entries[start..=i];
                slice.iter().map(|e| e.train_loss).sum::<f32>() / slice.len() as f32
            })
            .collect()
    }
}
