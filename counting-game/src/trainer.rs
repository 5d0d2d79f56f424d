use anyhow::{anyhow, Result};
use log::debug;
use model::{
    Checkpoint, Example, ModelInfo, TrainLog, TrainLogEntry, TrainOptions, TrainOutcome, Trainer,
};
use std::sync::Arc;

use super::{softmax, value_feature_of_encoded, CountingNetwork};

const LEARNING_RATE: f32 = 0.1;

/// Gradient descent on the policy logits (cross entropy) and the value weight (squared error).
#[derive(Default)]
pub struct CountingTrainer {}

impl CountingTrainer {
    pub fn new() -> Self {
        Self {}
    }
}

impl Trainer for CountingTrainer {
    fn train(
        &self,
        checkpoint: &Checkpoint,
        train: &[Arc<Example>],
        test: &[Arc<Example>],
        options: &TrainOptions,
        weight_decay: f32,
        target: ModelInfo,
    ) -> Result<TrainOutcome> {
        if train.is_empty() {
            return Err(anyhow!(
                "Cannot train {} without examples",
                target.model_name()
            ));
        }

        let mut network = CountingNetwork::from_bytes(checkpoint.network())?;
        let batches_per_epoch = (train.len() + options.batch_size - 1) / options.batch_size;
        let total_batches = batches_per_epoch * options.epochs;
        let record_interval = TrainLog::record_interval(total_batches, options.plot_points);
        let mut log = TrainLog::new();
        let mut batch_num = 0;

        for _ in 0..options.epochs {
            for batch in train.chunks(options.batch_size) {
                let train_loss = step(&mut network, batch, options, weight_decay);
                batch_num += 1;

                if batch_num % record_interval == 0 || batch_num == total_batches {
                    let test_loss = if test.is_empty() {
                        None
                    } else {
                        Some(loss(&network, test, options))
                    };

                    log.push(TrainLogEntry {
                        batch: batch_num,
                        train_loss,
                        test_loss,
                    });
                }
            }
        }

        debug!(
            "Trained {}: logits {:?}, value weight {}",
            target.model_name(),
            network.logits,
            network.value_weight
        );

        Ok(TrainOutcome {
            checkpoint: Checkpoint::new(target, network.to_bytes()?),
            log,
        })
    }
}

/// Applies one update and returns the loss of the batch before the update.
fn step(
    network: &mut CountingNetwork,
    batch: &[Arc<Example>],
    options: &TrainOptions,
    weight_decay: f32,
) -> f32 {
    let batch_loss = loss(network, batch, options);
    let policy = network.policy();
    let mut logit_grads = [0.0f32; 3];
    let mut value_grad = 0.0;

    for example in batch {
        for (i, grad) in logit_grads.iter_mut().enumerate() {
            *grad += policy[i] - example.policy.get(i).copied().unwrap_or(0.0);
        }

        let feature = value_feature_of_encoded(&example.state);
        let error = network.value(&example.state) - options.value_target.target(example);
        value_grad += 2.0 * error * feature;
    }

    let n = batch.len() as f32;
    for (logit, grad) in network.logits.iter_mut().zip(logit_grads) {
        *logit -= LEARNING_RATE * (options.policy_weight * grad / n + weight_decay * *logit);
    }

    network.value_weight -=
        LEARNING_RATE * (value_grad / n + weight_decay * network.value_weight);

    batch_loss
}

fn loss(network: &CountingNetwork, examples: &[Arc<Example>], options: &TrainOptions) -> f32 {
    let policy = softmax(&network.logits);
    let total: f32 = examples
        .iter()
        .map(|example| {
            let policy_loss: f32 = example
                .policy
                .iter()
                .zip(policy)
                .map(|(target, p)| -target * p.max(f32::EPSILON).ln())
                .sum();

            let value_error = network.value(&example.state) - options.value_target.target(example);

            options.policy_weight * policy_loss + value_error * value_error
        })
        .sum();

    total / examples.len() as f32
}
