use anyhow::{anyhow, Context};
use common::{write_atomic, StopSignal};
use log::{info, warn};
use model::{Checkpoint, ModelInfo, NetworkFactory, TrainLog, TrainLogEntry, Trainer};
use replay_buffer::{split_train_test, BufferPersistance, GenerationBuffer};
use self_play::{GameRecord, SelfPlayError, SelfPlayExecutor};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;

use super::{CheckpointStore, LoopError, LoopState, Phase, SelfLearnOptions};

const GAMES_DIR_NAME: &str = "games";
const LOGS_DIR_NAME: &str = "logs";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    MaxGenerations,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopOutcome {
    pub last_generation: usize,
    pub reason: StopReason,
}

/// Alternates self play and training. Generation `g + 1` is produced by self play with checkpoint
/// `g`, appended to the replay buffer and trained on, starting from checkpoint `g`.
pub struct SelfLearn<N, E, T> {
    options: SelfLearnOptions,
    network_factory: N,
    executor: E,
    trainer: T,
    stop: StopSignal,
}

impl<N, E, T> SelfLearn<N, E, T>
where
    N: NetworkFactory,
    E: SelfPlayExecutor,
    T: Trainer,
{
    pub fn new(options: SelfLearnOptions, network_factory: N, executor: E, trainer: T) -> Self {
        Self {
            options,
            network_factory,
            executor,
            trainer,
            stop: StopSignal::new(),
        }
    }

    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    pub fn options(&self) -> &SelfLearnOptions {
        &self.options
    }

    pub fn run(&self) -> Result<LoopOutcome, LoopError> {
        self.options.validate()?;

        let root = &self.options.root_path;
        let resume_err = || LoopError::persistence(0, Phase::Resume);
        let store = CheckpointStore::new(root).map_err(resume_err())?;
        let persistance = BufferPersistance::new(games_dir(root)).map_err(resume_err())?;
        let state = LoopState::load(root).map_err(resume_err())?;
        let mut checkpoint = self.resume_checkpoint(&store, state.as_ref())?;

        if state.is_none() {
            LoopState::commit(root, 0, Vec::new()).map_err(resume_err())?;
        }

        let buffer = GenerationBuffer::new(self.options.buffer_gen_count);

        self.restore_buffer(&buffer, &persistance, state.as_ref())?;

        loop {
            let last_generation = checkpoint.generation();

            if let Some(max_generations) = self.options.max_generations {
                if last_generation >= max_generations {
                    info!(
                        "Reached generation {} of {}, stopping",
                        last_generation, max_generations
                    );

                    return Ok(LoopOutcome {
                        last_generation,
                        reason: StopReason::MaxGenerations,
                    });
                }
            }

            if self.stop.is_stopped() {
                info!("Stop requested after generation {}", last_generation);

                return Ok(LoopOutcome {
                    last_generation,
                    reason: StopReason::Stopped,
                });
            }

            checkpoint = self.run_generation(&checkpoint, &buffer, &store, &persistance)?;
        }
    }

    fn run_generation(
        &self,
        checkpoint: &Checkpoint,
        buffer: &GenerationBuffer,
        store: &CheckpointStore,
        persistance: &BufferPersistance,
    ) -> Result<Checkpoint, LoopError> {
        let options = &self.options;
        let generation = checkpoint.generation() + 1;
        let start = Instant::now();

        info!(
            "Generation {}: playing {} games with {}",
            generation,
            options.fixed.games_per_gen,
            checkpoint.info().model_name()
        );

        let games = self
            .executor
            .generate(
                checkpoint,
                &options.fixed,
                &options.self_play,
                options.fixed.games_per_gen,
                &self.stop,
            )
            .map_err(|err| LoopError::from_self_play(generation, err))?;

        let num_games = games.len();
        if num_games != options.fixed.games_per_gen {
            return Err(LoopError::SelfPlay {
                generation,
                source: SelfPlayError::Incomplete {
                    played: num_games,
                    expected: options.fixed.games_per_gen,
                },
            });
        }

        let examples = games
            .into_iter()
            .flat_map(GameRecord::into_examples)
            .collect::<Vec<_>>();

        if examples.is_empty() {
            return Err(LoopError::EmptyGeneration { generation });
        }

        info!(
            "Generation {}: played {} games, {} examples, elapsed {:.1}s",
            generation,
            num_games,
            examples.len(),
            start.elapsed().as_secs_f32()
        );

        persistance
            .write(generation, &examples)
            .map_err(LoopError::persistence(generation, Phase::BufferSnapshot))?;

        let evicted = buffer.append(generation, examples);
        if !evicted.is_empty() {
            info!("Generation {}: evicted generations {:?}", generation, evicted);
        }

        let aggregate = buffer.aggregate();
        let (train, test) = split_train_test(
            &aggregate,
            options.test_fraction,
            options.split_seed.wrapping_add(generation as u64),
        );

        info!(
            "Generation {}: training on {} examples from generations {:?}, {} held out",
            generation,
            train.len(),
            buffer.generations(),
            test.len()
        );

        let train_start = Instant::now();
        let outcome = self
            .trainer
            .train(
                checkpoint,
                &train,
                &test,
                &options.train,
                options.weight_decay,
                ModelInfo::new(generation),
            )
            .and_then(|outcome| {
                if outcome.checkpoint.generation() != generation {
                    return Err(anyhow!(
                        "Trainer returned generation {} instead of {}",
                        outcome.checkpoint.generation(),
                        generation
                    ));
                }

                Ok(outcome)
            })
            .map_err(|err| LoopError::Training {
                generation,
                source: err.into(),
            })?;

        if let Some(entry) = outcome.log.last() {
            info!(
                "Generation {}: trained in {:.1}s, train loss {:.4}, test loss {:?}",
                generation,
                train_start.elapsed().as_secs_f32(),
                entry.train_loss,
                entry.test_loss
            );
        }

        store
            .save(&outcome.checkpoint)
            .map_err(LoopError::persistence(generation, Phase::Checkpoint))?;

        write_train_log(
            &options.root_path,
            generation,
            &outcome.log,
            options.train.plot_smooth_points,
        )
            .map_err(LoopError::persistence(generation, Phase::TrainLog))?;

        let buffer_generations = buffer.generations();
        LoopState::commit(&options.root_path, generation, buffer_generations)
            .map_err(LoopError::persistence(generation, Phase::Commit))?;

        info!(
            "Generation {}: committed, elapsed {:.1}s",
            generation,
            start.elapsed().as_secs_f32()
        );

        persistance
            .remove_outside(window_start(generation, options.buffer_gen_count), generation)
            .map_err(LoopError::persistence(generation, Phase::Cleanup))?;

        Ok(outcome.checkpoint)
    }

    fn resume_checkpoint(
        &self,
        store: &CheckpointStore,
        state: Option<&LoopState>,
    ) -> Result<Checkpoint, LoopError> {
        let committed = state.map_or(0, |s| s.last_completed_generation);
        let resume_err = || LoopError::persistence(committed, Phase::Resume);

        for uncommitted in store
            .generations()
            .map_err(resume_err())?
            .into_iter()
            .filter(|g| *g > committed)
        {
            warn!("Discarding uncommitted checkpoint of generation {}", uncommitted);
            store.remove(uncommitted).map_err(resume_err())?;
        }

        if let Some(checkpoint) = store.load(committed).map_err(resume_err())? {
            info!("Resuming from generation {}", committed);
            return Ok(checkpoint);
        }

        if state.is_some() {
            return Err(resume_err()(anyhow!(
                "Loop state is at generation {} but its checkpoint is missing",
                committed
            )));
        }

        info!("Starting a new run in {:?}", self.options.root_path);

        let network = self
            .network_factory
            .create()
            .context("Failed to create the initial network")
            .map_err(resume_err())?;

        let checkpoint = Checkpoint::new(ModelInfo::new(0), network);
        store.save(&checkpoint).map_err(resume_err())?;

        Ok(checkpoint)
    }

    fn restore_buffer(
        &self,
        buffer: &GenerationBuffer,
        persistance: &BufferPersistance,
        state: Option<&LoopState>,
    ) -> Result<(), LoopError> {
        let committed = state.map_or(0, |s| s.last_completed_generation);
        let min_generation = window_start(committed, self.options.buffer_gen_count);
        let resume_err = || LoopError::persistence(committed, Phase::Resume);

        for stale in persistance
            .generations()
            .map_err(resume_err())?
            .into_iter()
            .filter(|g| *g > committed)
        {
            warn!(
                "Discarding examples of uncommitted generation {}, they will be regenerated",
                stale
            );
        }

        persistance
            .remove_outside(min_generation, committed)
            .map_err(resume_err())?;

        let buffer_generations = state.map_or(&[][..], |s| &s.buffer_generations[..]);
        for generation in buffer_generations
            .iter()
            .copied()
            .filter(|g| (min_generation..=committed).contains(g))
        {
            let examples = persistance.read(generation).map_err(resume_err())?;
            buffer.append(generation, examples);
        }

        if !buffer.is_empty() {
            info!(
                "Restored {} examples from generations {:?}",
                buffer.size(),
                buffer.generations()
            );
        }

        Ok(())
    }
}

/// The oldest generation kept in a buffer of `buffer_gen_count` generations once `generation` is
/// complete. Generation 0 has no examples.
fn window_start(generation: usize, buffer_gen_count: usize) -> usize {
    (generation + 1).saturating_sub(buffer_gen_count).max(1)
}

#[derive(Serialize)]
struct TrainLogFile<'a> {
    generation: usize,
    entries: &'a [TrainLogEntry],
    smoothed_train_loss: Vec<f32>,
}

fn write_train_log(
    root: &Path,
    generation: usize,
    log: &TrainLog,
    smooth_points: usize,
) -> anyhow::Result<()> {
    let path = train_log_path(root, generation);
    let file = TrainLogFile {
        generation,
        entries: log.entries(),
        smoothed_train_loss: log.smoothed_train_loss(smooth_points),
    };

    write_atomic(&path, |writer| Ok(serde_json::to_writer(writer, &file)?))
        .with_context(|| format!("Failed to write train log to {:?}", path))
}

pub fn train_log_path(root: &Path, generation: usize) -> PathBuf {
    root.join(LOGS_DIR_NAME)
        .join(format!("{}.json", ModelInfo::new(generation).model_name()))
}

pub fn games_dir(root: &Path) -> PathBuf {
    root.join(GAMES_DIR_NAME)
}
