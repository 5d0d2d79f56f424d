use anyhow::anyhow;
use common::{get_env_usize, StopSignal};
use crossbeam::channel::{Receiver, Sender};
use futures::stream::{FuturesUnordered, StreamExt};
use log::{debug, info, warn};
use model::Checkpoint;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Instant;
use tokio::runtime::Handle;

use super::{
    FixedSelfPlayOptions, GamePlayer, GamePlayerFactory, GameRecord, SelfPlayError,
    SelfPlayExecutor, SelfPlayOptions,
};

/// Plays self play games on `devices * threads_per_device` worker threads. Each worker keeps
/// `batch_size` games in flight on the tokio runtime so that their network evaluations can be batched.
pub struct WorkerPool<F> {
    player_factory: F,
    runtime_handle: Handle,
}

impl<F> WorkerPool<F> {
    pub fn new(player_factory: F, runtime_handle: Handle) -> Self {
        Self {
            player_factory,
            runtime_handle,
        }
    }

    pub fn player_factory(&self) -> &F {
        &self.player_factory
    }
}

impl<F> SelfPlayExecutor for WorkerPool<F>
where
    F: GamePlayerFactory,
    F::Player: Sync,
{
    fn generate(
        &self,
        checkpoint: &Checkpoint,
        fixed: &FixedSelfPlayOptions,
        options: &SelfPlayOptions,
        game_count: usize,
        stop: &StopSignal,
    ) -> Result<Vec<GameRecord>, SelfPlayError> {
        let player = self
            .player_factory
            .create(checkpoint, fixed, options)
            .map_err(|err| SelfPlayError::Player(err.into()))?;

        let dispatcher = Dispatcher::new(game_count, fixed.max_failed_games);
        let channel_size = get_env_usize("SELF_PLAY_CHANNEL_SIZE").unwrap_or(1000);
        let (game_results_tx, game_results_rx) = crossbeam::channel::bounded(channel_size);
        let model_name = checkpoint.info().model_name();

        let player_ref = &player;
        let dispatcher_ref = &dispatcher;
        let runtime_handle = &self.runtime_handle;
        let batch_size = fixed.batch_size;

        info!(
            "Starting self play with {} on {} workers, {} games",
            model_name,
            fixed.workers(),
            game_count
        );

        let res = crossbeam::scope(move |s| {
            for device in 0..fixed.devices {
                for thread_num in 0..fixed.threads_per_device {
                    let game_results_tx = game_results_tx.clone();

                    let spawned = s
                        .builder()
                        .name(format!("self-play-{}-{}", device, thread_num))
                        .spawn(move |_| {
                            debug!("Starting Thread: {}-{}", device, thread_num);

                            runtime_handle.block_on(play_games(
                                player_ref,
                                batch_size,
                                dispatcher_ref,
                                stop,
                                game_results_tx,
                            ));
                        });

                    if let Err(err) = spawned {
                        dispatcher_ref.abort();
                        return Err(SelfPlayError::Spawn(err));
                    }
                }
            }

            drop(game_results_tx);

            Ok(collect_games(game_results_rx, game_count, &model_name))
        });

        let games = match res {
            Ok(games) => games?,
            Err(_) => return Err(SelfPlayError::WorkerPanicked),
        };

        dispatcher.into_result(games, stop)
    }
}

async fn play_games<P: GamePlayer>(
    player: &P,
    batch_size: usize,
    dispatcher: &Dispatcher,
    stop: &StopSignal,
    game_results_tx: Sender<GameRecord>,
) {
    let mut games = FuturesUnordered::new();

    dispatch(&mut games, player, batch_size, dispatcher, stop);

    while let Some(result) = games.next().await {
        match result {
            Ok(game) => {
                if let Err(e) = game_results_tx.send(game) {
                    warn!("Failed to send game results through the results channel. {}", e);
                    return;
                }
            }
            Err(err) => dispatcher.game_failed(err),
        }

        dispatch(&mut games, player, batch_size, dispatcher, stop);
    }
}

fn dispatch<P: GamePlayer>(
    games: &mut FuturesUnordered<P::Future>,
    player: &P,
    batch_size: usize,
    dispatcher: &Dispatcher,
    stop: &StopSignal,
) {
    while games.len() < batch_size && dispatcher.claim(stop) {
        games.push(player.play_game());
    }
}

fn collect_games(
    game_results_rx: Receiver<GameRecord>,
    game_count: usize,
    model_name: &str,
) -> Vec<GameRecord> {
    let starting_run_time = Instant::now();
    let log_every = (game_count / 10).max(1);
    let mut games = Vec::with_capacity(game_count);

    for game in game_results_rx.iter() {
        debug!(
            "Model: {}, Number of Positions: {}, Outcome: {}",
            model_name,
            game.len(),
            game.outcome()
        );

        games.push(game);

        let num_of_games_played = games.len();
        if num_of_games_played % log_every == 0 {
            let elapsed = starting_run_time.elapsed().as_secs_f32();

            info!(
                "Model: {}, Games Played: {}/{}, Elapsed: {:.2}h, GPM: {:.2}",
                model_name,
                num_of_games_played,
                game_count,
                elapsed / (60 * 60) as f32,
                num_of_games_played as f32 / elapsed.max(f32::EPSILON) * 60_f32
            );
        }
    }

    games
}

/// Hands out game slots to the workers so that exactly the requested number of games complete.
struct Dispatcher {
    expected: usize,
    remaining: AtomicUsize,
    failures: AtomicUsize,
    max_failed_games: usize,
    aborted: AtomicBool,
    first_error: Mutex<Option<anyhow::Error>>,
}

impl Dispatcher {
    fn new(expected: usize, max_failed_games: usize) -> Self {
        Self {
            expected,
            remaining: AtomicUsize::new(expected),
            failures: AtomicUsize::new(0),
            max_failed_games,
            aborted: AtomicBool::new(false),
            first_error: Mutex::new(None),
        }
    }

    fn claim(&self, stop: &StopSignal) -> bool {
        if stop.is_stopped() || self.aborted.load(Ordering::SeqCst) {
            return false;
        }

        self.remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |r| r.checked_sub(1))
            .is_ok()
    }

    fn game_failed(&self, err: anyhow::Error) {
        let failures = self.failures.fetch_add(1, Ordering::SeqCst) + 1;

        warn!(
            "Self play game failed, {} failures of {} allowed. {:#}",
            failures, self.max_failed_games, err
        );

        self.first_error.lock().get_or_insert(err);

        if failures > self.max_failed_games {
            self.abort();
        } else {
            // Give the slot back so the game is replayed.
            self.remaining.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
    }

    fn into_result(
        self,
        games: Vec<GameRecord>,
        stop: &StopSignal,
    ) -> Result<Vec<GameRecord>, SelfPlayError> {
        let played = games.len();

        if self.aborted.load(Ordering::SeqCst) {
            let source = self
                .first_error
                .into_inner()
                .unwrap_or_else(|| anyhow!("self play was aborted"));

            return Err(SelfPlayError::TooManyFailures {
                failures: self.failures.load(Ordering::SeqCst),
                max_failed_games: self.max_failed_games,
                source: source.into(),
            });
        }

        if played == self.expected {
            Ok(games)
        } else if stop.is_stopped() {
            Err(SelfPlayError::Cancelled {
                played,
                expected: self.expected,
            })
        } else {
            Err(SelfPlayError::Incomplete {
                played,
                expected: self.expected,
            })
        }
    }
}
