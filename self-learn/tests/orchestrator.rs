use anyhow::anyhow;
use common::StopSignal;
use model::{
    Checkpoint, Example, ModelInfo, TrainLog, TrainOptions, TrainOutcome, Trainer, ValueTarget,
};
use parking_lot::Mutex;
use replay_buffer::BufferPersistance;
use self_learn::{
    games_dir, train_log_path, CheckpointStore, LoopError, LoopState, Phase, SelfLearn,
    SelfLearnOptions, StopReason,
};
use self_play::{
    FixedSelfPlayOptions, GameRecord, Position, SelfPlayError, SelfPlayExecutor, SelfPlayOptions,
};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

fn options(root: &Path, buffer_gen_count: usize, games_per_gen: usize) -> SelfLearnOptions {
    SelfLearnOptions {
        root_path: root.to_path_buf(),
        buffer_gen_count,
        fixed: FixedSelfPlayOptions {
            game: "fake".to_string(),
            devices: 1,
            threads_per_device: 1,
            batch_size: 1,
            games_per_gen,
            max_failed_games: 0,
        },
        self_play: SelfPlayOptions {
            temperature: 1.0,
            zero_temp_move_count: 0,
            max_game_length: 10,
            keep_tree: false,
            dirichlet_alpha: 0.3,
            dirichlet_eps: 0.25,
            full_search_prob: 1.0,
            full_iterations: 1,
            part_iterations: 1,
            exploration_weight: 2.0,
            random_symmetries: false,
            cache_size: None,
        },
        train: TrainOptions {
            epochs: 1,
            value_target: ValueTarget::Final,
            policy_weight: 1.0,
            batch_size: 32,
            plot_points: 10,
            plot_smooth_points: 5,
        },
        weight_decay: 0.0,
        test_fraction: 0.0,
        split_seed: 7,
        max_generations: Some(3),
    }
}

fn initial_network() -> anyhow::Result<Vec<u8>> {
    Ok(b"net-0".to_vec())
}

/// Plays games whose positions encode `[generation, run, game, ply]`.
#[derive(Clone)]
struct FakeExecutor {
    run: usize,
    positions_per_game: usize,
    missing_games: usize,
    fail_on_generation: Option<usize>,
    stop_on_generation: Option<usize>,
    calls: Arc<Mutex<Vec<usize>>>,
}

impl FakeExecutor {
    fn new(run: usize) -> Self {
        Self {
            run,
            positions_per_game: 2,
            missing_games: 0,
            fail_on_generation: None,
            stop_on_generation: None,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn calls(&self) -> Vec<usize> {
        self.calls.lock().clone()
    }
}

impl SelfPlayExecutor for FakeExecutor {
    fn generate(
        &self,
        checkpoint: &Checkpoint,
        _fixed: &FixedSelfPlayOptions,
        _options: &SelfPlayOptions,
        game_count: usize,
        stop: &StopSignal,
    ) -> Result<Vec<GameRecord>, SelfPlayError> {
        let generation = checkpoint.generation() + 1;
        self.calls.lock().push(generation);

        if self.fail_on_generation == Some(generation) {
            return Err(SelfPlayError::WorkerPanicked);
        }

        if self.stop_on_generation == Some(generation) {
            stop.stop();
        }

        Ok((0..game_count.saturating_sub(self.missing_games))
            .map(|game| {
                let positions = (0..self.positions_per_game)
                    .map(|ply| Position {
                        state: vec![generation as f32, self.run as f32, game as f32, ply as f32],
                        policy: vec![1.0],
                        search_value: 0.0,
                    })
                    .collect();

                GameRecord::new(positions, 1.0)
            })
            .collect())
    }
}

struct TrainCall {
    target: usize,
    checkpoint: usize,
    train: Vec<Arc<Example>>,
    test: Vec<Arc<Example>>,
}

impl TrainCall {
    fn generations(examples: &[Arc<Example>]) -> BTreeSet<usize> {
        examples.iter().map(|e| e.state[0] as usize).collect()
    }

    fn train_generations(&self) -> BTreeSet<usize> {
        Self::generations(&self.train)
    }

    fn all_generations(&self) -> BTreeSet<usize> {
        let mut generations = Self::generations(&self.train);
        generations.extend(Self::generations(&self.test));
        generations
    }
}

#[derive(Clone, Default)]
struct FakeTrainer {
    fail_on_generation: Option<usize>,
    calls: Arc<Mutex<Vec<TrainCall>>>,
}

impl Trainer for FakeTrainer {
    fn train(
        &self,
        checkpoint: &Checkpoint,
        train: &[Arc<Example>],
        test: &[Arc<Example>],
        _options: &TrainOptions,
        _weight_decay: f32,
        target: ModelInfo,
    ) -> anyhow::Result<TrainOutcome> {
        self.calls.lock().push(TrainCall {
            target: target.generation(),
            checkpoint: checkpoint.generation(),
            train: train.to_vec(),
            test: test.to_vec(),
        });

        if self.fail_on_generation == Some(target.generation()) {
            return Err(anyhow!("loss diverged"));
        }

        Ok(TrainOutcome {
            checkpoint: Checkpoint::new(
                target,
                format!("net-{}", target.generation()).into_bytes(),
            ),
            log: TrainLog::new(),
        })
    }
}

fn committed(root: &Path) -> Option<usize> {
    LoopState::load(root)
        .unwrap()
        .map(|s| s.last_completed_generation)
}

fn checkpoints(root: &Path) -> Vec<usize> {
    CheckpointStore::new(root).unwrap().generations().unwrap()
}

fn buffer_files(root: &Path) -> Vec<usize> {
    BufferPersistance::new(games_dir(root))
        .unwrap()
        .generations()
        .unwrap()
}

#[test]
fn test_buffer_holds_the_retention_window() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let mut options = options(root, 3, 3);
    options.max_generations = Some(6);

    let trainer = FakeTrainer::default();
    let outcome = SelfLearn::new(
        options,
        initial_network,
        FakeExecutor::new(1),
        trainer.clone(),
    )
    .run()
    .unwrap();

    assert_eq!(outcome.last_generation, 6);
    assert_eq!(outcome.reason, StopReason::MaxGenerations);

    let calls = trainer.calls.lock();
    assert_eq!(calls.len(), 6);

    for call in calls.iter() {
        let g = call.target;
        let expected = ((g + 1).saturating_sub(3).max(1)..=g).collect::<BTreeSet<_>>();

        assert_eq!(call.checkpoint, g - 1);
        assert_eq!(call.all_generations(), expected);
        assert_eq!(call.train.len(), expected.len() * 6);
    }

    let state = LoopState::load(root).unwrap().unwrap();
    assert_eq!(state.last_completed_generation, 6);
    assert_eq!(state.buffer_generations, vec![4, 5, 6]);
    assert_eq!(buffer_files(root), vec![4, 5, 6]);
    assert_eq!(checkpoints(root), (0..=6).collect::<Vec<_>>());
    assert!(train_log_path(root, 6).is_file());
}

#[test]
fn test_crash_before_commit_regenerates_the_generation() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();

    let failing_trainer = FakeTrainer {
        fail_on_generation: Some(2),
        ..Default::default()
    };

    let err = SelfLearn::new(
        options(root, 2, 3),
        initial_network,
        FakeExecutor::new(1),
        failing_trainer,
    )
    .run()
    .unwrap_err();

    assert!(matches!(err, LoopError::Training { generation: 2, .. }));
    assert_eq!(err.phase(), Phase::Training);
    assert_eq!(committed(root), Some(1));
    assert_eq!(buffer_files(root), vec![1, 2]);
    assert_eq!(checkpoints(root), vec![0, 1]);

    let executor = FakeExecutor::new(2);
    let trainer = FakeTrainer::default();
    let outcome = SelfLearn::new(
        options(root, 2, 3),
        initial_network,
        executor.clone(),
        trainer.clone(),
    )
    .run()
    .unwrap();

    assert_eq!(outcome.last_generation, 3);
    assert_eq!(executor.calls(), vec![2, 3]);

    let calls = trainer.calls.lock();
    let retried = &calls[0];
    assert_eq!(retried.target, 2);

    let gen_two = retried
        .train
        .iter()
        .filter(|e| e.state[0] as usize == 2)
        .collect::<Vec<_>>();
    assert_eq!(gen_two.len(), 6);
    assert!(gen_two.iter().all(|e| e.state[1] as usize == 2));

    let gen_one = retried
        .train
        .iter()
        .filter(|e| e.state[0] as usize == 1)
        .collect::<Vec<_>>();
    assert_eq!(gen_one.len(), 6);
    assert!(gen_one.iter().all(|e| e.state[1] as usize == 1));

    assert_eq!(committed(root), Some(3));
}

#[test]
fn test_uncommitted_checkpoint_is_discarded_on_resume() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let mut options = options(root, 2, 2);
    options.max_generations = Some(2);

    SelfLearn::new(
        options.clone(),
        initial_network,
        FakeExecutor::new(1),
        FakeTrainer::default(),
    )
    .run()
    .unwrap();

    let store = CheckpointStore::new(root).unwrap();
    store
        .save(&Checkpoint::new(ModelInfo::new(3), b"net-3".to_vec()))
        .unwrap();

    let outcome = SelfLearn::new(
        options,
        initial_network,
        FakeExecutor::new(2),
        FakeTrainer::default(),
    )
    .run()
    .unwrap();

    assert_eq!(outcome.last_generation, 2);
    assert_eq!(checkpoints(root), vec![0, 1, 2]);
}

#[test]
fn test_resume_continues_with_restored_buffer() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let mut options = options(root, 3, 2);
    options.max_generations = Some(2);

    SelfLearn::new(
        options.clone(),
        initial_network,
        FakeExecutor::new(1),
        FakeTrainer::default(),
    )
    .run()
    .unwrap();

    options.max_generations = Some(4);
    let executor = FakeExecutor::new(2);
    let trainer = FakeTrainer::default();

    SelfLearn::new(options, initial_network, executor.clone(), trainer.clone())
        .run()
        .unwrap();

    assert_eq!(executor.calls(), vec![3, 4]);

    let calls = trainer.calls.lock();
    assert_eq!(calls[0].checkpoint, 2);
    assert_eq!(calls[0].train_generations(), BTreeSet::from([1, 2, 3]));
    assert_eq!(calls[1].train_generations(), BTreeSet::from([2, 3, 4]));
    assert_eq!(buffer_files(root), vec![2, 3, 4]);
}

#[test]
fn test_zero_test_fraction_never_holds_out() {
    let dir = tempfile::tempdir().unwrap();
    let trainer = FakeTrainer::default();

    SelfLearn::new(
        options(dir.path(), 2, 5),
        initial_network,
        FakeExecutor::new(1),
        trainer.clone(),
    )
    .run()
    .unwrap();

    let calls = trainer.calls.lock();
    assert_eq!(calls.len(), 3);
    assert!(calls.iter().all(|c| c.test.is_empty()));
}

#[test]
fn test_test_fraction_holds_out_disjoint_examples() {
    let dir = tempfile::tempdir().unwrap();
    let mut options = options(dir.path(), 1, 100);
    options.test_fraction = 0.05;
    options.max_generations = Some(1);

    let mut executor = FakeExecutor::new(1);
    executor.positions_per_game = 10;
    let trainer = FakeTrainer::default();

    SelfLearn::new(options, initial_network, executor, trainer.clone())
        .run()
        .unwrap();

    let calls = trainer.calls.lock();
    let call = &calls[0];

    assert_eq!(call.train.len(), 950);
    assert_eq!(call.test.len(), 50);

    let key = |e: &Arc<Example>| e.state.iter().map(|v| *v as usize).collect::<Vec<_>>();
    let train = call.train.iter().map(key).collect::<BTreeSet<_>>();
    let test = call.test.iter().map(key).collect::<BTreeSet<_>>();

    assert!(train.is_disjoint(&test));
    assert_eq!(train.len() + test.len(), 1000);
}

#[test]
fn test_single_generation_buffer_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let trainer = FakeTrainer::default();

    let outcome = SelfLearn::new(
        options(root, 1, 4),
        initial_network,
        FakeExecutor::new(1),
        trainer.clone(),
    )
    .run()
    .unwrap();

    assert_eq!(outcome.last_generation, 3);
    assert_eq!(checkpoints(root), vec![0, 1, 2, 3]);
    assert_eq!(committed(root), Some(3));

    let calls = trainer.calls.lock();
    for call in calls.iter() {
        assert_eq!(call.train.len(), 8);
        assert_eq!(call.train_generations(), BTreeSet::from([call.target]));
    }

    let store = CheckpointStore::new(root).unwrap();
    assert_eq!(store.latest().unwrap().unwrap().network(), b"net-3");
    assert_eq!(buffer_files(root), vec![3]);
}

#[test]
fn test_self_play_failure_does_not_commit() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let mut options = options(root, 2, 2);
    options.max_generations = Some(5);

    let mut executor = FakeExecutor::new(1);
    executor.fail_on_generation = Some(3);

    let err = SelfLearn::new(options, initial_network, executor, FakeTrainer::default())
        .run()
        .unwrap_err();

    assert!(matches!(err, LoopError::SelfPlay { generation: 3, .. }));
    assert_eq!(err.generation(), Some(3));
    assert_eq!(committed(root), Some(2));

    let store = CheckpointStore::new(root).unwrap();
    assert!(!store.contains(3));
    assert!(store.contains(2));
}

#[test]
fn test_short_generation_is_a_self_play_failure() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();

    let mut executor = FakeExecutor::new(1);
    executor.missing_games = 3;
    let trainer = FakeTrainer::default();

    let err = SelfLearn::new(
        options(root, 2, 4),
        initial_network,
        executor,
        trainer.clone(),
    )
    .run()
    .unwrap_err();

    assert!(matches!(
        err,
        LoopError::SelfPlay {
            generation: 1,
            source: SelfPlayError::Incomplete {
                played: 1,
                expected: 4
            },
        }
    ));
    assert!(trainer.calls.lock().is_empty());
    assert_eq!(committed(root), Some(0));
    assert_eq!(checkpoints(root), vec![0]);
}

#[test]
fn test_failed_checkpoint_write_does_not_advance_loop_state() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let mut options = options(root, 2, 2);
    options.max_generations = Some(1);

    SelfLearn::new(
        options.clone(),
        initial_network,
        FakeExecutor::new(1),
        FakeTrainer::default(),
    )
    .run()
    .unwrap();

    let store = CheckpointStore::new(root).unwrap();
    std::fs::create_dir_all(store.file_path(2)).unwrap();

    options.max_generations = Some(3);
    let trainer = FakeTrainer::default();

    let err = SelfLearn::new(
        options,
        initial_network,
        FakeExecutor::new(2),
        trainer.clone(),
    )
    .run()
    .unwrap_err();

    assert!(matches!(
        err,
        LoopError::Persistence {
            generation: 2,
            phase: Phase::Checkpoint,
            ..
        }
    ));
    assert_eq!(trainer.calls.lock().len(), 1);
    assert_eq!(committed(root), Some(1));
    assert_eq!(checkpoints(root), vec![0, 1]);
    assert!(!train_log_path(root, 2).exists());
}

#[test]
fn test_fresh_run_commits_generation_zero() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let mut options = options(root, 2, 2);
    options.max_generations = Some(0);

    let executor = FakeExecutor::new(1);
    let outcome = SelfLearn::new(
        options,
        initial_network,
        executor.clone(),
        FakeTrainer::default(),
    )
    .run()
    .unwrap();

    assert_eq!(outcome.last_generation, 0);
    assert!(executor.calls().is_empty());

    let state = LoopState::load(root).unwrap().unwrap();
    assert_eq!(state.last_completed_generation, 0);
    assert!(state.buffer_generations.is_empty());
    assert_eq!(checkpoints(root), vec![0]);
}

#[test]
fn test_empty_generation_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();

    let mut executor = FakeExecutor::new(1);
    executor.positions_per_game = 0;
    let trainer = FakeTrainer::default();

    let err = SelfLearn::new(
        options(root, 2, 2),
        initial_network,
        executor,
        trainer.clone(),
    )
    .run()
    .unwrap_err();

    assert!(matches!(err, LoopError::EmptyGeneration { generation: 1 }));
    assert!(trainer.calls.lock().is_empty());
    assert_eq!(committed(root), Some(0));
    assert_eq!(checkpoints(root), vec![0]);
}

#[test]
fn test_invalid_configuration_fails_before_any_generation() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("run");
    let mut options = options(&root, 0, 2);
    options.test_fraction = 0.05;

    let executor = FakeExecutor::new(1);
    let err = SelfLearn::new(
        options,
        initial_network,
        executor.clone(),
        FakeTrainer::default(),
    )
    .run()
    .unwrap_err();

    assert!(matches!(err, LoopError::Configuration(_)));
    assert!(executor.calls().is_empty());
    assert!(!root.exists());
}

#[test]
fn test_stop_signal_is_honored_at_generation_boundary() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let mut options = options(root, 2, 2);
    options.max_generations = None;

    let mut executor = FakeExecutor::new(1);
    executor.stop_on_generation = Some(2);
    let stop = StopSignal::new();

    let outcome = SelfLearn::new(options, initial_network, executor, FakeTrainer::default())
        .with_stop_signal(stop.clone())
        .run()
        .unwrap();

    assert!(stop.is_stopped());
    assert_eq!(outcome.last_generation, 2);
    assert_eq!(outcome.reason, StopReason::Stopped);
    assert_eq!(committed(root), Some(2));
}

#[test]
fn test_missing_committed_checkpoint_is_a_persistence_failure() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();

    LoopState::commit(root, 4, vec![3, 4]).unwrap();

    let err = SelfLearn::new(
        options(root, 2, 2),
        initial_network,
        FakeExecutor::new(1),
        FakeTrainer::default(),
    )
    .run()
    .unwrap_err();

    assert!(matches!(
        err,
        LoopError::Persistence {
            generation: 4,
            phase: Phase::Resume,
            ..
        }
    ));
}
