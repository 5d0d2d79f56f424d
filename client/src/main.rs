mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use common::{get_env_usize, ConfigLoader, FsExt, StopSignal};
use counting_game::{CountingNetworkFactory, CountingPlayerFactory, CountingTrainer};
use dotenv::dotenv;
use env_logger::Env;
use log::{info, warn};
use replay_buffer::BufferPersistance;
use self_learn::{games_dir, CheckpointStore, LoopState, SelfLearn, SelfLearnOptions};
use self_play::WorkerPool;

fn main() -> Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::SelfLearn(self_learn_args) => {
            let options = load_options(&self_learn_args.config)?;

            run_self_learn(options)
        }
        Commands::Status(status_args) => {
            let options = load_options(&status_args.config)?;

            print_status(&options)
        }
    }
}

fn load_options(config: &str) -> Result<SelfLearnOptions> {
    let config_path = config.to_string().relative_to_cwd()?;
    let config = ConfigLoader::new(config_path, "self_learn".to_string())?;

    config.load()
}

fn run_self_learn(options: SelfLearnOptions) -> Result<()> {
    let mut builder = tokio::runtime::Builder::new_multi_thread();

    builder.enable_all();

    if let Some(worker_threads) = get_env_usize("TOKIO_THREADS") {
        builder.worker_threads(worker_threads);
    }

    info!("{:?}", builder);

    let runtime = builder.build().context("Failed to build the tokio runtime")?;
    let stop = StopSignal::new();

    let ctrl_c_stop = stop.clone();
    runtime.spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Received ctrl-c, finishing the in flight games before stopping");
            ctrl_c_stop.stop();
        }
    });

    let executor = WorkerPool::new(CountingPlayerFactory::new(), runtime.handle().clone());
    let self_learn = SelfLearn::new(
        options,
        CountingNetworkFactory::new(),
        executor,
        CountingTrainer::new(),
    )
    .with_stop_signal(stop);

    let outcome = self_learn.run()?;

    info!(
        "Self learning finished at generation {} ({:?})",
        outcome.last_generation, outcome.reason
    );

    Ok(())
}

fn print_status(options: &SelfLearnOptions) -> Result<()> {
    let root = &options.root_path;

    match LoopState::load(root)? {
        Some(state) => println!(
            "Last completed generation: {}, buffer generations: {:?}",
            state.last_completed_generation, state.buffer_generations
        ),
        None => println!("No generation has been committed in {:?}", root),
    }

    let checkpoints = CheckpointStore::new(root)?.generations()?;
    println!("Checkpoints: {:?}", checkpoints);

    let buffer_files = BufferPersistance::new(games_dir(root))?.generations()?;
    println!("Buffer snapshots: {:?}", buffer_files);

    Ok(())
}
