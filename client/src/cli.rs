use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[clap(author, version)]
#[clap(name = "Optima Self Learning Client")]
#[clap(about = "Runs the self play and training loop", long_about = None)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    SelfLearn(SelfLearnCommand),
    Status(StatusCommand),
}

#[derive(Args)]
pub struct SelfLearnCommand {
    #[clap(short, long, default_value_t = String::from("self_learn.conf"))]
    pub config: String,
}

#[derive(Args)]
#[clap(about = "Prints the last committed generation and the stored checkpoints.", long_about = None)]
pub struct StatusCommand {
    #[clap(short, long, default_value_t = String::from("self_learn.conf"))]
    pub config: String,
}
