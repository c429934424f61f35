use clap::Parser;
use convo::cli::{Cli, Commands};
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    convo::cli::init_logging(cli.verbose);

    match cli.command {
        Some(Commands::Ask(args)) => convo::cli::ask(args).await,
        Some(Commands::Models) => convo::cli::models(),
        Some(Commands::Config(args)) => convo::cli::config(args),
        Some(Commands::Chat(args)) => convo::cli::chat(args).await,
        // Interactive chat with config defaults
        None => convo::cli::chat(Default::default()).await,
    }
}
