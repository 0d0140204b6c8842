use clap::Parser;
use herald_core::config::HeraldConfig;

mod admin;
mod cli;
mod run;

use cli::{Cli, Commands};

const DEFAULT_LOG_FILTER: &str =
    "herald_server=info,herald_worker=info,herald_store=info,herald_executor=info";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // logs go to stderr so admin commands can print JSON on stdout
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let load_config = || HeraldConfig::load(cli.config.as_deref());

    let output = match cli.command {
        Commands::Run => return run::run(load_config()?).await,
        Commands::Job { command } => admin::job(&load_config()?, command)?,
        Commands::Schedule { command } => admin::schedule(&load_config()?, command)?,
        Commands::Cron { command } => admin::cron(command)?,
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
