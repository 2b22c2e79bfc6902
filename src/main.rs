use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use intent_flow::api;
use intent_flow::api::state::AppState;

mod cli;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let _ = dotenvy::dotenv();

    let cli = cli::Cli::parse();
    match cli.command {
        cli::Command::Serve { host, port } => {
            let state = AppState::from_env()?;
            api::serve(&host, port, state).await
        }
    }
}
