use clap::{Parser, Subcommand};

/// AI-assisted trading-intent backend — natural-language strategy
/// planning with an executable preview, plus cross-chain intent tracking.
#[derive(Parser)]
#[command(name = "intent-flow", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the HTTP API server
    Serve {
        /// Bind address
        #[arg(long, default_value = "0.0.0.0")]
        host: String,

        /// Bind port
        #[arg(long, default_value_t = 8000)]
        port: u16,
    },
}
