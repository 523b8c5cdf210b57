//! docstate operator CLI entry point.
//!
//! Binary name: `dstate`
//!
//! Parses CLI arguments, sets up tracing, loads configuration, then dispatches
//! to the command handler.

mod cli;
mod state;

use clap::Parser;
use docstate_observe::tracing_setup::{
    TracingOptions, init_tracing, shutdown_tracing, verbosity_filter,
};

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let options = TracingOptions {
        default_filter: verbosity_filter(cli.verbose, cli.quiet).to_string(),
        enable_otel: cli.otel,
    };
    if let Err(e) = init_tracing(&options) {
        eprintln!("Warning: failed to initialize tracing: {e}");
    }

    let result = run(cli).await;
    shutdown_tracing();
    result
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let state = AppState::init(cli.data_dir.clone()).await?;

    match cli.command {
        Commands::Init => cli::init::init(&state, cli.json).await,
        Commands::Keys { context } => cli::keys::keys(&state, &context, cli.json),
        Commands::Load { context } => cli::state::load(&state, &context, cli.json).await,
        Commands::Save {
            context,
            user_data,
            conversation_data,
            private_data,
        } => {
            let bodies = cli::state::StateBodies {
                user_data,
                conversation_data,
                private_data,
            };
            cli::state::save(&state, &context, &bodies, cli.json).await
        }
        Commands::Config { write } => cli::config::config(&state, write, cli.json).await,
    }
}
