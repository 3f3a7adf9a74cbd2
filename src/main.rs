//! agent-turn CLI binary entry point.

use agent_turn::agent_loop::TurnStatus;
use agent_turn::cli::{Cli, Commands};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse_args();
    let result = match cli.command {
        Commands::Replay(args) => agent_turn::cli::run_replay(args).await,
    };

    match result {
        Ok(TurnStatus::Canceled) => std::process::exit(130),
        Ok(_) => {}
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}
