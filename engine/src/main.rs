// Lantern text-adventure agent runner
// Main entry point for the lantern binary

use clap::Parser;
use lantern_engine::cli::{Cli, Command};
use lantern_engine::config::Config;
use lantern_engine::handlers::{
    handle_config, handle_games, handle_history, handle_replay, handle_results, handle_run,
    handle_secret, OutputFormat,
};
use lantern_engine::telemetry::init_telemetry_with_level;
use sdk::errors::{EngineError, LanternErrorExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration (or use custom path if provided)
    let config = if let Some(config_path) = &cli.config {
        Config::load_from_path(config_path)?
    } else {
        Config::load_or_create()?
    };

    // --log wins over the config file; RUST_LOG wins over both
    let log_level = cli.log.as_deref().unwrap_or(&config.core.log_level);
    init_telemetry_with_level(log_level);

    tracing::info!(
        "Lantern v{} ({} - {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_COMMIT_HASH"),
        env!("BUILD_TIMESTAMP")
    );

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    let result = match cli.command {
        Command::Run(args) => {
            tracing::info!("Running batch with the {} agent", args.agent);
            handle_run(args, &config, format).await
        }

        Command::Games { games_dir, only_33 } => {
            handle_games(games_dir, only_33, &config, format).await
        }

        Command::Results { file } => handle_results(file, &config, format).await,

        Command::History { limit } => {
            tracing::info!("Showing last {} episodes", limit);
            handle_history(limit, &config, format).await
        }

        Command::Replay { episode_id } => {
            tracing::info!("Replaying episode: {}", episode_id);
            handle_replay(episode_id, &config, format).await
        }

        Command::Secret { action } => handle_secret(action, &config, format).await,

        Command::Config { action } => {
            handle_config(action, cli.config.as_deref(), &config, format).await
        }
    };

    if let Err(e) = &result {
        if let Some(engine_err) = e.downcast_ref::<EngineError>() {
            eprintln!("Hint: {}", engine_err.user_hint());
        }
    }

    result
}
