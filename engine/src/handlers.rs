//! Command handlers for CLI operations
//!
//! - run: play a batch of games and write the results file
//! - games: list discovered game files
//! - results: print a results file
//! - history / replay: read the episode store
//! - secret: manage the model API key in the OS keychain
//! - config: show or validate configuration

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::json;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::batch::{AgentKind, BatchObserver, BatchOptions, BatchRunner, GameResult, ResultsSummary};
use crate::cli::{ConfigAction, RunArgs, SecretAction};
use crate::config::{expand_path, AgentConfig, Config};
use crate::db::Database;
use crate::game::{catalog, BridgeFactory, GameFactory};
use crate::llm::openai::OpenAIProvider;
use crate::llm::LLMProvider;
use crate::secrets::{SecretManager, SERVICE_NAME};
use sdk::errors::EngineError;

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

/// Agent settings for a run: config.toml values with CLI overrides applied
pub fn effective_agent_config(base: &AgentConfig, args: &RunArgs) -> Result<AgentConfig> {
    let agent = AgentConfig {
        max_steps: args.max_steps.unwrap_or(base.max_steps),
        max_chat_history_size: args
            .max_chat_history_size
            .unwrap_or(base.max_chat_history_size),
        fallback_to_random: base.fallback_to_random && !args.no_fallback,
        timeout_secs: args.timeout.unwrap_or(base.timeout_secs),
    };
    agent.validate()?;
    Ok(agent)
}

/// Prints one block per finished game
struct ProgressPrinter;

#[async_trait]
impl BatchObserver for ProgressPrinter {
    async fn game_finished(&self, game: &str, result: &GameResult, done: usize, total: usize) {
        println!("[{}/{}] {}", done, total, format_game(game, result));
    }
}

/// Play a batch of games
pub async fn handle_run(args: RunArgs, config: &Config, format: OutputFormat) -> Result<()> {
    let agent_config = effective_agent_config(&config.agent, &args)?;

    let games_dir = match &args.games_dir {
        Some(dir) => expand_path(dir)?,
        None => config.game.games_dir.clone(),
    };
    let only_33 = args.only_33 || config.game.only_33;
    let games = catalog::select_games(catalog::discover_games(&games_dir, only_33)?, &args.games);
    if games.is_empty() {
        anyhow::bail!("No games found in {}", games_dir.display());
    }

    let factory: Arc<dyn GameFactory> = Arc::new(BridgeFactory::from_config(&config.game)?);

    let options = BatchOptions {
        agent: args.agent,
        agent_config,
        output_file: args
            .output
            .clone()
            .unwrap_or_else(|| config.batch.output_file.clone()),
        concurrency: args.concurrency.unwrap_or(config.batch.concurrency),
        seed: args.seed,
    };
    let output_file = options.output_file.clone();

    let mut runner = BatchRunner::new(factory, options)?;

    if args.agent == AgentKind::Llm {
        runner = runner.with_provider(build_provider(config, args.model.as_deref())?);
    }

    let database = if args.no_store {
        None
    } else {
        let db = open_store(config).await?;
        runner = runner.with_store(Arc::new(db.episodes()));
        Some(db)
    };

    if matches!(format, OutputFormat::Text) {
        runner = runner.with_observer(Arc::new(ProgressPrinter));
        println!(
            "Playing {} games with the {} agent (run {})",
            games.len(),
            args.agent,
            runner.run_id()
        );
        println!();
    }

    let summary = runner.run(games).await?;

    if let Some(db) = database {
        db.close().await?;
    }

    match format {
        OutputFormat::Text => {
            println!();
            print!("{}", format_totals(&summary));
            println!("Results saved to {}", output_file.display());
        }
        OutputFormat::Json => {
            let output = json!({
                "run_id": runner.run_id(),
                "output_file": output_file,
                "totals": summary.totals(),
                "results": summary,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

/// Build the chat-completion provider for the llm agent
fn build_provider(config: &Config, model_override: Option<&str>) -> Result<Arc<dyn LLMProvider>> {
    let mut llm = config.llm.clone();
    if let Some(model) = model_override {
        llm.model = model.to_string();
    }
    if llm.model.trim().is_empty() {
        anyhow::bail!("The llm agent needs a model: pass --model or set llm.model in config.toml");
    }

    let api_key = SecretManager::new(SERVICE_NAME).resolve(&llm.api_key_env)?;
    Ok(Arc::new(OpenAIProvider::new(llm, api_key)))
}

/// List game files
pub async fn handle_games(
    games_dir: Option<PathBuf>,
    only_33: bool,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let dir = match games_dir {
        Some(dir) => expand_path(&dir)?,
        None => config.game.games_dir.clone(),
    };
    let games = catalog::discover_games(&dir, only_33 || config.game.only_33)?;

    match format {
        OutputFormat::Text => {
            if games.is_empty() {
                println!("No games found in {}", dir.display());
                return Ok(());
            }
            println!("Games in {} ({}):", dir.display(), games.len());
            for game in &games {
                println!("  {:<16} {}", game.name, game.path.display());
            }
        }
        OutputFormat::Json => {
            let list: Vec<_> = games
                .iter()
                .map(|g| json!({"name": g.name, "path": g.path}))
                .collect();
            let output = json!({"games_dir": dir, "count": list.len(), "games": list});
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

/// Print a results file
pub async fn handle_results(
    file: Option<PathBuf>,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let path = file.unwrap_or_else(|| config.batch.output_file.clone());
    let summary = ResultsSummary::load(&path)?;

    match format {
        OutputFormat::Text => {
            if summary.is_empty() {
                println!("No results in {}", path.display());
                return Ok(());
            }
            print!("{}", format_results(&summary));
        }
        OutputFormat::Json => {
            let output = json!({
                "file": path,
                "totals": summary.totals(),
                "results": summary,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

/// One game's block of text
pub fn format_game(game: &str, result: &GameResult) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Game: {}", game);
    if !result.agent.is_empty() {
        let _ = writeln!(out, "  Agent: {}", result.agent);
    }
    if !result.game_path.is_empty() {
        let _ = writeln!(out, "  Path: {}", result.game_path);
    }
    if let Some(outcome) = result.outcome {
        match result.reason {
            Some(reason) => {
                let _ = writeln!(out, "  Outcome: {} ({})", outcome, reason);
            }
            None => {
                let _ = writeln!(out, "  Outcome: {}", outcome);
            }
        }
    }
    let _ = writeln!(out, "  Steps: {} / {}", result.steps, result.max_steps);
    let _ = writeln!(
        out,
        "  Observations: {}  Actions: {}  Rewards: {}",
        result.num_observations, result.num_actions, result.num_rewards
    );
    let max_score = result
        .max_score
        .map(|s| s.to_string())
        .unwrap_or_else(|| "?".to_string());
    let _ = writeln!(out, "  Total Reward: {} / {}", result.total_reward, max_score);
    let _ = writeln!(out, "  Walkthrough length: {}", result.walkthrough_len);
    if result.fallback_steps > 0 {
        let _ = writeln!(out, "  Fallback steps: {}", result.fallback_steps);
    }
    if !result.info.is_empty() {
        let _ = writeln!(out, "  Info: {}", serde_json::Value::Object(result.info.clone()));
    }
    if let Some(error) = &result.error {
        let _ = writeln!(out, "  Error: {}", error);
    }
    out
}

/// Totals block
pub fn format_totals(summary: &ResultsSummary) -> String {
    let totals = summary.totals();
    let mut out = String::new();
    let _ = writeln!(out, "Games: {}", totals.games);
    let _ = writeln!(
        out,
        "  Done: {}  Step limit: {}  Failed: {}",
        totals.done, totals.step_limit_reached, totals.failed
    );
    let _ = writeln!(
        out,
        "  Total steps: {}  Mean steps: {:.1}",
        totals.total_steps, totals.mean_steps
    );
    let _ = writeln!(out, "  Total reward: {}", totals.total_reward);
    out
}

/// Every game followed by the totals
pub fn format_results(summary: &ResultsSummary) -> String {
    let mut out = String::new();
    for (game, result) in summary.iter() {
        out.push_str(&format_game(game, result));
        out.push('\n');
    }
    out.push_str(&format_totals(summary));
    out
}

async fn open_store(config: &Config) -> Result<Database> {
    let path = config.database_path();
    Database::new(&path).await.map_err(|e| {
        EngineError::Database(format!("cannot open {}: {:#}", path.display(), e)).into()
    })
}

/// Show recent episodes
pub async fn handle_history(limit: usize, config: &Config, format: OutputFormat) -> Result<()> {
    let database = open_store(config).await?;

    let episodes = database
        .episodes()
        .list_recent(limit as i64)
        .await
        .context("Failed to fetch episode history")?;

    match format {
        OutputFormat::Text => {
            if episodes.is_empty() {
                println!("No episodes in history");
            } else {
                println!("Episode History (last {} episodes):", limit);
                println!();

                for episode in &episodes {
                    println!("Episode ID: {}", episode.id);
                    println!("  Game: {} ({})", episode.game, episode.agent);
                    match &episode.reason {
                        Some(reason) => println!("  Outcome: {} ({})", episode.outcome, reason),
                        None => println!("  Outcome: {}", episode.outcome),
                    }
                    println!(
                        "  Steps: {}  Reward: {}",
                        episode.steps, episode.total_reward
                    );
                    println!("  Run: {}", episode.run_id);

                    let created = chrono::DateTime::from_timestamp(episode.created_at, 0)
                        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
                        .unwrap_or_else(|| "Unknown".to_string());
                    println!("  Created: {}", created);
                    println!();
                }
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "episodes": episodes,
                "count": episodes.len(),
                "limit": limit
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    database.close().await?;
    Ok(())
}

/// Print an episode's initial observation and every step
pub async fn handle_replay(episode_id: String, config: &Config, format: OutputFormat) -> Result<()> {
    let database = open_store(config).await?;
    let repo = database.episodes();

    let episode = repo
        .get_episode(&episode_id)
        .await
        .context("Failed to fetch episode")?
        .ok_or_else(|| anyhow::anyhow!("Episode not found: {}", episode_id))?;

    let steps = repo
        .get_steps(&episode_id)
        .await
        .context("Failed to fetch episode steps")?;

    match format {
        OutputFormat::Text => {
            println!("Episode Replay: {}", episode_id);
            println!("Game: {} ({})", episode.game, episode.agent);
            println!("Outcome: {}", episode.outcome);
            println!();
            println!("{}", episode.initial_observation.trim_end());
            println!();

            for step in &steps {
                let marker = if step.fallback { " [fallback]" } else { "" };
                println!("> {}{}", step.action, marker);
                println!("{}", step.observation.trim_end());
                if step.reward != 0 {
                    println!("(reward {:+})", step.reward);
                }
                println!();
            }

            if let Some(error) = &episode.error {
                println!("Error: {}", error);
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "episode": episode,
                "steps": steps,
                "step_count": steps.len()
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    database.close().await?;
    Ok(())
}

/// Manage the model API key
pub async fn handle_secret(action: SecretAction, config: &Config, format: OutputFormat) -> Result<()> {
    let manager = SecretManager::new(SERVICE_NAME);
    let default_key = config.llm.api_key_env.clone();

    match action {
        SecretAction::Set { key } => {
            let key = key.unwrap_or(default_key);
            let value = rpassword::read_password_from_tty(Some(&format!("Enter value for {}: ", key)))
                .context("Failed to read secret")?;
            manager.set_secret(&key, &value)?;
            report(format, &key, "stored")?;
        }
        SecretAction::Delete { key } => {
            let key = key.unwrap_or(default_key);
            manager.delete_secret(&key)?;
            report(format, &key, "deleted")?;
        }
        SecretAction::Status { key } => {
            let key = key.unwrap_or(default_key);
            let in_env = std::env::var(&key).map(|v| !v.trim().is_empty()).unwrap_or(false);
            let in_keychain = manager.has_secret(&key);

            match format {
                OutputFormat::Text => {
                    println!("{}:", key);
                    println!("  Environment: {}", if in_env { "set" } else { "not set" });
                    println!(
                        "  Keychain: {}",
                        if in_keychain { "stored" } else { "not stored" }
                    );
                }
                OutputFormat::Json => {
                    let output = json!({
                        "key": key,
                        "environment": in_env,
                        "keychain": in_keychain,
                    });
                    println!("{}", serde_json::to_string_pretty(&output)?);
                }
            }
        }
    }

    Ok(())
}

fn report(format: OutputFormat, key: &str, status: &str) -> Result<()> {
    match format {
        OutputFormat::Text => println!("Secret '{}' {}", key, status),
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({"key": key, "status": status}))?
            );
        }
    }
    Ok(())
}

/// Show or validate configuration
pub async fn handle_config(
    action: ConfigAction,
    config_path: Option<&Path>,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    match action {
        ConfigAction::Show => match format {
            OutputFormat::Text => {
                print!("{}", toml::to_string_pretty(config)?);
            }
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(config)?);
            }
        },
        ConfigAction::Validate => {
            if let Some(path) = config_path {
                Config::load_from_path(path)?;
            }
            match format {
                OutputFormat::Text => println!("Configuration is valid"),
                OutputFormat::Json => println!("{}", json!({"valid": true})),
            }
        }
    }

    Ok(())
}
