//! CLI interface for Lantern
//!
//! Commands and global flags, defined with clap's derive API. Every run flag
//! is optional and overrides the matching config.toml value for that run.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::batch::AgentKind;

/// Lantern text-adventure agent runner
///
/// Plays a batch of interactive-fiction games with a random, walkthrough or
/// language-model agent and records steps, rewards and outcomes.
#[derive(Parser, Debug)]
#[command(name = "lantern")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Play a batch of games and write a results file
    Run(RunArgs),

    /// List the game files a run would play
    Games {
        /// Directory holding the game files
        #[arg(long, value_name = "DIR")]
        games_dir: Option<PathBuf>,

        /// Only list the 33-game benchmark subset
        #[arg(long)]
        only_33: bool,
    },

    /// Print a results file
    Results {
        /// Results file (defaults to batch.output_file)
        file: Option<PathBuf>,
    },

    /// Show recent episodes from the episode store
    History {
        /// Number of episodes to show (default: 10)
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Replay and show all steps of a stored episode
    Replay {
        /// Episode ID to replay
        episode_id: String,
    },

    /// Manage the model API key in the OS keychain
    Secret {
        #[command(subcommand)]
        action: SecretAction,
    },

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Options for `lantern run`
#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Agent that picks the actions
    #[arg(short, long, value_enum, default_value_t = AgentKind::Random)]
    pub agent: AgentKind,

    /// Play only these games (by identifier, repeatable)
    #[arg(short, long = "game", value_name = "NAME")]
    pub games: Vec<String>,

    /// Directory holding the game files
    #[arg(long, value_name = "DIR")]
    pub games_dir: Option<PathBuf>,

    /// Only play the 33-game benchmark subset
    #[arg(long)]
    pub only_33: bool,

    /// Maximum actions per game
    #[arg(long, value_name = "N")]
    pub max_steps: Option<usize>,

    /// Conversation turns kept for the model
    #[arg(long, value_name = "N")]
    pub max_chat_history_size: Option<usize>,

    /// Seconds allowed for one model call
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<f64>,

    /// Fail the game instead of playing a random action when the model fails
    #[arg(long)]
    pub no_fallback: bool,

    /// Model identifier for the llm agent
    #[arg(short, long)]
    pub model: Option<String>,

    /// Results file
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Games played at the same time
    #[arg(long, value_name = "N")]
    pub concurrency: Option<usize>,

    /// Seed for every random choice, for reproducible runs
    #[arg(long)]
    pub seed: Option<u64>,

    /// Don't record episodes in the episode store
    #[arg(long)]
    pub no_store: bool,
}

/// Keychain actions
#[derive(Subcommand, Debug)]
pub enum SecretAction {
    /// Store a secret (prompted without echo)
    Set {
        /// Secret name (defaults to llm.api_key_env)
        key: Option<String>,
    },

    /// Remove a stored secret
    Delete {
        /// Secret name (defaults to llm.api_key_env)
        key: Option<String>,
    },

    /// Show where the secret would be resolved from
    Status {
        /// Secret name (defaults to llm.api_key_env)
        key: Option<String>,
    },
}

/// Configuration actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show the effective configuration
    Show,

    /// Validate a configuration file
    Validate,
}
