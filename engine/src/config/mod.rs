//! Configuration management
//!
//! This module handles loading, validation, and management of the Lantern
//! configuration. Configuration is stored in TOML format at
//! ~/.lantern/config.toml and is created with defaults on first use.
//!
//! # Configuration Sections
//!
//! - **core**: log level, data directory (episode store)
//! - **agent**: per-episode loop limits and fallback behaviour
//! - **llm**: chat-completion endpoint and model for the model-backed policy
//! - **game**: how game adapters are launched and where game files live
//! - **batch**: results file and parallelism for batch runs
//!
//! # Examples
//!
//! ```no_run
//! use lantern_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load_or_create()?;
//!
//! println!("Max steps: {}", config.agent.max_steps);
//! println!("Model: {}", config.llm.model);
//! # Ok(())
//! # }
//! ```

use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Core settings
    #[serde(default)]
    pub core: CoreConfig,

    /// Agent loop settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// Remote model settings
    #[serde(default)]
    pub llm: LLMConfig,

    /// Game adapter settings
    #[serde(default)]
    pub game: GameConfig,

    /// Batch runner settings
    #[serde(default)]
    pub batch: BatchConfig,
}

/// Core configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Data directory path (supports ~ expansion)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

/// Agent loop configuration
///
/// These are the only options the agent loop recognises. `validate` is called
/// by the loop constructor so that bad values fail before any game starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Hard cap on actions per episode (must be positive)
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,

    /// Number of non-system turns kept in the model's context window
    #[serde(default = "default_max_chat_history_size")]
    pub max_chat_history_size: usize,

    /// Substitute a uniformly random valid action when the primary policy fails
    #[serde(default = "default_true")]
    pub fallback_to_random: bool,

    /// Budget for one primary policy call, in seconds (must be positive)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: f64,
}

/// Remote model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMConfig {
    /// Base URL of an OpenAI-compatible API
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    /// Model identifier (e.g. meta-llama/llama-3.3-70b-instruct)
    #[serde(default)]
    pub model: String,

    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Optional HTTP-Referer attribution header
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referer: Option<String>,

    /// Optional X-Title attribution header
    #[serde(default = "default_llm_title", skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    // Note: API key comes from the environment or the OS keychain, never from this file
}

/// Game adapter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameConfig {
    /// Command that serves one game over the JSON-lines bridge protocol.
    /// The game file path is appended as the last argument.
    #[serde(default)]
    pub bridge_command: Vec<String>,

    /// Directory holding the game files (supports ~ expansion)
    #[serde(default = "default_games_dir")]
    pub games_dir: PathBuf,

    /// Restrict runs to the 33-game benchmark subset
    #[serde(default)]
    pub only_33: bool,
}

/// Batch runner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Results file, rewritten after every finished game
    #[serde(default = "default_output_file")]
    pub output_file: PathBuf,

    /// Maximum number of games played at the same time
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("~/.lantern")
}

fn default_max_steps() -> usize {
    1000
}

fn default_max_chat_history_size() -> usize {
    10
}

fn default_timeout_secs() -> f64 {
    10.0
}

fn default_llm_base_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}

fn default_api_key_env() -> String {
    "OPENROUTER_API_KEY".to_string()
}

fn default_llm_title() -> Option<String> {
    Some("Lantern Agent".to_string())
}

fn default_games_dir() -> PathBuf {
    PathBuf::from("./z-machine-games-master/jericho-game-suite")
}

fn default_output_file() -> PathBuf {
    PathBuf::from("results.json")
}

fn default_concurrency() -> usize {
    1
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            data_dir: default_data_dir(),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            max_chat_history_size: default_max_chat_history_size(),
            fallback_to_random: true,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            model: String::new(),
            api_key_env: default_api_key_env(),
            referer: None,
            title: default_llm_title(),
        }
    }
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            bridge_command: Vec::new(),
            games_dir: default_games_dir(),
            only_33: false,
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            output_file: default_output_file(),
            concurrency: default_concurrency(),
        }
    }
}

impl AgentConfig {
    /// Reject values the agent loop cannot honour
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Config` if `max_steps` is zero or `timeout_secs`
    /// is not a positive, finite number.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.max_steps == 0 {
            return Err(EngineError::Config(
                "max_steps must be a positive integer".to_string(),
            ));
        }

        if self.timeout_secs <= 0.0 || Duration::try_from_secs_f64(self.timeout_secs).is_err() {
            return Err(EngineError::Config(format!(
                "timeout must be a positive number of seconds, got {}",
                self.timeout_secs
            )));
        }

        Ok(())
    }

    /// Per-call policy budget
    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout_secs)
    }
}

const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

fn config_err(what: &str, e: impl std::fmt::Display) -> EngineError {
    EngineError::Config(format!("{}: {}", what, e))
}

fn home() -> Result<PathBuf, EngineError> {
    dirs::home_dir().ok_or_else(|| EngineError::Config("No home directory for ~".to_string()))
}

impl Config {
    /// Read `~/.lantern/config.toml`, writing the defaults there on first run
    pub fn load_or_create() -> Result<Self, EngineError> {
        let path = home()?.join(".lantern").join("config.toml");

        if path.exists() {
            Self::load_from_path(&path)
        } else {
            Self::write_default(&path)
        }
    }

    pub fn load_from_path(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| config_err(&format!("Cannot read {}", path.display()), e))?;

        Self::from_toml_str(&contents)
    }

    /// Parse, validate and resolve paths
    pub fn from_toml_str(contents: &str) -> Result<Self, EngineError> {
        let mut config: Config =
            toml::from_str(contents).map_err(|e| config_err("Malformed config", e))?;
        config.finish()?;
        Ok(config)
    }

    fn write_default(path: &Path) -> Result<Self, EngineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| config_err(&format!("Cannot create {}", parent.display()), e))?;
        }

        let mut config = Self::default();

        // Written before `finish` so the file keeps `~` paths
        let text = toml::to_string_pretty(&config)
            .map_err(|e| config_err("Cannot render default config", e))?;
        config.finish()?;
        fs::write(path, text)
            .map_err(|e| config_err(&format!("Cannot write {}", path.display()), e))?;

        tracing::info!("Wrote default configuration to {}", path.display());
        Ok(config)
    }

    /// Location of the episode store
    pub fn database_path(&self) -> PathBuf {
        self.core.data_dir.join("lantern.db")
    }

    fn finish(&mut self) -> Result<(), EngineError> {
        if !LOG_LEVELS.contains(&self.core.log_level.as_str()) {
            return Err(EngineError::Config(format!(
                "log_level '{}' is not one of {}",
                self.core.log_level,
                LOG_LEVELS.join("/")
            )));
        }

        self.agent.validate()?;

        if self.batch.concurrency == 0 {
            return Err(EngineError::Config(
                "batch.concurrency must be at least 1".to_string(),
            ));
        }

        if self.llm.api_key_env.trim().is_empty() {
            return Err(EngineError::Config(
                "llm.api_key_env must name an environment variable".to_string(),
            ));
        }

        self.game.games_dir = expand_path(&self.game.games_dir)?;
        self.core.data_dir = expand_path(&self.core.data_dir)?;

        fs::create_dir_all(&self.core.data_dir).map_err(|e| {
            config_err(&format!("Cannot create {}", self.core.data_dir.display()), e)
        })?;

        Ok(())
    }
}

/// Resolve a leading `~` against the home directory
pub fn expand_path(path: &Path) -> Result<PathBuf, EngineError> {
    match path.strip_prefix("~") {
        Ok(rest) => Ok(home()?.join(rest)),
        Err(_) => Ok(path.to_path_buf()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = Config::default();

        assert_eq!(config.core.log_level, "info");
        assert_eq!(config.agent.max_steps, 1000);
        assert_eq!(config.agent.max_chat_history_size, 10);
        assert!(config.agent.fallback_to_random);
        assert_eq!(config.agent.timeout_secs, 10.0);
        assert_eq!(config.llm.api_key_env, "OPENROUTER_API_KEY");
        assert_eq!(config.batch.concurrency, 1);
    }

    #[test]
    fn test_agent_validate_rejects_zero_steps() {
        let agent = AgentConfig {
            max_steps: 0,
            ..AgentConfig::default()
        };
        assert!(matches!(agent.validate(), Err(EngineError::Config(_))));
    }

    #[test]
    fn test_agent_validate_rejects_bad_timeout() {
        for timeout_secs in [0.0, -1.0, f64::NAN, f64::INFINITY, 1e20] {
            let agent = AgentConfig {
                timeout_secs,
                ..AgentConfig::default()
            };
            assert!(agent.validate().is_err(), "accepted timeout {}", timeout_secs);
        }
    }

    #[test]
    fn test_agent_timeout_duration() {
        let agent = AgentConfig {
            timeout_secs: 0.25,
            ..AgentConfig::default()
        };
        assert_eq!(agent.timeout(), Duration::from_millis(250));
    }

    #[test]
    fn test_zero_history_is_allowed() {
        let agent = AgentConfig {
            max_chat_history_size: 0,
            ..AgentConfig::default()
        };
        assert!(agent.validate().is_ok());
    }

    #[test]
    fn test_expand_path_forms() {
        let home = dirs::home_dir().unwrap();

        assert_eq!(expand_path(Path::new("~")).unwrap(), home);
        assert_eq!(
            expand_path(Path::new("~/games/zork1.z5")).unwrap(),
            home.join("games/zork1.z5")
        );
        assert_eq!(
            expand_path(Path::new("/srv/games")).unwrap(),
            PathBuf::from("/srv/games")
        );
        // Only a whole leading component counts
        assert_eq!(
            expand_path(Path::new("~games")).unwrap(),
            PathBuf::from("~games")
        );
    }

    #[test]
    fn test_unknown_log_level_rejected() {
        let err = Config::from_toml_str("[core]\nlog_level = \"loud\"\n").unwrap_err();
        assert!(err.to_string().contains("loud"));
    }

    #[test]
    fn test_database_lives_in_data_dir() {
        let mut config = Config::default();
        config.core.data_dir = PathBuf::from("/var/lib/lantern");
        assert_eq!(
            config.database_path(),
            PathBuf::from("/var/lib/lantern/lantern.db")
        );
    }
}
