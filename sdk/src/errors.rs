//! Errors shared by the engine and game adapters
//!
//! Every variant maps to a short operator hint and a recoverability flag via
//! [`LanternErrorExt`]. Messages must never carry credentials; text from a
//! remote service is scrubbed by the engine before it is wrapped here.

use thiserror::Error;

/// Operator-facing metadata for an error
pub trait LanternErrorExt {
    /// Static advice for the operator; never echoes the wrapped detail
    fn user_hint(&self) -> &str;

    /// Recoverable errors are handled inside a single agent step (retry or
    /// fallback). Non-recoverable errors end the current episode.
    fn is_recoverable(&self) -> bool;
}

/// Everything that can go wrong while playing or recording an episode
///
/// - **Configuration**: invalid or missing configuration
/// - **Game**: adapter failures (bridge process, protocol, engine errors)
/// - **Policy**: the decision-policy taxonomy (no valid actions, exhausted
///   script, timeout, parse failure, exhausted retries/fallback)
/// - **Persistence**: results file and episode store failures
///
/// # Examples
///
/// ```
/// use sdk::errors::{EngineError, LanternErrorExt};
///
/// let timeout = EngineError::PolicyTimeout { secs: 10.0 };
/// assert!(timeout.is_recoverable());
///
/// let fatal = EngineError::PolicyFailure("model returned garbage twice".into());
/// assert!(!fatal.is_recoverable());
/// println!("Hint: {}", fatal.user_hint());
/// ```
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(String),

    // Game adapter errors
    #[error("Game error: {0}")]
    Game(String),

    #[error("Game bridge error: {0}")]
    Bridge(String),

    // Policy errors
    #[error("No valid actions available")]
    NoValidActions,

    #[error("Scripted walkthrough exhausted")]
    ExhaustedScript,

    #[error("Policy timed out after {secs}s")]
    PolicyTimeout { secs: f64 },

    #[error("Policy response did not match a valid action: {0}")]
    PolicyParseFailure(String),

    #[error("Policy failure: {0}")]
    PolicyFailure(String),

    // Agent loop errors
    #[error("Invalid episode state: {0}")]
    InvalidState(String),

    #[error("LLM provider error: {0}")]
    LLMProvider(String),

    // Persistence errors
    #[error("Database error: {0}")]
    Database(String),

    #[error("Results file error: {0}")]
    Results(String),

    // Keyring errors
    #[error("Keyring error: {0}")]
    KeyringError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LanternErrorExt for EngineError {
    fn user_hint(&self) -> &str {
        match self {
            Self::Config(_) => "Fix the offending value in ~/.lantern/config.toml",

            Self::Game(_) => "The game adapter reported an error. Check the game file",
            Self::Bridge(_) => "The game bridge process failed. Check bridge_command",

            Self::NoValidActions => "The game offered no legal moves",
            Self::ExhaustedScript => "The walkthrough has no steps left",
            Self::PolicyTimeout { .. } => "The model took too long to answer. Raise the timeout",
            Self::PolicyParseFailure(_) => "The model did not answer with a valid action",
            Self::PolicyFailure(_) => {
                "The decision policy failed. Enable fallback_to_random to keep playing"
            }

            Self::InvalidState(_) => "An episode can only be run once",

            Self::LLMProvider(_) => "LLM provider unavailable. Check your API key and network",

            Self::Database(_) => "Episode store operation failed",
            Self::Results(_) => "Could not read or write the results file",

            Self::KeyringError(_) => "Keychain unavailable. Export the API key variable instead",
            Self::Io(_) => "A local file could not be read or written",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            // Handled inside a single step by retry or fallback
            Self::PolicyTimeout { .. }
            | Self::PolicyParseFailure(_)
            | Self::LLMProvider(_) => true,

            _ => false,
        }
    }
}
