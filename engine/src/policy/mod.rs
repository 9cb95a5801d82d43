//! Decision Policies
//!
//! A policy turns the current game state into the next action. Three
//! strategies ship with Lantern:
//!
//! - [`ScriptedPolicy`]: replays a solved walkthrough, one entry per call
//! - [`RandomPolicy`]: uniform choice over the valid actions
//! - [`ModelPolicy`]: asks a remote chat-completion model and matches the
//!   answer against the valid actions
//!
//! The agent loop never calls a primary policy directly. It goes through
//! [`GuardedPolicy`], which adds the per-call timeout, the single retry and
//! the random fallback.

use crate::agent::WorkingMemory;
use async_trait::async_trait;
use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod guarded;
pub mod model;
pub mod random;
pub mod scripted;

pub use guarded::GuardedPolicy;
pub use model::ModelPolicy;
pub use random::RandomPolicy;
pub use scripted::ScriptedPolicy;

/// Errors raised by a single policy invocation
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PolicyError {
    /// Nothing to choose from
    #[error("No valid actions available")]
    NoValidActions,

    /// Scripted replay has no entries left
    #[error("Walkthrough exhausted")]
    ExhaustedScript,

    /// The call exceeded its budget and was abandoned
    #[error("Policy timed out after {secs}s")]
    Timeout { secs: f64 },

    /// The model answered with something that is not a valid action
    #[error("Response did not match a valid action: {0}")]
    ParseFailure(String),

    /// Transport, authentication or malformed-response error from the model service
    #[error("Model service error: {0}")]
    Provider(String),

    /// Retry budget spent; the episode cannot continue
    #[error("Policy failed: {0}")]
    Failure(String),
}

impl PolicyError {
    /// Errors the guard may answer with a retry or a fallback
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PolicyError::Timeout { .. } | PolicyError::ParseFailure(_) | PolicyError::Provider(_)
        )
    }
}

impl From<PolicyError> for EngineError {
    fn from(err: PolicyError) -> Self {
        match err {
            PolicyError::NoValidActions => EngineError::NoValidActions,
            PolicyError::ExhaustedScript => EngineError::ExhaustedScript,
            PolicyError::Timeout { secs } => EngineError::PolicyTimeout { secs },
            PolicyError::ParseFailure(msg) => EngineError::PolicyParseFailure(msg),
            PolicyError::Provider(msg) => EngineError::LLMProvider(msg),
            PolicyError::Failure(msg) => EngineError::PolicyFailure(msg),
        }
    }
}

/// Which policy produced an action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    Primary,
    Fallback,
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provenance::Primary => write!(f, "primary"),
            Provenance::Fallback => write!(f, "fallback"),
        }
    }
}

/// The action chosen for one step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyResult {
    pub action: String,
    pub provenance: Provenance,
}

impl PolicyResult {
    pub fn primary(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            provenance: Provenance::Primary,
        }
    }

    pub fn fallback(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            provenance: Provenance::Fallback,
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.provenance == Provenance::Fallback
    }
}

/// Game state handed to a policy for one decision
#[derive(Debug, Clone, Copy)]
pub struct PolicyContext<'a> {
    /// Number of actions taken so far in the episode
    pub step: usize,

    /// Most recent observation
    pub observation: &'a str,

    /// Actions the adapter currently accepts (empty when not queried)
    pub valid_actions: &'a [String],

    /// Bounded conversation history, current observation included
    pub history: &'a WorkingMemory,
}

/// Strategy producing the next action
#[async_trait]
pub trait DecisionPolicy: Send {
    /// Short identifier recorded in results (e.g. "random")
    fn name(&self) -> &str;

    /// Whether the loop must query the adapter's valid actions before each call
    fn needs_valid_actions(&self) -> bool {
        true
    }

    /// Task instructions placed in the permanent system entry of the memory
    fn system_prompt(&self) -> Option<String> {
        None
    }

    /// Choose the next action
    ///
    /// # Errors
    /// Returns a `PolicyError`; the guard decides whether it is retried,
    /// replaced by a fallback action, or ends the episode.
    async fn choose_action(&mut self, ctx: &PolicyContext<'_>) -> Result<String, PolicyError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdk::errors::LanternErrorExt;

    #[test]
    fn test_recoverable_classification() {
        assert!(PolicyError::Timeout { secs: 1.0 }.is_recoverable());
        assert!(PolicyError::ParseFailure("xyzzy".into()).is_recoverable());
        assert!(PolicyError::Provider("503".into()).is_recoverable());

        assert!(!PolicyError::NoValidActions.is_recoverable());
        assert!(!PolicyError::ExhaustedScript.is_recoverable());
        assert!(!PolicyError::Failure("gave up".into()).is_recoverable());
    }

    #[test]
    fn test_conversion_keeps_recoverability() {
        let recoverable: EngineError = PolicyError::Timeout { secs: 2.0 }.into();
        assert!(recoverable.is_recoverable());

        let fatal: EngineError = PolicyError::Failure("gave up".into()).into();
        assert!(!fatal.is_recoverable());
        assert!(matches!(fatal, EngineError::PolicyFailure(_)));
    }

    #[test]
    fn test_policy_result_provenance() {
        assert!(!PolicyResult::primary("north").is_fallback());
        assert!(PolicyResult::fallback("north").is_fallback());
        assert_eq!(Provenance::Fallback.to_string(), "fallback");
    }
}
