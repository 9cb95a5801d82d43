//! Game environment trait
//!
//! This module defines the `GameEnvironment` trait that every game adapter
//! implements. The engine never looks inside the interpreter: the adapter is
//! authoritative for which actions are legal and for when the game is over.

use async_trait::async_trait;

use crate::errors::EngineError;
use crate::types::StepOutcome;

/// Trait that all game adapters must implement
///
/// One value wraps exactly one running game. Calls are strictly sequential:
/// every observation depends on the state left behind by the previous step.
#[async_trait]
pub trait GameEnvironment: Send {
    /// Restart the game and return the opening text
    async fn reset(&mut self) -> Result<String, EngineError>;

    /// Apply an action and report what happened
    async fn step(&mut self, action: &str) -> Result<StepOutcome, EngineError>;

    /// Actions that are legal in the current game state
    async fn valid_actions(&mut self) -> Result<Vec<String>, EngineError>;

    /// Solved playthrough for this game, if the adapter knows one
    async fn walkthrough(&mut self) -> Result<Vec<String>, EngineError> {
        Ok(Vec::new())
    }

    /// Maximum achievable score, if known
    async fn max_score(&mut self) -> Result<Option<i64>, EngineError> {
        Ok(None)
    }

    /// Release the underlying game
    async fn close(&mut self) -> Result<(), EngineError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl GameEnvironment for Echo {
        async fn reset(&mut self) -> Result<String, EngineError> {
            Ok("Hello.".to_string())
        }

        async fn step(&mut self, action: &str) -> Result<StepOutcome, EngineError> {
            Ok(StepOutcome::new(action))
        }

        async fn valid_actions(&mut self) -> Result<Vec<String>, EngineError> {
            Ok(vec!["wait".to_string()])
        }
    }

    #[tokio::test]
    async fn test_default_methods() {
        let mut game: Box<dyn GameEnvironment> = Box::new(Echo);

        assert_eq!(game.reset().await.unwrap(), "Hello.");
        assert_eq!(game.step("wait").await.unwrap().observation, "wait");
        assert!(game.walkthrough().await.unwrap().is_empty());
        assert_eq!(game.max_score().await.unwrap(), None);
        assert!(game.close().await.is_ok());
    }
}
