//! Game step types

use serde::{Deserialize, Serialize};

/// Result of applying one action to a game
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    /// Text the game printed in response to the action
    pub observation: String,

    /// Score change caused by the action
    #[serde(default)]
    pub reward: i64,

    /// Whether the game has ended
    #[serde(default)]
    pub done: bool,

    /// Adapter-specific diagnostics (e.g. `{"moves": 3, "score": 10}`)
    #[serde(default)]
    pub info: serde_json::Map<String, serde_json::Value>,
}

impl StepOutcome {
    /// Create a non-terminal outcome with no reward and empty info
    pub fn new(observation: impl Into<String>) -> Self {
        Self {
            observation: observation.into(),
            reward: 0,
            done: false,
            info: serde_json::Map::new(),
        }
    }

    /// Set the reward
    pub fn with_reward(mut self, reward: i64) -> Self {
        self.reward = reward;
        self
    }

    /// Mark the outcome as terminal
    pub fn finished(mut self) -> Self {
        self.done = true;
        self
    }

    /// Add an info entry
    pub fn with_info(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.info.insert(key.into(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builder() {
        let outcome = StepOutcome::new("You win.")
            .with_reward(5)
            .finished()
            .with_info("moves", json!(12));

        assert_eq!(outcome.observation, "You win.");
        assert_eq!(outcome.reward, 5);
        assert!(outcome.done);
        assert_eq!(outcome.info.get("moves"), Some(&json!(12)));
    }

    #[test]
    fn test_missing_fields_default() {
        let outcome: StepOutcome = serde_json::from_str(r#"{"observation": "Dark."}"#).unwrap();
        assert_eq!(outcome.reward, 0);
        assert!(!outcome.done);
        assert!(outcome.info.is_empty());
    }
}
