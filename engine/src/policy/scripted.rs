//! Walkthrough replay
//!
//! Returns the entries of a solved playthrough in order. The adapter is
//! authoritative for legality, so valid actions are never queried and the
//! script is replayed verbatim.

use super::{DecisionPolicy, PolicyContext, PolicyError};
use async_trait::async_trait;
use std::collections::VecDeque;

pub struct ScriptedPolicy {
    remaining: VecDeque<String>,
    total: usize,
}

impl ScriptedPolicy {
    pub fn new(script: impl IntoIterator<Item = String>) -> Self {
        let remaining: VecDeque<String> = script.into_iter().collect();
        let total = remaining.len();
        Self { remaining, total }
    }

    /// Length of the original script
    pub fn len(&self) -> usize {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Entries not yet replayed
    pub fn remaining(&self) -> usize {
        self.remaining.len()
    }
}

#[async_trait]
impl DecisionPolicy for ScriptedPolicy {
    fn name(&self) -> &str {
        "walkthrough"
    }

    fn needs_valid_actions(&self) -> bool {
        false
    }

    async fn choose_action(&mut self, _ctx: &PolicyContext<'_>) -> Result<String, PolicyError> {
        self.remaining.pop_front().ok_or(PolicyError::ExhaustedScript)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::WorkingMemory;

    #[tokio::test]
    async fn test_replays_in_order_then_exhausts() {
        let mut policy = ScriptedPolicy::new(vec!["north".to_string(), "take lamp".to_string()]);
        let memory = WorkingMemory::with_capacity(4);
        let ctx = PolicyContext {
            step: 0,
            observation: "Forest",
            valid_actions: &[],
            history: &memory,
        };

        assert_eq!(policy.len(), 2);
        assert_eq!(policy.choose_action(&ctx).await.unwrap(), "north");
        assert_eq!(policy.choose_action(&ctx).await.unwrap(), "take lamp");
        assert_eq!(policy.remaining(), 0);
        assert_eq!(
            policy.choose_action(&ctx).await,
            Err(PolicyError::ExhaustedScript)
        );
    }

    #[tokio::test]
    async fn test_empty_script_exhausts_immediately() {
        let mut policy = ScriptedPolicy::new(Vec::new());
        let memory = WorkingMemory::with_capacity(1);
        let ctx = PolicyContext {
            step: 0,
            observation: "",
            valid_actions: &[],
            history: &memory,
        };

        assert!(policy.is_empty());
        assert!(!policy.needs_valid_actions());
        assert_eq!(
            policy.choose_action(&ctx).await,
            Err(PolicyError::ExhaustedScript)
        );
    }
}
