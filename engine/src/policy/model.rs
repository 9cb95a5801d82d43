//! Model-backed action selection
//!
//! Sends the bounded history plus a final prompt listing the valid actions to
//! an [`LLMProvider`]. The trimmed reply must equal one valid action, ignoring
//! case; anything else is a parse failure and is left to the guard.

use super::{DecisionPolicy, PolicyContext, PolicyError};
use crate::llm::{LLMProvider, Message};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

const DEFAULT_SYSTEM_PROMPT: &str = "You are playing a text adventure game. \
Each turn you see the latest game text and a list of valid actions. \
Reply with exactly one action from the list and nothing else.";

pub struct ModelPolicy {
    provider: Arc<dyn LLMProvider>,
    system_prompt: String,
}

impl ModelPolicy {
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self {
            provider,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    fn action_prompt(observation: &str, valid_actions: &[String]) -> String {
        format!(
            "Current observation: {}\nValid actions: {}\nWhich action do you take?",
            observation,
            valid_actions.join(", ")
        )
    }
}

/// Map a raw reply onto the canonical spelling of a valid action
pub fn match_action(response: &str, valid_actions: &[String]) -> Option<String> {
    let wanted = response.trim().to_lowercase();
    valid_actions
        .iter()
        .find(|action| action.trim().to_lowercase() == wanted)
        .cloned()
}

#[async_trait]
impl DecisionPolicy for ModelPolicy {
    fn name(&self) -> &str {
        "llm"
    }

    fn system_prompt(&self) -> Option<String> {
        Some(self.system_prompt.clone())
    }

    async fn choose_action(&mut self, ctx: &PolicyContext<'_>) -> Result<String, PolicyError> {
        if ctx.valid_actions.is_empty() {
            return Err(PolicyError::NoValidActions);
        }

        let mut messages = ctx.history.render();
        if !messages.first().is_some_and(Message::is_system) {
            messages.insert(0, Message::system(&self.system_prompt));
        }
        messages.push(Message::user(Self::action_prompt(
            ctx.observation,
            ctx.valid_actions,
        )));

        let reply = self
            .provider
            .generate(&messages)
            .await
            .map_err(|e| PolicyError::Provider(e.to_string()))?;

        debug!(
            "Model {} replied at step {}: {:?}",
            self.provider.model(),
            ctx.step,
            reply.trim()
        );

        match_action(&reply, ctx.valid_actions)
            .ok_or_else(|| PolicyError::ParseFailure(reply.trim().to_string()))
    }
}
