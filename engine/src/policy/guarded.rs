//! Timeout, retry and fallback around a primary policy
//!
//! Every primary call runs under `tokio::time::timeout`. When the budget runs
//! out the call's future is dropped, so an in-flight model request is
//! abandoned and its late reply can never reach the episode.
//!
//! On a recoverable failure (timeout, parse failure, provider error):
//! - with a fallback, a uniformly random valid action is used for this step
//! - without one, the primary gets exactly one more attempt; a second
//!   recoverable failure becomes `PolicyError::Failure`
//!
//! `NoValidActions` and `ExhaustedScript` are passed through untouched.

use super::{DecisionPolicy, PolicyContext, PolicyError, PolicyResult, RandomPolicy};
use crate::config::AgentConfig;
use std::time::Duration;
use tokio::time::timeout;
use tracing::warn;

pub struct GuardedPolicy {
    primary: Box<dyn DecisionPolicy>,
    fallback: Option<RandomPolicy>,
    budget: Duration,
}

impl GuardedPolicy {
    /// Wrap `primary` using the timeout and fallback settings of `config`
    pub fn new(primary: Box<dyn DecisionPolicy>, config: &AgentConfig) -> Self {
        Self {
            primary,
            fallback: config.fallback_to_random.then(RandomPolicy::new),
            budget: config.timeout(),
        }
    }

    /// Replace the fallback with a seeded one; no effect when fallback is off
    pub fn with_fallback_seed(mut self, seed: u64) -> Self {
        if self.fallback.is_some() {
            self.fallback = Some(RandomPolicy::seeded(seed));
        }
        self
    }

    pub fn primary(&self) -> &dyn DecisionPolicy {
        self.primary.as_ref()
    }

    pub fn has_fallback(&self) -> bool {
        self.fallback.is_some()
    }

    async fn attempt(&mut self, ctx: &PolicyContext<'_>) -> Result<String, PolicyError> {
        match timeout(self.budget, self.primary.choose_action(ctx)).await {
            Ok(result) => result,
            Err(_) => Err(PolicyError::Timeout {
                secs: self.budget.as_secs_f64(),
            }),
        }
    }

    /// Obtain the action for one step
    ///
    /// # Errors
    /// `NoValidActions`, `ExhaustedScript`, or `Failure` once the retry
    /// budget is spent.
    pub async fn decide(&mut self, ctx: &PolicyContext<'_>) -> Result<PolicyResult, PolicyError> {
        let first = match self.attempt(ctx).await {
            Ok(action) => return Ok(PolicyResult::primary(action)),
            Err(e) if !e.is_recoverable() => return Err(e),
            Err(e) => e,
        };

        if let Some(fallback) = self.fallback.as_mut() {
            warn!(
                "{} policy failed at step {} ({}), using random fallback",
                self.primary.name(),
                ctx.step,
                first
            );
            let action = fallback.pick(ctx.valid_actions)?;
            return Ok(PolicyResult::fallback(action));
        }

        warn!(
            "{} policy failed at step {} ({}), retrying once",
            self.primary.name(),
            ctx.step,
            first
        );

        match self.attempt(ctx).await {
            Ok(action) => Ok(PolicyResult::primary(action)),
            Err(e) if e.is_recoverable() => Err(PolicyError::Failure(format!(
                "{} policy failed twice at step {}: {}; then {}",
                self.primary.name(),
                ctx.step,
                first,
                e
            ))),
            Err(e) => Err(e),
        }
    }
}
