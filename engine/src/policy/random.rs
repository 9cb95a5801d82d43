//! Uniform random choice over the valid actions
//!
//! Used as an agent on its own and as the fallback inside [`GuardedPolicy`].
//!
//! [`GuardedPolicy`]: super::GuardedPolicy

use super::{DecisionPolicy, PolicyContext, PolicyError};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

fn build_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

pub struct RandomPolicy {
    rng: StdRng,
    seed: Option<u64>,
}

impl RandomPolicy {
    pub fn new() -> Self {
        Self {
            rng: build_rng(None),
            seed: None,
        }
    }

    /// Deterministic sequence of choices for a given seed
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: build_rng(Some(seed)),
            seed: Some(seed),
        }
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    /// Pick one action uniformly
    pub fn pick(&mut self, valid_actions: &[String]) -> Result<String, PolicyError> {
        valid_actions
            .choose(&mut self.rng)
            .cloned()
            .ok_or(PolicyError::NoValidActions)
    }
}

impl Default for RandomPolicy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DecisionPolicy for RandomPolicy {
    fn name(&self) -> &str {
        "random"
    }

    async fn choose_action(&mut self, ctx: &PolicyContext<'_>) -> Result<String, PolicyError> {
        self.pick(ctx.valid_actions)
    }
}
