//! Agent Loop
//!
//! Drives one episode against one game adapter:
//!
//! 1. Query valid actions (skipped for policies that don't use them)
//! 2. Obtain an action through the guarded policy (timeout, retry, fallback)
//! 3. Append the action to the bounded memory
//! 4. Step the game
//! 5. Append observation and reward to the memory and the step log
//! 6. Advance the step counter
//!
//! # States
//!
//! `Ready -> Running -> {Done, StepLimitReached, Failed}`. Every terminal
//! state keeps the records gathered so far, and accessors keep returning the
//! same values after termination.

use sdk::errors::EngineError;
use sdk::GameEnvironment;
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use super::episode::{EpisodeLog, EpisodeState, EpisodeSummary, TerminationReason};
use super::WorkingMemory;
use crate::config::AgentConfig;
use crate::llm::Message;
use crate::policy::{DecisionPolicy, GuardedPolicy, PolicyContext, PolicyError};

/// Orchestrates one episode
pub struct AgentLoop {
    env: Box<dyn GameEnvironment>,
    policy: GuardedPolicy,
    config: AgentConfig,
    memory: WorkingMemory,
    log: Option<EpisodeLog>,
    state: EpisodeState,
    reason: Option<TerminationReason>,
    error: Option<String>,
    step: usize,
    last_info: Map<String, Value>,
}

impl AgentLoop {
    /// Create a loop in the `Ready` state
    ///
    /// # Errors
    /// Returns `EngineError::Config` if `config` is invalid.
    pub fn new(
        env: Box<dyn GameEnvironment>,
        policy: Box<dyn DecisionPolicy>,
        config: AgentConfig,
    ) -> Result<Self, EngineError> {
        config.validate()?;

        let mut memory = WorkingMemory::with_capacity(config.max_chat_history_size);
        if let Some(prompt) = policy.system_prompt() {
            memory.append(Message::system(prompt));
        }

        Ok(Self {
            env,
            policy: GuardedPolicy::new(policy, &config),
            config,
            memory,
            log: None,
            state: EpisodeState::Ready,
            reason: None,
            error: None,
            step: 0,
            last_info: Map::new(),
        })
    }

    /// Seed the random fallback so runs are reproducible
    pub fn with_fallback_seed(mut self, seed: u64) -> Self {
        self.policy = self.policy.with_fallback_seed(seed);
        self
    }

    /// Run the episode to a terminal state
    ///
    /// Failures of the game or the policy end the episode and are reported
    /// through the summary, not as an `Err`.
    ///
    /// # Errors
    /// Returns `EngineError::InvalidState` if the loop has already run.
    pub async fn run(&mut self) -> Result<EpisodeSummary, EngineError> {
        if self.state != EpisodeState::Ready {
            return Err(EngineError::InvalidState(format!(
                "run() called on an episode in state {}",
                self.state
            )));
        }
        self.state = EpisodeState::Running;

        let initial = match self.env.reset().await {
            Ok(observation) => observation,
            Err(e) => {
                self.fail(TerminationReason::EnvironmentError, e.to_string());
                return Ok(self.summary());
            }
        };

        info!(
            "Episode started with {} policy (max_steps={})",
            self.policy.primary().name(),
            self.config.max_steps
        );
        self.memory
            .append(Message::user(format!("Step 0: Observation: {}", initial)));
        self.log = Some(EpisodeLog::new(initial));

        while self.step < self.config.max_steps {
            if let Some(reason) = self.tick().await {
                self.reason = Some(reason);
                self.state = reason.state();
                break;
            }
        }

        if self.state == EpisodeState::Running {
            self.reason = Some(TerminationReason::StepLimit);
            self.state = EpisodeState::StepLimitReached;
        }

        match self.state {
            EpisodeState::Failed => error!(
                "Episode failed after {} steps: {}",
                self.step,
                self.error.as_deref().unwrap_or("unknown error")
            ),
            _ => info!(
                "Episode finished: {} ({}) after {} steps, reward {}",
                self.state,
                self.reason.map(|r| r.as_str()).unwrap_or("-"),
                self.step,
                self.total_reward()
            ),
        }

        Ok(self.summary())
    }

    /// One iteration; `Some(reason)` when the episode must stop
    async fn tick(&mut self) -> Option<TerminationReason> {
        let valid_actions = if self.policy.primary().needs_valid_actions() {
            match self.env.valid_actions().await {
                Ok(actions) => actions,
                Err(e) => {
                    self.error = Some(e.to_string());
                    return Some(TerminationReason::EnvironmentError);
                }
            }
        } else {
            Vec::new()
        };

        let observation = self
            .log
            .as_ref()
            .map(|log| log.last_observation().to_string())
            .unwrap_or_default();

        let ctx = PolicyContext {
            step: self.step,
            observation: &observation,
            valid_actions: &valid_actions,
            history: &self.memory,
        };

        let decision = match self.policy.decide(&ctx).await {
            Ok(decision) => decision,
            Err(PolicyError::ExhaustedScript) => {
                debug!("Walkthrough exhausted at step {}", self.step);
                return Some(TerminationReason::ScriptExhausted);
            }
            Err(PolicyError::NoValidActions) => {
                self.error = Some(PolicyError::NoValidActions.to_string());
                return Some(TerminationReason::NoValidActions);
            }
            Err(e) => {
                self.error = Some(e.to_string());
                return Some(TerminationReason::PolicyFailure);
            }
        };

        let next = self.step + 1;
        self.memory.append(Message::assistant(format!(
            "Step {}: Action: {}",
            next, decision.action
        )));

        let outcome = match self.env.step(&decision.action).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Game rejected step {} ({}): {}", next, decision.action, e);
                self.error = Some(e.to_string());
                return Some(TerminationReason::EnvironmentError);
            }
        };

        debug!(
            step = next,
            action = %decision.action,
            reward = outcome.reward,
            fallback = decision.is_fallback(),
            "Step taken"
        );

        self.memory.append(Message::user(format!(
            "Step {}: Reward: {}\nObservation: {}",
            next, outcome.reward, outcome.observation
        )));
        let fallback = decision.is_fallback();
        if let Some(log) = self.log.as_mut() {
            log.record(decision.action, outcome.observation, outcome.reward, fallback);
        }
        self.last_info = outcome.info;
        self.step = next;

        outcome.done.then_some(TerminationReason::GameOver)
    }

    fn fail(&mut self, reason: TerminationReason, message: String) {
        self.error = Some(message);
        self.reason = Some(reason);
        self.state = reason.state();
    }

    /// Close the game adapter
    pub async fn close(&mut self) -> Result<(), EngineError> {
        self.env.close().await
    }

    pub fn summary(&self) -> EpisodeSummary {
        EpisodeSummary {
            state: self.state,
            reason: self.reason,
            steps: self.step,
            total_reward: self.total_reward(),
            fallback_steps: self.fallback_steps(),
            error: self.error.clone(),
        }
    }

    pub fn state(&self) -> EpisodeState {
        self.state
    }

    pub fn reason(&self) -> Option<TerminationReason> {
        self.reason
    }

    /// Number of actions taken
    pub fn steps(&self) -> usize {
        self.step
    }

    pub fn is_done(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn observations(&self) -> &[String] {
        self.log.as_ref().map(EpisodeLog::observations).unwrap_or(&[])
    }

    pub fn actions(&self) -> &[String] {
        self.log.as_ref().map(EpisodeLog::actions).unwrap_or(&[])
    }

    pub fn rewards(&self) -> &[i64] {
        self.log.as_ref().map(EpisodeLog::rewards).unwrap_or(&[])
    }

    pub fn log(&self) -> Option<&EpisodeLog> {
        self.log.as_ref()
    }

    /// Give up the loop and keep its trajectory
    pub fn into_log(self) -> Option<EpisodeLog> {
        self.log
    }

    pub fn total_reward(&self) -> i64 {
        self.log.as_ref().map(EpisodeLog::total_reward).unwrap_or(0)
    }

    pub fn fallback_steps(&self) -> usize {
        self.log.as_ref().map(EpisodeLog::fallback_steps).unwrap_or(0)
    }

    /// Info map from the most recent step
    pub fn last_info(&self) -> &Map<String, Value> {
        &self.last_info
    }

    pub fn memory(&self) -> &WorkingMemory {
        &self.memory
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn policy_name(&self) -> &str {
        self.policy.primary().name()
    }
}
