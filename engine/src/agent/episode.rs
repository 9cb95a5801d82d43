//! Episode state and the per-episode step log

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of one episode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpisodeState {
    Ready,
    Running,
    Done,
    StepLimitReached,
    Failed,
}

impl EpisodeState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EpisodeState::Done | EpisodeState::StepLimitReached | EpisodeState::Failed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EpisodeState::Ready => "ready",
            EpisodeState::Running => "running",
            EpisodeState::Done => "done",
            EpisodeState::StepLimitReached => "step_limit_reached",
            EpisodeState::Failed => "failed",
        }
    }
}

impl fmt::Display for EpisodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a terminal state was entered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// The adapter reported `done`
    GameOver,
    /// The walkthrough ran out of entries
    ScriptExhausted,
    /// `max_steps` actions were taken
    StepLimit,
    NoValidActions,
    PolicyFailure,
    /// The adapter itself failed (reset, step, or valid-action query)
    EnvironmentError,
}

impl TerminationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminationReason::GameOver => "game_over",
            TerminationReason::ScriptExhausted => "script_exhausted",
            TerminationReason::StepLimit => "step_limit",
            TerminationReason::NoValidActions => "no_valid_actions",
            TerminationReason::PolicyFailure => "policy_failure",
            TerminationReason::EnvironmentError => "environment_error",
        }
    }

    /// Terminal state this reason leads to
    pub fn state(&self) -> EpisodeState {
        match self {
            TerminationReason::GameOver | TerminationReason::ScriptExhausted => EpisodeState::Done,
            TerminationReason::StepLimit => EpisodeState::StepLimitReached,
            TerminationReason::NoValidActions
            | TerminationReason::PolicyFailure
            | TerminationReason::EnvironmentError => EpisodeState::Failed,
        }
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only record of one episode.
///
/// Created with the initial observation; every later write adds an action,
/// its reward and the resulting observation together, so
/// `observations.len() == actions.len() + 1 == rewards.len() + 1` always holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeLog {
    observations: Vec<String>,
    actions: Vec<String>,
    rewards: Vec<i64>,
    fallback: Vec<bool>,
}

impl EpisodeLog {
    pub fn new(initial_observation: impl Into<String>) -> Self {
        Self {
            observations: vec![initial_observation.into()],
            actions: Vec::new(),
            rewards: Vec::new(),
            fallback: Vec::new(),
        }
    }

    pub fn record(
        &mut self,
        action: impl Into<String>,
        observation: impl Into<String>,
        reward: i64,
        fallback: bool,
    ) {
        self.actions.push(action.into());
        self.rewards.push(reward);
        self.fallback.push(fallback);
        self.observations.push(observation.into());
    }

    pub fn observations(&self) -> &[String] {
        &self.observations
    }

    pub fn actions(&self) -> &[String] {
        &self.actions
    }

    pub fn rewards(&self) -> &[i64] {
        &self.rewards
    }

    /// Per-step flag: action came from the random fallback
    pub fn fallback_flags(&self) -> &[bool] {
        &self.fallback
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn total_reward(&self) -> i64 {
        self.rewards.iter().sum()
    }

    pub fn fallback_steps(&self) -> usize {
        self.fallback.iter().filter(|f| **f).count()
    }

    pub fn last_observation(&self) -> &str {
        self.observations.last().map(String::as_str).unwrap_or_default()
    }

    /// Iterate `(step_index, action, observation_after, reward, fallback)`,
    /// step indices starting at 1
    pub fn steps(&self) -> impl Iterator<Item = (usize, &str, &str, i64, bool)> + '_ {
        self.actions
            .iter()
            .zip(self.observations.iter().skip(1))
            .zip(self.rewards.iter().zip(self.fallback.iter()))
            .enumerate()
            .map(|(i, ((action, obs), (reward, fallback)))| {
                (i + 1, action.as_str(), obs.as_str(), *reward, *fallback)
            })
    }
}

/// Snapshot of a finished episode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeSummary {
    pub state: EpisodeState,
    pub reason: Option<TerminationReason>,
    pub steps: usize,
    pub total_reward: i64,
    pub fallback_steps: usize,
    pub error: Option<String>,
}
