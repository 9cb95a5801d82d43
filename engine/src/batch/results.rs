//! Results file
//!
//! A JSON object mapping game identifier to its result record. Only `steps`
//! is required when loading, so files written by older tools still load.

use crate::agent::{EpisodeState, TerminationReason};
use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

/// Record for one game
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameResult {
    #[serde(default)]
    pub agent: String,

    #[serde(default)]
    pub game_path: String,

    #[serde(default)]
    pub max_steps: usize,

    /// Final step counter
    pub steps: usize,

    #[serde(default)]
    pub num_observations: usize,

    #[serde(default)]
    pub num_actions: usize,

    #[serde(default)]
    pub num_rewards: usize,

    #[serde(default)]
    pub total_reward: i64,

    #[serde(default)]
    pub max_score: Option<i64>,

    #[serde(default)]
    pub walkthrough_len: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<EpisodeState>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<TerminationReason>,

    #[serde(default)]
    pub fallback_steps: usize,

    /// Adapter info map from the last step
    #[serde(default)]
    pub info: Map<String, Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Row id in the episode store, when one was written
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episode_id: Option<String>,
}

impl GameResult {
    pub fn is_solved(&self) -> bool {
        self.outcome == Some(EpisodeState::Done)
    }
}

/// Aggregates over a results file
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultsTotals {
    pub games: usize,
    pub total_steps: usize,
    pub mean_steps: f64,
    pub total_reward: i64,
    pub done: usize,
    pub step_limit_reached: usize,
    pub failed: usize,
}

/// Game identifier -> result, ordered by identifier
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultsSummary {
    games: BTreeMap<String, GameResult>,
}

impl ResultsSummary {
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    /// Returns `EngineError::Results` if the file is unreadable or not a
    /// results mapping.
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            EngineError::Results(format!("Failed to read {}: {}", path.display(), e))
        })?;

        serde_json::from_str(&contents).map_err(|e| {
            EngineError::Results(format!("Failed to parse {}: {}", path.display(), e))
        })
    }

    /// Write pretty JSON through a temporary file so readers never see a
    /// half-written results file
    pub fn save(&self, path: &Path) -> Result<(), EngineError> {
        let json = serde_json::to_string_pretty(&self.games)
            .map_err(|e| EngineError::Results(format!("Failed to serialize results: {}", e)))?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        std::fs::write(&tmp, json).map_err(|e| {
            EngineError::Results(format!("Failed to write {}: {}", path.display(), e))
        })?;
        std::fs::rename(&tmp, path).map_err(|e| {
            EngineError::Results(format!("Failed to write {}: {}", path.display(), e))
        })?;

        Ok(())
    }

    pub fn insert(&mut self, game: impl Into<String>, result: GameResult) {
        self.games.insert(game.into(), result);
    }

    pub fn get(&self, game: &str) -> Option<&GameResult> {
        self.games.get(game)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &GameResult)> {
        self.games.iter()
    }

    pub fn len(&self) -> usize {
        self.games.len()
    }

    pub fn is_empty(&self) -> bool {
        self.games.is_empty()
    }

    pub fn totals(&self) -> ResultsTotals {
        let mut totals = ResultsTotals {
            games: self.games.len(),
            ..ResultsTotals::default()
        };

        for result in self.games.values() {
            totals.total_steps += result.steps;
            totals.total_reward += result.total_reward;
            match result.outcome {
                Some(EpisodeState::Done) => totals.done += 1,
                Some(EpisodeState::StepLimitReached) => totals.step_limit_reached += 1,
                Some(EpisodeState::Failed) => totals.failed += 1,
                _ => {}
            }
        }

        if totals.games > 0 {
            totals.mean_steps = totals.total_steps as f64 / totals.games as f64;
        }

        totals
    }
}
