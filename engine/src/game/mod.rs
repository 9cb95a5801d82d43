//! Game adapters
//!
//! The agent loop only sees `sdk::GameEnvironment`. This module supplies the
//! production adapter (an external bridge process) and the catalogue of game
//! files a batch run iterates over.

use async_trait::async_trait;
use sdk::errors::EngineError;
use sdk::GameEnvironment;
use std::path::Path;

pub mod bridge;
pub mod catalog;

pub use bridge::BridgeGame;
pub use catalog::{discover_games, game_name, GameEntry, BENCHMARK_33};

use crate::config::GameConfig;

/// Builds a fresh adapter for a game file
#[async_trait]
pub trait GameFactory: Send + Sync {
    async fn open(&self, game_path: &Path) -> Result<Box<dyn GameEnvironment>, EngineError>;
}

/// Factory that starts one bridge process per game
#[derive(Debug, Clone)]
pub struct BridgeFactory {
    command: Vec<String>,
}

impl BridgeFactory {
    /// # Errors
    /// Returns `EngineError::Config` when no bridge command is configured.
    pub fn new(command: Vec<String>) -> Result<Self, EngineError> {
        if command.first().map_or(true, |program| program.trim().is_empty()) {
            return Err(EngineError::Config(
                "game.bridge_command is not set; point it at a game bridge executable".to_string(),
            ));
        }
        Ok(Self { command })
    }

    pub fn from_config(config: &GameConfig) -> Result<Self, EngineError> {
        Self::new(config.bridge_command.clone())
    }
}

#[async_trait]
impl GameFactory for BridgeFactory {
    async fn open(&self, game_path: &Path) -> Result<Box<dyn GameEnvironment>, EngineError> {
        let game = BridgeGame::spawn(&self.command, game_path)?;
        Ok(Box::new(game))
    }
}
