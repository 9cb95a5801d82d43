//! Game adapter backed by an external process
//!
//! The configured `bridge_command` is started with the game file appended as
//! its last argument. Requests and responses are single-line JSON objects on
//! the child's stdin and stdout:
//!
//! | request                                | response                                  |
//! |----------------------------------------|-------------------------------------------|
//! | `{"cmd":"reset"}`                      | `{"observation": ".."}`                   |
//! | `{"cmd":"step","action":".."}`         | `{"observation","reward","done","info"}`  |
//! | `{"cmd":"valid_actions"}`              | `{"valid_actions": [..]}`                 |
//! | `{"cmd":"walkthrough"}`                | `{"walkthrough": [..]}`                   |
//! | `{"cmd":"max_score"}`                  | `{"max_score": n}`                        |
//! | `{"cmd":"close"}`                      | any object, then the process exits        |
//!
//! Any response may instead be `{"error": ".."}`.
//!
//! The child is started without a shell and is killed if the adapter is
//! dropped without `close()`.

use async_trait::async_trait;
use sdk::errors::EngineError;
use sdk::{GameEnvironment, StepOutcome};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, warn};

/// How long a closed bridge may take to exit before it is killed
const CLOSE_GRACE: Duration = Duration::from_secs(2);

#[derive(Deserialize)]
struct ResetReply {
    observation: String,
}

#[derive(Deserialize)]
struct ValidActionsReply {
    valid_actions: Vec<String>,
}

#[derive(Deserialize)]
struct WalkthroughReply {
    walkthrough: Vec<String>,
}

#[derive(Deserialize)]
struct MaxScoreReply {
    max_score: Option<i64>,
}

pub struct BridgeGame {
    game_path: PathBuf,
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    closed: bool,
}

impl BridgeGame {
    /// Start the bridge process for one game
    ///
    /// # Errors
    /// Returns `EngineError::Bridge` if the command is empty or cannot be spawned.
    pub fn spawn(command: &[String], game_path: &Path) -> Result<Self, EngineError> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| EngineError::Bridge("bridge_command is empty".to_string()))?;

        let mut child = Command::new(program)
            .args(args)
            .arg(game_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EngineError::Bridge(format!("Failed to start {}: {}", program, e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| EngineError::Bridge("Bridge stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::Bridge("Bridge stdout unavailable".to_string()))?;

        debug!("Started game bridge for {}", game_path.display());

        Ok(Self {
            game_path: game_path.to_path_buf(),
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
            closed: false,
        })
    }

    pub fn game_path(&self) -> &Path {
        &self.game_path
    }

    async fn request(&mut self, payload: Value) -> Result<Value, EngineError> {
        if self.closed {
            return Err(EngineError::Bridge("Game already closed".to_string()));
        }

        let mut line = payload.to_string();
        line.push('\n');
        self.stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| EngineError::Bridge(format!("Write to bridge failed: {}", e)))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| EngineError::Bridge(format!("Write to bridge failed: {}", e)))?;

        let reply = self
            .stdout
            .next_line()
            .await
            .map_err(|e| EngineError::Bridge(format!("Read from bridge failed: {}", e)))?
            .ok_or_else(|| EngineError::Bridge("Bridge closed its output".to_string()))?;

        let value: Value = serde_json::from_str(reply.trim())
            .map_err(|e| EngineError::Bridge(format!("Malformed bridge reply: {}", e)))?;

        if let Some(message) = value.get("error") {
            let message = message
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| message.to_string());
            return Err(EngineError::Game(message));
        }

        Ok(value)
    }

    async fn call<T: DeserializeOwned>(&mut self, payload: Value) -> Result<T, EngineError> {
        let value = self.request(payload).await?;
        serde_json::from_value(value)
            .map_err(|e| EngineError::Bridge(format!("Unexpected bridge reply: {}", e)))
    }
}

#[async_trait]
impl GameEnvironment for BridgeGame {
    async fn reset(&mut self) -> Result<String, EngineError> {
        let reply: ResetReply = self.call(json!({"cmd": "reset"})).await?;
        Ok(reply.observation)
    }

    async fn step(&mut self, action: &str) -> Result<StepOutcome, EngineError> {
        self.call(json!({"cmd": "step", "action": action})).await
    }

    async fn valid_actions(&mut self) -> Result<Vec<String>, EngineError> {
        let reply: ValidActionsReply = self.call(json!({"cmd": "valid_actions"})).await?;
        Ok(reply.valid_actions)
    }

    async fn walkthrough(&mut self) -> Result<Vec<String>, EngineError> {
        let reply: WalkthroughReply = self.call(json!({"cmd": "walkthrough"})).await?;
        Ok(reply.walkthrough)
    }

    async fn max_score(&mut self) -> Result<Option<i64>, EngineError> {
        let reply: MaxScoreReply = self.call(json!({"cmd": "max_score"})).await?;
        Ok(reply.max_score)
    }

    async fn close(&mut self) -> Result<(), EngineError> {
        if self.closed {
            return Ok(());
        }

        if let Err(e) = self.request(json!({"cmd": "close"})).await {
            warn!("Bridge close request failed: {}", e);
        }
        self.closed = true;

        if tokio::time::timeout(CLOSE_GRACE, self.child.wait())
            .await
            .is_err()
        {
            warn!("Bridge did not exit within {:?}, killing it", CLOSE_GRACE);
            if let Err(e) = self.child.kill().await {
                debug!("Bridge already gone: {}", e);
            }
        }

        debug!("Closed game bridge for {}", self.game_path.display());
        Ok(())
    }
}
