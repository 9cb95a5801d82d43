/// Episode persistence
///
/// Stores every finished episode with its full step log so that runs can be
/// listed (`lantern history`) and replayed (`lantern replay`).
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::agent::{EpisodeLog, EpisodeSummary};

/// Header row of a stored episode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeRecord {
    pub id: String,
    pub run_id: String,
    pub game: String,
    pub agent: String,
    pub outcome: String,
    pub reason: Option<String>,
    pub steps: i64,
    pub total_reward: i64,
    pub initial_observation: String,
    pub error: Option<String>,
    pub created_at: i64,
}

/// One stored step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub step_index: i64,
    pub action: String,
    pub observation: String,
    pub reward: i64,
    pub fallback: bool,
}

/// Identity of an episode being saved
#[derive(Debug, Clone, Copy)]
pub struct NewEpisode<'a> {
    pub id: &'a str,
    pub run_id: &'a str,
    pub game: &'a str,
    pub agent: &'a str,
}

pub struct EpisodeRepository {
    pool: SqlitePool,
}

impl EpisodeRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Save an episode and all of its steps in one transaction
    pub async fn save_episode(
        &self,
        episode: NewEpisode<'_>,
        summary: &EpisodeSummary,
        log: Option<&EpisodeLog>,
    ) -> Result<()> {
        let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs() as i64;
        let initial = log
            .and_then(|l| l.observations().first())
            .map(String::as_str)
            .unwrap_or("");

        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;

        sqlx::query(
            "INSERT INTO episodes (id, run_id, game, agent, outcome, reason, steps, total_reward, initial_observation, error, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(episode.id)
        .bind(episode.run_id)
        .bind(episode.game)
        .bind(episode.agent)
        .bind(summary.state.as_str())
        .bind(summary.reason.map(|r| r.as_str()))
        .bind(summary.steps as i64)
        .bind(summary.total_reward)
        .bind(initial)
        .bind(summary.error.as_deref())
        .bind(now)
        .execute(&mut *tx)
        .await
        .context("Failed to insert episode")?;

        if let Some(log) = log {
            for (index, action, observation, reward, fallback) in log.steps() {
                sqlx::query(
                    "INSERT INTO episode_steps (episode_id, step_index, action, observation, reward, fallback)
                     VALUES (?, ?, ?, ?, ?, ?)",
                )
                .bind(episode.id)
                .bind(index as i64)
                .bind(action)
                .bind(observation)
                .bind(reward)
                .bind(fallback)
                .execute(&mut *tx)
                .await
                .context("Failed to insert episode step")?;
            }
        }

        tx.commit().await.context("Failed to commit episode")?;
        Ok(())
    }

    /// Most recent episodes first
    pub async fn list_recent(&self, limit: i64) -> Result<Vec<EpisodeRecord>> {
        let rows = sqlx::query(
            "SELECT id, run_id, game, agent, outcome, reason, steps, total_reward, initial_observation, error, created_at
             FROM episodes ORDER BY created_at DESC, rowid DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list episodes")?;

        Ok(rows.iter().map(episode_from_row).collect())
    }

    pub async fn get_episode(&self, id: &str) -> Result<Option<EpisodeRecord>> {
        let row = sqlx::query(
            "SELECT id, run_id, game, agent, outcome, reason, steps, total_reward, initial_observation, error, created_at
             FROM episodes WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch episode")?;

        Ok(row.as_ref().map(episode_from_row))
    }

    /// Steps of an episode in order
    pub async fn get_steps(&self, episode_id: &str) -> Result<Vec<StepRecord>> {
        let rows = sqlx::query(
            "SELECT step_index, action, observation, reward, fallback
             FROM episode_steps WHERE episode_id = ? ORDER BY step_index ASC",
        )
        .bind(episode_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch episode steps")?;

        Ok(rows
            .iter()
            .map(|r| StepRecord {
                step_index: r.get("step_index"),
                action: r.get("action"),
                observation: r.get("observation"),
                reward: r.get("reward"),
                fallback: r.get("fallback"),
            })
            .collect())
    }

    /// Episodes of one batch run, ordered by game
    pub async fn list_run(&self, run_id: &str) -> Result<Vec<EpisodeRecord>> {
        let rows = sqlx::query(
            "SELECT id, run_id, game, agent, outcome, reason, steps, total_reward, initial_observation, error, created_at
             FROM episodes WHERE run_id = ? ORDER BY game ASC",
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list run episodes")?;

        Ok(rows.iter().map(episode_from_row).collect())
    }
}

fn episode_from_row(r: &sqlx::sqlite::SqliteRow) -> EpisodeRecord {
    EpisodeRecord {
        id: r.get("id"),
        run_id: r.get("run_id"),
        game: r.get("game"),
        agent: r.get("agent"),
        outcome: r.get("outcome"),
        reason: r.get("reason"),
        steps: r.get("steps"),
        total_reward: r.get("total_reward"),
        initial_observation: r.get("initial_observation"),
        error: r.get("error"),
        created_at: r.get("created_at"),
    }
}
