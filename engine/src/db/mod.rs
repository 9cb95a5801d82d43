/// Episode store
///
/// One SQLite file under `data_dir` holding every finished episode and its
/// step log. The schema version lives in `PRAGMA user_version`; opening the
/// store applies whatever migrations the file has not seen yet.
use anyhow::{Context, Result};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::ConnectOptions;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

pub mod episodes;

pub use episodes::{EpisodeRecord, EpisodeRepository, NewEpisode, StepRecord};

/// Schema migrations in order; entry `i` brings the file to version `i + 1`
const MIGRATIONS: &[(&str, &str)] = &[(
    "001_initial.sql",
    include_str!("../../migrations/001_initial.sql"),
)];

/// Handle to the episode store
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (or create) the store at `db_path` and bring its schema up to date
    ///
    /// The parent directory is created when missing. The file is opened in
    /// WAL mode with foreign keys on, so deleting an episode removes its steps.
    pub async fn new(db_path: &Path) -> Result<Self> {
        info!("Opening episode store at {}", db_path.display());

        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .disable_statement_logging();

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .context("Failed to connect to episode store")?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Schema version recorded in the file
    pub async fn schema_version(&self) -> Result<i64> {
        sqlx::query_scalar("PRAGMA user_version")
            .fetch_one(&self.pool)
            .await
            .context("Failed to read schema version")
    }

    async fn migrate(&self) -> Result<()> {
        let current = self.schema_version().await?;

        for (index, (name, sql)) in MIGRATIONS.iter().enumerate() {
            let version = index as i64 + 1;
            if version <= current {
                continue;
            }

            debug!("Applying migration {}", name);
            let mut tx = self.pool.begin().await.context("Failed to begin migration")?;

            sqlx::raw_sql(sql)
                .execute(&mut *tx)
                .await
                .with_context(|| format!("Failed to apply migration {}", name))?;

            let bump = format!("PRAGMA user_version = {}", version);
            sqlx::query(&bump)
                .execute(&mut *tx)
                .await
                .context("Failed to record schema version")?;

            tx.commit()
                .await
                .with_context(|| format!("Failed to commit migration {}", name))?;
        }

        if (current as usize) < MIGRATIONS.len() {
            info!(
                "Episode store schema at version {} (was {})",
                MIGRATIONS.len(),
                current
            );
        }
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Checkpoint the WAL into the main file
    pub async fn flush_wal(&self) -> Result<()> {
        sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
            .execute(&self.pool)
            .await
            .context("Failed to flush WAL")?;
        Ok(())
    }

    /// Checkpoint and close every pooled connection
    pub async fn close(self) -> Result<()> {
        self.flush_wal().await?;
        self.pool.close().await;
        debug!("Episode store closed");
        Ok(())
    }

    pub fn episodes(&self) -> EpisodeRepository {
        EpisodeRepository::new(self.pool.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_fresh_store_is_at_latest_version() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(&temp_dir.path().join("lantern.db"))
            .await
            .unwrap();

        assert_eq!(db.schema_version().await.unwrap(), MIGRATIONS.len() as i64);

        let journal_mode: String = sqlx::query_scalar("PRAGMA journal_mode")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(journal_mode.to_lowercase(), "wal");

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_reopen_keeps_rows() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested").join("lantern.db");

        let db = Database::new(&db_path).await.unwrap();
        sqlx::query(
            "INSERT INTO episodes (id, run_id, game, agent, outcome, steps, total_reward, created_at)
             VALUES ('e1', 'r1', 'zork1', 'random', 'done', 3, 0, 0)",
        )
        .execute(db.pool())
        .await
        .unwrap();
        db.close().await.unwrap();

        let db = Database::new(&db_path).await.unwrap();
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM episodes")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(db.schema_version().await.unwrap(), MIGRATIONS.len() as i64);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_deleting_episode_removes_steps() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(&temp_dir.path().join("lantern.db"))
            .await
            .unwrap();

        sqlx::query(
            "INSERT INTO episodes (id, run_id, game, agent, outcome, steps, total_reward, created_at)
             VALUES ('e1', 'r1', 'zork1', 'random', 'done', 1, 0, 0)",
        )
        .execute(db.pool())
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO episode_steps (episode_id, step_index, action, observation, reward)
             VALUES ('e1', 1, 'north', 'Forest', 0)",
        )
        .execute(db.pool())
        .await
        .unwrap();

        sqlx::query("DELETE FROM episodes WHERE id = 'e1'")
            .execute(db.pool())
            .await
            .unwrap();

        let steps: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM episode_steps")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(steps, 0);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_step_without_episode_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(&temp_dir.path().join("lantern.db"))
            .await
            .unwrap();

        let result = sqlx::query(
            "INSERT INTO episode_steps (episode_id, step_index, action, observation, reward)
             VALUES ('ghost', 1, 'north', 'Forest', 0)",
        )
        .execute(db.pool())
        .await;
        assert!(result.is_err());

        db.close().await.unwrap();
    }
}
