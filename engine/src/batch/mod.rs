//! Batch runner
//!
//! Plays one episode per game file and collects the results:
//!
//! - a fresh adapter and a fresh agent loop per game
//! - up to `concurrency` games at once (semaphore-bounded task set)
//! - the results file is rewritten under a mutex after every finished game,
//!   so an interrupted batch keeps everything played so far
//! - a failed episode is recorded like any other and never stops the batch

use async_trait::async_trait;
use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use serde_json::Map;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

pub mod results;

pub use results::{GameResult, ResultsSummary, ResultsTotals};

use crate::agent::{AgentLoop, EpisodeLog, EpisodeState, EpisodeSummary, TerminationReason};
use crate::config::AgentConfig;
use crate::db::{EpisodeRepository, NewEpisode};
use crate::game::{GameEntry, GameFactory};
use crate::llm::LLMProvider;
use crate::policy::{DecisionPolicy, ModelPolicy, RandomPolicy, ScriptedPolicy};
use crate::secrets::{SecretManager, SERVICE_NAME};

/// Which primary policy plays the games
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    /// Uniform random valid action
    #[default]
    Random,
    /// Replay the game's solved walkthrough
    Walkthrough,
    /// Remote language model
    Llm,
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentKind::Random => write!(f, "random"),
            AgentKind::Walkthrough => write!(f, "walkthrough"),
            AgentKind::Llm => write!(f, "llm"),
        }
    }
}

/// Settings for one batch run
#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub agent: AgentKind,
    pub agent_config: AgentConfig,
    pub output_file: PathBuf,
    pub concurrency: usize,
    /// Base seed for random choices; game `i` uses `seed + i`
    pub seed: Option<u64>,
}

/// Receives each finished game, e.g. to print progress
#[async_trait]
pub trait BatchObserver: Send + Sync {
    async fn game_finished(&self, game: &str, result: &GameResult, done: usize, total: usize);
}

#[derive(Clone)]
pub struct BatchRunner {
    factory: Arc<dyn GameFactory>,
    provider: Option<Arc<dyn LLMProvider>>,
    store: Option<Arc<EpisodeRepository>>,
    observer: Option<Arc<dyn BatchObserver>>,
    options: BatchOptions,
    run_id: String,
}

impl BatchRunner {
    /// # Errors
    /// Returns `EngineError::Config` for invalid agent settings or a zero
    /// concurrency.
    pub fn new(factory: Arc<dyn GameFactory>, options: BatchOptions) -> Result<Self, EngineError> {
        options.agent_config.validate()?;
        if options.concurrency == 0 {
            return Err(EngineError::Config(
                "concurrency must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            factory,
            provider: None,
            store: None,
            observer: None,
            options,
            run_id: Uuid::new_v4().to_string(),
        })
    }

    /// Model used by the `llm` agent
    pub fn with_provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Save every finished episode to the episode store
    pub fn with_store(mut self, store: Arc<EpisodeRepository>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn BatchObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn options(&self) -> &BatchOptions {
        &self.options
    }

    /// Play every game and return the collected results
    ///
    /// # Errors
    /// Returns `EngineError::Config` if the `llm` agent has no provider, or
    /// `EngineError::Results` if the final results file cannot be written.
    pub async fn run(&self, games: Vec<GameEntry>) -> Result<ResultsSummary, EngineError> {
        if self.options.agent == AgentKind::Llm && self.provider.is_none() {
            return Err(EngineError::Config(
                "the llm agent needs a model and an API key".to_string(),
            ));
        }

        let total = games.len();
        info!(
            run_id = %self.run_id,
            "Starting batch: {} games, agent={}, max_steps={}, concurrency={}",
            total,
            self.options.agent,
            self.options.agent_config.max_steps,
            self.options.concurrency
        );

        let summary = Arc::new(Mutex::new(ResultsSummary::new()));
        let finished = Arc::new(Mutex::new(0usize));
        let semaphore = Arc::new(Semaphore::new(self.options.concurrency));
        let mut tasks = JoinSet::new();

        for (index, entry) in games.into_iter().enumerate() {
            let runner = self.clone();
            let summary = Arc::clone(&summary);
            let finished = Arc::clone(&finished);
            let semaphore = Arc::clone(&semaphore);

            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return;
                };

                let span = info_span!("episode", game = %entry.name);
                let result = runner.play_game(index, &entry).instrument(span).await;

                let mut summary = summary.lock().await;
                summary.insert(entry.name.clone(), result.clone());
                if let Err(e) = summary.save(&runner.options.output_file) {
                    error!("Failed to save results after {}: {}", entry.name, e);
                }

                let mut done = finished.lock().await;
                *done += 1;
                info!(
                    "[{}/{}] {}: {} after {} steps",
                    *done,
                    total,
                    entry.name,
                    result.outcome.map(|o| o.as_str()).unwrap_or("-"),
                    result.steps
                );
                if let Some(observer) = &runner.observer {
                    observer
                        .game_finished(&entry.name, &result, *done, total)
                        .await;
                }
            });
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!("Game task aborted: {}", e);
            }
        }

        let summary = summary.lock().await.clone();
        summary.save(&self.options.output_file)?;

        let totals = summary.totals();
        info!(
            run_id = %self.run_id,
            "Batch finished: {} games, {} done, {} step limit, {} failed",
            totals.games,
            totals.done,
            totals.step_limit_reached,
            totals.failed
        );

        Ok(summary)
    }

    /// Play one game; every failure ends up inside the returned record
    async fn play_game(&self, index: usize, entry: &GameEntry) -> GameResult {
        let mut result = GameResult {
            agent: self.options.agent.to_string(),
            game_path: entry.path.display().to_string(),
            max_steps: self.options.agent_config.max_steps,
            steps: 0,
            num_observations: 0,
            num_actions: 0,
            num_rewards: 0,
            total_reward: 0,
            max_score: None,
            walkthrough_len: 0,
            outcome: None,
            reason: None,
            fallback_steps: 0,
            info: Map::new(),
            error: None,
            episode_id: None,
        };

        let mut env = match self.factory.open(&entry.path).await {
            Ok(env) => env,
            Err(e) => {
                warn!("Could not open {}: {}", entry.path.display(), e);
                return self.record_failure(result, entry, e).await;
            }
        };

        let walkthrough = match env.walkthrough().await {
            Ok(walkthrough) => walkthrough,
            Err(e) if self.options.agent == AgentKind::Walkthrough => {
                env.close().await.ok();
                return self.record_failure(result, entry, e).await;
            }
            Err(e) => {
                warn!("No walkthrough for {}: {}", entry.name, e);
                Vec::new()
            }
        };
        result.walkthrough_len = walkthrough.len();

        result.max_score = match env.max_score().await {
            Ok(score) => score,
            Err(e) => {
                warn!("No max score for {}: {}", entry.name, e);
                None
            }
        };

        let seed = self.options.seed.map(|s| s.wrapping_add(index as u64));
        let policy: Box<dyn DecisionPolicy> = match self.options.agent {
            AgentKind::Random => Box::new(match seed {
                Some(seed) => RandomPolicy::seeded(seed),
                None => RandomPolicy::new(),
            }),
            AgentKind::Walkthrough => Box::new(ScriptedPolicy::new(walkthrough)),
            AgentKind::Llm => match &self.provider {
                Some(provider) => Box::new(ModelPolicy::new(Arc::clone(provider))),
                None => {
                    env.close().await.ok();
                    let e = EngineError::Config("no model provider configured".to_string());
                    return self.record_failure(result, entry, e).await;
                }
            },
        };

        let mut agent = match AgentLoop::new(env, policy, self.options.agent_config.clone()) {
            Ok(agent) => agent,
            Err(e) => return self.record_failure(result, entry, e).await,
        };
        if let Some(seed) = seed {
            agent = agent.with_fallback_seed(seed);
        }

        let summary = match agent.run().await {
            Ok(summary) => summary,
            Err(e) => {
                agent.close().await.ok();
                return self.record_failure(result, entry, e).await;
            }
        };

        if let Err(e) = agent.close().await {
            warn!("Failed to close {}: {}", entry.name, e);
        }

        result.steps = summary.steps;
        result.num_observations = agent.observations().len();
        result.num_actions = agent.actions().len();
        result.num_rewards = agent.rewards().len();
        result.total_reward = summary.total_reward;
        result.outcome = Some(summary.state);
        result.reason = summary.reason;
        result.fallback_steps = summary.fallback_steps;
        result.info = agent.last_info().clone();
        result.error = summary.error.as_deref().map(scrub);

        let log = agent.into_log();
        result.episode_id = self.persist(entry, &summary, log.as_ref()).await;
        result
    }

    async fn record_failure(
        &self,
        mut result: GameResult,
        entry: &GameEntry,
        err: EngineError,
    ) -> GameResult {
        let summary = EpisodeSummary {
            state: EpisodeState::Failed,
            reason: Some(TerminationReason::EnvironmentError),
            steps: 0,
            total_reward: 0,
            fallback_steps: 0,
            error: Some(scrub(&err.to_string())),
        };

        result.outcome = Some(summary.state);
        result.reason = summary.reason;
        result.error = summary.error.clone();
        result.episode_id = self.save_episode(entry, &summary, None).await;
        result
    }

    async fn persist(
        &self,
        entry: &GameEntry,
        summary: &EpisodeSummary,
        log: Option<&EpisodeLog>,
    ) -> Option<String> {
        let mut summary = summary.clone();
        summary.error = summary.error.as_deref().map(scrub);
        self.save_episode(entry, &summary, log).await
    }

    async fn save_episode(
        &self,
        entry: &GameEntry,
        summary: &EpisodeSummary,
        log: Option<&EpisodeLog>,
    ) -> Option<String> {
        let store = self.store.as_ref()?;
        let id = Uuid::new_v4().to_string();
        let agent = self.options.agent.to_string();
        let episode = NewEpisode {
            id: &id,
            run_id: &self.run_id,
            game: &entry.name,
            agent: &agent,
        };

        match store.save_episode(episode, summary, log).await {
            Ok(()) => Some(id),
            Err(e) => {
                warn!("Failed to store episode for {}: {:#}", entry.name, e);
                None
            }
        }
    }
}

fn scrub(text: &str) -> String {
    SecretManager::new(SERVICE_NAME).scrub(text)
}
