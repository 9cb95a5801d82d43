//! Integration tests for the agent loop
//!
//! These tests drive complete episodes against an in-memory game and check
//! the recorded trajectory, the terminal state and the fallback behavior.

use async_trait::async_trait;
use lantern_engine::agent::{AgentLoop, EpisodeState, TerminationReason};
use lantern_engine::config::AgentConfig;
use lantern_engine::policy::{DecisionPolicy, PolicyContext, PolicyError, RandomPolicy, ScriptedPolicy};
use sdk::errors::EngineError;
use sdk::{GameEnvironment, StepOutcome};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Small deterministic game: fixed replies per action, same valid actions everywhere
struct MockGame {
    opening: String,
    valid: Vec<String>,
    replies: HashMap<String, StepOutcome>,
    fail_on: Option<String>,
    closed: bool,
}

impl MockGame {
    fn new(opening: &str, valid: &[&str]) -> Self {
        Self {
            opening: opening.to_string(),
            valid: valid.iter().map(|a| a.to_string()).collect(),
            replies: HashMap::new(),
            fail_on: None,
            closed: false,
        }
    }

    fn reply(mut self, action: &str, outcome: StepOutcome) -> Self {
        self.replies.insert(action.to_string(), outcome);
        self
    }

    fn failing_on(mut self, action: &str) -> Self {
        self.fail_on = Some(action.to_string());
        self
    }
}

#[async_trait]
impl GameEnvironment for MockGame {
    async fn reset(&mut self) -> Result<String, EngineError> {
        Ok(self.opening.clone())
    }

    async fn step(&mut self, action: &str) -> Result<StepOutcome, EngineError> {
        if self.fail_on.as_deref() == Some(action) {
            return Err(EngineError::Game(format!("interpreter crashed on '{}'", action)));
        }
        Ok(self
            .replies
            .get(action)
            .cloned()
            .unwrap_or_else(|| StepOutcome::new("Nothing happens.")))
    }

    async fn valid_actions(&mut self) -> Result<Vec<String>, EngineError> {
        Ok(self.valid.clone())
    }

    async fn close(&mut self) -> Result<(), EngineError> {
        self.closed = true;
        Ok(())
    }
}

/// Primary that never answers
struct Hanging;

#[async_trait]
impl DecisionPolicy for Hanging {
    fn name(&self) -> &str {
        "hanging"
    }

    async fn choose_action(&mut self, _ctx: &PolicyContext<'_>) -> Result<String, PolicyError> {
        std::future::pending().await
    }
}

/// Primary whose model service always errors
struct Broken;

#[async_trait]
impl DecisionPolicy for Broken {
    fn name(&self) -> &str {
        "broken"
    }

    async fn choose_action(&mut self, _ctx: &PolicyContext<'_>) -> Result<String, PolicyError> {
        Err(PolicyError::Provider("503 Service Unavailable".to_string()))
    }
}

/// Primary that plays "north" a few times, then its model service goes down
struct Flaky {
    healthy_calls: usize,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl DecisionPolicy for Flaky {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn choose_action(&mut self, _ctx: &PolicyContext<'_>) -> Result<String, PolicyError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.healthy_calls {
            Ok("north".to_string())
        } else {
            Err(PolicyError::Provider("502 Bad Gateway".to_string()))
        }
    }
}

fn config(max_steps: usize) -> AgentConfig {
    AgentConfig {
        max_steps,
        max_chat_history_size: 4,
        fallback_to_random: true,
        timeout_secs: 0.05,
    }
}

fn script(actions: &[&str]) -> ScriptedPolicy {
    ScriptedPolicy::new(actions.iter().map(|a| a.to_string()))
}

#[tokio::test]
async fn test_single_step_trajectory() {
    let valid = ["open mailbox", "north", "south", "west"];
    let game = MockGame::new("West of House...", &valid).reply(
        "open mailbox",
        StepOutcome::new("Opening the small mailbox reveals a leaflet."),
    );

    // First seed whose opening pick is "open mailbox"
    let offered: Vec<String> = valid.iter().map(|a| a.to_string()).collect();
    let seed = (0..1000u64)
        .find(|seed| RandomPolicy::seeded(*seed).pick(&offered).unwrap() == "open mailbox")
        .unwrap();

    let mut agent = AgentLoop::new(
        Box::new(game),
        Box::new(RandomPolicy::seeded(seed)),
        config(1),
    )
    .unwrap();
    let summary = agent.run().await.unwrap();

    assert_eq!(
        agent.observations(),
        [
            "West of House...".to_string(),
            "Opening the small mailbox reveals a leaflet.".to_string()
        ]
    );
    assert_eq!(agent.actions(), ["open mailbox".to_string()]);
    assert_eq!(agent.rewards(), [0]);
    assert_eq!(summary.steps, 1);
    assert_eq!(summary.total_reward, 0);
    assert_eq!(summary.fallback_steps, 0);
    // The game never reported done; only the step limit ended the episode
    assert_eq!(summary.state, EpisodeState::StepLimitReached);
    assert_eq!(summary.reason, Some(TerminationReason::StepLimit));
}

#[tokio::test]
async fn test_finished_game_is_done() {
    let game = MockGame::new("Living Room", &["enter trophy case", "wait"]).reply(
        "enter trophy case",
        StepOutcome::new("*** You have won ***").with_reward(10).finished(),
    );

    let mut agent = AgentLoop::new(
        Box::new(game),
        Box::new(script(&["wait", "enter trophy case", "wait"])),
        config(10),
    )
    .unwrap();
    let summary = agent.run().await.unwrap();

    assert_eq!(summary.state, EpisodeState::Done);
    assert_eq!(summary.reason, Some(TerminationReason::GameOver));
    assert_eq!(summary.steps, 2);
    assert_eq!(agent.rewards(), [0, 10]);
}

#[tokio::test]
async fn test_step_limit_reached() {
    let game = MockGame::new("A maze of twisty little passages.", &["north", "south", "east"]);

    let mut agent =
        AgentLoop::new(Box::new(game), Box::new(RandomPolicy::seeded(1)), config(10)).unwrap();
    let summary = agent.run().await.unwrap();

    assert_eq!(summary.state, EpisodeState::StepLimitReached);
    assert_eq!(summary.reason, Some(TerminationReason::StepLimit));
    assert_eq!(agent.steps(), 10);
    assert_eq!(agent.actions().len(), 10);
    assert_eq!(agent.rewards().len(), 10);
    assert_eq!(agent.observations().len(), 11);
}

#[tokio::test]
async fn test_rewards_are_summed() {
    let game = MockGame::new("Kitchen", &["take lamp", "wait"])
        .reply("take lamp", StepOutcome::new("Taken.").with_reward(5))
        .reply("wait", StepOutcome::new("Time passes.").with_reward(-1));

    let mut agent = AgentLoop::new(
        Box::new(game),
        Box::new(script(&["take lamp", "wait", "wait"])),
        config(10),
    )
    .unwrap();
    let summary = agent.run().await.unwrap();

    assert_eq!(agent.rewards(), [5, -1, -1]);
    assert_eq!(summary.total_reward, 3);
}

#[tokio::test]
async fn test_timeout_falls_back_to_valid_actions() {
    let valid = ["north", "south", "take lamp"];
    let game = MockGame::new("Forest", &valid);

    let mut agent = AgentLoop::new(Box::new(game), Box::new(Hanging), config(5))
        .unwrap()
        .with_fallback_seed(3);
    let summary = agent.run().await.unwrap();

    assert_eq!(summary.state, EpisodeState::StepLimitReached);
    assert_eq!(summary.fallback_steps, 5);
    for action in agent.actions() {
        assert!(valid.contains(&action.as_str()), "unexpected action {}", action);
    }
    assert!(agent.log().unwrap().fallback_flags().iter().all(|f| *f));
}

#[tokio::test]
async fn test_failure_without_fallback_stops_episode() {
    let game = MockGame::new("Clearing", &["north"]);
    let mut cfg = config(10);
    cfg.fallback_to_random = false;

    let mut agent = AgentLoop::new(Box::new(game), Box::new(Broken), cfg).unwrap();
    let summary = agent.run().await.unwrap();

    assert_eq!(summary.state, EpisodeState::Failed);
    assert_eq!(summary.reason, Some(TerminationReason::PolicyFailure));
    assert_eq!(summary.steps, 0);
    assert!(summary.error.unwrap().contains("503"));

    // Records gathered before the failure stay readable
    assert_eq!(agent.observations(), ["Clearing".to_string()]);
    assert!(agent.actions().is_empty());
    assert!(agent.is_done());
}

#[tokio::test]
async fn test_mid_episode_failure_keeps_prior_steps() {
    let k = 3;
    let calls = Arc::new(AtomicUsize::new(0));
    let game = MockGame::new("Clearing", &["north", "south"])
        .reply("north", StepOutcome::new("Forest Path").with_reward(1));
    let mut cfg = config(10);
    cfg.fallback_to_random = false;

    let policy = Flaky {
        healthy_calls: k,
        calls: Arc::clone(&calls),
    };
    let mut agent = AgentLoop::new(Box::new(game), Box::new(policy), cfg).unwrap();
    let summary = agent.run().await.unwrap();

    assert_eq!(summary.state, EpisodeState::Failed);
    assert_eq!(summary.reason, Some(TerminationReason::PolicyFailure));
    assert_eq!(summary.steps, k);
    assert_eq!(summary.total_reward, 3);
    assert!(summary.error.unwrap().contains("502"));

    assert_eq!(agent.actions(), vec!["north".to_string(); k]);
    assert_eq!(agent.rewards(), vec![1; k]);
    assert_eq!(agent.observations().len(), k + 1);
    assert_eq!(agent.observations()[0], "Clearing");
    assert!(agent.observations()[1..].iter().all(|o| o == "Forest Path"));

    // k successes, the failed attempt and exactly one retry
    assert_eq!(calls.load(Ordering::SeqCst), k + 2);
}

#[tokio::test]
async fn test_timeout_without_fallback_fails() {
    let game = MockGame::new("Clearing", &["north"]);
    let mut cfg = config(10);
    cfg.fallback_to_random = false;

    let mut agent = AgentLoop::new(Box::new(game), Box::new(Hanging), cfg).unwrap();
    let summary = agent.run().await.unwrap();

    assert_eq!(summary.state, EpisodeState::Failed);
    assert_eq!(summary.reason, Some(TerminationReason::PolicyFailure));
    assert!(summary.error.unwrap().contains("timed out"));
}

#[tokio::test]
async fn test_game_error_fails_episode() {
    let game = MockGame::new("Attic", &["jump"]).failing_on("jump");

    let mut agent =
        AgentLoop::new(Box::new(game), Box::new(RandomPolicy::seeded(0)), config(10)).unwrap();
    let summary = agent.run().await.unwrap();

    assert_eq!(summary.state, EpisodeState::Failed);
    assert_eq!(summary.reason, Some(TerminationReason::EnvironmentError));
    assert_eq!(agent.observations().len(), 1);
    assert!(agent.actions().is_empty());
}

#[tokio::test]
async fn test_no_valid_actions_fails() {
    let game = MockGame::new("The void.", &[]);

    let mut agent =
        AgentLoop::new(Box::new(game), Box::new(RandomPolicy::seeded(0)), config(10)).unwrap();
    let summary = agent.run().await.unwrap();

    assert_eq!(summary.state, EpisodeState::Failed);
    assert_eq!(summary.reason, Some(TerminationReason::NoValidActions));
}

#[tokio::test]
async fn test_exhausted_walkthrough_is_done() {
    let game = MockGame::new("West of House", &[]);

    let mut agent = AgentLoop::new(
        Box::new(game),
        Box::new(script(&["north", "east"])),
        config(10),
    )
    .unwrap();
    let summary = agent.run().await.unwrap();

    assert_eq!(summary.state, EpisodeState::Done);
    assert_eq!(summary.reason, Some(TerminationReason::ScriptExhausted));
    assert_eq!(agent.actions(), ["north".to_string(), "east".to_string()]);
}

#[tokio::test]
async fn test_scripted_runs_are_identical() {
    async fn play() -> (Vec<String>, Vec<String>, Vec<i64>) {
        let game = MockGame::new("Living Room", &[])
            .reply("move rug", StepOutcome::new("A trap door!").with_reward(0))
            .reply("open trap door", StepOutcome::new("The door creaks open.").with_reward(10));
        let mut agent = AgentLoop::new(
            Box::new(game),
            Box::new(script(&["move rug", "open trap door", "down"])),
            config(10),
        )
        .unwrap();
        agent.run().await.unwrap();
        (
            agent.observations().to_vec(),
            agent.actions().to_vec(),
            agent.rewards().to_vec(),
        )
    }

    assert_eq!(play().await, play().await);
}

#[tokio::test]
async fn test_seeded_random_runs_are_identical() {
    async fn play() -> Vec<String> {
        let game = MockGame::new("Crossroads", &["north", "south", "east", "west", "up"]);
        let mut agent =
            AgentLoop::new(Box::new(game), Box::new(RandomPolicy::seeded(99)), config(20))
                .unwrap();
        agent.run().await.unwrap();
        agent.actions().to_vec()
    }

    assert_eq!(play().await, play().await);
}

#[tokio::test]
async fn test_memory_stays_bounded() {
    let game = MockGame::new("Cellar", &["wait"]);

    let mut agent =
        AgentLoop::new(Box::new(game), Box::new(RandomPolicy::seeded(5)), config(25)).unwrap();
    agent.run().await.unwrap();

    assert_eq!(agent.memory().capacity(), 4);
    assert!(agent.memory().turn_count() <= 4);
    assert_eq!(agent.actions().len(), 25);
}

#[tokio::test]
async fn test_run_twice_is_rejected() {
    let game = MockGame::new("Cellar", &["wait"]);

    let mut agent =
        AgentLoop::new(Box::new(game), Box::new(RandomPolicy::seeded(5)), config(2)).unwrap();
    let first = agent.run().await.unwrap();

    assert!(matches!(agent.run().await, Err(EngineError::InvalidState(_))));
    // Terminal accessors are stable
    assert_eq!(agent.summary(), first);
    assert_eq!(agent.steps(), 2);
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let game = MockGame::new("Cellar", &["wait"]);
    let mut cfg = config(0);
    cfg.timeout_secs = 1.0;

    let result = AgentLoop::new(Box::new(game), Box::new(RandomPolicy::new()), cfg);
    assert!(matches!(result, Err(EngineError::Config(_))));
}

#[tokio::test]
async fn test_oversized_timeout_is_rejected() {
    let game = MockGame::new("Cellar", &["wait"]);
    let mut cfg = config(5);
    cfg.timeout_secs = 1e20;

    let result = AgentLoop::new(Box::new(game), Box::new(RandomPolicy::new()), cfg);
    assert!(matches!(result, Err(EngineError::Config(_))));
}
