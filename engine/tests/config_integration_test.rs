//! Integration tests for configuration management
//!
//! These tests verify that the Config struct can be properly loaded,
//! validated, and processed with path expansion.

use lantern_engine::config::Config;
use sdk::errors::EngineError;
use std::path::PathBuf;
use tempfile::TempDir;

fn full_config(data_dir: &str) -> String {
    format!(
        r#"
[core]
log_level = "debug"
data_dir = "{data_dir}"

[agent]
max_steps = 250
max_chat_history_size = 6
fallback_to_random = false
timeout_secs = 4.5

[llm]
base_url = "https://openrouter.ai/api/v1"
model = "meta-llama/llama-3.3-70b-instruct"
api_key_env = "OPENROUTER_API_KEY"
referer = "https://example.org/lantern"
title = "Lantern Agent"

[game]
bridge_command = ["python3", "-m", "jericho_bridge"]
games_dir = "{data_dir}/games"
only_33 = true

[batch]
output_file = "results/llm.json"
concurrency = 4
"#
    )
}

#[test]
fn test_config_toml_parsing() {
    let temp_dir = TempDir::new().unwrap();
    let data_dir = temp_dir.path().join("data");
    let config = Config::from_toml_str(&full_config(&data_dir.display().to_string())).unwrap();

    assert_eq!(config.core.log_level, "debug");
    assert_eq!(config.core.data_dir, data_dir);
    assert!(data_dir.exists(), "data directory is created on load");

    assert_eq!(config.agent.max_steps, 250);
    assert_eq!(config.agent.max_chat_history_size, 6);
    assert!(!config.agent.fallback_to_random);
    assert_eq!(config.agent.timeout_secs, 4.5);

    assert_eq!(config.llm.model, "meta-llama/llama-3.3-70b-instruct");
    assert_eq!(config.llm.referer.as_deref(), Some("https://example.org/lantern"));

    assert_eq!(
        config.game.bridge_command,
        vec!["python3", "-m", "jericho_bridge"]
    );
    assert!(config.game.only_33);

    assert_eq!(config.batch.output_file, PathBuf::from("results/llm.json"));
    assert_eq!(config.batch.concurrency, 4);
    assert_eq!(config.database_path(), data_dir.join("lantern.db"));
}

#[test]
fn test_missing_sections_use_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let toml = format!(
        "[core]\ndata_dir = \"{}\"\n",
        temp_dir.path().display()
    );
    let config = Config::from_toml_str(&toml).unwrap();

    assert_eq!(config.core.log_level, "info");
    assert_eq!(config.agent.max_steps, 1000);
    assert_eq!(config.agent.max_chat_history_size, 10);
    assert!(config.agent.fallback_to_random);
    assert_eq!(config.agent.timeout_secs, 10.0);
    assert_eq!(config.llm.api_key_env, "OPENROUTER_API_KEY");
    assert_eq!(config.llm.title.as_deref(), Some("Lantern Agent"));
    assert!(config.game.bridge_command.is_empty());
    assert_eq!(config.batch.concurrency, 1);
}

#[test]
fn test_load_from_path() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    let data_dir = temp_dir.path().join("data");
    std::fs::write(&config_path, full_config(&data_dir.display().to_string())).unwrap();

    let config = Config::load_from_path(&config_path).unwrap();
    assert_eq!(config.agent.max_steps, 250);
}

#[test]
fn test_missing_file_is_config_error() {
    let temp_dir = TempDir::new().unwrap();
    let result = Config::load_from_path(&temp_dir.path().join("nope.toml"));
    assert!(matches!(result, Err(EngineError::Config(_))));
}

#[test]
fn test_invalid_values_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let data_dir = temp_dir.path().display().to_string();

    let cases = [
        "[agent]\nmax_steps = 0",
        "[agent]\ntimeout_secs = 0.0",
        "[agent]\ntimeout_secs = -1.0",
        "[agent]\ntimeout_secs = 1e20",
        "[core]\nlog_level = \"loud\"",
        "[batch]\nconcurrency = 0",
        "[llm]\napi_key_env = \"\"",
        "[agent]\nmax_steps = \"many\"",
    ];

    for case in cases {
        let toml = if case.starts_with("[core]") {
            format!("{}\ndata_dir = \"{}\"\n", case, data_dir)
        } else {
            format!("[core]\ndata_dir = \"{}\"\n\n{}\n", data_dir, case)
        };
        let result = Config::from_toml_str(&toml);
        assert!(
            matches!(result, Err(EngineError::Config(_))),
            "expected rejection of: {}",
            case
        );
    }
}

#[test]
fn test_tilde_expansion() {
    let home = match dirs::home_dir() {
        Some(home) => home,
        None => return,
    };
    let temp_dir = TempDir::new().unwrap();
    let toml = format!(
        "[core]\ndata_dir = \"{}\"\n\n[game]\ngames_dir = \"~/games\"\n",
        temp_dir.path().display()
    );

    let config = Config::from_toml_str(&toml).unwrap();
    assert_eq!(config.game.games_dir, home.join("games"));
}
