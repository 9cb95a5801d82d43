//! Lantern Engine Library
//!
//! Agent loop, decision policies, game adapters and batch runner behind the
//! `lantern` binary. Also used directly by the integration tests.

/// Configuration management module
pub mod config;

/// Secret management module
pub mod secrets;

/// Episode store
pub mod db;

/// LLM provider abstraction layer
pub mod llm;

/// Agent loop, bounded memory and episode state
pub mod agent;

/// Decision policies and the timeout/fallback guard
pub mod policy;

/// Game adapters and game file discovery
pub mod game;

/// Batch runner and results file
pub mod batch;

/// Telemetry and Observability
pub mod telemetry;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;
