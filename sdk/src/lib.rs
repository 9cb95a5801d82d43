//! Lantern SDK
//!
//! Shared contract between the Lantern engine and game adapters.
//! Adapter crates depend on this crate only.

/// Error types and handling
pub mod errors;

/// Game environment trait
pub mod game;

/// Game step types
pub mod types;

// Re-export commonly used types
pub use errors::{EngineError, LanternErrorExt};
pub use game::GameEnvironment;
pub use types::StepOutcome;
