//! Agent Loop
//!
//! The orchestrator that plays one episode: it keeps the bounded
//! conversation memory, asks the guarded decision policy for each action,
//! steps the game and records every observation, action and reward.

pub mod core;
pub mod episode;
pub mod working_memory;

pub use core::AgentLoop;
pub use episode::{EpisodeLog, EpisodeState, EpisodeSummary, TerminationReason};
pub use working_memory::WorkingMemory;
