//! Working Memory for the Agent Loop
//!
//! Bounded conversation history handed to the model-backed policy. The cap
//! counts turns, not tokens: at most `capacity` non-system entries are kept
//! and the oldest are evicted first. The system entry (task instructions) is
//! held separately, so it is never evicted and always renders first.

use crate::llm::Message;
use std::collections::VecDeque;

/// Capped, chronological log of role-tagged messages
#[derive(Debug, Clone)]
pub struct WorkingMemory {
    /// Permanent task-instruction entry
    system: Option<Message>,

    /// Non-system entries, oldest at the front
    turns: VecDeque<Message>,

    /// Effective cap on `turns` (never below 1)
    capacity: usize,
}

impl WorkingMemory {
    /// Create an empty memory holding at most `max_turns` non-system entries.
    ///
    /// A cap of 0 behaves like 1: the most recent entry is always kept.
    pub fn with_capacity(max_turns: usize) -> Self {
        let capacity = max_turns.max(1);
        Self {
            system: None,
            turns: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Add an entry, evicting the oldest non-system entries until the cap holds.
    ///
    /// A system message replaces the current system entry instead of taking
    /// a turn slot.
    pub fn append(&mut self, message: Message) {
        if message.is_system() {
            self.system = Some(message);
            return;
        }

        self.turns.push_back(message);
        while self.turns.len() > self.capacity {
            self.turns.pop_front();
        }
    }

    /// Current window in chronological order, system entry first
    pub fn render(&self) -> Vec<Message> {
        self.system
            .iter()
            .chain(self.turns.iter())
            .cloned()
            .collect()
    }

    /// Number of non-system entries currently held
    pub fn turn_count(&self) -> usize {
        self.turns.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.system.is_none() && self.turns.is_empty()
    }

    /// Most recent non-system entry
    pub fn last(&self) -> Option<&Message> {
        self.turns.back()
    }
}
