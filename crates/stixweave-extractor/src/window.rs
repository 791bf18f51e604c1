//! Bounding the per-chunk conversation

use stixweave_domain::ConversationState;
use tracing::{debug, warn};

/// What a compression pass did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WindowOutcome {
    /// Exchange groups removed
    pub dropped_groups: usize,
    /// Turns removed
    pub dropped_turns: usize,
    /// Still over the limit because the newest group alone is too large
    pub oversize: bool,
}

/// Keeps a conversation within `max_turns`
///
/// The system and chunk-prompt turns always stay. Exchange groups (an action
/// and its observations, or a rejected answer and its feedback) are removed
/// whole, oldest first. The newest group is never removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowManager {
    max_turns: usize,
}

impl WindowManager {
    /// Create a window manager
    pub fn new(max_turns: usize) -> Self {
        Self { max_turns }
    }

    /// The configured limit
    pub fn max_turns(&self) -> usize {
        self.max_turns
    }

    /// Compress `state` in place until it fits or nothing more can be dropped
    pub fn compress(&self, state: &mut ConversationState) -> WindowOutcome {
        let mut outcome = WindowOutcome::default();
        while state.len() > self.max_turns {
            let removed = state.drop_oldest_group();
            if removed == 0 {
                outcome.oversize = true;
                warn!(
                    turns = state.len(),
                    max_turns = self.max_turns,
                    "Conversation exceeds window even after compression"
                );
                break;
            }
            outcome.dropped_groups += 1;
            outcome.dropped_turns += removed;
        }
        if outcome.dropped_groups > 0 {
            debug!(
                "Dropped {} exchange groups ({} turns), {} turns left",
                outcome.dropped_groups,
                outcome.dropped_turns,
                state.len()
            );
        }
        outcome
    }
}
