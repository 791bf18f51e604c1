//! Per-chunk dialogue state
//!
//! A conversation is two header turns (system instructions, chunk prompt)
//! followed by exchange groups. A group is either an `Action` with the
//! `Observation`s it produced, or an `Answer` that failed to parse with the
//! `Feedback` sent back. Groups are the unit of truncation: they are kept or
//! dropped whole, so an observation never outlives its action.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::ops::Range;

/// Number of leading turns that are never dropped
pub const HEADER_TURNS: usize = 2;

/// A tool invocation requested by the reasoning service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Call identifier, echoed back on the observation
    pub id: String,

    /// Tool name
    pub name: String,

    /// Tool arguments
    pub arguments: Value,
}

/// One turn of the dialogue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Turn {
    /// System instructions
    System {
        /// Instruction text
        content: String,
    },
    /// Chunk prompt
    User {
        /// Prompt text
        content: String,
    },
    /// Tool invocations issued by the model
    Action {
        /// Free text emitted alongside the calls, if any
        content: Option<String>,
        /// The calls
        calls: Vec<ToolCall>,
    },
    /// Result of one tool invocation
    Observation {
        /// Id of the call this answers
        call_id: String,
        /// Tool name
        name: String,
        /// Tool output
        content: String,
    },
    /// A final answer the model gave that could not be used
    Answer {
        /// Raw answer text
        content: String,
    },
    /// Correction request for the preceding answer
    Feedback {
        /// Feedback text
        content: String,
    },
}

impl Turn {
    /// Whether this turn opens an exchange group
    pub fn opens_group(&self) -> bool {
        matches!(self, Turn::Action { .. } | Turn::Answer { .. })
    }
}

/// Ordered turns for one chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    turns: Vec<Turn>,
}

impl ConversationState {
    /// Start a conversation from its two header turns
    pub fn new(system: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            turns: vec![
                Turn::System {
                    content: system.into(),
                },
                Turn::User {
                    content: prompt.into(),
                },
            ],
        }
    }

    /// All turns in order
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Number of turns
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Always false: the header is never removed
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Append an action turn
    pub fn push_action(&mut self, content: Option<String>, calls: Vec<ToolCall>) {
        self.turns.push(Turn::Action { content, calls });
    }

    /// Append an observation for a call of the most recent action
    pub fn push_observation(
        &mut self,
        call_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) {
        self.turns.push(Turn::Observation {
            call_id: call_id.into(),
            name: name.into(),
            content: content.into(),
        });
    }

    /// Append an unusable answer followed by its feedback
    pub fn push_rejected_answer(&mut self, answer: impl Into<String>, feedback: impl Into<String>) {
        self.turns.push(Turn::Answer {
            content: answer.into(),
        });
        self.turns.push(Turn::Feedback {
            content: feedback.into(),
        });
    }

    /// Turn ranges of every exchange group after the header, oldest first
    pub fn groups(&self) -> Vec<Range<usize>> {
        let mut groups = Vec::new();
        let mut start: Option<usize> = None;
        for (i, turn) in self.turns.iter().enumerate().skip(HEADER_TURNS) {
            if turn.opens_group() {
                if let Some(s) = start {
                    groups.push(s..i);
                }
                start = Some(i);
            } else if start.is_none() {
                start = Some(i);
            }
        }
        if let Some(s) = start {
            groups.push(s..self.turns.len());
        }
        groups
    }

    /// Drop the oldest exchange group, never the newest one
    ///
    /// Returns the number of turns removed (zero when only one group is left).
    pub fn drop_oldest_group(&mut self) -> usize {
        let groups = self.groups();
        if groups.len() < 2 {
            return 0;
        }
        let oldest = groups[0].clone();
        let removed = oldest.len();
        self.turns.drain(oldest);
        removed
    }

    /// Check the pairing invariant
    ///
    /// The header is intact, every observation follows its action (or a sibling
    /// observation) and every feedback follows its answer.
    pub fn is_well_formed(&self) -> bool {
        if !matches!(self.turns.first(), Some(Turn::System { .. }))
            || !matches!(self.turns.get(1), Some(Turn::User { .. }))
        {
            return false;
        }
        let mut previous: Option<&Turn> = None;
        for turn in self.turns.iter().skip(HEADER_TURNS) {
            let ok = match turn {
                Turn::Observation { .. } => matches!(
                    previous,
                    Some(Turn::Action { .. }) | Some(Turn::Observation { .. })
                ),
                Turn::Feedback { .. } => matches!(
                    previous,
                    Some(Turn::Answer { .. }) | Some(Turn::Feedback { .. })
                ),
                Turn::Action { .. } | Turn::Answer { .. } => true,
                Turn::System { .. } | Turn::User { .. } => false,
            };
            if !ok {
                return false;
            }
            previous = Some(turn);
        }
        true
    }
}
