//! Task state machine.
//!
//! Enforces the valid transition graph for a whole review task (not a
//! single provider run):
//!
//! ```text
//! draft       -> queued
//! queued      -> dispatched | cancelled | expired
//! dispatched  -> running    | cancelled | expired
//! running     -> retrying | aggregating | failed | cancelled | expired
//!                | partial_success
//! retrying    -> running | failed | expired
//! aggregating -> completed | partial_success | failed
//! ```
//!
//! `completed`, `partial_success`, `failed`, `cancelled` and `expired` are
//! terminal and have no outgoing edges.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Orchestrator-level state of a review task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Draft,
    Queued,
    Dispatched,
    Running,
    Retrying,
    Aggregating,
    Completed,
    PartialSuccess,
    Failed,
    Cancelled,
    Expired,
}

impl TaskState {
    /// All states, in declaration order. Used by exhaustive table tests.
    pub const ALL: [TaskState; 11] = [
        TaskState::Draft,
        TaskState::Queued,
        TaskState::Dispatched,
        TaskState::Running,
        TaskState::Retrying,
        TaskState::Aggregating,
        TaskState::Completed,
        TaskState::PartialSuccess,
        TaskState::Failed,
        TaskState::Cancelled,
        TaskState::Expired,
    ];

    /// Terminal states have no outgoing transitions.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::PartialSuccess | Self::Failed | Self::Cancelled | Self::Expired
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::Queued => "QUEUED",
            Self::Dispatched => "DISPATCHED",
            Self::Running => "RUNNING",
            Self::Retrying => "RETRYING",
            Self::Aggregating => "AGGREGATING",
            Self::Completed => "COMPLETED",
            Self::PartialSuccess => "PARTIAL_SUCCESS",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
            Self::Expired => "EXPIRED",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by [`TaskStateMachine::transition`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("illegal transition {from} -> {to}")]
    IllegalTransition { from: TaskState, to: TaskState },
}

/// Holds the current [`TaskState`] and validates every transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskStateMachine {
    state: TaskState,
}

impl Default for TaskStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskStateMachine {
    /// A fresh task starts in `DRAFT`.
    pub fn new() -> Self {
        Self {
            state: TaskState::Draft,
        }
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    /// Check whether `from -> to` is an edge in the transition graph.
    pub fn is_valid_transition(from: TaskState, to: TaskState) -> bool {
        use TaskState::*;
        matches!(
            (from, to),
            (Draft, Queued)
                | (Queued, Dispatched)
                | (Queued, Cancelled)
                | (Queued, Expired)
                | (Dispatched, Running)
                | (Dispatched, Cancelled)
                | (Dispatched, Expired)
                | (Running, Retrying)
                | (Running, Aggregating)
                | (Running, Failed)
                | (Running, Cancelled)
                | (Running, Expired)
                | (Running, PartialSuccess)
                | (Retrying, Running)
                | (Retrying, Failed)
                | (Retrying, Expired)
                | (Aggregating, Completed)
                | (Aggregating, PartialSuccess)
                | (Aggregating, Failed)
        )
    }

    /// Advance to `next`, or fail with [`StateError::IllegalTransition`].
    pub fn transition(&mut self, next: TaskState) -> Result<(), StateError> {
        if !Self::is_valid_transition(self.state, next) {
            return Err(StateError::IllegalTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }
}
