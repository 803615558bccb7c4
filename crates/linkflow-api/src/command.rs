// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Commands: the workflow driver's output.
//!
//! A command is an instruction the history service materializes into a
//! history event. The driver never writes history itself.

use serde::{Deserialize, Serialize};

/// How a failure was classified by whoever reported it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FailureKind {
    /// Application-level failure reported by an executor.
    #[default]
    Application,
    /// System-level failure while running an activity.
    Activity,
    /// The work exceeded its deadline.
    Timeout,
}

/// A failure reported back into history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Failure {
    /// Human-readable message.
    pub message: String,
    /// Classification.
    pub kind: FailureKind,
    /// Whether the reporter considers the failure retryable.
    pub retryable: bool,
    /// Optional structured details.
    pub details: Vec<u8>,
}

/// Decision output applied by the history service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Command {
    /// Schedule a node for execution; materializes as `NODE_SCHEDULED`.
    ScheduleNode {
        /// Node id within the workflow definition.
        node_id: String,
        /// Node type, resolved against the executor registry.
        node_type: String,
        /// Node input.
        input: Vec<u8>,
        /// Node configuration from the definition.
        config: Vec<u8>,
        /// Attempt, 1-based; > 1 on re-schedules.
        attempt: i32,
    },
    /// Close the execution successfully; materializes as `EXECUTION_COMPLETED`.
    CompleteWorkflowExecution {
        /// Final result payload.
        result: Vec<u8>,
    },
    /// Close the execution with a failure; materializes as `EXECUTION_FAILED`.
    FailWorkflowExecution {
        /// The terminal failure.
        failure: Failure,
    },
}

impl Command {
    /// Whether this command closes the execution.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Command::CompleteWorkflowExecution { .. } | Command::FailWorkflowExecution { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_classification() {
        assert!(!Command::ScheduleNode {
            node_id: "n".to_string(),
            node_type: "http".to_string(),
            input: Vec::new(),
            config: Vec::new(),
            attempt: 1,
        }
        .is_terminal());
        assert!(Command::CompleteWorkflowExecution { result: Vec::new() }.is_terminal());
        assert!(Command::FailWorkflowExecution {
            failure: Failure::default()
        }
        .is_terminal());
    }
}
