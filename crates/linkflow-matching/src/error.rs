// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for the matching service.

/// Result type using [`MatchingError`].
pub type Result<T> = std::result::Result<T, MatchingError>;

/// Errors surfaced by the matching service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MatchingError {
    /// The named task queue does not exist (only `complete_task` requires
    /// a prior queue).
    #[error("task queue '{0}' not found")]
    TaskQueueNotFound(String),

    /// No pending task with this id.
    #[error("task '{0}' not found")]
    TaskNotFound(String),

    /// The queue's rate limiter has no tokens; back off.
    #[error("rate limited")]
    RateLimited,

    /// The poll was abandoned before a task arrived.
    #[error("poll canceled")]
    Canceled,
}

impl MatchingError {
    /// Stable error code for the wire.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::TaskQueueNotFound(_) | Self::TaskNotFound(_) => "NOT_FOUND",
            Self::RateLimited => "RATE_LIMITED",
            Self::Canceled => "CANCELED",
        }
    }
}
