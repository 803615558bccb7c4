// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for the history service, with stable wire codes.

use crate::engine::EngineError;
use crate::store::StoreError;

/// Result type using [`HistoryError`].
pub type Result<T> = std::result::Result<T, HistoryError>;

/// Errors surfaced by the history service.
#[derive(Debug, Clone, thiserror::Error)]
pub enum HistoryError {
    /// The service has not been started or was stopped.
    #[error("history service is not running")]
    NotRunning,

    /// `start` was called on a running service.
    #[error("history service is already running")]
    AlreadyRunning,

    /// The engine rejected an event.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// A store operation failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Malformed request.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A reserved interface that is not implemented.
    #[error("{0} is not implemented")]
    Unimplemented(&'static str),
}

impl HistoryError {
    /// Stable error code for the wire.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotRunning => "SERVICE_NOT_RUNNING",
            Self::AlreadyRunning => "ALREADY_RUNNING",
            Self::Engine(_) => "EVENT_REJECTED",
            Self::Store(StoreError::VersionMismatch) => "VERSION_MISMATCH",
            Self::Store(StoreError::ExecutionNotFound) => "NOT_FOUND",
            Self::Store(StoreError::EventNotFound) => "NOT_FOUND",
            Self::InvalidArgument(_) => "INVALID_ARGUMENT",
            Self::Unimplemented(_) => "UNIMPLEMENTED",
        }
    }

    /// Whether the error is an optimistic-concurrency conflict.
    pub fn is_version_mismatch(&self) -> bool {
        matches!(self, Self::Store(StoreError::VersionMismatch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(HistoryError::NotRunning.error_code(), "SERVICE_NOT_RUNNING");
        assert_eq!(
            HistoryError::Store(StoreError::VersionMismatch).error_code(),
            "VERSION_MISMATCH"
        );
        assert_eq!(
            HistoryError::Store(StoreError::ExecutionNotFound).error_code(),
            "NOT_FOUND"
        );
        assert_eq!(
            HistoryError::Engine(EngineError::EventOutOfOrder).error_code(),
            "EVENT_REJECTED"
        );
        assert!(HistoryError::Store(StoreError::VersionMismatch).is_version_mismatch());
        assert!(!HistoryError::NotRunning.is_version_mismatch());
    }
}
