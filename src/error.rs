// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types shared across services.

/// Application error type.
///
/// Variants mirror the failure taxonomy of the session/tracking core:
/// typed conditions the state machine reacts to (`NotFound`,
/// `AlreadyJoined`, `AlreadyEnded`, ...) plus infrastructure failures.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Not authorized: {0}")]
    NotAuthorized(String),

    #[error("Already joined: {0}")]
    AlreadyJoined(String),

    #[error("Session already ended: {0}")]
    AlreadyEnded(String),

    #[error("Backend quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Whether the caller should suggest a retry to the user.
    ///
    /// Quota and timeout conditions are transient; plain database errors
    /// may be (network blips), so they count as retryable too.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::QuotaExceeded(_) | AppError::Timeout(_) | AppError::Database(_)
        )
    }

    /// Short, actionable message for the UI layer.
    pub fn user_message(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "That session no longer exists.",
            AppError::InvalidState(_) => "This action is not possible right now.",
            AppError::NotAuthorized(_) => "Only the session creator can do that.",
            AppError::AlreadyJoined(_) => "You already joined this session.",
            AppError::AlreadyEnded(_) => "This session has already ended.",
            AppError::QuotaExceeded(_) | AppError::Timeout(_) | AppError::Database(_) => {
                "Connection trouble - please try again."
            }
            AppError::Internal(_) => "Something went wrong.",
        }
    }
}

/// Result type alias for service operations.
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(AppError::QuotaExceeded("rate limit".into()).is_retryable());
        assert!(AppError::Timeout("get_document".into()).is_retryable());
        assert!(AppError::Database("unavailable".into()).is_retryable());

        assert!(!AppError::NotFound("session x".into()).is_retryable());
        assert!(!AppError::NotAuthorized("end".into()).is_retryable());
        assert!(!AppError::AlreadyEnded("session x".into()).is_retryable());
    }

    #[test]
    fn test_quota_distinct_from_database() {
        // Quota errors must stay distinguishable from generic failures.
        let quota = AppError::QuotaExceeded("resource exhausted".into());
        assert!(!matches!(quota, AppError::Database(_)));
    }

    #[test]
    fn test_transient_errors_suggest_retry() {
        let msg = AppError::QuotaExceeded("resource exhausted".into()).user_message();
        assert!(msg.contains("try again"));

        let msg = AppError::NotAuthorized("end".into()).user_message();
        assert!(msg.contains("creator"));
    }
}
