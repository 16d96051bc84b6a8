//! # AppError
//!
//! Centralized error handling for the Burrow ecosystem. Every lookup and
//! validation failure is a distinct variant so the delivery layer can map
//! it to the right status without string matching.

use thiserror::Error;

use crate::models::{Forum, Thread, User};

/// The primary error type for all burrow-core operations.
#[derive(Error, Debug)]
pub enum AppError {
    /// Malformed input (e.g. empty post message, bad slug, vote value
    /// outside {+1, -1}).
    #[error("validation failed: {0}")]
    Validation(String),

    /// The thread referenced by id or slug does not exist.
    #[error("thread {0} not found")]
    ThreadNotFound(String),

    /// A post's declared parent does not exist at all.
    #[error("parent post {0} not found")]
    ParentNotFound(i64),

    /// A post's declared parent exists but lives in a different thread.
    /// Signaled distinctly from [`AppError::ParentNotFound`] because the
    /// caller must render a conflict, not a 404.
    #[error("parent post {parent} belongs to another thread (expected {thread})")]
    ParentThreadMismatch { parent: i64, thread: i64 },

    /// A post or thread author does not exist.
    #[error("author {0} not found")]
    AuthorNotFound(String),

    /// The user casting a vote does not exist.
    #[error("voter {0} not found")]
    VoterNotFound(String),

    #[error("user {0} not found")]
    UserNotFound(String),

    #[error("forum {0} not found")]
    ForumNotFound(String),

    #[error("post {0} not found")]
    PostNotFound(i64),

    /// Nickname or email already registered; carries the clashing rows so
    /// the caller can show them.
    #[error("nickname or email already registered")]
    UserConflict(Vec<User>),

    /// A thread with this slug already exists; carries the existing thread.
    #[error("thread slug already taken")]
    ThreadConflict(Box<Thread>),

    /// A forum with this slug already exists; carries the existing forum.
    #[error("forum slug already taken")]
    ForumConflict(Box<Forum>),

    /// Unexpected storage failure (pool exhausted, constraint we do not
    /// handle, I/O error).
    #[error("internal store error: {0}")]
    Store(#[source] anyhow::Error),
}

impl AppError {
    /// Wraps an arbitrary storage-layer failure.
    pub fn store(err: impl Into<anyhow::Error>) -> Self {
        AppError::Store(err.into())
    }
}

/// A specialized Result type for Burrow logic.
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_offender() {
        let err = AppError::ThreadNotFound("rust-lang".into());
        assert_eq!(err.to_string(), "thread rust-lang not found");

        let err = AppError::ParentThreadMismatch { parent: 7, thread: 3 };
        assert!(err.to_string().contains("parent post 7"));
        assert!(err.to_string().contains("expected 3"));
    }

    #[test]
    fn store_wraps_any_error() {
        let io = std::io::Error::other("disk on fire");
        let err = AppError::store(io);
        assert!(matches!(err, AppError::Store(_)));
    }
}
