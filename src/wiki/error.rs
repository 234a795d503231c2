//! Wiki layer error types.

use std::path::PathBuf;

use thiserror::Error;

use crate::storage::StorageError;

/// Result type for wiki operations.
pub type WikiResult<T> = Result<T, WikiError>;

/// Wiki errors.
///
/// Whether storage failures reach the caller depends on the configured
/// [`ErrorPolicy`](crate::wiki::ErrorPolicy); `PathEscape` always does.
#[derive(Debug, Error)]
pub enum WikiError {
    /// a page or attachment name resolved outside the wiki root
    #[error("invalid path {path:?}, must be under the wiki repository {root:?}")]
    PathEscape { path: PathBuf, root: PathBuf },

    /// the page is bound to a historical revision
    #[error("page {0} is a read-only view of a past revision")]
    ReadOnlyRevision(String),

    /// nothing usable is left of a page or attachment name after normalizing
    #[error("invalid name {0:?}")]
    InvalidName(String),

    /// git refused the commit (only surfaced under the strict policy)
    #[error("commit failed: {0}")]
    CommitFailed(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl WikiError {
    /// sandbox violations abort regardless of policy
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            WikiError::PathEscape { .. } | WikiError::ReadOnlyRevision(_) | WikiError::InvalidName(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_errors() {
        let escape = WikiError::PathEscape {
            path: PathBuf::from("../x"),
            root: PathBuf::from("/wiki"),
        };
        assert!(escape.is_fatal());
        assert!(WikiError::ReadOnlyRevision("home".into()).is_fatal());
        assert!(!WikiError::CommitFailed("locked".into()).is_fatal());
        assert!(!WikiError::Storage(StorageError::Internal("x".into())).is_fatal());
    }

    #[test]
    fn test_error_display() {
        let err = WikiError::from(StorageError::CommitNotFound("abc".into()));
        assert!(err.to_string().starts_with("storage error"));
        assert_eq!(WikiError::CommitFailed("locked".into()).to_string(), "commit failed: locked");
    }
}
