//! Storage layer error types
//!
//! All errors that can occur while talking to git are defined here.
//! We use `thiserror` for ergonomic error definition and better error messages

use std::path::PathBuf;

use thiserror::Error;

use crate::storage::types::InvalidNameError;

/// the main error type for storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    /// error from the underlying Git library
    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    /// I/O error (filesystem level)
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// repo is not initialized
    #[error("repository not initialized: {0}")]
    NotInitialized(PathBuf),

    /// repo has no working directory
    #[error("repository is bare: {0}")]
    BareRepository(PathBuf),

    /// repo is empty (no commits)
    #[error("repository is empty: no commits found")]
    EmptyRepository,

    /// the commit was not found
    #[error("commit not found: {0}")]
    CommitNotFound(String),

    /// the specified branch/ref was not found
    #[error("ref not found: {0}")]
    RefNotFound(String),

    /// branch already exists
    #[error("branch already exists: {0}")]
    BranchAlreadyExists(String),

    /// the checked out branch cannot be deleted
    #[error("cannot delete the checked out branch: {0}")]
    BranchCheckedOut(String),

    /// invalid branch name
    #[error("invalid branch name: {0}")]
    InvalidBranchName(#[from] InvalidNameError),

    /// merge left conflicting paths behind
    #[error("merge conflict: {conflicting_paths:?}")]
    MergeConflict { conflicting_paths: Vec<PathBuf> },

    /// a path handed to the repository is not inside its working directory
    #[error("path is outside the working directory: {0}")]
    OutsideWorkdir(PathBuf),

    /// internal error that shouldn't happen
    #[error("internal error: {0}")]
    Internal(String),
}

/// result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
