//! storage layer for the wiki
//!
//! this module provides a complete abstraction over git for page storage.
//! The upper layer (pages, attachments, listings) uses the [`VersionControl`]
//! trait and never touches git2 directly.
//!
//!  # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     GitRepository                           │
//! │  (VersionControl: index, working tree, history, snapshots)  │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!        ┌─────────────────────┼─────────────────────┐
//!        │                     │                     │
//!        ▼                     ▼                     ▼
//!  ┌─────────────┐       ┌─────────────┐       ┌─────────────┐
//!  │    tree     │       │   commit    │       │    refs     │
//!  │ (snapshots) │       │  (history)  │       │ (branches)  │
//!  └─────────────┘       └─────────────┘       └─────────────┘
//!  ```
//!
//! # Usage
//!
//! ```ignore
//! use gitwiki::storage::{GitRepository, VersionControl};
//!
//! let repo = GitRepository::open_or_init("./wiki")?;
//! std::fs::write(repo.path().join("home.markdown"), "# Home")?;
//! repo.stage(Path::new("home.markdown"))?;
//! let outcome = repo.commit("created home");
//! ```

mod backend;
mod commit;
mod error;
mod refs;
mod repository;
mod tree;
mod types;

// Re-export public API
pub use backend::VersionControl;
pub use commit::{CommitInfo, CommitMessage, CommitOutcome};
pub use error::{StorageError, StorageResult};
pub use repository::{GitRepository, META_FILE};
pub use tree::{EntryKind, SnapshotNode, TreeNode};
pub use types::{BranchName, CommitId, GitSignature, GrepMatch, InvalidNameError, TreeId};
