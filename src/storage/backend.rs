//! The repository interface the wiki core is written against.
//!
//! The core never talks to git2 directly; it receives something that
//! implements [`VersionControl`] when a [`Wiki`](crate::wiki::Wiki) is built.
//! [`GitRepository`](crate::storage::GitRepository) is the real implementation.
//!
//! All paths are relative to the working directory and use `/` separators.

use std::collections::BTreeSet;
use std::path::Path;

use crate::storage::commit::{CommitInfo, CommitOutcome};
use crate::storage::error::StorageResult;
use crate::storage::tree::SnapshotNode;
use crate::storage::types::{CommitId, GrepMatch};

pub trait VersionControl {
    type Node: SnapshotNode;

    /// root of the working directory
    fn workdir(&self) -> &Path;

    fn current_branch_name(&self) -> StorageResult<String>;

    /// resolve a user supplied revision (full or abbreviated sha, branch, `HEAD~1`)
    fn resolve(&self, spec: &str) -> StorageResult<CommitId>;

    /// content of `path` as committed in `rev`; `None` if the path is absent there
    fn read_blob(&self, rev: CommitId, path: &Path) -> StorageResult<Option<Vec<u8>>>;

    /// content of `path` in the working directory; `None` if there is no such file
    fn read_working_file(&self, path: &Path) -> StorageResult<Option<Vec<u8>>>;

    /// bring the index in line with the working directory for `path`
    /// (file, directory, or a path that no longer exists)
    fn stage(&self, path: &Path) -> StorageResult<()>;

    /// delete `path` from the working directory and the index
    fn remove(&self, path: &Path, recursive: bool) -> StorageResult<()>;

    /// commit the index; an unchanged index is `NothingToCommit`
    fn commit(&self, message: &str) -> CommitOutcome;

    /// every path in the index of the checked out branch
    fn tracked_files(&self) -> StorageResult<BTreeSet<String>>;

    fn is_tracked(&self, path: &Path) -> StorageResult<bool> {
        let path = path.to_string_lossy();
        Ok(self.tracked_files()?.contains(path.as_ref()))
    }

    /// newest-first history from `from` (HEAD if `None`), optionally only
    /// the commits that changed `path`; empty on an unborn branch
    fn log(&self, path: Option<&Path>, from: Option<CommitId>) -> StorageResult<Vec<CommitInfo>>;

    /// unified patch between two commits, optionally limited to `path`
    fn diff(&self, from: CommitId, to: CommitId, path: Option<&Path>) -> StorageResult<String>;

    /// the root tree of `rev` (HEAD if `None`)
    fn snapshot_tree(&self, rev: Option<CommitId>) -> StorageResult<Self::Node>;

    /// lines of committed text files at HEAD containing `pattern`
    fn grep(&self, pattern: &str) -> StorageResult<Vec<GrepMatch>>;
}
