//!  Commit creation and history traversal
//!
//!  commits are the atomic units of change in the wiki:
//! - each page edit, deletion or upload creates exactly one commit
//! - page history is the list of commits that touched the page file
//! - diffs are rendered as unified patch text, limited to one path
//!
//! this module handles commit creation, history walking, and diff operations

use std::path::Path;

use chrono::{DateTime, TimeZone, Utc};
use git2::{DiffFormat, DiffOptions, Repository, Revwalk, Sort};
use serde::Serialize;

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::{CommitId, GitSignature, TreeId};

/// information about a commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitInfo {
    pub id: CommitId,
    #[serde(skip)]
    pub tree_id: TreeId,
    pub parent_ids: Vec<CommitId>,
    pub message: String,
    pub author_name: String,
    pub author_email: String,
    pub committer_name: String,
    pub committer_email: String,
    pub timestamp: DateTime<Utc>,
}

impl CommitInfo {
    /// create CommitInfo from a git2::Commit
    pub(crate) fn from_git2(commit: &git2::Commit<'_>) -> Self {
        let author = commit.author();
        let committer = commit.committer();
        let timestamp = Utc
            .timestamp_opt(committer.when().seconds(), 0)
            .single()
            .unwrap_or_else(Utc::now);

        Self {
            id: CommitId::new(commit.id()),
            tree_id: TreeId::new(commit.tree_id()),
            parent_ids: commit.parent_ids().map(CommitId::new).collect(),
            message: commit.message().unwrap_or("").to_string(),
            author_name: author.name().unwrap_or("Unknown").to_string(),
            author_email: author.email().unwrap_or("unknown@unknown").to_string(),
            committer_name: committer.name().unwrap_or("Unknown").to_string(),
            committer_email: committer.email().unwrap_or("unknown@unknown").to_string(),
            timestamp,
        }
    }

    /// check if this is a merge commit (has multiple parents)
    pub fn is_merge(&self) -> bool {
        self.parent_ids.len() > 1
    }

    /// get a short summary of the commit (first line of message)
    pub fn summary(&self) -> &str {
        self.message.lines().next().unwrap_or(&self.message)
    }
}

/// What happened when the index was committed.
///
/// Git refuses nothing here; an unchanged index is reported as
/// `NothingToCommit` so callers can tell a no-op from a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed(CommitId),
    NothingToCommit,
    Failed(String),
}

impl CommitOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, CommitOutcome::Committed(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, CommitOutcome::Failed(_))
    }

    /// the new commit, if one was made
    pub fn commit_id(&self) -> Option<CommitId> {
        match self {
            CommitOutcome::Committed(id) => Some(*id),
            _ => None,
        }
    }
}

impl From<StorageResult<Option<CommitId>>> for CommitOutcome {
    fn from(result: StorageResult<Option<CommitId>>) -> Self {
        match result {
            Ok(Some(id)) => CommitOutcome::Committed(id),
            Ok(None) => CommitOutcome::NothingToCommit,
            Err(e) => CommitOutcome::Failed(e.to_string()),
        }
    }
}

/// builder for creating commits with a fluent interface
pub struct CommitBuilder<'a> {
    repo: &'a Repository,
    tree_id: Option<TreeId>,
    parents: Vec<CommitId>,
    message: String,
    signature: GitSignature,
    update_ref: Option<String>,
}

impl<'a> CommitBuilder<'a> {
    /// create a new CommitBuilder
    pub fn new(repo: &'a Repository) -> Self {
        Self {
            repo,
            tree_id: None,
            parents: Vec::new(),
            message: String::new(),
            signature: GitSignature::wiki(),
            update_ref: None,
        }
    }

    /// set the tree for this commit
    pub fn tree(mut self, tree_id: TreeId) -> Self {
        self.tree_id = Some(tree_id);
        self
    }

    /// add a parent commit
    pub fn parent(mut self, parent: CommitId) -> Self {
        self.parents.push(parent);
        self
    }

    /// set the commit message
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// set the author/committer signature
    pub fn signature(mut self, signature: GitSignature) -> Self {
        self.signature = signature;
        self
    }

    /// update a ref (branch) to point to this commit
    pub fn update_ref(mut self, refname: impl Into<String>) -> Self {
        self.update_ref = Some(refname.into());
        self
    }

    /// create the commit and return its ID
    pub fn commit(self) -> StorageResult<CommitId> {
        let tree_id = self
            .tree_id
            .ok_or_else(|| StorageError::Internal("commit requires a tree".to_string()))?;

        let tree = self.repo.find_tree(tree_id.raw())?;
        let sig = self.signature.to_git2_signature()?;

        let parent_commits: Vec<git2::Commit<'_>> = self
            .parents
            .iter()
            .map(|id| self.repo.find_commit(id.raw()))
            .collect::<Result<_, _>>()?;

        let parent_refs: Vec<&git2::Commit<'_>> = parent_commits.iter().collect();

        let oid = self.repo.commit(
            self.update_ref.as_deref(),
            &sig,
            &sig,
            &self.message,
            &tree,
            &parent_refs,
        )?;

        Ok(CommitId::new(oid))
    }
}

/// get information about a commit
pub fn get_commit(repo: &Repository, id: CommitId) -> StorageResult<CommitInfo> {
    let commit = repo
        .find_commit(id.raw())
        .map_err(|_| StorageError::CommitNotFound(id.to_string()))?;

    Ok(CommitInfo::from_git2(&commit))
}

/// commit whatever is staged in the index on top of HEAD
///
/// Returns `None` when the index tree equals the HEAD tree.
pub fn commit_index(
    repo: &Repository,
    message: &str,
    signature: &GitSignature,
) -> StorageResult<Option<CommitId>> {
    let mut index = repo.index()?;
    let tree_id = TreeId::new(index.write_tree()?);

    let parent = match repo.head() {
        Ok(head) => Some(head.peel_to_commit()?),
        Err(e) if e.code() == git2::ErrorCode::UnbornBranch => None,
        Err(e) => return Err(StorageError::Git(e)),
    };

    if let Some(parent) = &parent {
        if parent.tree_id() == tree_id.raw() {
            return Ok(None);
        }
    }

    let mut builder = CommitBuilder::new(repo)
        .tree(tree_id)
        .message(message)
        .signature(signature.clone())
        .update_ref("HEAD");
    if let Some(parent) = &parent {
        builder = builder.parent(CommitId::new(parent.id()));
    }
    builder.commit().map(Some)
}

/// render a unified patch between two commits, optionally limited to one path
pub fn diff_patch(
    repo: &Repository,
    old: CommitId,
    new: CommitId,
    path: Option<&Path>,
) -> StorageResult<String> {
    let old_tree = repo.find_commit(old.raw())?.tree()?;
    let new_tree = repo.find_commit(new.raw())?.tree()?;

    let mut opts = DiffOptions::new();
    if let Some(path) = path {
        opts.pathspec(path);
    }
    let diff = repo.diff_tree_to_tree(Some(&old_tree), Some(&new_tree), Some(&mut opts))?;

    let mut patch = String::new();
    diff.print(DiffFormat::Patch, |_delta, _hunk, line| {
        if let origin @ ('+' | '-' | ' ') = line.origin() {
            patch.push(origin);
        }
        patch.push_str(&String::from_utf8_lossy(line.content()));
        true
    })?;

    Ok(patch)
}

/// iterate over commit history starting from a commit
pub struct HistoryIterator<'repo> {
    repo: &'repo Repository,
    revwalk: Revwalk<'repo>,
}

impl<'repo> HistoryIterator<'repo> {
    /// create a new history iterator
    pub fn new(repo: &'repo Repository, start: CommitId) -> StorageResult<Self> {
        let mut revwalk = repo.revwalk()?;
        revwalk.push(start.raw())?;
        revwalk.set_sorting(Sort::TIME | Sort::TOPOLOGICAL)?;

        Ok(Self { repo, revwalk })
    }
}

impl<'repo> Iterator for HistoryIterator<'repo> {
    type Item = StorageResult<git2::Commit<'repo>>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.revwalk.next()? {
            Ok(oid) => Some(self.repo.find_commit(oid).map_err(StorageError::Git)),
            Err(e) => Some(Err(StorageError::Git(e))),
        }
    }
}

/// newest-first history starting at `start`
///
/// With a path, only commits whose version of the path differs from every
/// parent are kept, which is what `git log -- <path>` shows.
pub fn history(repo: &Repository, start: CommitId, path: Option<&Path>) -> StorageResult<Vec<CommitInfo>> {
    let mut commits = Vec::new();
    for commit in HistoryIterator::new(repo, start)? {
        let commit = commit?;
        let keep = match path {
            Some(path) => touches_path(&commit, path)?,
            None => true,
        };
        if keep {
            commits.push(CommitInfo::from_git2(&commit));
        }
    }
    Ok(commits)
}

fn touches_path(commit: &git2::Commit<'_>, path: &Path) -> StorageResult<bool> {
    let ours = entry_id(&commit.tree()?, path);

    if commit.parent_count() == 0 {
        return Ok(ours.is_some());
    }
    for parent in commit.parents() {
        if entry_id(&parent.tree()?, path) == ours {
            return Ok(false);
        }
    }
    Ok(true)
}

fn entry_id(tree: &git2::Tree<'_>, path: &Path) -> Option<git2::Oid> {
    tree.get_path(path).ok().map(|entry| entry.id())
}

/// message formatting for wiki operations
pub struct CommitMessage;

impl CommitMessage {
    /// a page was written; `created` on first write, `edited` afterwards
    pub fn page_saved(basename: &str, existed: bool, note: Option<&str>) -> String {
        let verb = if existed { "edited" } else { "created" };
        match note.filter(|n| !n.is_empty()) {
            Some(note) => format!("{} {} : {}", verb, basename, note),
            None => format!("{} {}", verb, basename),
        }
    }

    pub fn page_deleted(basename: &str) -> String {
        format!("deleted {}", basename)
    }

    pub fn file_uploaded(file: &str, basename: &str) -> String {
        format!("uploaded {} for {}", file, basename)
    }

    pub fn file_removed(file: &str, basename: &str) -> String {
        format!("removed {} for {}", file, basename)
    }

    pub fn repository_initialized() -> String {
        "initialized wiki".to_string()
    }

    pub fn branch_reverted() -> String {
        "reverted branch".to_string()
    }

    pub fn branch_merged(branch: &str) -> String {
        format!("merged branch {}", branch)
    }
}
