//!  Branch and reference management.
//!
//!  Git refs are pointers to commits.  This module handles:
//! - resolving HEAD and the checked out branch name
//! - branch lifecycle (create, checkout, delete, list)
//! - merging another branch into the checked out one
//!
//! The wiki core only ever reads HEAD; everything else is here for the
//! routing layer, which lets users keep drafts on separate branches.

use std::path::PathBuf;

use git2::build::CheckoutBuilder;
use git2::{BranchType, Repository};

use crate::storage::commit::{CommitBuilder, CommitMessage};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::{BranchName, CommitId, GitSignature, TreeId};

/// Manages Git references (branches).
pub struct RefManager;

impl RefManager {
    /// Resolve a branch name to its current commit ID.
    pub fn resolve_branch(repo: &Repository, branch: &BranchName) -> StorageResult<CommitId> {
        let reference = repo
            .find_reference(&branch.as_ref_path())
            .map_err(|_| StorageError::RefNotFound(branch.to_string()))?;

        let commit = reference
            .peel_to_commit()
            .map_err(|_| StorageError::RefNotFound(branch.to_string()))?;

        Ok(CommitId::new(commit.id()))
    }

    /// Get the current HEAD commit.
    pub fn head_commit(repo: &Repository) -> StorageResult<CommitId> {
        let head = repo.head().map_err(|e| {
            if e.code() == git2::ErrorCode::UnbornBranch {
                StorageError::EmptyRepository
            } else {
                StorageError::Git(e)
            }
        })?;

        let commit = head.peel_to_commit()?;
        Ok(CommitId::new(commit.id()))
    }

    /// Get the HEAD commit, or `None` on an unborn branch.
    pub fn try_head_commit(repo: &Repository) -> StorageResult<Option<CommitId>> {
        match Self::head_commit(repo) {
            Ok(id) => Ok(Some(id)),
            Err(StorageError::EmptyRepository) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Name of the checked out branch, also for an unborn branch.
    pub fn current_branch(repo: &Repository) -> StorageResult<String> {
        let head = repo.find_reference("HEAD")?;
        match head.symbolic_target() {
            Some(target) => Ok(target.strip_prefix("refs/heads/").unwrap_or(target).to_string()),
            None => Ok("HEAD".to_string()),
        }
    }

    /// Check if a branch exists.
    pub fn branch_exists(repo: &Repository, branch: &BranchName) -> bool {
        repo.find_reference(&branch.as_ref_path()).is_ok()
    }

    /// Create a new branch pointing to the given commit.
    pub fn create_branch(repo: &Repository, branch: &BranchName, target: CommitId) -> StorageResult<()> {
        if Self::branch_exists(repo, branch) {
            return Err(StorageError::BranchAlreadyExists(branch.to_string()));
        }

        let commit = repo.find_commit(target.raw())?;
        repo.branch(branch.as_str(), &commit, false)?;

        Ok(())
    }

    /// Point HEAD at a branch and force the working tree and index to match it.
    pub fn checkout_branch(repo: &Repository, branch: &BranchName) -> StorageResult<()> {
        if !Self::branch_exists(repo, branch) {
            return Err(StorageError::RefNotFound(branch.to_string()));
        }
        repo.set_head(&branch.as_ref_path())?;
        repo.checkout_head(Some(CheckoutBuilder::new().force()))?;
        Ok(())
    }

    /// Delete a branch. The checked out branch cannot be deleted.
    pub fn delete_branch(repo: &Repository, branch: &BranchName) -> StorageResult<()> {
        let mut git_branch = repo
            .find_branch(branch.as_str(), BranchType::Local)
            .map_err(|_| StorageError::RefNotFound(branch.to_string()))?;

        if git_branch.is_head() {
            return Err(StorageError::BranchCheckedOut(branch.to_string()));
        }
        git_branch.delete()?;

        Ok(())
    }

    /// List all local branches.
    pub fn list_branches(repo: &Repository) -> StorageResult<Vec<BranchName>> {
        let branches = repo.branches(Some(BranchType::Local))?;

        let mut result = Vec::new();
        for branch_result in branches {
            let (branch, _) = branch_result?;
            if let Some(name) = branch.name()? {
                if let Ok(branch_name) = BranchName::new(name) {
                    result.push(branch_name);
                }
            }
        }
        result.sort_by(|a, b| a.as_str().cmp(b.as_str()));

        Ok(result)
    }

    /// Merge `branch` into the checked out branch.
    ///
    /// Fast-forwards when possible, otherwise writes a merge commit. Conflicts
    /// abort the merge without touching HEAD. Returns the new HEAD, or `None`
    /// if there was nothing to merge.
    pub fn merge_branch(
        repo: &Repository,
        branch: &BranchName,
        signature: &GitSignature,
    ) -> StorageResult<Option<CommitId>> {
        let theirs = Self::resolve_branch(repo, branch)?;
        let ours = Self::head_commit(repo)?;

        let annotated = repo.find_annotated_commit(theirs.raw())?;
        let (analysis, _) = repo.merge_analysis(&[&annotated])?;

        if analysis.is_up_to_date() {
            return Ok(None);
        }

        if analysis.is_fast_forward() {
            let mut head = repo.head()?;
            head.set_target(theirs.raw(), &format!("fast-forward to {}", branch))?;
            repo.checkout_head(Some(CheckoutBuilder::new().force()))?;
            return Ok(Some(theirs));
        }

        let our_commit = repo.find_commit(ours.raw())?;
        let their_commit = repo.find_commit(theirs.raw())?;
        let mut index = repo.merge_commits(&our_commit, &their_commit, None)?;

        if index.has_conflicts() {
            let conflicting_paths = index
                .conflicts()?
                .filter_map(|conflict| conflict.ok())
                .filter_map(|conflict| conflict.our.or(conflict.their))
                .map(|entry| PathBuf::from(String::from_utf8_lossy(&entry.path).into_owned()))
                .collect();
            return Err(StorageError::MergeConflict { conflicting_paths });
        }

        let tree_id = TreeId::new(index.write_tree_to(repo)?);
        let merged = CommitBuilder::new(repo)
            .tree(tree_id)
            .parent(ours)
            .parent(theirs)
            .message(CommitMessage::branch_merged(branch.as_str()))
            .signature(signature.clone())
            .update_ref("HEAD")
            .commit()?;
        repo.checkout_head(Some(CheckoutBuilder::new().force()))?;

        Ok(Some(merged))
    }

    /// Commit the tree of `target` on top of HEAD, restoring every file to
    /// how it was at that commit.
    pub fn revert_to(repo: &Repository, target: CommitId, signature: &GitSignature) -> StorageResult<CommitId> {
        let head = Self::head_commit(repo)?;
        let target_commit = repo
            .find_commit(target.raw())
            .map_err(|_| StorageError::CommitNotFound(target.to_string()))?;

        let reverted = CommitBuilder::new(repo)
            .tree(TreeId::new(target_commit.tree_id()))
            .parent(head)
            .message(CommitMessage::branch_reverted())
            .signature(signature.clone())
            .update_ref("HEAD")
            .commit()?;
        repo.checkout_head(Some(CheckoutBuilder::new().force()))?;

        Ok(reverted)
    }
}
