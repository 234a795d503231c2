//!   Core Git repository wrapper.
//!
//!  This is the central component of the storage layer.  It wraps `git2::Repository`
//!  with shared access and implements [`VersionControl`] on top of the index and
//!  working directory, so that a wiki page is an ordinary tracked file.
//!
//! All other storage modules use this for Git access.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use git2::{IndexAddOption, ObjectType, Repository, TreeWalkMode, TreeWalkResult};
use log::debug;
use parking_lot::RwLock;

use crate::storage::backend::VersionControl;
use crate::storage::commit::{self, CommitInfo, CommitMessage, CommitOutcome};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::refs::RefManager;
use crate::storage::tree::TreeNode;
use crate::storage::types::{BranchName, CommitId, GitSignature, GrepMatch};

/// File committed by [`GitRepository::init`] so a fresh wiki always has a HEAD.
pub const META_FILE: &str = ".meta";

/// The main Git repository wrapper.
///
/// Clone this to share it - it uses Arc internally.
#[derive(Clone)]
pub struct GitRepository {
    inner: Arc<GitRepositoryInner>,
}

struct GitRepositoryInner {
    repo: RwLock<Repository>,
    path: PathBuf,
    signature: RwLock<GitSignature>,
}

impl GitRepository {
    /// Open an existing repository with a working directory.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        let repo = Repository::open(path).map_err(|_| StorageError::NotInitialized(path.to_path_buf()))?;
        Self::wrap(repo, path)
    }

    /// Initialize a new repository and commit the `.meta` marker file.
    pub fn init(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        fs::create_dir_all(path)?;
        let repo = Repository::init(path)?;
        let storage = Self::wrap(repo, path)?;

        let branch = storage.current_branch_name()?;
        fs::write(storage.path().join(META_FILE), format!("{}\n", branch))?;
        storage.stage(Path::new(META_FILE))?;
        match storage.commit(&CommitMessage::repository_initialized()) {
            CommitOutcome::Failed(reason) => return Err(StorageError::Internal(reason)),
            _ => debug!("initialized wiki repository at {}", storage.path().display()),
        }

        Ok(storage)
    }

    /// Open or initialize a repository.
    pub fn open_or_init(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        if path.join(".git").exists() {
            Self::open(path)
        } else {
            Self::init(path)
        }
    }

    fn wrap(repo: Repository, path: &Path) -> StorageResult<Self> {
        let workdir = repo
            .workdir()
            .ok_or_else(|| StorageError::BareRepository(path.to_path_buf()))?
            .canonicalize()?;

        Ok(Self {
            inner: Arc::new(GitRepositoryInner {
                repo: RwLock::new(repo),
                path: workdir,
                signature: RwLock::new(GitSignature::wiki()),
            }),
        })
    }

    /// Get the canonical working directory path.
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Set the signature for commits made through this handle and its clones.
    pub fn set_signature(&self, signature: GitSignature) {
        *self.inner.signature.write() = signature;
    }

    pub fn signature(&self) -> GitSignature {
        self.inner.signature.read().clone()
    }

    /// Execute a function with read access to the repository.
    pub fn with_repo<F, T>(&self, f: F) -> StorageResult<T>
    where
        F: FnOnce(&Repository) -> StorageResult<T>,
    {
        let repo = self.inner.repo.read();
        f(&repo)
    }

    /// Execute a function with write access to the repository.
    pub fn with_repo_mut<F, T>(&self, f: F) -> StorageResult<T>
    where
        F: FnOnce(&Repository) -> StorageResult<T>,
    {
        let repo = self.inner.repo.write();
        f(&repo)
    }

    /// Validate a repository relative path: no root, no `..`.
    fn relative(&self, path: &Path) -> StorageResult<PathBuf> {
        let path = path.strip_prefix(self.path()).unwrap_or(path);
        let mut clean = PathBuf::new();
        for component in path.components() {
            match component {
                Component::Normal(part) => clean.push(part),
                Component::CurDir => {}
                _ => return Err(StorageError::OutsideWorkdir(path.to_path_buf())),
            }
        }
        if clean.as_os_str().is_empty() {
            return Err(StorageError::OutsideWorkdir(path.to_path_buf()));
        }
        Ok(clean)
    }

    // ==================== High-level Operations ====================

    /// Get the current HEAD commit.
    pub fn head(&self) -> StorageResult<CommitId> {
        self.with_repo(RefManager::head_commit)
    }

    /// Get information about a commit.
    pub fn get_commit(&self, id: CommitId) -> StorageResult<CommitInfo> {
        self.with_repo(|repo| commit::get_commit(repo, id))
    }

    // ==================== Branch Operations ====================

    /// List all local branches.
    pub fn list_branches(&self) -> StorageResult<Vec<BranchName>> {
        self.with_repo(RefManager::list_branches)
    }

    /// Create a branch at HEAD.
    pub fn create_branch(&self, name: &str) -> StorageResult<BranchName> {
        let branch = BranchName::new(name)?;
        self.with_repo_mut(|repo| {
            let head = RefManager::head_commit(repo)?;
            RefManager::create_branch(repo, &branch, head)
        })?;
        Ok(branch)
    }

    /// Delete a branch other than the checked out one.
    pub fn delete_branch(&self, name: &str) -> StorageResult<()> {
        let branch = BranchName::new(name)?;
        self.with_repo_mut(|repo| RefManager::delete_branch(repo, &branch))
    }

    /// Switch the working directory to another branch.
    pub fn checkout_branch(&self, name: &str) -> StorageResult<()> {
        let branch = BranchName::new(name)?;
        self.with_repo_mut(|repo| RefManager::checkout_branch(repo, &branch))
    }

    /// Merge a branch into the checked out one.
    pub fn merge_branch(&self, name: &str) -> StorageResult<Option<CommitId>> {
        let branch = BranchName::new(name)?;
        let signature = self.signature();
        self.with_repo_mut(|repo| RefManager::merge_branch(repo, &branch, &signature))
    }

    /// Restore the whole wiki to how it was at `target`, as a new commit.
    pub fn revert_to(&self, target: CommitId) -> StorageResult<CommitId> {
        let signature = self.signature();
        self.with_repo_mut(|repo| RefManager::revert_to(repo, target, &signature))
    }

    // ==================== Remote Operations ====================

    pub fn add_remote(&self, name: &str, url: &str) -> StorageResult<()> {
        self.with_repo_mut(|repo| {
            repo.remote(name, url)?;
            Ok(())
        })
    }

    /// Fetch the default refspecs of a configured remote.
    pub fn fetch(&self, name: &str) -> StorageResult<()> {
        self.with_repo_mut(|repo| {
            let mut remote = repo
                .find_remote(name)
                .map_err(|_| StorageError::RefNotFound(name.to_string()))?;
            remote.fetch(&[] as &[&str], None, None)?;
            Ok(())
        })
    }
}

impl VersionControl for GitRepository {
    type Node = TreeNode;

    fn workdir(&self) -> &Path {
        self.path()
    }

    fn current_branch_name(&self) -> StorageResult<String> {
        self.with_repo(RefManager::current_branch)
    }

    fn resolve(&self, spec: &str) -> StorageResult<CommitId> {
        self.with_repo(|repo| {
            let commit = repo
                .revparse_single(spec)
                .and_then(|object| object.peel_to_commit())
                .map_err(|_| StorageError::CommitNotFound(spec.to_string()))?;
            Ok(CommitId::new(commit.id()))
        })
    }

    fn read_blob(&self, rev: CommitId, path: &Path) -> StorageResult<Option<Vec<u8>>> {
        let path = self.relative(path)?;
        self.with_repo(|repo| {
            let tree = repo
                .find_commit(rev.raw())
                .map_err(|_| StorageError::CommitNotFound(rev.to_string()))?
                .tree()?;
            let entry = match tree.get_path(&path) {
                Ok(entry) => entry,
                Err(e) if e.code() == git2::ErrorCode::NotFound => return Ok(None),
                Err(e) => return Err(StorageError::Git(e)),
            };
            if entry.kind() != Some(ObjectType::Blob) {
                return Ok(None);
            }
            let blob = repo.find_blob(entry.id())?;
            Ok(Some(blob.content().to_vec()))
        })
    }

    fn read_working_file(&self, path: &Path) -> StorageResult<Option<Vec<u8>>> {
        let full = self.path().join(self.relative(path)?);
        match fs::read(&full) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    fn stage(&self, path: &Path) -> StorageResult<()> {
        let rel = self.relative(path)?;
        let full = self.path().join(&rel);
        self.with_repo_mut(|repo| {
            let mut index = repo.index()?;
            if full.is_dir() {
                index.add_all([rel.as_path()], IndexAddOption::DEFAULT, None)?;
                index.update_all([rel.as_path()], None)?;
            } else if full.exists() {
                index.add_path(&rel)?;
            } else {
                index.remove_path(&rel)?;
                index.remove_dir(&rel, 0)?;
            }
            index.write()?;
            Ok(())
        })
    }

    fn remove(&self, path: &Path, recursive: bool) -> StorageResult<()> {
        let rel = self.relative(path)?;
        let full = self.path().join(&rel);
        if recursive && full.is_dir() {
            fs::remove_dir_all(&full)?;
        } else if full.is_file() {
            fs::remove_file(&full)?;
        }
        self.with_repo_mut(|repo| {
            let mut index = repo.index()?;
            if recursive {
                index.remove_dir(&rel, 0)?;
            }
            index.remove_path(&rel)?;
            index.write()?;
            Ok(())
        })
    }

    fn commit(&self, message: &str) -> CommitOutcome {
        let signature = self.signature();
        let outcome: CommitOutcome = self
            .with_repo_mut(|repo| commit::commit_index(repo, message, &signature))
            .into();
        debug!("commit {:?}: {:?}", message, outcome);
        outcome
    }

    fn tracked_files(&self) -> StorageResult<BTreeSet<String>> {
        self.with_repo(|repo| {
            let mut index = repo.index()?;
            index.read(false)?;
            Ok(index
                .iter()
                .map(|entry| String::from_utf8_lossy(&entry.path).into_owned())
                .collect())
        })
    }

    fn log(&self, path: Option<&Path>, from: Option<CommitId>) -> StorageResult<Vec<CommitInfo>> {
        let path = path.map(|p| self.relative(p)).transpose()?;
        self.with_repo(|repo| {
            let start = match from {
                Some(id) => id,
                None => match RefManager::try_head_commit(repo)? {
                    Some(id) => id,
                    None => return Ok(Vec::new()),
                },
            };
            commit::history(repo, start, path.as_deref())
        })
    }

    fn diff(&self, from: CommitId, to: CommitId, path: Option<&Path>) -> StorageResult<String> {
        let path = path.map(|p| self.relative(p)).transpose()?;
        self.with_repo(|repo| commit::diff_patch(repo, from, to, path.as_deref()))
    }

    fn snapshot_tree(&self, rev: Option<CommitId>) -> StorageResult<TreeNode> {
        let tree_id = self.with_repo(|repo| {
            let id = match rev {
                Some(id) => id,
                None => RefManager::head_commit(repo)?,
            };
            let commit = repo
                .find_commit(id.raw())
                .map_err(|_| StorageError::CommitNotFound(id.to_string()))?;
            Ok(commit.tree_id())
        })?;
        Ok(TreeNode::root(self.clone(), tree_id))
    }

    fn grep(&self, pattern: &str) -> StorageResult<Vec<GrepMatch>> {
        self.with_repo(|repo| {
            let head = match RefManager::try_head_commit(repo)? {
                Some(id) => id,
                None => return Ok(Vec::new()),
            };
            let tree = repo.find_commit(head.raw())?.tree()?;

            let mut blobs = Vec::new();
            tree.walk(TreeWalkMode::PreOrder, |root, entry| {
                if entry.kind() == Some(ObjectType::Blob) {
                    if let Some(name) = entry.name() {
                        blobs.push((format!("{}{}", root, name), entry.id()));
                    }
                }
                TreeWalkResult::Ok
            })?;

            let mut matches = Vec::new();
            for (path, id) in blobs {
                let blob = repo.find_blob(id)?;
                if blob.is_binary() {
                    continue;
                }
                let text = String::from_utf8_lossy(blob.content());
                for (i, line) in text.lines().enumerate() {
                    if line.contains(pattern) {
                        matches.push(GrepMatch {
                            path: path.clone(),
                            line_number: i + 1,
                            line: line.to_string(),
                        });
                    }
                }
            }
            Ok(matches)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::tree::SnapshotNode;
    use tempfile::TempDir;

    fn setup() -> (TempDir, GitRepository) {
        let dir = TempDir::new().unwrap();
        let repo = GitRepository::init(dir.path()).unwrap();
        (dir, repo)
    }

    fn write(repo: &GitRepository, name: &str, body: &str) {
        let full = repo.path().join(name);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(full, body).unwrap();
    }

    #[test]
    fn test_init_and_open() {
        let dir = TempDir::new().unwrap();

        let repo = GitRepository::init(dir.path()).unwrap();
        let head1 = repo.head().unwrap();
        assert!(repo.tracked_files().unwrap().contains(META_FILE));

        drop(repo);
        let repo = GitRepository::open(dir.path()).unwrap();
        assert_eq!(head1, repo.head().unwrap());
    }

    #[test]
    fn test_open_or_init() {
        let dir = TempDir::new().unwrap();

        let repo1 = GitRepository::open_or_init(dir.path()).unwrap();
        let head1 = repo1.head().unwrap();

        drop(repo1);
        let repo2 = GitRepository::open_or_init(dir.path()).unwrap();
        assert_eq!(head1, repo2.head().unwrap());
    }

    #[test]
    fn test_open_missing_fails() {
        let dir = TempDir::new().unwrap();
        let result = GitRepository::open(dir.path().join("nope"));
        assert!(matches!(result, Err(StorageError::NotInitialized(_))));
    }

    #[test]
    fn test_stage_commit_and_read() {
        let (_dir, repo) = setup();
        write(&repo, "home.markdown", "hello");
        repo.stage(Path::new("home.markdown")).unwrap();
        let id = repo.commit("created home").commit_id().unwrap();

        assert!(repo.is_tracked(Path::new("home.markdown")).unwrap());
        assert_eq!(
            repo.read_blob(id, Path::new("home.markdown")).unwrap(),
            Some(b"hello".to_vec())
        );
        assert_eq!(repo.read_blob(id, Path::new("missing.markdown")).unwrap(), None);
        assert_eq!(
            repo.read_working_file(Path::new("home.markdown")).unwrap(),
            Some(b"hello".to_vec())
        );
        assert_eq!(repo.read_working_file(Path::new("missing.markdown")).unwrap(), None);
    }

    #[test]
    fn test_commit_without_changes_is_noop() {
        let (_dir, repo) = setup();
        assert_eq!(repo.commit("nothing"), CommitOutcome::NothingToCommit);
    }

    #[test]
    fn test_remove_recursive() {
        let (_dir, repo) = setup();
        write(&repo, "pets_files/cat.png", "png");
        write(&repo, "pets_files/dog.png", "png");
        repo.stage(Path::new("pets_files")).unwrap();
        repo.commit("uploads");
        assert!(repo.is_tracked(Path::new("pets_files/cat.png")).unwrap());

        repo.remove(Path::new("pets_files"), true).unwrap();
        assert!(repo.commit("drop uploads").is_committed());

        assert!(!repo.path().join("pets_files").exists());
        let tracked = repo.tracked_files().unwrap();
        assert!(!tracked.iter().any(|p| p.starts_with("pets_files/")));
    }

    #[test]
    fn test_stage_deleted_file() {
        let (_dir, repo) = setup();
        write(&repo, "a.markdown", "a");
        repo.stage(Path::new("a.markdown")).unwrap();
        repo.commit("add a");

        fs::remove_file(repo.path().join("a.markdown")).unwrap();
        repo.stage(Path::new("a.markdown")).unwrap();
        assert!(repo.commit("rm a").is_committed());
        assert!(!repo.is_tracked(Path::new("a.markdown")).unwrap());
    }

    #[test]
    fn test_paths_outside_workdir_rejected() {
        let (_dir, repo) = setup();
        assert!(matches!(
            repo.stage(Path::new("../escape.markdown")),
            Err(StorageError::OutsideWorkdir(_))
        ));
        assert!(matches!(
            repo.read_working_file(Path::new("/etc/passwd")),
            Err(StorageError::OutsideWorkdir(_))
        ));
    }

    #[test]
    fn test_log_and_diff() {
        let (_dir, repo) = setup();
        write(&repo, "a.markdown", "one\n");
        repo.stage(Path::new("a.markdown")).unwrap();
        let c1 = repo.commit("one").commit_id().unwrap();
        write(&repo, "a.markdown", "two\n");
        repo.stage(Path::new("a.markdown")).unwrap();
        let c2 = repo.commit("two").commit_id().unwrap();

        let log = repo.log(Some(Path::new("a.markdown")), None).unwrap();
        assert_eq!(log.iter().map(|c| c.id).collect::<Vec<_>>(), vec![c2, c1]);

        let from_c1 = repo.log(Some(Path::new("a.markdown")), Some(c1)).unwrap();
        assert_eq!(from_c1.len(), 1);

        // the init commit is in the full log too
        assert_eq!(repo.log(None, None).unwrap().len(), 3);

        let patch = repo.diff(c1, c2, Some(Path::new("a.markdown"))).unwrap();
        assert!(patch.contains("-one"));
        assert!(patch.contains("+two"));
    }

    #[test]
    fn test_resolve_revision() {
        let (_dir, repo) = setup();
        let head = repo.head().unwrap();
        assert_eq!(repo.resolve("HEAD").unwrap(), head);
        assert_eq!(repo.resolve(&head.short()).unwrap(), head);
        assert!(matches!(repo.resolve("nope"), Err(StorageError::CommitNotFound(_))));
    }

    #[test]
    fn test_grep() {
        let (_dir, repo) = setup();
        write(&repo, "home.markdown", "first\nneedle here\n");
        write(&repo, "dir1/page.markdown", "another needle\n");
        repo.stage(Path::new("home.markdown")).unwrap();
        repo.stage(Path::new("dir1")).unwrap();
        repo.commit("pages");

        let found = repo.grep("needle").unwrap();
        assert_eq!(found.len(), 2);
        assert!(found
            .iter()
            .any(|m| m.path == "home.markdown" && m.line_number == 2 && m.line == "needle here"));
        assert!(found.iter().any(|m| m.path == "dir1/page.markdown"));
    }

    #[test]
    fn test_snapshot_at_revision() {
        let (_dir, repo) = setup();
        let initial = repo.head().unwrap();
        write(&repo, "a.markdown", "a");
        repo.stage(Path::new("a.markdown")).unwrap();
        repo.commit("a");

        let old = repo.snapshot_tree(Some(initial)).unwrap();
        assert!(!old.children().unwrap().contains_key("a.markdown"));
        let new = repo.snapshot_tree(None).unwrap();
        assert!(new.children().unwrap().contains_key("a.markdown"));
    }

    #[test]
    fn test_branches_through_handle() {
        let (_dir, repo) = setup();
        let trunk = repo.current_branch_name().unwrap();

        repo.create_branch("draft").unwrap();
        repo.checkout_branch("draft").unwrap();
        write(&repo, "draft.markdown", "wip");
        repo.stage(Path::new("draft.markdown")).unwrap();
        repo.commit("wip");
        assert!(repo.is_tracked(Path::new("draft.markdown")).unwrap());

        repo.checkout_branch(&trunk).unwrap();
        assert!(!repo.is_tracked(Path::new("draft.markdown")).unwrap());

        repo.merge_branch("draft").unwrap();
        assert!(repo.is_tracked(Path::new("draft.markdown")).unwrap());

        repo.delete_branch("draft").unwrap();
        let names: Vec<String> = repo
            .list_branches()
            .unwrap()
            .into_iter()
            .map(|b| b.as_str().to_string())
            .collect();
        assert_eq!(names, vec![trunk]);

        assert!(matches!(
            repo.create_branch("bad name"),
            Err(StorageError::InvalidBranchName(_))
        ));
    }

    #[test]
    fn test_add_remote_and_fetch() {
        let (_upstream_dir, upstream) = setup();
        let upstream_branch = upstream.current_branch_name().unwrap();
        let (_dir, repo) = setup();

        repo.add_remote("origin", &upstream.path().to_string_lossy()).unwrap();
        repo.fetch("origin").unwrap();

        let fetched = repo
            .with_repo(|r| Ok(r.find_reference(&format!("refs/remotes/origin/{}", upstream_branch)).is_ok()))
            .unwrap();
        assert!(fetched);
        assert!(matches!(repo.fetch("missing"), Err(StorageError::RefNotFound(_))));
    }

    #[test]
    fn test_signature_is_used() {
        let (_dir, repo) = setup();
        repo.set_signature(GitSignature::new("Ada", "ada@example.com"));
        write(&repo, "a.markdown", "a");
        repo.stage(Path::new("a.markdown")).unwrap();
        let id = repo.commit("a").commit_id().unwrap();
        assert_eq!(repo.get_commit(id).unwrap().author_name, "Ada");
    }
}
