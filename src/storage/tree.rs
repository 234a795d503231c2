//!  Point-in-time views of a committed tree.
//!
//! in Git, a tree is a directory. A [`TreeNode`] is a handle to one entry of
//! a committed tree: either a sub-tree (directory) or a blob (file). It holds
//! only the object id, so walking it never touches the working directory and
//! never changes, even if new commits are made.

use std::collections::BTreeMap;

use git2::ObjectType;

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::repository::GitRepository;

/// Anything that can be walked like a directory snapshot.
pub trait SnapshotNode: Sized {
    /// direct children keyed by entry name; empty for files
    fn children(&self) -> StorageResult<BTreeMap<String, Self>>;

    /// true for directories
    fn is_tree(&self) -> bool;

    /// file contents; an error for directories
    fn content(&self) -> StorageResult<Vec<u8>>;
}

/// the kind of object a tree entry points at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Tree,
    Blob,
    /// submodules and anything else git can store in a tree
    Other,
}

/// A read only handle to one entry of a committed git tree.
#[derive(Clone)]
pub struct TreeNode {
    repo: GitRepository,
    id: git2::Oid,
    kind: EntryKind,
}

impl std::fmt::Debug for TreeNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeNode")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .finish()
    }
}

impl TreeNode {
    pub(crate) fn root(repo: GitRepository, tree_id: git2::Oid) -> Self {
        Self {
            repo,
            id: tree_id,
            kind: EntryKind::Tree,
        }
    }

    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    /// object id as hex
    pub fn id(&self) -> String {
        self.id.to_string()
    }

    /// size of the blob in bytes, 0 for directories
    pub fn size(&self) -> StorageResult<usize> {
        match self.kind {
            EntryKind::Blob => self.repo.with_repo(|repo| Ok(repo.find_blob(self.id)?.size())),
            _ => Ok(0),
        }
    }
}

impl SnapshotNode for TreeNode {
    fn children(&self) -> StorageResult<BTreeMap<String, Self>> {
        if self.kind != EntryKind::Tree {
            return Ok(BTreeMap::new());
        }
        self.repo.with_repo(|repo| {
            let tree = repo.find_tree(self.id)?;
            let children = tree
                .iter()
                .filter_map(|entry| {
                    let name = entry.name()?.to_string();
                    let kind = match entry.kind() {
                        Some(ObjectType::Tree) => EntryKind::Tree,
                        Some(ObjectType::Blob) => EntryKind::Blob,
                        _ => EntryKind::Other,
                    };
                    Some((
                        name,
                        TreeNode {
                            repo: self.repo.clone(),
                            id: entry.id(),
                            kind,
                        },
                    ))
                })
                .collect();
            Ok(children)
        })
    }

    fn is_tree(&self) -> bool {
        self.kind == EntryKind::Tree
    }

    fn content(&self) -> StorageResult<Vec<u8>> {
        if self.kind != EntryKind::Blob {
            return Err(StorageError::Internal(format!("{} is not a blob", self.id)));
        }
        self.repo.with_repo(|repo| Ok(repo.find_blob(self.id)?.content().to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::VersionControl;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    #[test]
    fn test_snapshot_children_and_content() {
        let dir = TempDir::new().unwrap();
        let repo = GitRepository::init(dir.path()).unwrap();

        fs::create_dir_all(dir.path().join("dir1")).unwrap();
        fs::write(dir.path().join("home.markdown"), "welcome").unwrap();
        fs::write(dir.path().join("dir1/page.markdown"), "nested").unwrap();
        repo.stage(Path::new("home.markdown")).unwrap();
        repo.stage(Path::new("dir1")).unwrap();
        assert!(repo.commit("pages").is_committed());

        let root = repo.snapshot_tree(None).unwrap();
        let children = root.children().unwrap();
        assert!(children["dir1"].is_tree());
        assert!(!children["home.markdown"].is_tree());
        assert_eq!(children["home.markdown"].content().unwrap(), b"welcome");
        assert_eq!(children["home.markdown"].size().unwrap(), 7);

        let nested = children["dir1"].children().unwrap();
        assert_eq!(nested.keys().collect::<Vec<_>>(), vec!["page.markdown"]);
        assert!(children["dir1"].content().is_err());
    }

    #[test]
    fn test_snapshot_is_immutable() {
        let dir = TempDir::new().unwrap();
        let repo = GitRepository::init(dir.path()).unwrap();

        fs::write(dir.path().join("a.markdown"), "one").unwrap();
        repo.stage(Path::new("a.markdown")).unwrap();
        repo.commit("one");
        let before = repo.snapshot_tree(None).unwrap();

        fs::write(dir.path().join("a.markdown"), "two").unwrap();
        repo.stage(Path::new("a.markdown")).unwrap();
        repo.commit("two");

        let children = before.children().unwrap();
        assert_eq!(children["a.markdown"].content().unwrap(), b"one");
    }
}
