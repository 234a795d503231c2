//! Sandboxing of filesystem paths derived from page and attachment names.
//!
//! Every path the wiki reads, writes or deletes because of a user supplied
//! name goes through [`PathGuard::ensure_under_root`] first.

use std::fs;
use std::path::{Path, PathBuf};

use soft_canonicalize::soft_canonicalize;

use crate::wiki::error::{WikiError, WikiResult};

#[derive(Debug, Clone)]
pub struct PathGuard {
    root: PathBuf,
}

impl PathGuard {
    /// The root must exist; it is canonicalized once here.
    pub fn new(root: impl AsRef<Path>) -> WikiResult<Self> {
        let root = fs::canonicalize(root.as_ref())?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `path` (relative paths are taken from the root) and make sure
    /// the result is the root or lies below it.
    ///
    /// Resolution goes through `soft_canonicalize`, so symlinks are followed
    /// even when the file they name does not exist yet.
    pub fn ensure_under_root(&self, path: impl AsRef<Path>) -> WikiResult<PathBuf> {
        let path = path.as_ref();
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };

        let resolved = soft_canonicalize(&absolute)?;
        let target = dangling_target(&resolved)?;
        let inside = resolved.starts_with(&self.root)
            && target.map_or(true, |t| t.starts_with(&self.root));
        if inside {
            Ok(resolved)
        } else {
            Err(WikiError::PathEscape {
                path: path.to_path_buf(),
                root: self.root.clone(),
            })
        }
    }

    /// [`ensure_under_root`](Self::ensure_under_root), then strip the root.
    pub fn relative(&self, path: impl AsRef<Path>) -> WikiResult<PathBuf> {
        let resolved = self.ensure_under_root(path)?;
        Ok(resolved
            .strip_prefix(&self.root)
            .map(Path::to_path_buf)
            .unwrap_or_default())
    }
}

/// A dangling symlink left at the end of a resolved path still points
/// somewhere; follow it so creating the file cannot land outside the root.
fn dangling_target(path: &Path) -> std::io::Result<Option<PathBuf>> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_symlink() => {
            let target = fs::read_link(path)?;
            let target = match path.parent() {
                Some(parent) if target.is_relative() => parent.join(target),
                _ => target,
            };
            Ok(Some(soft_canonicalize(target)?))
        }
        _ => Ok(None),
    }
}
