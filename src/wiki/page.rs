//! A wiki page: one markdown file, its attachment directory and its history.
//!
//! A [`Page`] is a short lived view built from a basename and, optionally, a
//! revision. Unbound pages read the working tree and can be changed; pages
//! bound to a revision read committed blobs only and refuse every mutation.
//!
//! Each mutation stages its paths and makes at most one commit. Lookups that
//! hit git are cached in the page until the next mutation.

use std::cell::OnceCell;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::debug;

use crate::storage::{CommitId, CommitInfo, CommitMessage, CommitOutcome, VersionControl};
use crate::wiki::attachment::{Attachment, StoredFile, UploadedFile};
use crate::wiki::error::{WikiError, WikiResult};
use crate::wiki::markup::{self, LinkResolver};
use crate::wiki::names::{attach_dir_name, attachment_filename, to_title};
use crate::wiki::store::Wiki;

#[derive(Debug, Default)]
struct PageCache {
    raw_body: OnceCell<String>,
    body: OnceCell<String>,
    history: OnceCell<Vec<CommitInfo>>,
    commit: OnceCell<Option<CommitInfo>>,
}

/// `OnceCell::get_or_try_init` for a fallible initializer
fn memo<T>(cell: &OnceCell<T>, init: impl FnOnce() -> WikiResult<T>) -> WikiResult<&T> {
    if let Some(value) = cell.get() {
        return Ok(value);
    }
    let value = init()?;
    Ok(cell.get_or_init(|| value))
}

pub struct Page<'w, R: VersionControl> {
    wiki: &'w Wiki<R>,
    basename: String,
    /// page file, relative to the root
    name: PathBuf,
    filename: PathBuf,
    /// attachment directory, relative to the root
    attach_name: PathBuf,
    attach_dir: PathBuf,
    rev: Option<CommitId>,
    cache: PageCache,
}

impl<'w, R: VersionControl> Page<'w, R> {
    pub(crate) fn new(wiki: &'w Wiki<R>, basename: &str, rev: Option<CommitId>) -> WikiResult<Self> {
        let guard = wiki.guard();
        let filename = guard.ensure_under_root(wiki.page_file(basename))?;
        let attach_dir = guard.ensure_under_root(attach_dir_name(basename))?;
        let name = guard.relative(&filename)?;
        let attach_name = guard.relative(&attach_dir)?;
        if name.as_os_str().is_empty() || attach_name.as_os_str().is_empty() {
            return Err(WikiError::InvalidName(basename.to_string()));
        }

        Ok(Self {
            wiki,
            basename: basename.to_string(),
            name,
            filename,
            attach_name,
            attach_dir,
            rev,
            cache: PageCache::default(),
        })
    }

    pub fn basename(&self) -> &str {
        &self.basename
    }

    pub fn title(&self) -> String {
        to_title(&self.basename)
    }

    /// absolute path of the page file
    pub fn filename(&self) -> &Path {
        &self.filename
    }

    /// page file relative to the wiki root
    pub fn name(&self) -> &Path {
        &self.name
    }

    pub fn attach_dir(&self) -> &Path {
        &self.attach_dir
    }

    /// directory part of the basename, `None` at top level
    pub fn subwiki(&self) -> Option<&str> {
        self.basename.rsplit_once('/').map(|(dir, _)| dir)
    }

    pub fn revision(&self) -> Option<CommitId> {
        self.rev
    }

    // ==================== Reading ====================

    /// Markdown source; empty if the page does not exist (at the bound revision).
    pub fn raw_body(&self) -> WikiResult<&str> {
        memo(&self.cache.raw_body, || {
            let repo = self.wiki.repo();
            let read = match self.rev {
                Some(rev) => repo.read_blob(rev, &self.name),
                None => repo.read_working_file(&self.name),
            };
            let bytes = self.wiki.soften(read, None)?.unwrap_or_default();
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        })
        .map(String::as_str)
    }

    /// Rendered HTML of [`raw_body`](Self::raw_body).
    pub fn body(&self) -> WikiResult<&str> {
        memo(&self.cache.body, || {
            let raw = self.raw_body()?;
            self.render(raw)
        })
        .map(String::as_str)
    }

    /// Render arbitrary text as if it were this page's body.
    pub fn preview(&self, text: &str) -> WikiResult<String> {
        self.render(text)
    }

    fn render(&self, text: &str) -> WikiResult<String> {
        let tracked = self.wiki.tracked()?;
        let resolver = LinkResolver::new(self.subwiki(), &self.wiki.config().home_page);
        Ok(markup::render(text, &resolver, |target| {
            tracked.contains(&self.wiki.page_file(target))
        }))
    }

    // ==================== Mutations ====================

    fn ensure_writable(&self) -> WikiResult<()> {
        match self.rev {
            Some(rev) => Err(WikiError::ReadOnlyRevision(format!(
                "{}@{}",
                self.basename,
                rev.short()
            ))),
            None => Ok(()),
        }
    }

    /// Stage `paths` and commit them as one change.
    fn commit_paths(&mut self, paths: &[&Path], message: &str) -> WikiResult<CommitOutcome> {
        self.cache = PageCache::default();
        let repo = self.wiki.repo();
        let outcome = match paths.iter().try_for_each(|path| repo.stage(path)) {
            Ok(()) => repo.commit(message),
            Err(e) => CommitOutcome::Failed(e.to_string()),
        };
        self.wiki.settle(outcome)
    }

    /// Write the page and commit it. `message` is appended to the commit
    /// message when not empty.
    pub fn update(&mut self, content: &str, message: Option<&str>) -> WikiResult<CommitOutcome> {
        self.ensure_writable()?;
        let existed = self.is_tracked()?;
        if let Some(parent) = self.filename.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.filename, content)?;
        debug!("wrote {}", self.filename.display());

        let message = CommitMessage::page_saved(&self.basename, existed, message);
        let name = self.name.clone();
        self.commit_paths(&[name.as_path()], &message)
    }

    /// Add `text` after the current body, separated by a blank line.
    pub fn append(&mut self, text: &str, message: Option<&str>) -> WikiResult<CommitOutcome> {
        self.ensure_writable()?;
        let content = format!("{}\n\n{}", self.raw_body()?, text);
        self.update(&content, message)
    }

    /// Remove the page file and its attachment directory in one commit.
    pub fn delete(&mut self) -> WikiResult<CommitOutcome> {
        self.ensure_writable()?;
        if !self.filename.exists() {
            return Ok(CommitOutcome::NothingToCommit);
        }

        let repo = self.wiki.repo();
        let mut removed = repo.remove(&self.name, false);
        if removed.is_ok() && self.attach_dir.exists() {
            removed = repo.remove(&self.attach_name, true);
        }
        if let Err(e) = removed {
            self.cache = PageCache::default();
            return self.wiki.settle(CommitOutcome::Failed(e.to_string()));
        }

        let message = CommitMessage::page_deleted(&self.basename);
        let (name, attach_name) = (self.name.clone(), self.attach_name.clone());
        self.commit_paths(&[name.as_path(), attach_name.as_path()], &message)
    }

    // ==================== History ====================

    /// The page file is in the index of the checked out branch.
    pub fn is_tracked(&self) -> WikiResult<bool> {
        self.wiki.soften(self.wiki.repo().is_tracked(&self.name), false)
    }

    /// Commits that touched the page, newest first.
    pub fn history(&self) -> WikiResult<&[CommitInfo]> {
        memo(&self.cache.history, || {
            if !self.is_tracked()? {
                return Ok(Vec::new());
            }
            self.wiki.soften(self.wiki.repo().log(Some(&self.name), None), Vec::new())
        })
        .map(Vec::as_slice)
    }

    /// Newest commit touching the page at or before the bound revision.
    pub fn commit(&self) -> WikiResult<Option<&CommitInfo>> {
        memo(&self.cache.commit, || match self.rev {
            Some(rev) => {
                let log = self.wiki.repo().log(Some(&self.name), Some(rev));
                Ok(self.wiki.soften(log, Vec::new())?.into_iter().next())
            }
            None => Ok(self.history()?.first().cloned()),
        })
        .map(Option::as_ref)
    }

    fn commit_position(&self) -> WikiResult<Option<usize>> {
        let current = match self.commit()? {
            Some(commit) => commit.id,
            None => return Ok(None),
        };
        Ok(self.history()?.iter().position(|c| c.id == current))
    }

    /// The commit before [`commit`](Self::commit) in the page history.
    pub fn previous_commit(&self) -> WikiResult<Option<&CommitInfo>> {
        let history = self.history()?;
        Ok(self
            .commit_position()?
            .and_then(|i| i.checked_add(1))
            .and_then(|i| history.get(i)))
    }

    /// The commit after [`commit`](Self::commit) in the page history.
    pub fn next_commit(&self) -> WikiResult<Option<&CommitInfo>> {
        let history = self.history()?;
        Ok(self
            .commit_position()?
            .and_then(|i| i.checked_sub(1))
            .and_then(|i| history.get(i)))
    }

    /// Patch of the page file between two commits.
    pub fn diff(&self, from: CommitId, to: CommitId) -> WikiResult<String> {
        let diff = self.wiki.repo().diff(from, to, Some(&self.name));
        self.wiki.soften(diff, String::new())
    }

    /// Patch of the page file between `rev` and the page's current commit.
    pub fn delta(&self, rev: CommitId) -> WikiResult<String> {
        match self.commit()? {
            Some(commit) => self.diff(rev, commit.id),
            None => Ok(String::new()),
        }
    }

    pub fn updated_at(&self) -> WikiResult<DateTime<Utc>> {
        Ok(self.commit()?.map(|c| c.timestamp).unwrap_or_else(Utc::now))
    }

    pub fn branch_name(&self) -> WikiResult<String> {
        self.wiki.soften(self.wiki.repo().current_branch_name(), String::new())
    }

    // ==================== Attachments ====================

    /// Resolve an attachment name and make sure it stays in this page's
    /// attachment directory.
    fn attachment_path(&self, file: &str) -> WikiResult<PathBuf> {
        let path = self.wiki.guard().ensure_under_root(self.attach_name.join(file))?;
        if path.parent() != Some(self.attach_dir.as_path()) {
            return Err(WikiError::PathEscape {
                path: PathBuf::from(file),
                root: self.attach_dir.clone(),
            });
        }
        Ok(path)
    }

    /// Store an upload in the attachment directory. With `desired_name` the
    /// file is renamed, keeping its extension.
    pub fn save_file(&mut self, upload: &UploadedFile, desired_name: Option<&str>) -> WikiResult<StoredFile> {
        self.ensure_writable()?;
        let file = attachment_filename(&upload.filename, desired_name);
        if file.is_empty() {
            return Err(WikiError::InvalidName(upload.filename.clone()));
        }
        let target = self.attachment_path(&file)?;

        fs::create_dir_all(&self.attach_dir)?;
        fs::write(&target, &upload.data)?;
        debug!("stored {} ({} bytes)", target.display(), upload.data.len());

        let message = CommitMessage::file_uploaded(&file, &self.basename);
        let rel = self.attach_name.join(&file);
        let outcome = self.commit_paths(&[rel.as_path()], &message)?;
        Ok(StoredFile { name: file, outcome })
    }

    /// Remove an attachment; `NothingToCommit` if there is no such file.
    pub fn delete_file(&mut self, file: &str) -> WikiResult<CommitOutcome> {
        self.ensure_writable()?;
        let target = self.attachment_path(file)?;
        if !target.is_file() {
            return Ok(CommitOutcome::NothingToCommit);
        }

        let rel = self.wiki.guard().relative(&target)?;
        if let Err(e) = self.wiki.repo().remove(&rel, false) {
            return self.wiki.settle(CommitOutcome::Failed(e.to_string()));
        }
        let message = CommitMessage::file_removed(file, &self.basename);
        self.commit_paths(&[rel.as_path()], &message)
    }

    /// Files in the attachment directory sorted by name, `None` if the page
    /// has no attachment directory.
    pub fn attachments(&self) -> WikiResult<Option<Vec<Attachment>>> {
        if !self.attach_dir.is_dir() {
            return Ok(None);
        }
        let entries = match self.wiki.soften(fs::read_dir(&self.attach_dir).map(Some), None)? {
            Some(entries) => entries,
            None => return Ok(None),
        };

        let mut files = Vec::new();
        for entry in entries {
            let entry = match self.wiki.soften(entry.map(Some), None)? {
                Some(entry) => entry,
                None => continue,
            };
            let metadata = match self.wiki.soften(entry.metadata().map(Some), None)? {
                Some(metadata) if metadata.is_file() => metadata,
                _ => continue,
            };
            files.push(Attachment::new(entry.path(), &self.basename, metadata.len()));
        }
        files.sort_by_key(Attachment::name);
        Ok(Some(files))
    }
}
