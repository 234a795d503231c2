//! The wiki: a repository collaborator, a path guard and a configuration.
//!
//! [`Wiki`] hands out [`Page`] views and answers the questions that are
//! about the whole repository rather than one page (listing, search,
//! existence of link targets).

use std::collections::BTreeSet;
use std::fmt::Display;
use std::path::Path;

use flate2::write::GzEncoder;
use flate2::Compression;
use log::{debug, warn};
use serde::Serialize;

use crate::storage::{CommitId, CommitOutcome, GitRepository, GrepMatch, SnapshotNode, VersionControl};
use crate::wiki::config::{ErrorPolicy, WikiConfig};
use crate::wiki::error::{WikiError, WikiResult};
use crate::wiki::guard::PathGuard;
use crate::wiki::listing;
use crate::wiki::names::{is_attach_dir_or_file, strip_page_extension, to_filename, to_title};
use crate::wiki::page::Page;

/// Top-level directory of every path in [`Wiki::archive`].
pub const ARCHIVE_PREFIX: &str = "wiki";

/// One entry of [`Wiki::pages`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageSummary {
    pub basename: String,
    pub title: String,
}

pub struct Wiki<R: VersionControl> {
    repo: R,
    guard: PathGuard,
    config: WikiConfig,
}

impl Wiki<GitRepository> {
    /// Open the git repository at `config.root`, creating it when
    /// `create_if_missing` is set.
    pub fn open(config: WikiConfig) -> WikiResult<Self> {
        let repo = if config.create_if_missing {
            GitRepository::open_or_init(&config.root)?
        } else {
            GitRepository::open(&config.root)?
        };
        repo.set_signature(config.signature.clone());
        Self::new(repo, config)
    }
}

impl<R: VersionControl> Wiki<R> {
    pub fn new(repo: R, config: WikiConfig) -> WikiResult<Self> {
        let guard = PathGuard::new(repo.workdir())?;
        debug!("wiki at {}", guard.root().display());
        Ok(Self { repo, guard, config })
    }

    pub fn repo(&self) -> &R {
        &self.repo
    }

    pub fn config(&self) -> &WikiConfig {
        &self.config
    }

    pub fn guard(&self) -> &PathGuard {
        &self.guard
    }

    pub fn root(&self) -> &Path {
        self.guard.root()
    }

    /// The page `basename` as it is in the working tree.
    pub fn page(&self, basename: &str) -> WikiResult<Page<'_, R>> {
        Page::new(self, basename, None)
    }

    /// A read-only view of `basename` at `rev`.
    pub fn page_at(&self, basename: &str, rev: CommitId) -> WikiResult<Page<'_, R>> {
        Page::new(self, basename, Some(rev))
    }

    /// The page a new title would be stored as.
    pub fn page_for_title(&self, title: &str) -> WikiResult<Page<'_, R>> {
        let basename = to_filename(title.trim());
        if basename.trim_matches(['_', '/']).is_empty() {
            return Err(WikiError::InvalidName(title.to_string()));
        }
        self.page(&basename)
    }

    /// Resolve a user supplied revision. Unknown revisions are always an error.
    pub fn resolve_revision(&self, spec: &str) -> WikiResult<CommitId> {
        Ok(self.repo.resolve(spec)?)
    }

    pub fn page_file(&self, basename: &str) -> String {
        format!("{}{}", basename, self.config.page_extension)
    }

    /// Every tracked path of the checked out branch.
    pub fn tracked(&self) -> WikiResult<BTreeSet<String>> {
        self.soften(self.repo.tracked_files(), BTreeSet::new())
    }

    pub fn page_exists(&self, basename: &str) -> WikiResult<bool> {
        Ok(self.tracked()?.contains(&self.page_file(basename)))
    }

    /// Pages of the HEAD snapshot, recursing into sub-wikis when the
    /// configuration says so.
    pub fn pages(&self) -> WikiResult<Vec<PageSummary>> {
        self.pages_with(self.config.recursive_listing)
    }

    /// Page basenames, sorted. Directories, attachment directories and their
    /// files, hidden names and anything without the page extension are
    /// skipped.
    pub fn pages_with(&self, recursive: bool) -> WikiResult<Vec<PageSummary>> {
        let root = match self.soften(self.repo.snapshot_tree(None).map(Some), None)? {
            Some(root) => root,
            None => return Ok(Vec::new()),
        };
        let entries = self.soften(listing::list(&root, recursive, None), Default::default())?;

        let ext = self.config.page_extension.as_str();
        let mut pages: Vec<PageSummary> = entries
            .iter()
            .filter(|(path, node)| {
                !node.is_tree()
                    && !is_attach_dir_or_file(path)
                    && !path.split('/').any(|s| s.starts_with('_') || s.starts_with('.'))
                    && path.ends_with(ext)
            })
            .map(|(path, _)| {
                let basename = strip_page_extension(path, ext).to_string();
                PageSummary {
                    title: to_title(&basename),
                    basename,
                }
            })
            .collect();
        pages.sort_by(|a, b| a.basename.cmp(&b.basename));
        Ok(pages)
    }

    /// Lines of committed files containing `pattern`.
    pub fn search(&self, pattern: &str) -> WikiResult<Vec<GrepMatch>> {
        if pattern.is_empty() {
            return Ok(Vec::new());
        }
        self.soften(self.repo.grep(pattern), Vec::new())
    }

    /// Gzipped tarball of the committed tree at `rev` (HEAD if `None`), every
    /// file under `wiki/`. Uncommitted changes are not included.
    pub fn archive(&self, rev: Option<CommitId>) -> WikiResult<Vec<u8>> {
        let root = self.repo.snapshot_tree(rev)?;
        let mtime = self
            .repo
            .log(None, rev)?
            .first()
            .map_or(0, |commit| commit.timestamp.timestamp().max(0) as u64);

        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        let mut count = 0;
        for (path, node) in listing::list(&root, true, None)? {
            if node.is_tree() {
                continue;
            }
            let data = node.content()?;
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_mtime(mtime);
            builder.append_data(&mut header, format!("{}/{}", ARCHIVE_PREFIX, path), data.as_slice())?;
            count += 1;
        }

        let bytes = builder.into_inner()?.finish()?;
        debug!("archived {} files, {} bytes", count, bytes.len());
        Ok(bytes)
    }

    /// Apply the error policy to a commit outcome.
    pub(crate) fn settle(&self, outcome: CommitOutcome) -> WikiResult<CommitOutcome> {
        match (&outcome, self.config.error_policy) {
            (CommitOutcome::Failed(reason), ErrorPolicy::Strict) => {
                Err(WikiError::CommitFailed(reason.clone()))
            }
            (CommitOutcome::Failed(reason), ErrorPolicy::Lenient) => {
                warn!("commit failed: {}", reason);
                Ok(outcome)
            }
            _ => Ok(outcome),
        }
    }

    /// Apply the error policy to a soft failure: lenient logs and falls back,
    /// strict returns it. Fatal errors are returned under both.
    pub(crate) fn soften<T, E>(&self, result: Result<T, E>, fallback: T) -> WikiResult<T>
    where
        E: Into<WikiError> + Display,
    {
        match result {
            Ok(value) => Ok(value),
            Err(e) => {
                let err: WikiError = e.into();
                if err.is_fatal() || self.config.error_policy == ErrorPolicy::Strict {
                    Err(err)
                } else {
                    warn!("{}", err);
                    Ok(fallback)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageError;
    use flate2::read::GzDecoder;
    use std::collections::BTreeMap;
    use std::fs;
    use std::io::Read;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Wiki<GitRepository>) {
        let dir = TempDir::new().unwrap();
        let wiki = Wiki::open(WikiConfig::new(dir.path().join("wiki"))).unwrap();
        (dir, wiki)
    }

    fn save(wiki: &Wiki<GitRepository>, basename: &str, body: &str) {
        let mut page = wiki.page(basename).unwrap();
        assert!(page.update(body, None).unwrap().is_committed());
    }

    #[test]
    fn test_open_creates_repository() {
        let (dir, wiki) = setup();
        assert!(dir.path().join("wiki/.git").exists());
        assert!(wiki.root().ends_with("wiki"));
        assert!(wiki.tracked().unwrap().contains(crate::storage::META_FILE));
    }

    #[test]
    fn test_open_without_create_fails() {
        let dir = TempDir::new().unwrap();
        let config = WikiConfig::new(dir.path().join("missing")).create_if_missing(false);
        assert!(matches!(Wiki::open(config), Err(WikiError::Storage(_))));
    }

    #[test]
    fn test_pages_listing() {
        let (_dir, wiki) = setup();
        save(&wiki, "home", "welcome");
        save(&wiki, "dir1/page", "nested");
        save(&wiki, "_private", "hidden");
        wiki.page("home")
            .unwrap()
            .save_file(&crate::wiki::UploadedFile::new("cat.png", b"png".to_vec()), None)
            .unwrap();
        fs::write(wiki.root().join("notes.txt"), "x").unwrap();
        wiki.repo().stage(Path::new("notes.txt")).unwrap();
        wiki.repo().commit("notes");

        let names: Vec<_> = wiki.pages().unwrap().into_iter().map(|p| p.basename).collect();
        assert_eq!(names, vec!["dir1/page", "home"]);

        let flat: Vec<_> = wiki.pages_with(false).unwrap().into_iter().map(|p| p.basename).collect();
        assert_eq!(flat, vec!["home"]);
    }

    #[test]
    fn test_page_summary_title() {
        let (_dir, wiki) = setup();
        save(&wiki, "foo_bar", "x");
        let pages = wiki.pages().unwrap();
        assert_eq!(pages[0].title, "foo bar");
    }

    #[test]
    fn test_page_exists_and_search() {
        let (_dir, wiki) = setup();
        save(&wiki, "home", "line one\nneedle here\n");
        assert!(wiki.page_exists("home").unwrap());
        assert!(!wiki.page_exists("away").unwrap());

        let hits = wiki.search("needle").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].path, "home.markdown");
        assert_eq!(hits[0].line_number, 2);
        assert!(wiki.search("").unwrap().is_empty());
    }

    #[test]
    fn test_page_for_title() {
        let (_dir, wiki) = setup();
        let page = wiki.page_for_title("My New Page").unwrap();
        assert_eq!(page.basename(), "My_New_Page");
        assert!(matches!(wiki.page_for_title("?!"), Err(WikiError::InvalidName(_))));
    }

    #[test]
    fn test_resolve_revision() {
        let (_dir, wiki) = setup();
        save(&wiki, "home", "x");
        let head = wiki.resolve_revision("HEAD").unwrap();
        assert_eq!(wiki.resolve_revision(&head.short()).unwrap(), head);
        assert!(wiki.resolve_revision("nope").is_err());
    }

    #[test]
    fn test_soften_follows_policy() {
        let (dir, wiki) = setup();
        let failure: Result<u8, StorageError> = Err(StorageError::Internal("boom".into()));
        assert_eq!(wiki.soften(failure, 7).unwrap(), 7);

        let strict = Wiki::open(
            WikiConfig::new(dir.path().join("wiki")).error_policy(ErrorPolicy::Strict),
        )
        .unwrap();
        let failure: Result<u8, StorageError> = Err(StorageError::Internal("boom".into()));
        assert!(strict.soften(failure, 7).is_err());

        let escape: Result<u8, WikiError> = Err(WikiError::ReadOnlyRevision("x".into()));
        assert!(wiki.soften(escape, 7).is_err());
    }

    #[test]
    fn test_settle_follows_policy() {
        let (dir, wiki) = setup();
        let failed = CommitOutcome::Failed("locked".into());
        assert_eq!(wiki.settle(failed.clone()).unwrap(), failed);
        assert_eq!(
            wiki.settle(CommitOutcome::NothingToCommit).unwrap(),
            CommitOutcome::NothingToCommit
        );

        let strict = Wiki::open(
            WikiConfig::new(dir.path().join("wiki")).error_policy(ErrorPolicy::Strict),
        )
        .unwrap();
        assert!(matches!(strict.settle(failed), Err(WikiError::CommitFailed(_))));
    }

    fn unpack(bytes: &[u8]) -> BTreeMap<String, String> {
        let mut archive = tar::Archive::new(GzDecoder::new(bytes));
        let mut files = BTreeMap::new();
        for entry in archive.entries().unwrap() {
            let mut entry = entry.unwrap();
            let path = entry.path().unwrap().to_string_lossy().into_owned();
            let mut body = String::new();
            entry.read_to_string(&mut body).unwrap();
            files.insert(path, body);
        }
        files
    }

    #[test]
    fn test_archive_contains_committed_tree() {
        let (_dir, wiki) = setup();
        save(&wiki, "home", "welcome");
        save(&wiki, "dir1/page", "nested");
        fs::write(wiki.root().join("draft.markdown"), "not committed").unwrap();

        let files = unpack(&wiki.archive(None).unwrap());
        assert_eq!(files["wiki/home.markdown"], "welcome");
        assert_eq!(files["wiki/dir1/page.markdown"], "nested");
        assert!(files.contains_key("wiki/.meta"));
        assert!(!files.contains_key("wiki/draft.markdown"));
        assert!(files.keys().all(|path| path.starts_with("wiki/")));
    }

    #[test]
    fn test_archive_at_revision() {
        let (_dir, wiki) = setup();
        save(&wiki, "home", "first");
        let old = wiki.resolve_revision("HEAD").unwrap();
        save(&wiki, "home", "second");
        save(&wiki, "later", "new page");

        let files = unpack(&wiki.archive(Some(old)).unwrap());
        assert_eq!(files["wiki/home.markdown"], "first");
        assert!(!files.contains_key("wiki/later.markdown"));
    }
}
