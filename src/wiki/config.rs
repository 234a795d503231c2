//! Wiki configuration.

use std::path::PathBuf;

use crate::storage::GitSignature;
use crate::wiki::names::PAGE_FILE_EXT;

/// Environment variable naming the wiki repository.
pub const WIKI_HOME_VAR: &str = "WIKI_HOME";

/// How soft failures (git errors, unreadable files, failed commits) are
/// reported. Sandbox violations are errors under every policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// log a warning and degrade to empty results / a `Failed` outcome
    #[default]
    Lenient,
    /// return the failure as an error
    Strict,
}

/// Wiki configuration options.
#[derive(Debug, Clone)]
pub struct WikiConfig {
    /// Path to the wiki repository.
    pub root: PathBuf,
    /// Page shown for `/` and for links ending in `/`.
    pub home_page: String,
    /// Extension of page files.
    pub page_extension: String,
    /// Create and initialize the repository if missing.
    pub create_if_missing: bool,
    /// List pages in sub-wikis too.
    pub recursive_listing: bool,
    pub error_policy: ErrorPolicy,
    /// Author and committer of every wiki commit.
    pub signature: GitSignature,
}

impl Default for WikiConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("wiki"),
            home_page: "home".to_string(),
            page_extension: PAGE_FILE_EXT.to_string(),
            create_if_missing: true,
            recursive_listing: true,
            error_policy: ErrorPolicy::Lenient,
            signature: GitSignature::wiki(),
        }
    }
}

impl WikiConfig {
    /// Create a new configuration with the given root.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Default::default()
        }
    }

    /// Root from `$WIKI_HOME`, falling back to `$HOME/wiki`.
    pub fn from_env() -> Self {
        let root = std::env::var_os(WIKI_HOME_VAR)
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join("wiki")))
            .unwrap_or_else(|| PathBuf::from("wiki"));
        Self::new(root)
    }

    pub fn home_page(mut self, value: impl Into<String>) -> Self {
        self.home_page = value.into();
        self
    }

    pub fn page_extension(mut self, value: impl Into<String>) -> Self {
        self.page_extension = value.into();
        self
    }

    /// Set create_if_missing flag.
    pub fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    pub fn recursive_listing(mut self, value: bool) -> Self {
        self.recursive_listing = value;
        self
    }

    pub fn error_policy(mut self, value: ErrorPolicy) -> Self {
        self.error_policy = value;
        self
    }

    pub fn signature(mut self, value: GitSignature) -> Self {
        self.signature = value;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WikiConfig::new("/tmp/w");
        assert_eq!(config.root, PathBuf::from("/tmp/w"));
        assert_eq!(config.home_page, "home");
        assert_eq!(config.page_extension, ".markdown");
        assert_eq!(config.error_policy, ErrorPolicy::Lenient);
        assert!(config.create_if_missing);
    }

    #[test]
    fn test_builder() {
        let config = WikiConfig::new("w")
            .home_page("index")
            .page_extension(".md")
            .create_if_missing(false)
            .recursive_listing(false)
            .error_policy(ErrorPolicy::Strict)
            .signature(GitSignature::new("Ada", "ada@example.com"));
        assert_eq!(config.home_page, "index");
        assert_eq!(config.page_extension, ".md");
        assert!(!config.create_if_missing);
        assert!(!config.recursive_listing);
        assert_eq!(config.error_policy, ErrorPolicy::Strict);
        assert_eq!(config.signature.name, "Ada");
    }
}
