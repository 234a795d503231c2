//! gitwiki - a Git-backed wiki
//!
//! Pages are markdown files in a git working tree, every edit is a commit,
//! and attachments live in `<page>_files` directories next to their page.
//!
//! # Example
//!
//! ```no_run
//! use gitwiki::wiki::{Wiki, WikiConfig};
//!
//! let wiki = Wiki::open(WikiConfig::new("./my_wiki")).unwrap();
//! let mut page = wiki.page("home").unwrap();
//! page.update("Welcome! See [[Other Page]].", None).unwrap();
//! println!("{}", page.body().unwrap());
//! ```

pub mod logger;
pub mod storage;
pub mod wiki;
