//! The wiki core: pages, attachments, link rendering and listings on top of
//! a [`VersionControl`](crate::storage::VersionControl) collaborator.
//!
//! ```text
//! basename --names--> file paths --guard--> checked paths
//!                                             |
//!                         Wiki / Page <-------+----> storage (git)
//!                             |
//!            markup (body)  listing (pages)  attachment (files)
//! ```

mod attachment;
mod config;
mod error;
mod guard;
pub mod listing;
pub mod markup;
pub mod names;
mod page;
mod store;

pub use attachment::{format_size, Attachment, AttachmentSummary, StoredFile, UploadedFile};
pub use config::{ErrorPolicy, WikiConfig, WIKI_HOME_VAR};
pub use error::{WikiError, WikiResult};
pub use guard::PathGuard;
pub use page::Page;
pub use store::{PageSummary, Wiki, ARCHIVE_PREFIX};
