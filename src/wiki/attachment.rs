//! Files uploaded next to a page, in its `<page>_files` directory.
//!
//! Saving, deleting and listing go through [`Page`](crate::wiki::Page) since
//! every change is a commit on behalf of that page; this module holds the
//! value types and their derived metadata.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::storage::CommitOutcome;
use crate::wiki::names::ATTACH_DIR_SUFFIX;

const KB: u64 = 1024;
const MB: u64 = KB * 1024;

const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "gif"];

/// An upload as received from the outer layer.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// name on the client side, only its extension and basename are used
    pub filename: String,
    pub data: Vec<u8>,
}

impl UploadedFile {
    pub fn new(filename: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            data: data.into(),
        }
    }
}

/// Result of [`Page::save_file`](crate::wiki::Page::save_file).
#[derive(Debug, Clone)]
pub struct StoredFile {
    /// name the file was stored under
    pub name: String,
    pub outcome: CommitOutcome,
}

/// A file in a page's attachment directory.
#[derive(Debug, Clone)]
pub struct Attachment {
    path: PathBuf,
    page_name: String,
    size: u64,
}

impl Attachment {
    pub(crate) fn new(path: PathBuf, page_basename: &str, size: u64) -> Self {
        Self {
            path,
            page_name: page_basename.to_lowercase(),
            size,
        }
    }

    /// absolute path on disk
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn page_name(&self) -> &str {
        &self.page_name
    }

    pub fn bytes(&self) -> u64 {
        self.size
    }

    /// `/<page>_files/<file>`
    pub fn link_path(&self) -> String {
        format!("/{}{}/{}", self.page_name, ATTACH_DIR_SUFFIX, self.name())
    }

    /// `/a/file/delete/<page>/<file>`
    pub fn delete_path(&self) -> String {
        format!("/a/file/delete/{}/{}", self.page_name, self.name())
    }

    pub fn is_image(&self) -> bool {
        extension(&self.path).is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
    }

    /// human readable size: `1 Byte`, `N Bytes`, `x.xx KB`, `x.xx MB`
    pub fn size(&self) -> String {
        format_size(self.size)
    }

    pub fn content_type(&self) -> &'static str {
        content_type(&self.path)
    }

    pub fn summary(&self) -> AttachmentSummary {
        AttachmentSummary {
            name: self.name(),
            link: self.link_path(),
            delete_link: self.delete_path(),
            size: self.size(),
            bytes: self.size,
            is_image: self.is_image(),
            content_type: self.content_type(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AttachmentSummary {
    pub name: String,
    pub link: String,
    pub delete_link: String,
    pub size: String,
    pub bytes: u64,
    pub is_image: bool,
    pub content_type: &'static str,
}

fn extension(path: &Path) -> Option<String> {
    path.extension().map(|e| e.to_string_lossy().to_lowercase())
}

pub fn format_size(bytes: u64) -> String {
    match bytes {
        1 => "1 Byte".to_string(),
        n if n < KB => format!("{} Bytes", n),
        n if n < MB => format!("{} KB", two_decimals(n as f64 / KB as f64)),
        n => format!("{} MB", two_decimals(n as f64 / MB as f64)),
    }
}

/// `%.2f` with trailing zeros (and a bare `.`) removed
fn two_decimals(value: f64) -> String {
    let formatted = format!("{:.2}", value);
    formatted.trim_end_matches('0').trim_end_matches('.').to_string()
}

/// MIME type used when serving an attachment.
pub fn content_type(path: &Path) -> &'static str {
    match extension(path).as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("pdf") => "application/pdf",
        Some("txt") | Some("markdown") | Some("md") => "text/plain",
        Some("html") | Some("htm") => "text/html",
        Some("css") => "text/css",
        Some("js") => "application/javascript",
        Some("json") => "application/json",
        Some("zip") => "application/zip",
        Some("gz") => "application/gzip",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attachment(name: &str, size: u64) -> Attachment {
        Attachment::new(PathBuf::from("/wiki/pets_files").join(name), "Pets", size)
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0 Bytes");
        assert_eq!(format_size(1), "1 Byte");
        assert_eq!(format_size(500), "500 Bytes");
        assert_eq!(format_size(1023), "1023 Bytes");
        assert_eq!(format_size(1024), "1 KB");
        assert_eq!(format_size(2048), "2 KB");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(1100), "1.07 KB");
        assert_eq!(format_size(1572864), "1.5 MB");
        assert_eq!(format_size(MB), "1 MB");
    }

    #[test]
    fn test_is_image() {
        assert!(attachment("cat.png", 1).is_image());
        assert!(attachment("cat.JPG", 1).is_image());
        assert!(attachment("cat.jpeg", 1).is_image());
        assert!(attachment("cat.Gif", 1).is_image());
        assert!(!attachment("notes.txt", 1).is_image());
        assert!(!attachment("png", 1).is_image());
    }

    #[test]
    fn test_paths() {
        let a = attachment("cat.png", 2048);
        assert_eq!(a.name(), "cat.png");
        assert_eq!(a.page_name(), "pets");
        assert_eq!(a.link_path(), "/pets_files/cat.png");
        assert_eq!(a.delete_path(), "/a/file/delete/pets/cat.png");
        assert_eq!(a.size(), "2 KB");
    }

    #[test]
    fn test_content_type() {
        assert_eq!(attachment("cat.PNG", 1).content_type(), "image/png");
        assert_eq!(attachment("doc.pdf", 1).content_type(), "application/pdf");
        assert_eq!(attachment("blob", 1).content_type(), "application/octet-stream");
    }

    #[test]
    fn test_summary_serializes() {
        let json = serde_json::to_value(attachment("cat.png", 1).summary()).unwrap();
        assert_eq!(json["name"], "cat.png");
        assert_eq!(json["size"], "1 Byte");
        assert_eq!(json["is_image"], true);
        assert_eq!(json["link"], "/pets_files/cat.png");
    }
}
