//! Conversions between page titles, basenames, filenames and attachment
//! directory names.
//!
//! A basename is the url/path safe identifier of a page (`dir1/foo_bar`).
//! Titles are for display only and never turned back into paths.

/// Extension of page files on disk.
pub const PAGE_FILE_EXT: &str = ".markdown";

/// Suffix of the directory holding a page's attachments (`foo` -> `foo_files`).
pub const ATTACH_DIR_SUFFIX: &str = "_files";

/// Replaces whitespace in titles.
pub const SEPARATOR: char = '_';

fn is_filename_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '/' | '-')
}

/// Turn a title into a basename: whitespace runs become `_`, anything
/// outside `[A-Za-z0-9._/-]` is dropped. `/` survives so pages can nest.
pub fn to_filename(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    let mut in_space = false;
    for c in title.chars() {
        if c.is_whitespace() {
            if !in_space {
                out.push(SEPARATOR);
            }
            in_space = true;
            continue;
        }
        in_space = false;
        if is_filename_char(c) {
            out.push(c);
        }
    }
    out
}

/// Display form of a basename. Lossy.
pub fn to_title(basename: &str) -> String {
    basename.replace(SEPARATOR, " ")
}

pub fn attach_dir_name(basename: &str) -> String {
    format!("{}{}", basename.to_lowercase(), ATTACH_DIR_SUFFIX)
}

/// `foo/bar_files` -> `foo/bar`
pub fn page_from_attach_dir(dir: &str) -> Option<&str> {
    dir.strip_suffix(ATTACH_DIR_SUFFIX).filter(|page| !page.is_empty())
}

pub fn strip_page_extension<'a>(name: &'a str, ext: &str) -> &'a str {
    name.strip_suffix(ext).unwrap_or(name)
}

/// true for attachment directories and anything inside one:
/// `foo_files`, `foo_files/bar.jpg`, `foo/bar_files/file.jpg`
pub fn is_attach_dir_or_file(path: &str) -> bool {
    path.split('/')
        .any(|segment| segment.len() > ATTACH_DIR_SUFFIX.len() && segment.ends_with(ATTACH_DIR_SUFFIX))
}

/// Name an upload is stored under.
///
/// With a desired name the original extension (lowercased) is kept. The
/// result is one path segment with at most one `.`, so routes of the form
/// `<file>.<ext>` can split it.
pub fn attachment_filename(original: &str, desired: Option<&str>) -> String {
    let original = original.rsplit(['/', '\\']).next().unwrap_or(original);
    let raw = match desired.map(str::trim).filter(|d| !d.is_empty()) {
        Some(desired) => match extension(original) {
            Some(ext) => format!("{}.{}", desired, ext.to_lowercase()),
            None => desired.to_string(),
        },
        None => original.to_string(),
    };

    let normalized = to_filename(&raw);
    let (stem, ext) = match normalized.rfind('.') {
        Some(dot) if dot > 0 => (&normalized[..dot], Some(&normalized[dot + 1..])),
        _ => (normalized.as_str(), None),
    };

    let mut name = collapse_separators(&stem.replace(['/', '.'], "_"));
    if let Some(ext) = ext.map(|e| e.replace('/', "")).filter(|e| !e.is_empty()) {
        name.push('.');
        name.push_str(&ext);
    }
    name
}

fn extension(name: &str) -> Option<&str> {
    match name.rfind('.') {
        Some(dot) if dot > 0 && dot + 1 < name.len() => Some(&name[dot + 1..]),
        _ => None,
    }
}

fn collapse_separators(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c == SEPARATOR && out.ends_with(SEPARATOR) {
            continue;
        }
        out.push(c);
    }
    out.trim_matches(SEPARATOR).to_string()
}
