//! Markdown rendering with `[[wiki link]]` resolution.
//!
//! Rendering is three passes over text:
//!
//! 1. [`escape_links`] backslash-escapes the punctuation inside every link so
//!    the markdown renderer leaves the link text alone;
//! 2. [`render_markdown`] turns the escaped text into HTML;
//! 3. [`resolve_links`] finds the (now unescaped) links in the HTML and
//!    replaces each one with an anchor.
//!
//! Inline code spans and code blocks are left alone by both link passes.
//!
//! A link body may contain ASCII letters, digits, whitespace and `. / _ : -`.
//! `[[dir: Page Name]]` links to `dir/page_name`; a leading `/` makes the
//! target absolute instead of relative to the current sub-wiki.

use std::ops::Range;

use pulldown_cmark::{html, Event, Options, Parser, Tag};

use crate::wiki::names::to_filename;

/// Class added to links whose target page does not exist.
pub const NOT_FOUND_CLASS: &str = "notfound";

const OPEN: &str = "[[";
const CLOSE: &str = "]]";

fn is_link_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c.is_ascii_whitespace() || matches!(c, '.' | '/' | '_' | ':' | '-')
}

/// characters the escape pass leaves alone inside a link
fn is_plain_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c.is_ascii_whitespace() || matches!(c, '.' | '/')
}

/// A piece of scanned text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    Text(&'a str),
    /// `raw` is the whole `[[...]]`, `inner` what is between the brackets
    Link { raw: &'a str, inner: &'a str },
}

/// Splits text into plain runs and `[[...]]` links.
pub struct LinkScanner<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> LinkScanner<'a> {
    pub fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }
}

/// length of a valid link body at the start of `s`, if it is closed by `]]`
fn link_body_len(s: &str) -> Option<usize> {
    let len = s.find(|c: char| !is_link_char(c)).unwrap_or(s.len());
    (len > 0 && s[len..].starts_with(CLOSE)).then_some(len)
}

impl<'a> Iterator for LinkScanner<'a> {
    type Item = Segment<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let rest = &self.src[self.pos..];
        if rest.is_empty() {
            return None;
        }

        let mut search = 0;
        while let Some(offset) = rest[search..].find(OPEN) {
            let open = search + offset;
            if let Some(len) = link_body_len(&rest[open + OPEN.len()..]) {
                if open > 0 {
                    self.pos += open;
                    return Some(Segment::Text(&rest[..open]));
                }
                let end = OPEN.len() + len + CLOSE.len();
                self.pos += end;
                return Some(Segment::Link {
                    raw: &rest[..end],
                    inner: &rest[OPEN.len()..OPEN.len() + len],
                });
            }
            search = open + 1;
        }

        self.pos = self.src.len();
        Some(Segment::Text(rest))
    }
}

fn options() -> Options {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_FOOTNOTES);
    options
}

/// byte ranges of code spans and code blocks in markdown source
fn markdown_code_ranges(text: &str) -> Vec<Range<usize>> {
    let mut ranges: Vec<_> = Parser::new_ext(text, options())
        .into_offset_iter()
        .filter_map(|(event, range)| match event {
            Event::Code(_) | Event::Start(Tag::CodeBlock(_)) => Some(range),
            _ => None,
        })
        .collect();
    ranges.sort_by_key(|range| range.start);
    ranges
}

/// byte ranges of `<code>...</code>` elements in rendered HTML
fn html_code_ranges(html: &str) -> Vec<Range<usize>> {
    const END: &str = "</code>";
    let mut ranges = Vec::new();
    let mut pos = 0;
    while let Some(offset) = html[pos..].find("<code") {
        let start = pos + offset;
        let end = html[start..].find(END).map_or(html.len(), |e| start + e + END.len());
        ranges.push(start..end);
        pos = end;
    }
    ranges
}

/// Cut `text` into runs, flagged `true` when the run is one of `code`.
fn split_code<'a>(text: &'a str, code: &[Range<usize>]) -> Vec<(bool, &'a str)> {
    let mut runs = Vec::new();
    let mut pos = 0;
    for range in code {
        // nested in a range already emitted
        if range.start < pos {
            continue;
        }
        if range.start > pos {
            runs.push((false, &text[pos..range.start]));
        }
        runs.push((true, &text[range.clone()]));
        pos = range.end;
    }
    if pos < text.len() {
        runs.push((false, &text[pos..]));
    }
    runs
}

/// Backslash-escape every character of each link except letters, digits,
/// whitespace, `.` and `/`. Text outside links, and links inside code, are
/// untouched.
pub fn escape_links(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for (in_code, run) in split_code(text, &markdown_code_ranges(text)) {
        if in_code {
            out.push_str(run);
            continue;
        }
        for segment in LinkScanner::new(run) {
            match segment {
                Segment::Text(t) => out.push_str(t),
                Segment::Link { raw, .. } => {
                    for c in raw.chars() {
                        if !is_plain_char(c) {
                            out.push('\\');
                        }
                        out.push(c);
                    }
                }
            }
        }
    }
    out
}

pub fn render_markdown(text: &str) -> String {
    let mut out = String::new();
    html::push_html(&mut out, Parser::new_ext(text, options()));
    out
}

/// Turns link text into a page basename, relative to the sub-wiki of the
/// page being rendered.
#[derive(Debug, Clone, Copy)]
pub struct LinkResolver<'a> {
    subwiki: Option<&'a str>,
    home_page: &'a str,
}

impl<'a> LinkResolver<'a> {
    pub fn new(subwiki: Option<&'a str>, home_page: &'a str) -> Self {
        Self {
            subwiki: subwiki.filter(|s| !s.is_empty()),
            home_page,
        }
    }

    pub fn target(&self, text: &str) -> String {
        let lowered = text.trim().to_lowercase();
        let (absolute, path) = match lowered.strip_prefix('/') {
            Some(rest) => (true, rest),
            None => (false, lowered.as_str()),
        };

        let joined = path.split(':').map(str::trim).collect::<Vec<_>>().join("/");
        let mut target = to_filename(&joined);

        if !absolute {
            if let Some(subwiki) = self.subwiki {
                target = format!("{}/{}", subwiki, target);
            }
        }
        if target.is_empty() || target.ends_with('/') {
            target.push_str(self.home_page);
        }
        target
    }
}

/// Replace every `[[...]]` in rendered HTML with an anchor. `exists` is asked
/// once per link whether the target page is tracked.
pub fn resolve_links<F>(html: &str, resolver: &LinkResolver<'_>, exists: F) -> String
where
    F: Fn(&str) -> bool,
{
    let mut out = String::with_capacity(html.len());
    for (in_code, run) in split_code(html, &html_code_ranges(html)) {
        if in_code {
            out.push_str(run);
            continue;
        }
        for segment in LinkScanner::new(run) {
            match segment {
                Segment::Text(t) => out.push_str(t),
                Segment::Link { inner, .. } => {
                    let target = resolver.target(inner);
                    if exists(&target) {
                        out.push_str(&format!("<a href=\"/{}\">{}</a>", target, inner));
                    } else {
                        out.push_str(&format!(
                            "<a class=\"{}\" href=\"/{}\">{}</a>",
                            NOT_FOUND_CLASS, target, inner
                        ));
                    }
                }
            }
        }
    }
    out
}

/// All three passes.
pub fn render<F>(raw: &str, resolver: &LinkResolver<'_>, exists: F) -> String
where
    F: Fn(&str) -> bool,
{
    resolve_links(&render_markdown(&escape_links(raw)), resolver, exists)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn top() -> LinkResolver<'static> {
        LinkResolver::new(None, "home")
    }

    #[test]
    fn test_scanner_segments() {
        let segments: Vec<_> = LinkScanner::new("see [[Foo]] and [[[Bar]]] or [[bad!]]").collect();
        assert_eq!(
            segments,
            vec![
                Segment::Text("see "),
                Segment::Link { raw: "[[Foo]]", inner: "Foo" },
                Segment::Text(" and ["),
                Segment::Link { raw: "[[Bar]]", inner: "Bar" },
                Segment::Text("] or [[bad!]]"),
            ]
        );
    }

    #[test]
    fn test_scanner_edge_cases() {
        assert_eq!(LinkScanner::new("").count(), 0);
        assert_eq!(LinkScanner::new("[[]]").collect::<Vec<_>>(), vec![Segment::Text("[[]]")]);
        assert_eq!(
            LinkScanner::new("[[open").collect::<Vec<_>>(),
            vec![Segment::Text("[[open")]
        );
        assert_eq!(
            LinkScanner::new("[[a]][[b]]").collect::<Vec<_>>(),
            vec![
                Segment::Link { raw: "[[a]]", inner: "a" },
                Segment::Link { raw: "[[b]]", inner: "b" },
            ]
        );
        assert_eq!(
            LinkScanner::new("caf\u{e9} [[x]]").collect::<Vec<_>>(),
            vec![Segment::Text("caf\u{e9} "), Segment::Link { raw: "[[x]]", inner: "x" }]
        );
    }

    #[test]
    fn test_escape_links() {
        assert_eq!(escape_links("[[Foo:Bar_baz]]"), "\\[\\[Foo\\:Bar\\_baz\\]\\]");
        assert_eq!(escape_links("a_b [[x y/z.w]]"), "a_b \\[\\[x y/z.w\\]\\]");
        assert_eq!(escape_links("no links *here*"), "no links *here*");
    }

    #[test]
    fn test_escape_skips_code() {
        assert_eq!(
            escape_links("`[[Foo_Bar]]` and [[a_b]]"),
            "`[[Foo_Bar]]` and \\[\\[a\\_b\\]\\]"
        );
        let fenced = "```\n[[x_y]]\n```\n";
        assert_eq!(escape_links(fenced), fenced);
    }

    #[test]
    fn test_escaped_link_survives_markdown() {
        let html = render_markdown(&escape_links("[[_a_ b: c]]"));
        assert!(html.contains("[[_a_ b: c]]"), "{}", html);
        assert!(!html.contains("<em>"));
    }

    #[test]
    fn test_link_targets() {
        assert_eq!(top().target("Foo Bar"), "foo_bar");
        assert_eq!(top().target("sub: Baz"), "sub/baz");
        assert_eq!(top().target("dir2/"), "dir2/home");
        assert_eq!(top().target("/"), "home");

        let nested = LinkResolver::new(Some("dir1"), "home");
        assert_eq!(nested.target("sub: Baz"), "dir1/sub/baz");
        assert_eq!(nested.target("/sub: Baz"), "sub/baz");
        assert_eq!(nested.target("Other Page"), "dir1/other_page");
        assert_eq!(nested.target("sub:"), "dir1/sub/home");

        assert_eq!(LinkResolver::new(Some(""), "home").target("x"), "x");
    }

    #[test]
    fn test_render_top_level_link() {
        let html = render("[[Foo Bar]]", &top(), |_| false);
        assert!(
            html.contains("<a class=\"notfound\" href=\"/foo_bar\">Foo Bar</a>"),
            "{}",
            html
        );

        let html = render("[[Foo Bar]]", &top(), |t| t == "foo_bar");
        assert!(html.contains("<a href=\"/foo_bar\">Foo Bar</a>"), "{}", html);
        assert!(!html.contains(NOT_FOUND_CLASS));
    }

    #[test]
    fn test_render_subwiki_links() {
        let nested = LinkResolver::new(Some("dir1"), "home");
        let html = render("See [[sub: Baz]] and [[/sub: Baz]].", &nested, |_| true);
        assert!(html.contains("<a href=\"/dir1/sub/baz\">sub: Baz</a>"), "{}", html);
        assert!(html.contains("<a href=\"/sub/baz\">/sub: Baz</a>"), "{}", html);
    }

    #[test]
    fn test_render_keeps_markdown() {
        let html = render("# Title\n\nSome *text* with [[Link]].", &top(), |_| true);
        assert!(html.contains("<h1>Title</h1>"));
        assert!(html.contains("<em>text</em>"));
        assert!(html.contains("<a href=\"/link\">Link</a>"));
    }

    #[test]
    fn test_render_leaves_code_alone() {
        let html = render("Use `[[Foo_Bar]]` for links.", &top(), |_| true);
        assert!(html.contains("<code>[[Foo_Bar]]</code>"), "{}", html);
        assert!(!html.contains("<a"), "{}", html);

        let html = render("```\n[[x_y]]\n```\n\n[[Real]]", &top(), |_| true);
        assert!(html.contains("<pre><code>[[x_y]]\n</code></pre>"), "{}", html);
        assert!(html.contains("<a href=\"/real\">Real</a>"), "{}", html);
        assert_eq!(html.matches("<a").count(), 1);
    }

    #[test]
    fn test_split_code_runs() {
        let text = "ab`c`d";
        assert_eq!(
            split_code(text, &[2..5, 3..4]),
            vec![(false, "ab"), (true, "`c`"), (false, "d")]
        );
        assert_eq!(split_code(text, &[]), vec![(false, text)]);
    }

    #[test]
    fn test_exists_called_once_per_link() {
        let calls = std::cell::Cell::new(0);
        render("[[a]] [[b]] [[a]]", &top(), |_| {
            calls.set(calls.get() + 1);
            true
        });
        assert_eq!(calls.get(), 3);
    }
}
