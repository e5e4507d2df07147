//! Source-file references in rendered logs, rewritten into editor links.

use aho_corasick::{AhoCorasick, MatchKind};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::warn;

use super::ansi::{escape_html, unescape_html};
use crate::model::SuiteId;

static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid tag regex"));

/// A `file:line` reference found in a log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceReference {
    /// Full text of the match
    pub text: String,
    /// The file part, still HTML-escaped as it appears in the log
    pub file: String,
    pub line: Option<u32>,
}

/// Where links point to.
#[derive(Debug, Clone, Copy)]
pub struct LinkTarget<'a> {
    pub project_root: &'a Path,
    pub suite: SuiteId,
    /// Href template with `{file}` (hex-encoded), `{line}` and `{suite}`
    pub template: &'a str,
}

/// Finds source references in rendered HTML, ignoring markup.
///
/// The matcher's `file` and `line` named groups are used when present,
/// otherwise groups 1 and 2.
pub fn find_references(matcher: &Regex, html: &str) -> Vec<SourceReference> {
    let text = html.replace("<br>", "\n");
    let text = TAG.replace_all(&text, "");

    matcher
        .captures_iter(&text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let file = caps.name("file").or_else(|| caps.get(1))?;
            let line = caps
                .name("line")
                .or_else(|| caps.get(2))
                .and_then(|m| m.as_str().parse().ok());
            Some(SourceReference {
                text: whole.as_str().to_string(),
                file: file.as_str().to_string(),
                line,
            })
        })
        .collect()
}

/// Resolves a referenced file against the project root. Returns `None` when
/// the file does not exist.
///
/// Absolute paths are kept as they are and are not confined to the project
/// root: a stack frame in a vendored or system file still gets a link.
pub fn resolve_reference(file: &str, project_root: &Path) -> Option<PathBuf> {
    let path = Path::new(file);
    let path = if path.is_absolute() {
        path.to_path_buf()
    } else {
        project_root.join(path)
    };
    path.is_file().then_some(path)
}

/// Wraps every resolvable reference in an anchor.
///
/// The whole `file:line` text is linked when it appears verbatim in the
/// HTML; when markup splits it, only the file name is linked. References
/// that do not resolve to an existing file stay plain text.
pub fn link_references(html: &str, references: &[SourceReference], target: &LinkTarget) -> String {
    let mut needles: Vec<&str> = Vec::new();
    let mut anchors: Vec<String> = Vec::new();

    for reference in references {
        let needle = if html.contains(reference.text.as_str()) {
            reference.text.as_str()
        } else {
            reference.file.as_str()
        };
        if needle.is_empty() || needles.contains(&needle) {
            continue;
        }

        let file = unescape_html(&reference.file);
        if resolve_reference(&file, target.project_root).is_none() {
            continue;
        }

        needles.push(needle);
        anchors.push(anchor(target, &file, reference.line, needle));
    }

    if needles.is_empty() {
        return html.to_string();
    }

    let matcher = match AhoCorasick::builder()
        .match_kind(MatchKind::LeftmostLongest)
        .build(&needles)
    {
        Ok(matcher) => matcher,
        Err(e) => {
            warn!(error = %e, "failed to build reference matcher");
            return html.to_string();
        }
    };

    // Only text between tags is rewritten, never attributes.
    let mut out = String::with_capacity(html.len());
    let mut last = 0;
    for tag in TAG.find_iter(html) {
        out.push_str(&matcher.replace_all(&html[last..tag.start()], &anchors));
        out.push_str(tag.as_str());
        last = tag.end();
    }
    out.push_str(&matcher.replace_all(&html[last..], &anchors));
    out
}

fn anchor(target: &LinkTarget, file: &str, line: Option<u32>, text: &str) -> String {
    let href = target
        .template
        .replace("{file}", &hex::encode(file))
        .replace("{suite}", &target.suite.to_string())
        .replace("{line}", &line.map(|l| l.to_string()).unwrap_or_default());

    format!(
        "<a href=\"{}\" class=\"file\">{}</a>",
        escape_html(&href),
        text
    )
}
