//! Failure artifacts written by test tools into their output folder.

use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::ansi::{escape_html, remove_ansi_codes};
use crate::model::{ArtifactStrategy, TestContext};

/// Artifact file name for a test: the file name with `.php` removed, `::`
/// turned into `.`, path separators dropped, then `extension` appended.
/// Other extensions stay, so `example.spec.js` gives `example.spec.js.png`.
pub fn artifact_file_name(test_name: &str, extension: &str) -> String {
    let file_name = Path::new(test_name)
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| test_name.to_string());

    let base = file_name
        .replace(".php", "")
        .replace("::", ".")
        .replace(['\\', '/'], "");
    format!("{}{}", base, extension)
}

/// The tester's output folder resolved against the project root.
pub fn output_dir(ctx: &TestContext) -> Option<PathBuf> {
    ctx.tester
        .profile
        .output_folder
        .as_ref()
        .map(|folder| ctx.project.path.join(folder))
}

/// Renders a text artifact as HTML, keeping its line structure.
pub fn render_html(contents: &str) -> String {
    escape_html(contents).replace('\n', "<br />\n")
}

/// Reads the HTML failure artifact of a test, if the tool wrote one.
pub fn html_artifact(ctx: &TestContext) -> Option<String> {
    let dir = output_dir(ctx)?;
    let extension = ctx.tester.profile.output_html_fail_extension.as_deref()?;
    let path = dir.join(artifact_file_name(&ctx.test.name, extension));

    match fs::read_to_string(&path) {
        Ok(contents) => Some(render_html(&contents)),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "no html artifact");
            None
        }
    }
}

/// Screenshots of a failing run, according to the tester's artifact strategy.
pub fn screenshots(ctx: &TestContext, raw_log: &str) -> Vec<PathBuf> {
    let Some(dir) = output_dir(ctx) else {
        return Vec::new();
    };

    match &ctx.tester.profile.artifacts {
        ArtifactStrategy::Generic => {
            let Some(extension) = ctx.tester.profile.output_png_fail_extension.as_deref() else {
                return Vec::new();
            };
            let path = dir.join(artifact_file_name(&ctx.test.name, extension));
            if path.is_file() {
                vec![path]
            } else {
                Vec::new()
            }
        }
        ArtifactStrategy::PatternBased {
            pattern,
            file_template,
        } => failing_case_screenshots(&dir, pattern, file_template, raw_log),
    }
}

/// One screenshot per failing case named in the log.
fn failing_case_screenshots(
    dir: &Path,
    pattern: &str,
    file_template: &str,
    raw_log: &str,
) -> Vec<PathBuf> {
    let regex = match Regex::new(pattern) {
        Ok(regex) => regex,
        Err(e) => {
            warn!(pattern, error = %e, "invalid failure pattern");
            return Vec::new();
        }
    };

    let log = remove_ansi_codes(raw_log);
    let mut found = Vec::new();
    for caps in regex.captures_iter(&log) {
        let Some(case) = caps
            .name("name")
            .or_else(|| caps.get(2))
            .or_else(|| caps.get(1))
        else {
            continue;
        };

        let case = case.as_str().replace('\r', "");
        let case = case.trim_end();
        if case.is_empty() {
            continue;
        }

        let path = dir.join(file_template.replace("{name}", case));
        if !found.contains(&path) {
            found.push(path);
        }
    }
    found
}
