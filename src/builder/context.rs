//! Build context hygiene
//!
//! The environment descriptor holds cleartext secrets. Anything inside the
//! build context is sent to the engine and can be copied into a layer, so the
//! descriptor must either live outside the context or be excluded by the
//! context's ignore file.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use regex::Regex;

use crate::error::{PodError, Result};

/// Ignore file the engine reads from the root of the build context
pub const IGNORE_FILE_NAME: &str = ".dockerignore";

/// Fail unless `secret_file` stays out of what gets sent as `context`
pub fn ensure_excluded_from_context(secret_file: &Path, context: &Path) -> Result<()> {
    let context = fs::canonicalize(context).map_err(|e| {
        PodError::InvalidConfig(format!("build context '{}': {}", context.display(), e))
    })?;
    let secret_file = canonical_file_path(secret_file)?;

    let relative = match secret_file.strip_prefix(&context) {
        Ok(relative) => relative,
        Err(_) => return Ok(()),
    };
    if ignore_file_excludes(&context, relative)? {
        return Ok(());
    }

    Err(PodError::InvalidConfig(format!(
        "{} would be sent with build context {}; add '{}' to {} or use a --workdir outside the context",
        secret_file.display(),
        context.display(),
        relative.display(),
        context.join(IGNORE_FILE_NAME).display()
    )))
}

/// Canonicalize the parent so a file that does not exist yet still resolves
fn canonical_file_path(path: &Path) -> Result<PathBuf> {
    let file_name = path
        .file_name()
        .ok_or_else(|| PodError::InvalidConfig(format!("'{}' is not a file path", path.display())))?;
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let parent = fs::canonicalize(parent).map_err(|e| {
        PodError::InvalidConfig(format!("working directory '{}': {}", parent.display(), e))
    })?;
    Ok(parent.join(file_name))
}

/// Whether the ignore file at the root of `context` excludes `relative`.
/// Later lines win; `!` re-includes.
pub fn ignore_file_excludes(context: &Path, relative: &Path) -> Result<bool> {
    let content = match fs::read_to_string(context.join(IGNORE_FILE_NAME)) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(PodError::IoError(e)),
    };

    let target = slash_path(relative);
    let mut excluded = false;
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (negated, pattern) = match line.strip_prefix('!') {
            Some(rest) => (true, rest.trim()),
            None => (false, line),
        };
        if pattern_matches(pattern, &target) {
            excluded = !negated;
        }
    }
    Ok(excluded)
}

fn slash_path(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Match one ignore pattern against a slash-separated path. A pattern also
/// matches everything below a matching directory.
fn pattern_matches(pattern: &str, target: &str) -> bool {
    let pattern = pattern.trim_start_matches("./").trim_start_matches('/').trim_end_matches('/');
    if pattern.is_empty() {
        return false;
    }

    let mut source = String::from("^");
    let chars: Vec<char> = pattern.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' if chars.get(i + 1) == Some(&'*') => {
                source.push_str(".*");
                i += 1;
                // `**/` also matches zero directories
                if chars.get(i + 1) == Some(&'/') {
                    source.push_str("/?");
                    i += 1;
                }
            }
            '*' => source.push_str("[^/]*"),
            '?' => source.push_str("[^/]"),
            c => source.push_str(&regex::escape(&c.to_string())),
        }
        i += 1;
    }
    source.push_str("(/.*)?$");

    Regex::new(&source).map(|re| re.is_match(target)).unwrap_or(false)
}
