// src/watch/patterns.rs

use std::path::Path;

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};

/// Compiled include / ignore glob patterns for the watched vault.
///
/// Patterns are evaluated against paths relative to the watch root (forward
/// slashes). Ignore patterns are checked **before** include patterns: an
/// ignored path never produces an event even if it also matches an include.
#[derive(Clone)]
pub struct WatchProfile {
    include: GlobSet,
    ignore: Option<GlobSet>,
}

impl std::fmt::Debug for WatchProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchProfile").finish_non_exhaustive()
    }
}

impl WatchProfile {
    /// Returns true if the watcher should forward events for this path
    /// (relative to the watch root, e.g. `"notes/inbox/todo.md"`).
    pub fn matches(&self, rel_path: &str) -> bool {
        if let Some(ignore) = &self.ignore {
            if ignore.is_match(rel_path) {
                return false;
            }
        }
        self.include.is_match(rel_path)
    }
}

/// Compile the vault watch profile from config pattern lists.
pub fn build_watch_profile(patterns: &[String], ignore: &[String]) -> Result<WatchProfile> {
    let include = build_globset(patterns).context("building include globset")?;

    let ignore = if ignore.is_empty() {
        None
    } else {
        Some(build_globset(ignore).context("building ignore globset")?)
    };

    Ok(WatchProfile { include, ignore })
}

/// Build a GlobSet from simple string patterns.
fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        let glob = Glob::new(pat).with_context(|| format!("invalid glob pattern: {pat}"))?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}

/// Convert a path into a string relative to `root`, with forward slashes.
///
/// Tries a direct `strip_prefix` first and falls back to canonicalizing both
/// sides (symlinked roots, macOS `/private/var` prefixes). Returns `None` if
/// the path cannot be related to `root` at all.
pub fn relative_str(root: &Path, path: &Path) -> Option<String> {
    if let Ok(rel) = path.strip_prefix(root) {
        return Some(rel.to_string_lossy().replace('\\', "/"));
    }

    if let (Ok(root_canon), Ok(path_canon)) = (root.canonicalize(), path.canonicalize()) {
        if let Ok(rel) = path_canon.strip_prefix(&root_canon) {
            return Some(rel.to_string_lossy().replace('\\', "/"));
        }
    }

    None
}

/// Whether `path` carries one of the configured processable extensions.
///
/// Comparison is case-insensitive; an empty `extensions` list accepts
/// everything.
pub fn has_matching_extension(path: &Path, extensions: &[String]) -> bool {
    if extensions.is_empty() {
        return true;
    }
    let ext = match path.extension().and_then(|e| e.to_str()) {
        Some(e) => e.to_ascii_lowercase(),
        None => return false,
    };
    extensions.iter().any(|e| e.eq_ignore_ascii_case(&ext))
}
