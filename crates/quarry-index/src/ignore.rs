//! Traversal filtering with gitignore semantics.
//!
//! A default denylist (build outputs, VCS metadata, caches, dotfiles)
//! is merged with user patterns, duplicates removed, and matched
//! against `/`-separated paths relative to the codebase root. File
//! enumeration applies the engine plus the supported-extension filter
//! and sorts entries by file name, so traversal order is reproducible.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use ignore::gitignore::{Gitignore, GitignoreBuilder};

use crate::error::{IndexError, Result};

/// Patterns excluded from every index run.
pub const DEFAULT_IGNORE_PATTERNS: &[&str] = &[
    "node_modules/",
    "target/",
    "build/",
    "dist/",
    "out/",
    "vendor/",
    "coverage/",
    "__pycache__/",
    "venv/",
    ".git/",
    ".svn/",
    ".hg/",
    "*.min.js",
    "*.map",
    "*.lock",
    ".*",
];

/// Compiled ignore matcher for one codebase root.
#[derive(Clone)]
pub struct IgnoreEngine {
    matcher: Gitignore,
    patterns: Vec<String>,
}

impl IgnoreEngine {
    /// Build an engine from the default denylist merged with
    /// `user_patterns`, duplicates removed.
    ///
    /// # Errors
    ///
    /// Returns a config error if a pattern fails to compile.
    pub fn new(root: &Path, user_patterns: &[String]) -> Result<Self> {
        let mut patterns: Vec<String> = Vec::new();
        for pattern in DEFAULT_IGNORE_PATTERNS
            .iter()
            .map(|p| (*p).to_owned())
            .chain(user_patterns.iter().cloned())
        {
            if !patterns.contains(&pattern) {
                patterns.push(pattern);
            }
        }

        let mut builder = GitignoreBuilder::new(root);
        for pattern in &patterns {
            builder
                .add_line(None, pattern)
                .map_err(|e| IndexError::Config(format!("bad ignore pattern {pattern:?}: {e}")))?;
        }
        let matcher = builder
            .build()
            .map_err(|e| IndexError::Config(format!("ignore patterns: {e}")))?;

        Ok(Self { matcher, patterns })
    }

    /// Whether a root-relative path is excluded from traversal.
    #[must_use]
    pub fn is_ignored(&self, relative: &str, is_dir: bool) -> bool {
        self.matcher
            .matched_path_or_any_parents(relative, is_dir)
            .is_ignore()
    }

    /// Merged pattern list, in match order.
    #[must_use]
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}

/// Whether a file's extension is in the supported set. Extensions in
/// the set are lowercase and dotted (`".rs"`).
#[must_use]
pub fn has_supported_extension(path: &Path, extensions: &BTreeSet<String>) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| extensions.contains(&format!(".{}", ext.to_lowercase())))
}

/// Enumerate indexable files under `root`, honoring the engine and the
/// supported-extension set. Entries are sorted by file name.
#[must_use]
pub fn enumerate_files(
    root: &Path,
    engine: &IgnoreEngine,
    extensions: &BTreeSet<String>,
) -> Vec<PathBuf> {
    let root_owned = root.to_path_buf();
    let engine = engine.clone();
    WalkBuilder::new(root)
        .standard_filters(false)
        .sort_by_file_name(std::ffi::OsStr::cmp)
        .filter_entry(move |entry| {
            let Ok(relative) = entry.path().strip_prefix(&root_owned) else {
                return true;
            };
            if relative.as_os_str().is_empty() {
                return true;
            }
            let is_dir = entry.file_type().is_some_and(|ft| ft.is_dir());
            !engine.is_ignored(&relative.to_string_lossy().replace('\\', "/"), is_dir)
        })
        .build()
        .flatten()
        .filter(|entry| entry.file_type().is_some_and(|ft| ft.is_file()))
        .filter(|entry| has_supported_extension(entry.path(), extensions))
        .map(ignore::DirEntry::into_path)
        .collect()
}
