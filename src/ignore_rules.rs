//! Ignore rules for excluding files from a walk
//!
//! An [`IgnoreRuleSet`] is compiled from glob patterns, one per line in a
//! rules file (by default `.fimignore` at the monitored root) plus any
//! patterns supplied programmatically.
//!
//! ## Pattern Semantics
//!
//! - `*` matches any run of characters inside one path segment, so `temp*`
//!   matches every name starting with `temp` and `*.log` every name ending in
//!   `.log`. `?` and `[abc]` classes work as in shell globs.
//! - A pattern **without** `/` is matched against the file name only:
//!   `*.log` ignores both `a.log` and `dir/b.log`.
//! - A pattern **with** `/` is matched against the whole relative path:
//!   `cache/*.bin` ignores `cache/x.bin` but not `cache/deep/x.bin`; use
//!   `cache/**` to cover a whole subtree.
//! - There is no negation syntax. A path is ignored if any pattern matches.
//!
//! ## Rules File Format
//!
//! ```text
//! # editor droppings
//! *.swp
//! *~
//!
//! # runtime state
//! run/*.pid
//! ```
//!
//! Blank lines and lines starting with `#` are skipped. A line that does not
//! compile as a glob is logged and skipped; it never fails the load.

use crate::error::Result;
use globset::{Glob, GlobBuilder, GlobSet, GlobSetBuilder};
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// Marker that starts a comment line in a rules file
pub const COMMENT_MARKER: char = '#';

/// Default rules file name looked up at the monitored root
pub const DEFAULT_IGNORE_FILE: &str = ".fimignore";

/// Compiled, immutable set of ignore patterns
#[derive(Debug, Clone)]
pub struct IgnoreRuleSet {
    /// Patterns that compiled, in load order
    patterns: Vec<String>,
    /// Patterns without a separator, matched against the file name
    name_globs: GlobSet,
    /// Patterns with a separator, matched against the relative path
    path_globs: GlobSet,
}

impl IgnoreRuleSet {
    /// Rule set that matches nothing
    pub fn empty() -> Self {
        Self::from_patterns(std::iter::empty::<&str>())
    }

    /// Load patterns from a rules file
    ///
    /// `None`, a missing file, or an empty file all yield an empty rule set.
    ///
    /// # Errors
    ///
    /// - [`FimError::Io`](crate::FimError::Io) if the file exists but cannot be read
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::empty());
        };

        let contents = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No ignore file at {:?}", path);
                return Ok(Self::empty());
            }
            Err(e) => return Err(e.into()),
        };

        let text = String::from_utf8_lossy(&contents);
        let rules = Self::parse(&text);
        debug!("Loaded {} ignore patterns from {:?}", rules.len(), path);
        Ok(rules)
    }

    /// Compile patterns from rules-file text
    pub fn parse(text: &str) -> Self {
        Self::from_patterns(text.lines())
    }

    /// Compile patterns from an iterator of lines
    ///
    /// Each line is trimmed; blank lines and comments are dropped.
    pub fn from_patterns<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut patterns = Vec::new();
        let mut name_builder = GlobSetBuilder::new();
        let mut path_builder = GlobSetBuilder::new();

        for line in lines {
            let pattern = line.as_ref().trim();
            if pattern.is_empty() || pattern.starts_with(COMMENT_MARKER) {
                continue;
            }

            let glob = match compile(pattern) {
                Ok(glob) => glob,
                Err(e) => {
                    warn!("Skipping invalid ignore pattern '{}': {}", pattern, e);
                    continue;
                }
            };

            if pattern.contains('/') {
                path_builder.add(glob);
            } else {
                name_builder.add(glob);
            }
            patterns.push(pattern.to_string());
        }

        Self {
            patterns,
            name_globs: build_set(name_builder),
            path_globs: build_set(path_builder),
        }
    }

    /// Return a new rule set with `extra` patterns appended
    pub fn with_patterns<I, S>(&self, extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let merged: Vec<String> = self
            .patterns
            .iter()
            .cloned()
            .chain(extra.into_iter().map(|p| p.as_ref().to_string()))
            .collect();
        Self::from_patterns(merged)
    }

    /// Whether `relative_path` (forward-slash separated) is ignored
    pub fn matches(&self, relative_path: &str) -> bool {
        let name = relative_path.rsplit('/').next().unwrap_or(relative_path);
        self.name_globs.is_match(name) || self.path_globs.is_match(relative_path)
    }

    /// Patterns that compiled, in load order
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Number of active patterns
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Whether the rule set matches nothing
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

impl Default for IgnoreRuleSet {
    fn default() -> Self {
        Self::empty()
    }
}

/// Free-function form of [`IgnoreRuleSet::matches`]
pub fn matches(rules: &IgnoreRuleSet, relative_path: &str) -> bool {
    rules.matches(relative_path)
}

fn compile(pattern: &str) -> std::result::Result<Glob, globset::Error> {
    GlobBuilder::new(pattern)
        .literal_separator(true)
        .backslash_escape(true)
        .build()
}

fn build_set(builder: GlobSetBuilder) -> GlobSet {
    // Every glob was already compiled individually, so building the set
    // cannot fail on pattern syntax.
    builder.build().unwrap_or_else(|e| {
        warn!("Failed to build ignore set: {}", e);
        GlobSet::empty()
    })
}
