//! Ordered exclusion rules.
//!
//! Patterns are evaluated top to bottom and the first one that matches
//! decides. A pattern is either:
//!
//! - an absolute path, excluding that directory (or file) and everything
//!   below it, or
//! - a single gitignore-style line matched against the path relative to the
//!   scan root (`node_modules/`, `*.tmp`, `build/cache`).
//!
//! A leading `!` turns a pattern into an include rule: a matching path is
//! kept and later rules are not consulted.

use std::path::{Path, PathBuf};

use ignore::gitignore::{Gitignore, GitignoreBuilder};

use super::ScanError;

#[derive(Debug)]
enum Matcher {
    Prefix(PathBuf),
    Glob(Gitignore),
}

#[derive(Debug)]
struct Rule {
    pattern: String,
    include: bool,
    matcher: Matcher,
}

/// Compiled exclusion rules for one scan root.
#[derive(Debug)]
pub struct ExclusionRules {
    root: PathBuf,
    rules: Vec<Rule>,
}

impl ExclusionRules {
    /// Compile `patterns` relative to `root`.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::InvalidPattern`] for a glob the `ignore` crate
    /// rejects.
    pub fn new<S: AsRef<str>>(root: &Path, patterns: &[S]) -> Result<Self, ScanError> {
        let mut rules = Vec::with_capacity(patterns.len());

        for raw in patterns {
            let raw = raw.as_ref().trim();
            if raw.is_empty() || raw.starts_with('#') {
                continue;
            }

            let (include, body) = match raw.strip_prefix('!') {
                Some(rest) => (true, rest),
                None => (false, raw),
            };

            let matcher = if Path::new(body).is_absolute() {
                Matcher::Prefix(PathBuf::from(body.trim_end_matches('/')))
            } else {
                let mut builder = GitignoreBuilder::new(root);
                builder
                    .add_line(None, body)
                    .map_err(|e| invalid(raw, &e))?;
                Matcher::Glob(builder.build().map_err(|e| invalid(raw, &e))?)
            };

            rules.push(Rule {
                pattern: raw.to_string(),
                include,
                matcher,
            });
        }

        Ok(Self {
            root: root.to_path_buf(),
            rules,
        })
    }

    /// Rules that match nothing.
    #[must_use]
    pub fn empty(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            rules: Vec::new(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Whether `path` should be left out of the scan.
    #[must_use]
    pub fn is_excluded(&self, path: &Path, is_dir: bool) -> bool {
        self.first_match(path, is_dir)
            .is_some_and(|rule| !rule.include)
    }

    /// The pattern that decided `path`, for logging.
    #[must_use]
    pub fn matching_pattern(&self, path: &Path, is_dir: bool) -> Option<&str> {
        self.first_match(path, is_dir).map(|r| r.pattern.as_str())
    }

    fn first_match(&self, path: &Path, is_dir: bool) -> Option<&Rule> {
        if path == self.root {
            return None;
        }
        let relative = path.strip_prefix(&self.root).unwrap_or(path);

        self.rules.iter().find(|rule| match &rule.matcher {
            Matcher::Prefix(prefix) => path.starts_with(prefix),
            Matcher::Glob(gi) => gi.matched(relative, is_dir).is_ignore(),
        })
    }
}

fn invalid(pattern: &str, error: &ignore::Error) -> ScanError {
    ScanError::InvalidPattern {
        pattern: pattern.to_string(),
        message: error.to_string(),
    }
}
