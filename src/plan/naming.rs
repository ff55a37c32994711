//! Descriptive file names and deterministic collision resolution.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use super::{Destination, PlanError};

/// Numeric suffixes tried before a name is declared unresolvable.
pub const MAX_SUFFIX_ATTEMPTS: usize = 1000;

const REDUNDANT_PREFIXES: &[&str] = &[
    "enhanced_",
    "simple_",
    "fixed_",
    "new_",
    "updated_",
    "improved_",
    "copy of ",
];

const REDUNDANT_SUFFIXES: &[&str] = &[
    " (1)", " 1", "_1", "_v2", "-v2", " copy", "-copy", "_copy", "_final", "_old",
];

/// Strip redundant prefixes and version/copy suffixes from a file stem.
///
/// Matching is case-insensitive and repeated until nothing more strips.
/// Returns the input unchanged if stripping would leave nothing.
#[must_use]
pub fn clean_stem(stem: &str) -> String {
    let mut current = stem.trim().to_string();
    loop {
        let lower = current.to_lowercase();
        let stripped = REDUNDANT_PREFIXES
            .iter()
            .find(|p| lower.starts_with(*p) && current.is_char_boundary(p.len()))
            .map(|p| current[p.len()..].to_string())
            .or_else(|| {
                REDUNDANT_SUFFIXES
                    .iter()
                    .filter(|s| lower.ends_with(*s))
                    .find_map(|s| {
                        let cut = current.len().checked_sub(s.len())?;
                        current.is_char_boundary(cut).then(|| current[..cut].to_string())
                    })
            });
        match stripped {
            Some(next) if !next.trim().is_empty() => current = next.trim().to_string(),
            _ => return current,
        }
    }
}

/// Lower-kebab-case ASCII slug. Accents are decomposed and dropped.
#[must_use]
pub fn slugify(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut pending_dash = false;
    for c in s.nfkd().filter(|c| !is_combining_mark(*c)) {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    out
}

/// Descriptive name for `file_name` under `category`:
/// `<category>-<cleaned stem>.<lowercased ext>`.
#[must_use]
pub fn derive_name(category: &str, file_name: &str) -> String {
    let path = Path::new(file_name);
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name);
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase);

    let category = slugify(category);
    let stem = slugify(&clean_stem(stem));
    let base = if stem.is_empty() || stem == category {
        category
    } else if category.is_empty() || stem.starts_with(&format!("{category}-")) {
        stem
    } else {
        format!("{category}-{stem}")
    };
    let base = if base.is_empty() { "file".to_string() } else { base };

    match extension {
        Some(ext) if !ext.is_empty() => format!("{base}.{ext}"),
        _ => base,
    }
}

/// `name` with `_n` inserted before the extension.
#[must_use]
pub fn with_suffix(name: &str, n: usize) -> String {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{stem}_{n}.{ext}"),
        _ => format!("{name}_{n}"),
    }
}

/// Hands out destinations that are unique within a plan.
///
/// Path destinations must also be absent on disk. Resolution tries the
/// plain name, then `_1`, `_2`, ... so the same claims in the same order
/// always produce the same names.
#[derive(Debug, Default)]
pub struct NameAllocator {
    planned: HashSet<Destination>,
}

impl NameAllocator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a free path for `name` inside `dir`.
    pub fn claim_path(&mut self, dir: &Path, name: &str) -> Result<PathBuf, PlanError> {
        let chosen = self.claim(
            name,
            |candidate| Destination::Path {
                path: dir.join(candidate),
            },
            true,
        )?;
        Ok(dir.join(chosen))
    }

    /// Claim a free file name for `name` in the `category` store.
    pub fn claim_store(&mut self, category: &str, name: &str) -> Result<String, PlanError> {
        self.claim(
            name,
            |candidate| Destination::Store {
                category: category.to_string(),
                file_name: candidate.to_string(),
            },
            false,
        )
    }

    /// Whether `destination` has been handed out already.
    #[must_use]
    pub fn is_planned(&self, destination: &Destination) -> bool {
        self.planned.contains(destination)
    }

    fn claim<F>(&mut self, name: &str, make: F, check_disk: bool) -> Result<String, PlanError>
    where
        F: Fn(&str) -> Destination,
    {
        for attempt in 0..=MAX_SUFFIX_ATTEMPTS {
            let candidate = if attempt == 0 {
                name.to_string()
            } else {
                with_suffix(name, attempt)
            };
            let destination = make(&candidate);
            if self.planned.contains(&destination) {
                continue;
            }
            if check_disk {
                if let Some(path) = destination.path() {
                    if path.symlink_metadata().is_ok() {
                        continue;
                    }
                }
            }
            self.planned.insert(destination);
            return Ok(candidate);
        }
        Err(PlanError::Conflict {
            destination: make(name).to_string(),
            reason: format!("no free name after {MAX_SUFFIX_ATTEMPTS} numeric suffixes"),
        })
    }
}
