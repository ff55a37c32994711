//! Ordered purpose rules.
//!
//! A rule says "files matching this predicate belong to category X and
//! should be renamed in place (or moved to X's store)". Rules are evaluated
//! in order and the first match wins. Files no rule matches are kept as-is.
//!
//! In configuration:
//!
//! ```toml
//! [[rules]]
//! category = "music"
//! disposition = "relocate"
//! extensions = ["mp3", "wav", "flac"]
//!
//! [[rules]]
//! category = "script"
//! disposition = "rename"
//! name_pattern = "^(enhanced|simple|fixed)_"
//! ```

use std::collections::BTreeSet;
use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::PlanError;

/// What happens to a file matched by a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Disposition {
    Rename,
    Relocate,
}

/// Uncompiled rule as written in configuration.
///
/// Every predicate that is present must match.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RuleSpec {
    pub category: String,
    #[serde(default = "default_disposition")]
    pub disposition: Disposition,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extensions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_pattern: Option<String>,
}

fn default_disposition() -> Disposition {
    Disposition::Rename
}

impl Default for Disposition {
    fn default() -> Self {
        default_disposition()
    }
}

#[derive(Debug, Clone)]
enum Predicate {
    Extension(BTreeSet<String>),
    Name(Regex),
    Path(Regex),
}

impl Predicate {
    fn matches(&self, path: &Path) -> bool {
        match self {
            Self::Extension(set) => path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| set.contains(&e.to_lowercase())),
            Self::Name(re) => path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| re.is_match(n)),
            Self::Path(re) => path.to_str().is_some_and(|p| re.is_match(p)),
        }
    }
}

/// A compiled rule.
#[derive(Debug, Clone)]
pub struct PurposeRule {
    pub category: String,
    pub disposition: Disposition,
    predicates: Vec<Predicate>,
}

impl PurposeRule {
    /// Compile a rule.
    ///
    /// # Errors
    ///
    /// [`PlanError::InvalidRule`] for an empty category, a rule with no
    /// predicate, or an invalid regex.
    pub fn compile(rule: &RuleSpec) -> Result<Self, PlanError> {
        let invalid = |reason: String| PlanError::InvalidRule {
            category: rule.category.clone(),
            reason,
        };

        if rule.category.trim().is_empty() {
            return Err(invalid("category must not be empty".into()));
        }

        let mut predicates = Vec::new();
        if !rule.extensions.is_empty() {
            predicates.push(Predicate::Extension(
                rule.extensions
                    .iter()
                    .map(|e| e.trim_start_matches('.').to_lowercase())
                    .collect(),
            ));
        }
        if let Some(ref pattern) = rule.name_pattern {
            let re = Regex::new(pattern).map_err(|e| invalid(format!("name_pattern: {e}")))?;
            predicates.push(Predicate::Name(re));
        }
        if let Some(ref pattern) = rule.path_pattern {
            let re = Regex::new(pattern).map_err(|e| invalid(format!("path_pattern: {e}")))?;
            predicates.push(Predicate::Path(re));
        }
        if predicates.is_empty() {
            return Err(invalid("at least one of extensions, name_pattern or path_pattern is required".into()));
        }

        Ok(Self {
            category: rule.category.clone(),
            disposition: rule.disposition,
            predicates,
        })
    }

    #[must_use]
    pub fn matches(&self, path: &Path) -> bool {
        self.predicates.iter().all(|p| p.matches(path))
    }
}

/// Ordered rule list; first match wins.
#[derive(Debug, Clone, Default)]
pub struct PurposeRules {
    rules: Vec<PurposeRule>,
}

impl PurposeRules {
    /// Compile every rule, failing on the first invalid one.
    pub fn compile(entries: &[RuleSpec]) -> Result<Self, PlanError> {
        let rules = entries
            .iter()
            .map(PurposeRule::compile)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }

    #[must_use]
    pub fn first_match(&self, path: &Path) -> Option<&PurposeRule> {
        self.rules.iter().find(|r| r.matches(path))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
