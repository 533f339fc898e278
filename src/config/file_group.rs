//! File-group definitions from the `files` array
//!
//! Each constraint may be written with its singular key (a scalar or a list)
//! and with its pluralized key (a list). Both forms are folded into one
//! normalized set per constraint when the config is loaded.

use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::PathBuf;

use super::comparator::{DepthRange, NumberComparator, NumberExpr};
use super::ConfigError;

/// A scalar or a list of scalars
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(v) => vec![v],
            OneOrMany::Many(v) => v,
        }
    }
}

/// A file group exactly as written in the config
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileGroupDefinition {
    #[serde(default, rename = "in")]
    pub roots: Option<OneOrMany<String>>,
    #[serde(default, rename = "ins")]
    pub roots_plural: Option<Vec<String>>,

    #[serde(default)]
    pub name: Option<OneOrMany<String>>,
    #[serde(default)]
    pub names: Option<Vec<String>>,

    #[serde(default, rename = "notName")]
    pub not_name: Option<OneOrMany<String>>,
    #[serde(default, rename = "notNames")]
    pub not_names: Option<Vec<String>>,

    #[serde(default)]
    pub contains: Option<OneOrMany<String>>,
    #[serde(default, rename = "notContains")]
    pub not_contains: Option<OneOrMany<String>>,

    #[serde(default)]
    pub depth: Option<OneOrMany<NumberExpr>>,
    #[serde(default)]
    pub depths: Option<Vec<NumberExpr>>,

    #[serde(default)]
    pub size: Option<OneOrMany<NumberExpr>>,
    #[serde(default)]
    pub sizes: Option<Vec<NumberExpr>>,

    #[serde(default)]
    pub exclude: Option<OneOrMany<String>>,
    #[serde(default)]
    pub excludes: Option<Vec<String>>,

    #[serde(default, rename = "ignoreDotFiles")]
    pub ignore_dot_files: Option<bool>,
    #[serde(default, rename = "ignoreVCS")]
    pub ignore_vcs: Option<bool>,

    #[serde(default, rename = "addVCSPattern")]
    pub add_vcs_pattern: Option<OneOrMany<String>>,
    #[serde(default, rename = "addVCSPatterns")]
    pub add_vcs_patterns: Option<Vec<String>>,

    #[serde(default, rename = "stripWhitespace")]
    pub strip_whitespace: Option<bool>,
}

/// Normalized, typed file-matching rules for one group
#[derive(Debug, Clone, PartialEq)]
pub struct FileGroupSpec {
    /// Directories (or single files) to search; empty means the base directory
    pub roots: BTreeSet<PathBuf>,
    /// Base-name patterns, at least one must match when non-empty
    pub names: BTreeSet<String>,
    /// Base-name patterns that reject a file
    pub not_names: BTreeSet<String>,
    /// Content patterns, at least one must match when non-empty
    pub contains: BTreeSet<String>,
    /// Content patterns that reject a file
    pub not_contains: BTreeSet<String>,
    pub depth: DepthRange,
    /// Size tests, all must hold
    pub sizes: Vec<NumberComparator>,
    /// Directory names or root-relative prefixes to prune
    pub excluded_dirs: BTreeSet<String>,
    pub include_vcs: bool,
    pub include_dot_files: bool,
    /// Extra VCS metadata names on top of the defaults
    pub vcs_patterns: BTreeSet<String>,
    pub strip_whitespace: bool,
}

impl Default for FileGroupSpec {
    fn default() -> Self {
        Self {
            roots: BTreeSet::new(),
            names: BTreeSet::new(),
            not_names: BTreeSet::new(),
            contains: BTreeSet::new(),
            not_contains: BTreeSet::new(),
            depth: DepthRange::default(),
            sizes: Vec::new(),
            excluded_dirs: BTreeSet::new(),
            include_vcs: false,
            include_dot_files: false,
            vcs_patterns: BTreeSet::new(),
            strip_whitespace: true,
        }
    }
}

impl FileGroupSpec {
    /// Fold a raw definition into typed constraints
    pub fn from_definition(def: FileGroupDefinition) -> Result<Self, ConfigError> {
        let mut spec = FileGroupSpec {
            roots: merge(def.roots, def.roots_plural)
                .into_iter()
                .map(PathBuf::from)
                .collect(),
            names: merge(def.name, def.names).into_iter().collect(),
            not_names: merge(def.not_name, def.not_names).into_iter().collect(),
            contains: merge(def.contains, None).into_iter().collect(),
            not_contains: merge(def.not_contains, None).into_iter().collect(),
            excluded_dirs: merge(def.exclude, def.excludes)
                .into_iter()
                .map(|d| d.trim_matches('/').to_string())
                .filter(|d| !d.is_empty())
                .collect(),
            include_vcs: def.ignore_vcs.unwrap_or(false),
            include_dot_files: def.ignore_dot_files.unwrap_or(false),
            vcs_patterns: merge(def.add_vcs_pattern, def.add_vcs_patterns)
                .into_iter()
                .collect(),
            strip_whitespace: def.strip_whitespace.unwrap_or(true),
            ..FileGroupSpec::default()
        };

        for expr in merge(def.depth, def.depths) {
            spec.depth.constrain(expr.to_comparator()?)?;
        }
        for expr in merge(def.size, def.sizes) {
            spec.sizes.push(expr.to_comparator()?);
        }

        Ok(spec)
    }

    /// Parse one group from a JSON value
    pub fn from_value(value: serde_json::Value) -> Result<Self, ConfigError> {
        let def: FileGroupDefinition = serde_json::from_value(value)?;
        Self::from_definition(def)
    }
}

fn merge<T>(singular: Option<OneOrMany<T>>, plural: Option<Vec<T>>) -> Vec<T> {
    let mut out = singular.map(OneOrMany::into_vec).unwrap_or_default();
    out.extend(plural.unwrap_or_default());
    out
}
