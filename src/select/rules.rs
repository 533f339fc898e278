//! Path pruning rules: VCS metadata, dot files and excluded directories
//!
//! Paths are checked relative to the root being walked, component by
//! component.

use std::collections::BTreeSet;
use std::path::{Component, Path};

use crate::config::FileGroupSpec;

/// Version-control metadata names excluded by default
pub const DEFAULT_VCS_NAMES: &[&str] = &[
    ".svn",
    "_svn",
    "CVS",
    "_darcs",
    ".arch-params",
    ".monotone",
    ".bzr",
    ".git",
    ".hg",
];

/// Pruning rules for one file group
#[derive(Debug, Clone)]
pub struct PathRules {
    vcs_names: BTreeSet<String>,
    exclude_vcs: bool,
    exclude_dot_files: bool,
    excluded_names: BTreeSet<String>,
    excluded_prefixes: Vec<String>,
}

impl PathRules {
    pub fn from_spec(spec: &FileGroupSpec) -> Self {
        let mut vcs_names: BTreeSet<String> =
            DEFAULT_VCS_NAMES.iter().map(|n| n.to_string()).collect();
        vcs_names.extend(spec.vcs_patterns.iter().cloned());

        let (prefixes, names): (Vec<String>, Vec<String>) = spec
            .excluded_dirs
            .iter()
            .cloned()
            .partition(|d| d.contains('/'));

        Self {
            vcs_names,
            exclude_vcs: !spec.include_vcs,
            exclude_dot_files: !spec.include_dot_files,
            excluded_names: names.into_iter().collect(),
            excluded_prefixes: prefixes,
        }
    }

    /// Whether `rel_path` (relative to the root) is pruned
    pub fn is_excluded(&self, rel_path: &Path, is_dir: bool) -> bool {
        let names: Vec<String> = rel_path
            .components()
            .filter_map(|c| match c {
                Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        if names.is_empty() {
            return false;
        }

        for name in &names {
            let is_vcs = self.vcs_names.contains(name);
            if is_vcs && self.exclude_vcs {
                return true;
            }
            if !is_vcs && self.exclude_dot_files && name.starts_with('.') {
                return true;
            }
        }

        let dir_names = if is_dir {
            &names[..]
        } else {
            &names[..names.len() - 1]
        };
        if dir_names.iter().any(|n| self.excluded_names.contains(n)) {
            return true;
        }

        let joined = names.join("/");
        self.excluded_prefixes.iter().any(|prefix| {
            joined
                .strip_prefix(prefix.as_str())
                .map_or(false, |rest| rest.starts_with('/') || (rest.is_empty() && is_dir))
        })
    }
}
