//! File selection
//!
//! Turns a [`FileGroupSpec`] into the concrete, ordered list of files to pack.
//! Each root is walked in file-name order without following symlinks; only
//! regular files are reported.

mod pattern;
mod rules;

pub use pattern::{ContentMatcher, NameMatcher};
pub use rules::{PathRules, DEFAULT_VCS_NAMES};

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

use crate::config::{DepthRange, FileGroupSpec, NumberComparator};

/// Errors for file selection
#[derive(Debug, thiserror::Error)]
pub enum SelectError {
    #[error("Root not found: {0}")]
    RootNotFound(PathBuf),

    #[error("Invalid glob pattern '{pattern}': {source}")]
    InvalidGlob {
        pattern: String,
        source: globset::Error,
    },

    #[error("Invalid regex pattern '{pattern}': {source}")]
    InvalidRegex {
        pattern: String,
        source: regex_lite::Error,
    },

    #[error("Walk error: {0}")]
    WalkError(#[from] walkdir::Error),

    #[error("Failed to read {path}: {source}")]
    ReadError { path: PathBuf, source: io::Error },
}

/// One matched file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedFile {
    pub absolute_path: PathBuf,
    /// Relative to the base directory, `/`-separated
    pub relative_path: String,
}

/// Compiled matcher for one file group
#[derive(Debug)]
pub struct FileSelector {
    base_directory: PathBuf,
    roots: Vec<PathBuf>,
    names: NameMatcher,
    not_names: NameMatcher,
    contains: ContentMatcher,
    not_contains: ContentMatcher,
    depth: DepthRange,
    sizes: Vec<NumberComparator>,
    rules: PathRules,
    skip_paths: BTreeSet<PathBuf>,
}

impl FileSelector {
    /// Compile the patterns of `spec`; relative roots resolve against `base_directory`
    pub fn new(spec: &FileGroupSpec, base_directory: &Path) -> Result<Self, SelectError> {
        let roots = if spec.roots.is_empty() {
            vec![base_directory.to_path_buf()]
        } else {
            spec.roots
                .iter()
                .map(|root| normalize_lexically(&base_directory.join(root)))
                .collect()
        };

        Ok(Self {
            base_directory: base_directory.to_path_buf(),
            roots,
            names: NameMatcher::new(&spec.names)?,
            not_names: NameMatcher::new(&spec.not_names)?,
            contains: ContentMatcher::new(&spec.contains)?,
            not_contains: ContentMatcher::new(&spec.not_contains)?,
            depth: spec.depth,
            sizes: spec.sizes.clone(),
            rules: PathRules::from_spec(spec),
            skip_paths: BTreeSet::new(),
        })
    }

    /// Never report these absolute paths
    pub fn with_skip_paths(mut self, paths: impl IntoIterator<Item = PathBuf>) -> Self {
        self.skip_paths
            .extend(paths.into_iter().map(|p| normalize_lexically(&p)));
        self
    }

    /// Walk every root and return the matches sorted by relative path
    pub fn select(&self) -> Result<Vec<SelectedFile>, SelectError> {
        let mut selected = BTreeMap::new();

        for root in &self.roots {
            let metadata = match fs::metadata(root) {
                Ok(metadata) => metadata,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    return Err(SelectError::RootNotFound(root.clone()));
                }
                Err(source) => {
                    return Err(SelectError::ReadError {
                        path: root.clone(),
                        source,
                    })
                }
            };

            if metadata.is_file() {
                if self.accepts(root, metadata.len())? {
                    self.insert(&mut selected, root.clone());
                }
                continue;
            }

            self.walk_root(root, &mut selected)?;
        }

        Ok(selected.into_values().collect())
    }

    fn walk_root(
        &self,
        root: &Path,
        selected: &mut BTreeMap<String, SelectedFile>,
    ) -> Result<(), SelectError> {
        let mut walker = WalkDir::new(root)
            .follow_links(false)
            .sort_by(|a, b| a.file_name().cmp(b.file_name()));
        if let Some(max) = self.depth.max {
            walker = walker.max_depth(max.saturating_add(1));
        }

        let entries = walker.into_iter().filter_entry(|entry| {
            if entry.depth() == 0 {
                return true;
            }
            let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());
            !self.rules.is_excluded(rel, entry.file_type().is_dir())
        });

        for entry in entries {
            let entry = entry?;
            if !entry.file_type().is_file() || entry.depth() == 0 {
                continue;
            }
            if !self.depth.contains(entry.depth() - 1) {
                continue;
            }

            let size = entry.metadata()?.len();
            if self.accepts(entry.path(), size)? {
                self.insert(selected, entry.path().to_path_buf());
            }
        }

        Ok(())
    }

    /// Name, size and content checks for one regular file
    fn accepts(&self, path: &Path, size: u64) -> Result<bool, SelectError> {
        if self.skip_paths.contains(&normalize_lexically(path)) {
            debug!(path = %path.display(), "skipping output file");
            return Ok(false);
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();
        if !self.names.is_empty() && !self.names.is_match(&name) {
            return Ok(false);
        }
        if self.not_names.is_match(&name) {
            return Ok(false);
        }

        if !self.sizes.iter().all(|cmp| cmp.test(size)) {
            return Ok(false);
        }

        if self.contains.is_empty() && self.not_contains.is_empty() {
            return Ok(true);
        }
        let contents = fs::read(path).map_err(|source| SelectError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        if !self.contains.is_empty() && !self.contains.is_match(&contents) {
            return Ok(false);
        }
        Ok(!self.not_contains.is_match(&contents))
    }

    fn insert(&self, selected: &mut BTreeMap<String, SelectedFile>, absolute_path: PathBuf) {
        let relative_path = relative_path(&absolute_path, &self.base_directory);
        debug!(path = %relative_path, "selected");
        selected.insert(
            relative_path.clone(),
            SelectedFile {
                absolute_path,
                relative_path,
            },
        );
    }
}

/// Resolve `.` and `..` components without touching the filesystem
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if out.file_name().is_some() {
                    out.pop();
                } else if !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// `/`-separated path of `path` relative to `base`, with `..` when outside it
pub fn relative_path(path: &Path, base: &Path) -> String {
    let path = normalize_lexically(path);
    let base = normalize_lexically(base);

    let path_parts: Vec<_> = path.components().collect();
    let base_parts: Vec<_> = base.components().collect();
    let common = path_parts
        .iter()
        .zip(&base_parts)
        .take_while(|(a, b)| a == b)
        .count();

    let mut parts: Vec<String> = vec!["..".to_string(); base_parts.len() - common];
    parts.extend(
        path_parts[common..]
            .iter()
            .map(|c| c.as_os_str().to_string_lossy().into_owned()),
    );
    parts.join("/")
}
