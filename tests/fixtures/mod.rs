//! Shared fixtures for integration tests
//!
//! Builds small project trees inside a temporary directory and writes the
//! `pharmacy.json` describing them.

#![allow(dead_code)]

use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A throwaway project directory
pub struct Project {
    pub dir: TempDir,
}

impl Project {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    /// Canonical project root, matching the config's base directory
    pub fn root(&self) -> PathBuf {
        fs::canonicalize(self.dir.path()).unwrap()
    }

    /// Write a file, creating parent directories
    pub fn file(&self, path: &str, contents: impl AsRef<[u8]>) -> &Self {
        let full = self.dir.path().join(path);
        fs::create_dir_all(full.parent().unwrap()).unwrap();
        fs::write(full, contents).unwrap();
        self
    }

    /// Write `pharmacy.json` and return its path
    pub fn config(&self, config: &Value) -> PathBuf {
        let path = self.dir.path().join("pharmacy.json");
        fs::write(&path, serde_json::to_vec_pretty(config).unwrap()).unwrap();
        path
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.root().join(rel)
    }
}

/// The tree used by the end-to-end scenario
pub fn scenario_project() -> Project {
    let project = Project::new();
    project
        .file("src/a.txt", "hello")
        .file("src/.git/HEAD", "ref: refs/heads/main\n");
    project
}

/// A small library with code, docs, VCS metadata and a license
pub fn library_project() -> Project {
    let project = Project::new();
    project
        .file("LICENSE", "MIT")
        .file(
            "src/Version.php",
            "<?php\n// version holder\nconst VERSION = '@package_version@';\n",
        )
        .file("src/Util/Str.php", "<?php\n\n\nfunction   pad($s) { return $s; }\n")
        .file("src/Util/.DS_Store", [0u8, 1, 2])
        .file("src/.svn/entries", "12")
        .file("tests/StrTest.php", "<?php class StrTest {}\n")
        .file("bin/tool", "#!/usr/bin/env php\n<?php require 'src/Version.php';\n");
    project
}

/// Read an archive back, panicking on any error
pub fn read_archive(path: &Path) -> pharmacy::ArchiveReader {
    pharmacy::ArchiveReader::open(path).unwrap()
}
