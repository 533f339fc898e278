//! Compile orchestration
//!
//! Drives one build from a loaded [`BuildConfig`]:
//! - Open a fresh archive (removing any previous one)
//! - Select the files of every file group
//! - Transform and store each file
//! - Attach the rendered stub
//! - Sign and finalize
//!
//! Errors from every layer are collected into [`CompileError`] and classified
//! by [`ErrorKind`]. Only [`Compiler::compile`] turns them into a boolean.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::archive::{
    load_signing_key, pubkey_path, ArchiveBuilder, ArchiveError, ArchiveSummary, SignatureError,
};
use crate::config::{BuildConfig, ConfigError};
use crate::select::{FileSelector, SelectError};
use crate::stub::{self, StubError, StubVariables};
use crate::transform::transform;

/// Failure classes reported to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or missing configuration, bad patterns, missing inputs
    Config,
    /// Entry paths that cannot be stored
    Validation,
    /// Filesystem read/write/delete failures
    Io,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Config => "ConfigError",
            ErrorKind::Validation => "ValidationError",
            ErrorKind::Io => "IOError",
        };
        write!(f, "{}", s)
    }
}

/// Compile errors
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("selection error: {0}")]
    Select(#[from] SelectError),

    #[error("archive error: {0}")]
    Archive(#[from] ArchiveError),

    #[error("stub error: {0}")]
    Stub(#[from] StubError),

    #[error("signing key error: {0}")]
    SigningKey(#[from] SignatureError),

    #[error("failed to read {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
}

impl CompileError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            CompileError::Config(_) | CompileError::SigningKey(_) => ErrorKind::Config,
            CompileError::Select(e) => match e {
                SelectError::RootNotFound(_)
                | SelectError::InvalidGlob { .. }
                | SelectError::InvalidRegex { .. } => ErrorKind::Config,
                SelectError::WalkError(_) | SelectError::ReadError { .. } => ErrorKind::Io,
            },
            CompileError::Archive(e) => match e {
                ArchiveError::InvalidEntryPath { .. } => ErrorKind::Validation,
                ArchiveError::SignatureNotSet => ErrorKind::Config,
                ArchiveError::Signature(SignatureError::Io(_)) => ErrorKind::Io,
                ArchiveError::Signature(_) => ErrorKind::Config,
                ArchiveError::Malformed(_) => ErrorKind::Validation,
                ArchiveError::IoError(_)
                | ArchiveError::MissingOutputDir(_)
                | ArchiveError::RemoveExisting { .. } => ErrorKind::Io,
            },
            CompileError::Stub(e) => match e {
                StubError::NotFound(_) => ErrorKind::Config,
                StubError::Read { .. } => ErrorKind::Io,
            },
            CompileError::Read { .. } => ErrorKind::Io,
        }
    }
}

/// Pipeline progress, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CompileStage {
    Idle,
    ConfigLoaded,
    FilesSelected,
    ContentStaged,
    StubAttached,
    Finalized,
}

impl fmt::Display for CompileStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompileStage::Idle => "idle",
            CompileStage::ConfigLoaded => "config_loaded",
            CompileStage::FilesSelected => "files_selected",
            CompileStage::ContentStaged => "content_staged",
            CompileStage::StubAttached => "stub_attached",
            CompileStage::Finalized => "finalized",
        };
        write!(f, "{}", s)
    }
}

/// A failed compile and the last stage it completed
#[derive(Debug, Error)]
#[error("{error} (after stage {stage})")]
pub struct CompileFailure {
    pub stage: CompileStage,
    #[source]
    pub error: CompileError,
}

impl CompileFailure {
    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }
}

/// Outcome of a successful compile
#[derive(Debug, Clone)]
pub struct CompileReport {
    pub summary: ArchiveSummary,
    /// Stored paths in archive order
    pub files: Vec<String>,
}

/// Builds the archive described by a [`BuildConfig`]
#[derive(Debug, Clone)]
pub struct Compiler {
    config: BuildConfig,
}

impl Compiler {
    pub fn new(config: BuildConfig) -> Self {
        Self { config }
    }

    /// Load the configuration at `path`
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        Ok(Self::new(BuildConfig::from_file(path)?))
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Run the full pipeline
    ///
    /// Nothing is left at the archive path when this fails: the previous
    /// archive is removed up front and the new one only appears on finalize.
    pub fn try_compile(&self) -> Result<CompileReport, CompileFailure> {
        let mut stage = CompileStage::ConfigLoaded;
        self.run(&mut stage)
            .map_err(|error| CompileFailure { stage, error })
    }

    /// Run the pipeline, reporting any failure on stderr
    pub fn compile(&self) -> bool {
        match self.try_compile() {
            Ok(report) => {
                let summary = &report.summary;
                info!(
                    path = %summary.path.display(),
                    entries = summary.entry_count,
                    size = summary.size,
                    algorithm = %summary.algorithm,
                    signature = %summary.signature,
                    "archive written"
                );
                true
            }
            Err(failure) => {
                let kind = failure.kind();
                debug!(kind = %kind, stage = %failure.stage, "compile failed");
                eprintln!("{}: {}", kind, failure.error);
                false
            }
        }
    }

    fn run(&self, stage: &mut CompileStage) -> Result<CompileReport, CompileError> {
        let config = &self.config;
        let archive_path = config.archive_path();
        debug!(path = %archive_path.display(), "opening archive");

        let mut builder = ArchiveBuilder::open(&archive_path)?;
        builder.set_signature_algorithm(config.signature_algorithm);
        if config.signature_algorithm.requires_key() {
            if let Some(key_path) = &config.signing_key {
                builder.set_signing_key(load_signing_key(key_path)?);
            }
        }

        let skip = [archive_path.clone(), pubkey_path(&archive_path)];
        let mut groups = Vec::with_capacity(config.file_groups.len());
        for group in &config.file_groups {
            let selected = FileSelector::new(group, &config.base_directory)?
                .with_skip_paths(skip.iter().cloned())
                .select()?;
            debug!(roots = group.roots.len(), files = selected.len(), "file group selected");
            groups.push((group.strip_whitespace, selected));
        }
        *stage = CompileStage::FilesSelected;

        for (strip, selected) in groups {
            for file in selected {
                let contents = fs::read(&file.absolute_path).map_err(|source| {
                    CompileError::Read {
                        path: file.absolute_path.clone(),
                        source,
                    }
                })?;
                let stored = transform(&contents, &file.relative_path, &config.version, strip);
                builder.add_entry(&file.relative_path, stored)?;
            }
        }
        *stage = CompileStage::ContentStaged;

        let vars = StubVariables {
            archive_name: config.archive_file_name(),
            version: config.version.clone(),
            stale_warning_days: config.stale_warning_days,
        };
        if let Some(stub) = stub::resolve(&config.stub, &vars)? {
            builder.set_stub(stub);
        }
        *stage = CompileStage::StubAttached;

        let files = builder.entries().iter().map(|e| e.path.clone()).collect();
        let summary = builder.finalize()?;
        *stage = CompileStage::Finalized;

        Ok(CompileReport { summary, files })
    }
}
