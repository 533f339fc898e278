//! pharmacy - self-executing archive builder
//!
//! Reads a `pharmacy.json` build description, selects the matching source
//! files, transforms their contents and packs them behind a bootstrap stub
//! into a single signed archive.

pub mod archive;
pub mod compiler;
pub mod config;
pub mod logging;
pub mod select;
pub mod stub;
pub mod transform;

pub use archive::{ArchiveBuilder, ArchiveReader, SignatureAlgorithm};
pub use compiler::{CompileError, CompileFailure, CompileReport, CompileStage, Compiler, ErrorKind};
pub use config::{BuildConfig, ConfigError, FileGroupSpec};
pub use select::{FileSelector, SelectedFile};
