//! Build configuration (pharmacy.json)
//!
//! Loads the JSON configuration, applies defaults and resolves every path
//! against the directory holding the configuration file.

mod comparator;
mod file_group;

pub use comparator::{DepthRange, NumberComparator, NumberExpr, Operator};
pub use file_group::{FileGroupDefinition, FileGroupSpec, OneOrMany};

use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::archive::{SignatureAlgorithm, SignatureError};
use crate::stub::{StubSource, DEFAULT_STALE_WARNING_DAYS};

/// Config file read when none is given
pub const DEFAULT_CONFIG_FILE: &str = "pharmacy.json";

/// Archive name used when the config has none
pub const DEFAULT_ARCHIVE_NAME: &str = "pharmacy.phar";

/// Version used when the config has none
pub const DEFAULT_VERSION: &str = "git";

/// Stub looked up next to the config when none is configured
pub const DEFAULT_STUB_FILE: &str = "stub.sh";

/// Error types for config operations
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    IoError { path: PathBuf, source: io::Error },

    #[error("Failed to parse JSON: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("Invalid signature algorithm: {0}")]
    SignatureAlgorithm(#[from] SignatureError),

    #[error("Invalid comparator: {0}")]
    InvalidComparator(String),

    #[error("The OPENSSL signature algorithm requires 'signingkey'")]
    MissingSigningKey,

    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Top-level keys as written in the config
#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    name: Option<String>,
    version: Option<String>,
    stub: Option<String>,
    signaturealgorithm: Option<String>,
    signingkey: Option<String>,
    stalewarningdays: Option<u32>,
    #[serde(default)]
    files: Vec<Value>,
    #[serde(flatten)]
    unknown: BTreeMap<String, Value>,
}

/// Immutable build description
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Archive file name (or path) as configured
    pub archive_name: String,
    pub version: String,
    pub signature_algorithm: SignatureAlgorithm,
    /// Base64 Ed25519 key file for the external algorithm
    pub signing_key: Option<PathBuf>,
    pub stub: StubSource,
    /// Days before a hash-versioned build warns it is stale; `None` disables
    pub stale_warning_days: Option<u32>,
    pub file_groups: Vec<FileGroupSpec>,
    /// Canonical directory containing the config file
    pub base_directory: PathBuf,
}

impl BuildConfig {
    /// Load and validate a config file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let io_err = |source| ConfigError::IoError {
            path: path.to_path_buf(),
            source,
        };
        let contents = fs::read_to_string(path).map_err(io_err)?;
        let absolute = fs::canonicalize(path).map_err(io_err)?;
        let base = absolute
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("/"));
        Self::parse_str(&contents, &base)
    }

    /// Parse config text whose relative paths resolve against `base_directory`
    pub fn parse_str(s: &str, base_directory: &Path) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_json::from_str(s)?;
        for key in raw.unknown.keys() {
            warn!(key = %key, "ignoring unknown config key");
        }

        let signature_algorithm = match raw.signaturealgorithm.as_deref() {
            Some(name) => name.parse::<SignatureAlgorithm>()?,
            None => SignatureAlgorithm::default(),
        };

        let stub = match raw.stub {
            Some(stub) => StubSource::Configured(base_directory.join(stub)),
            None => StubSource::Default(base_directory.join(DEFAULT_STUB_FILE)),
        };

        let file_groups = raw
            .files
            .into_iter()
            .map(FileGroupSpec::from_value)
            .collect::<Result<Vec<_>, _>>()?;

        let config = BuildConfig {
            archive_name: raw.name.unwrap_or_else(|| DEFAULT_ARCHIVE_NAME.to_string()),
            version: raw.version.unwrap_or_else(|| DEFAULT_VERSION.to_string()),
            signature_algorithm,
            signing_key: raw.signingkey.map(|key| base_directory.join(key)),
            stub,
            stale_warning_days: match raw.stalewarningdays {
                Some(0) => None,
                Some(days) => Some(days),
                None => Some(DEFAULT_STALE_WARNING_DAYS),
            },
            file_groups,
            base_directory: base_directory.to_path_buf(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.archive_name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "'name' must not be empty".to_string(),
            ));
        }

        if self.signature_algorithm.requires_key() {
            match &self.signing_key {
                Some(key) if key.is_file() => {}
                Some(key) => {
                    return Err(ConfigError::ValidationError(format!(
                        "signing key not found: {}",
                        key.display()
                    )))
                }
                None => return Err(ConfigError::MissingSigningKey),
            }
        }

        Ok(())
    }

    /// Where the archive is written
    pub fn archive_path(&self) -> PathBuf {
        self.base_directory.join(&self.archive_name)
    }

    /// File name used inside the stub
    pub fn archive_file_name(&self) -> String {
        Path::new(&self.archive_name)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.archive_name.clone())
    }
}
