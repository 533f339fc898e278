//! Bootstrap stub rendering
//!
//! A stub template is plain text with a fixed set of placeholders:
//!
//! - `@archive_name@`: file name of the archive being built
//! - `@package_version@`: project version
//! - `@warning_time@`: Unix time after which the build counts as stale
//!
//! Lines mentioning `@warning_time@` are only emitted for builds whose
//! version is a commit hash. When the template has no such line, an
//! `ARCHIVE_WARNING_TIME=<epoch>` assignment is inserted after the shebang.

use chrono::{DateTime, Duration, Utc};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Shebang used when the template does not bring its own
pub const DEFAULT_SHEBANG: &str = "#!/usr/bin/env sh";

/// Default stale-build threshold in days
pub const DEFAULT_STALE_WARNING_DAYS: u32 = 30;

const ARCHIVE_NAME: &str = "@archive_name@";
const PACKAGE_VERSION: &str = "@package_version@";
const WARNING_TIME: &str = "@warning_time@";

/// Errors for stub loading
#[derive(Debug, thiserror::Error)]
pub enum StubError {
    #[error("stub not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to read stub {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
}

/// Where the stub template comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StubSource {
    /// Named in the config; must exist
    Configured(PathBuf),
    /// Conventional location; skipped when absent
    Default(PathBuf),
}

impl StubSource {
    pub fn path(&self) -> &Path {
        match self {
            StubSource::Configured(path) | StubSource::Default(path) => path,
        }
    }
}

/// Build-time values substituted into the template
#[derive(Debug, Clone)]
pub struct StubVariables {
    pub archive_name: String,
    pub version: String,
    /// Days until the build is considered stale, `None` to disable
    pub stale_warning_days: Option<u32>,
}

impl StubVariables {
    /// Epoch after which a hash-versioned build should warn, if any
    pub fn warning_time(&self, now: DateTime<Utc>) -> Option<i64> {
        let days = self.stale_warning_days.filter(|d| *d > 0)?;
        if !is_commit_hash(&self.version) {
            return None;
        }
        Some((now + Duration::days(i64::from(days))).timestamp())
    }
}

/// Whether a version string looks like a commit hash (`^[a-f0-9]+$`)
pub fn is_commit_hash(version: &str) -> bool {
    !version.is_empty()
        && version
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// Load the stub for `source`, returning `None` when a default stub is absent
pub fn resolve(source: &StubSource, vars: &StubVariables) -> Result<Option<Vec<u8>>, StubError> {
    let path = source.path();
    if !path.is_file() {
        return match source {
            StubSource::Configured(path) => Err(StubError::NotFound(path.clone())),
            StubSource::Default(path) => {
                warn!(path = %path.display(), "no default stub, archive will not be executable");
                Ok(None)
            }
        };
    }

    let template = fs::read_to_string(path).map_err(|source| StubError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Some(render(&template, vars, Utc::now())))
}

/// Render a template into stub bytes
pub fn render(template: &str, vars: &StubVariables, now: DateTime<Utc>) -> Vec<u8> {
    let warning_time = vars.warning_time(now);

    let (shebang, body) = match template.strip_prefix("#!") {
        Some(_) => {
            let (first, rest) = template.split_once('\n').unwrap_or((template, ""));
            (first.trim_end_matches('\r').to_string(), rest)
        }
        None => (DEFAULT_SHEBANG.to_string(), template),
    };

    let mut out = String::with_capacity(template.len() + 64);
    out.push_str(&shebang);
    out.push('\n');

    if let Some(time) = warning_time {
        if !template.contains(WARNING_TIME) {
            out.push_str(&format!("ARCHIVE_WARNING_TIME={}\n", time));
        }
    }

    for line in body.split_inclusive('\n') {
        if line.contains(WARNING_TIME) {
            match warning_time {
                Some(time) => out.push_str(&line.replace(WARNING_TIME, &time.to_string())),
                None => continue,
            }
        } else {
            out.push_str(line);
        }
    }

    let mut out = out
        .replace(ARCHIVE_NAME, &vars.archive_name)
        .replace(PACKAGE_VERSION, &vars.version);
    if !out.ends_with('\n') {
        out.push('\n');
    }
    out.into_bytes()
}
