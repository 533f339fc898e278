//! Archive assembly
//!
//! Builds the self-executing archive: an optional stub, a canonical tar
//! stream of entries, and a signature trailer. Entries are written with
//! normalized headers (mode 0644, mtime 0, uid/gid 0) so an unchanged source
//! tree always produces the same bytes.
//!
//! ```text
//! [stub][tar stream][stub length: u64 LE]                    signed body
//! [signature][signature length: u32 LE][flag: u32 LE]["GBMB"] trailer
//! ```

mod reader;
mod signature;

pub use reader::ArchiveReader;
pub use signature::{
    decode_signing_key, decode_verifying_key, encode_signing_key, encode_verifying_key,
    load_signing_key, load_verifying_key, pubkey_path, SignatureAlgorithm, SignatureError,
};

use ed25519_dalek::SigningKey;
use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tar::{Builder, Header};
use tempfile::NamedTempFile;
use tracing::debug;

/// Magic bytes closing every archive
pub const MAGIC: &[u8; 4] = b"GBMB";

/// Size of the fixed part of the trailer (signature length, flag, magic)
pub const TRAILER_FIXED_LEN: usize = 4 + 4 + MAGIC.len();

/// Errors for archive operations
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("output directory does not exist: {0}")]
    MissingOutputDir(PathBuf),

    #[error("cannot replace existing archive {path}: {source}")]
    RemoveExisting { path: PathBuf, source: io::Error },

    #[error("invalid entry path '{path}': {reason}")]
    InvalidEntryPath { path: String, reason: &'static str },

    #[error("signature algorithm was not set before finalize")]
    SignatureNotSet,

    #[error("signature error: {0}")]
    Signature(#[from] SignatureError),

    #[error("not an archive: {0}")]
    Malformed(String),
}

/// One stored file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Normalized relative path, `/`-separated
    pub path: String,
    /// Stored bytes
    pub contents: Vec<u8>,
}

/// Outcome of a successful finalize
#[derive(Debug, Clone)]
pub struct ArchiveSummary {
    /// Where the archive was written
    pub path: PathBuf,
    /// Number of entries stored
    pub entry_count: usize,
    /// Total archive size in bytes
    pub size: u64,
    /// Trailer algorithm
    pub algorithm: SignatureAlgorithm,
    /// Hex-encoded trailer signature
    pub signature: String,
    /// Whether a stub was prepended
    pub executable: bool,
}

/// Accumulates entries and writes the archive on finalize
#[derive(Debug)]
pub struct ArchiveBuilder {
    path: PathBuf,
    algorithm: Option<SignatureAlgorithm>,
    signing_key: Option<SigningKey>,
    stub: Option<Vec<u8>>,
    entries: Vec<ArchiveEntry>,
    index: HashMap<String, usize>,
}

impl ArchiveBuilder {
    /// Start a fresh archive at `path`, deleting any file already there
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ArchiveError> {
        let path = path.into();

        let parent = output_dir(&path);
        if !parent.is_dir() {
            return Err(ArchiveError::MissingOutputDir(parent.to_path_buf()));
        }

        if path.exists() {
            fs::remove_file(&path).map_err(|source| ArchiveError::RemoveExisting {
                path: path.clone(),
                source,
            })?;
            debug!(path = %path.display(), "removed previous archive");
        }

        Ok(Self {
            path,
            algorithm: None,
            signing_key: None,
            stub: None,
            entries: Vec::new(),
            index: HashMap::new(),
        })
    }

    /// Target path of the archive
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Select the trailer algorithm
    pub fn set_signature_algorithm(&mut self, algorithm: SignatureAlgorithm) {
        self.algorithm = Some(algorithm);
    }

    /// Key used by [`SignatureAlgorithm::External`]
    pub fn set_signing_key(&mut self, key: SigningKey) {
        self.signing_key = Some(key);
    }

    /// Bytes prepended to the archive so it can be executed directly
    pub fn set_stub(&mut self, stub: Vec<u8>) {
        self.stub = Some(stub);
    }

    /// Store an entry, replacing the contents of an existing entry with the same path
    pub fn add_entry(&mut self, path: &str, contents: Vec<u8>) -> Result<(), ArchiveError> {
        let path = normalize_entry_path(path)?;

        match self.index.get(&path) {
            Some(&slot) => {
                debug!(path = %path, "replacing existing entry");
                self.entries[slot].contents = contents;
            }
            None => {
                self.index.insert(path.clone(), self.entries.len());
                self.entries.push(ArchiveEntry { path, contents });
            }
        }
        Ok(())
    }

    /// Entries in insertion order
    pub fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    /// Write the archive atomically
    ///
    /// The archive is assembled in a temporary file next to the target and
    /// renamed into place only after everything was written. On error the
    /// temporary file is dropped, which deletes it.
    pub fn finalize(self) -> Result<ArchiveSummary, ArchiveError> {
        let algorithm = self.algorithm.ok_or(ArchiveError::SignatureNotSet)?;
        if algorithm.requires_key() && self.signing_key.is_none() {
            return Err(SignatureError::MissingKey(algorithm).into());
        }

        let stub = self.stub.as_deref().unwrap_or_default();
        let mut body = Vec::with_capacity(stub.len());
        body.extend_from_slice(stub);
        write_entries(&mut body, &self.entries)?;
        body.extend_from_slice(&(stub.len() as u64).to_le_bytes());

        let signature = algorithm.sign(&body, self.signing_key.as_ref())?;

        let mut tmp = NamedTempFile::new_in(output_dir(&self.path))?;
        tmp.write_all(&body)?;
        tmp.write_all(&signature)?;
        tmp.write_all(&(signature.len() as u32).to_le_bytes())?;
        tmp.write_all(&algorithm.flag().to_le_bytes())?;
        tmp.write_all(MAGIC)?;
        tmp.as_file().sync_all()?;

        let executable = self.stub.is_some();
        set_mode(tmp.path(), executable)?;

        let size = (body.len() + signature.len() + TRAILER_FIXED_LEN) as u64;

        // Public key is in place before the archive appears
        let pubkey = match &self.signing_key {
            Some(key) if algorithm.requires_key() => {
                let path = pubkey_path(&self.path);
                let mut key_tmp = NamedTempFile::new_in(output_dir(&self.path))?;
                writeln!(key_tmp, "{}", encode_verifying_key(&key.verifying_key()))?;
                key_tmp.as_file().sync_all()?;
                set_mode(key_tmp.path(), false)?;
                key_tmp.persist(&path).map_err(|e| ArchiveError::IoError(e.error))?;
                Some(path)
            }
            _ => None,
        };

        if let Err(e) = tmp.persist(&self.path) {
            if let Some(path) = pubkey {
                let _ = fs::remove_file(path);
            }
            return Err(ArchiveError::IoError(e.error));
        }
        debug!(path = %self.path.display(), size, "archive persisted");

        Ok(ArchiveSummary {
            path: self.path,
            entry_count: self.entries.len(),
            size,
            algorithm,
            signature: hex::encode(signature),
            executable,
        })
    }
}

/// Normalize an entry path to `/` separators, rejecting anything that could
/// escape the archive root
pub fn normalize_entry_path(path: &str) -> Result<String, ArchiveError> {
    let invalid = |reason| ArchiveError::InvalidEntryPath {
        path: path.to_string(),
        reason,
    };

    let unified = path.replace('\\', "/");
    if unified.starts_with('/') {
        return Err(invalid("absolute paths are not allowed"));
    }

    let mut segments = Vec::new();
    for segment in unified.split('/') {
        match segment {
            "" | "." => continue,
            ".." => return Err(invalid("parent directory segments are not allowed")),
            s if segments.is_empty() && s.len() == 2 && s.ends_with(':') => {
                return Err(invalid("drive prefixes are not allowed"));
            }
            s => segments.push(s),
        }
    }

    if segments.is_empty() {
        return Err(invalid("path is empty"));
    }
    Ok(segments.join("/"))
}

/// Append entries as a canonical tar stream
fn write_entries(out: &mut Vec<u8>, entries: &[ArchiveEntry]) -> io::Result<()> {
    let mut builder = Builder::new(out);
    for entry in entries {
        let mut header = Header::new_gnu();
        header.set_size(entry.contents.len() as u64);
        header.set_mtime(0);
        header.set_uid(0);
        header.set_gid(0);
        header.set_mode(0o644);
        header.set_entry_type(tar::EntryType::Regular);
        builder.append_data(&mut header, &entry.path, entry.contents.as_slice())?;
    }
    builder.finish()
}

fn output_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// Temporary files are created 0600; give the archive regular file modes
fn set_mode(path: &Path, executable: bool) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = if executable { 0o755 } else { 0o644 };
        fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    }
    #[cfg(not(unix))]
    let _ = (path, executable);
    Ok(())
}
