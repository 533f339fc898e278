//! Reading finished archives
//!
//! Splits an archive into stub, entries and trailer, and checks the trailer
//! signature before exposing any entry.

use ed25519_dalek::VerifyingKey;
use std::fs;
use std::io::{Cursor, Read};
use std::path::Path;

use super::signature::{load_verifying_key, SignatureAlgorithm};
use super::{ArchiveEntry, ArchiveError, MAGIC, TRAILER_FIXED_LEN};

/// A verified archive loaded into memory
#[derive(Debug)]
pub struct ArchiveReader {
    stub: Vec<u8>,
    entries: Vec<ArchiveEntry>,
    algorithm: SignatureAlgorithm,
    signature: Vec<u8>,
}

impl ArchiveReader {
    /// Open and verify an archive
    ///
    /// Externally signed archives are verified with the `<archive>.pubkey`
    /// file written next to them.
    pub fn open(path: &Path) -> Result<Self, ArchiveError> {
        let bytes = fs::read(path)?;
        let flag = read_flag(&bytes)?;
        let key = if SignatureAlgorithm::from_flag(flag)?.requires_key() {
            Some(load_verifying_key(path)?)
        } else {
            None
        };
        Self::from_bytes(&bytes, key.as_ref())
    }

    /// Parse and verify archive bytes
    pub fn from_bytes(bytes: &[u8], key: Option<&VerifyingKey>) -> Result<Self, ArchiveError> {
        let algorithm = SignatureAlgorithm::from_flag(read_flag(bytes)?)?;

        let fixed_start = bytes.len() - TRAILER_FIXED_LEN;
        let sig_len = u32::from_le_bytes(word(&bytes[fixed_start..fixed_start + 4])) as usize;
        let body_end = fixed_start
            .checked_sub(sig_len)
            .ok_or_else(|| malformed("signature length exceeds archive size"))?;
        let signature = bytes[body_end..fixed_start].to_vec();
        let body = &bytes[..body_end];

        algorithm.verify(body, &signature, key)?;

        if body.len() < 8 {
            return Err(malformed("missing stub length"));
        }
        let (payload, stub_len) = body.split_at(body.len() - 8);
        let mut len_bytes = [0u8; 8];
        len_bytes.copy_from_slice(stub_len);
        let stub_len = u64::from_le_bytes(len_bytes) as usize;
        if stub_len > payload.len() {
            return Err(malformed("stub length exceeds archive size"));
        }
        let (stub, tar_bytes) = payload.split_at(stub_len);

        let mut entries = Vec::new();
        let mut archive = tar::Archive::new(Cursor::new(tar_bytes));
        for entry in archive.entries()? {
            let mut entry = entry?;
            let path = entry.path()?.to_string_lossy().into_owned();
            let mut contents = Vec::new();
            entry.read_to_end(&mut contents)?;
            entries.push(ArchiveEntry { path, contents });
        }

        Ok(Self {
            stub: stub.to_vec(),
            entries,
            algorithm,
            signature,
        })
    }

    /// Stub bytes, empty when the archive has none
    pub fn stub(&self) -> &[u8] {
        &self.stub
    }

    /// Entries in stored order
    pub fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    /// Contents of the entry at `path`
    pub fn get(&self, path: &str) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|e| e.path == path)
            .map(|e| e.contents.as_slice())
    }

    /// Trailer algorithm
    pub fn algorithm(&self) -> SignatureAlgorithm {
        self.algorithm
    }

    /// Hex-encoded trailer signature
    pub fn signature_hex(&self) -> String {
        hex::encode(&self.signature)
    }
}

fn read_flag(bytes: &[u8]) -> Result<u32, ArchiveError> {
    if bytes.len() < TRAILER_FIXED_LEN || !bytes.ends_with(MAGIC) {
        return Err(malformed("missing GBMB trailer"));
    }
    let at = bytes.len() - MAGIC.len() - 4;
    Ok(u32::from_le_bytes(word(&bytes[at..at + 4])))
}

fn word(slice: &[u8]) -> [u8; 4] {
    let mut out = [0u8; 4];
    out.copy_from_slice(slice);
    out
}

fn malformed(reason: &str) -> ArchiveError {
    ArchiveError::Malformed(reason.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{encode_signing_key, ArchiveBuilder, SignatureError};
    use ed25519_dalek::SigningKey;
    use tempfile::TempDir;

    fn build(dir: &TempDir, algorithm: SignatureAlgorithm, key: Option<SigningKey>) -> Vec<u8> {
        let path = dir.path().join("test.phar");
        let mut builder = ArchiveBuilder::open(&path).unwrap();
        builder.set_signature_algorithm(algorithm);
        if let Some(key) = key {
            builder.set_signing_key(key);
        }
        builder.add_entry("a.txt", b"alpha".to_vec()).unwrap();
        builder.finalize().unwrap();
        fs::read(path).unwrap()
    }

    #[test]
    fn test_reads_every_digest_algorithm() {
        for algorithm in [
            SignatureAlgorithm::Md5,
            SignatureAlgorithm::Sha1,
            SignatureAlgorithm::Sha256,
            SignatureAlgorithm::Sha512,
        ] {
            let dir = TempDir::new().unwrap();
            let bytes = build(&dir, algorithm, None);
            let archive = ArchiveReader::from_bytes(&bytes, None).unwrap();
            assert_eq!(archive.algorithm(), algorithm);
            assert_eq!(archive.get("a.txt").unwrap(), b"alpha");
            assert!(archive.stub().is_empty());
        }
    }

    #[test]
    fn test_tampered_archive_rejected() {
        let dir = TempDir::new().unwrap();
        let mut bytes = build(&dir, SignatureAlgorithm::Sha256, None);
        let pos = bytes.windows(5).position(|w| w == b"alpha").unwrap();
        bytes[pos] = b'A';

        let err = ArchiveReader::from_bytes(&bytes, None).unwrap_err();
        assert!(matches!(err, ArchiveError::Signature(SignatureError::Mismatch)));
    }

    #[test]
    fn test_missing_magic_rejected() {
        let err = ArchiveReader::from_bytes(b"plain text file", None).unwrap_err();
        assert!(matches!(err, ArchiveError::Malformed(_)));
    }

    #[test]
    fn test_external_uses_pubkey_file() {
        let dir = TempDir::new().unwrap();
        let key = SigningKey::generate(&mut rand::thread_rng());
        // keys survive the base64 form used on disk
        let key = crate::archive::decode_signing_key(&encode_signing_key(&key)).unwrap();
        build(&dir, SignatureAlgorithm::External, Some(key));

        let path = dir.path().join("test.phar");
        assert!(dir.path().join("test.phar.pubkey").exists());
        let archive = ArchiveReader::open(&path).unwrap();
        assert_eq!(archive.algorithm(), SignatureAlgorithm::External);
        assert_eq!(archive.signature_hex().len(), 128);

        fs::write(
            dir.path().join("test.phar.pubkey"),
            crate::archive::encode_verifying_key(
                &SigningKey::generate(&mut rand::thread_rng()).verifying_key(),
            ),
        )
        .unwrap();
        assert!(ArchiveReader::open(&path).is_err());
    }
}
