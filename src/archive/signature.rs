//! Archive integrity signatures
//!
//! Digest algorithms follow the phar flag numbering. The external algorithm
//! signs the archive body with an Ed25519 key supplied by the operator; the
//! matching public key travels next to the archive in `<archive>.pubkey`.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use md5::compute as md5_compute;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Errors from signing, verification and key handling
#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("unknown signature algorithm '{0}' (expected MD5, SHA1, SHA256, SHA512 or OPENSSL)")]
    UnknownAlgorithm(String),

    #[error("unknown signature flag 0x{0:04x}")]
    UnknownFlag(u32),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("the {0} algorithm requires a signing key")]
    MissingKey(SignatureAlgorithm),

    #[error("signature mismatch")]
    Mismatch,
}

/// Result type for signature operations
pub type SignatureResult<T> = Result<T, SignatureError>;

/// Integrity scheme stored in the archive trailer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignatureAlgorithm {
    Md5,
    #[default]
    Sha1,
    Sha256,
    Sha512,
    /// Ed25519 signature made with an operator-provided key (`OPENSSL` in config)
    External,
}

impl SignatureAlgorithm {
    /// Flag value written to the trailer
    pub fn flag(self) -> u32 {
        match self {
            SignatureAlgorithm::Md5 => 0x0001,
            SignatureAlgorithm::Sha1 => 0x0002,
            SignatureAlgorithm::Sha256 => 0x0003,
            SignatureAlgorithm::Sha512 => 0x0004,
            SignatureAlgorithm::External => 0x0010,
        }
    }

    /// Decode a trailer flag
    pub fn from_flag(flag: u32) -> SignatureResult<Self> {
        match flag {
            0x0001 => Ok(SignatureAlgorithm::Md5),
            0x0002 => Ok(SignatureAlgorithm::Sha1),
            0x0003 => Ok(SignatureAlgorithm::Sha256),
            0x0004 => Ok(SignatureAlgorithm::Sha512),
            0x0010 => Ok(SignatureAlgorithm::External),
            other => Err(SignatureError::UnknownFlag(other)),
        }
    }

    /// Config spelling of the algorithm
    pub fn as_str(self) -> &'static str {
        match self {
            SignatureAlgorithm::Md5 => "MD5",
            SignatureAlgorithm::Sha1 => "SHA1",
            SignatureAlgorithm::Sha256 => "SHA256",
            SignatureAlgorithm::Sha512 => "SHA512",
            SignatureAlgorithm::External => "OPENSSL",
        }
    }

    /// Whether signing needs a private key
    pub fn requires_key(self) -> bool {
        self == SignatureAlgorithm::External
    }

    /// Compute the trailer signature over the archive body
    pub fn sign(self, body: &[u8], key: Option<&SigningKey>) -> SignatureResult<Vec<u8>> {
        match self {
            SignatureAlgorithm::Md5 => Ok(md5_compute(body).0.to_vec()),
            SignatureAlgorithm::Sha1 => Ok(Sha1::digest(body).to_vec()),
            SignatureAlgorithm::Sha256 => Ok(Sha256::digest(body).to_vec()),
            SignatureAlgorithm::Sha512 => Ok(Sha512::digest(body).to_vec()),
            SignatureAlgorithm::External => {
                let key = key.ok_or(SignatureError::MissingKey(self))?;
                Ok(key.sign(body).to_bytes().to_vec())
            }
        }
    }

    /// Check a trailer signature against the archive body
    pub fn verify(
        self,
        body: &[u8],
        signature: &[u8],
        key: Option<&VerifyingKey>,
    ) -> SignatureResult<()> {
        match self {
            SignatureAlgorithm::External => {
                let key = key.ok_or(SignatureError::MissingKey(self))?;
                let bytes: [u8; 64] = signature
                    .try_into()
                    .map_err(|_| SignatureError::Mismatch)?;
                key.verify(body, &Signature::from_bytes(&bytes))
                    .map_err(|_| SignatureError::Mismatch)
            }
            digest => {
                if digest.sign(body, None)? == signature {
                    Ok(())
                } else {
                    Err(SignatureError::Mismatch)
                }
            }
        }
    }
}

impl FromStr for SignatureAlgorithm {
    type Err = SignatureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MD5" => Ok(SignatureAlgorithm::Md5),
            "SHA1" => Ok(SignatureAlgorithm::Sha1),
            "SHA256" => Ok(SignatureAlgorithm::Sha256),
            "SHA512" => Ok(SignatureAlgorithm::Sha512),
            "OPENSSL" | "EXTERNAL" => Ok(SignatureAlgorithm::External),
            other => Err(SignatureError::UnknownAlgorithm(other.to_string())),
        }
    }
}

impl fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Path of the public key written next to an externally signed archive
pub fn pubkey_path(archive: &Path) -> PathBuf {
    let mut name = archive.as_os_str().to_os_string();
    name.push(".pubkey");
    PathBuf::from(name)
}

/// Encode a signing key to base64 for storage
pub fn encode_signing_key(key: &SigningKey) -> String {
    base64::Engine::encode(&base64::engine::general_purpose::STANDARD, key.to_bytes())
}

/// Decode a signing key from base64
pub fn decode_signing_key(encoded: &str) -> SignatureResult<SigningKey> {
    let bytes =
        base64::Engine::decode(&base64::engine::general_purpose::STANDARD, encoded.trim())?;
    let bytes_array: [u8; 32] = bytes
        .try_into()
        .map_err(|_| SignatureError::InvalidKey("key must be 32 bytes".to_string()))?;
    Ok(SigningKey::from_bytes(&bytes_array))
}

/// Encode a verifying key to base64 for storage
pub fn encode_verifying_key(key: &VerifyingKey) -> String {
    base64::Engine::encode(&base64::engine::general_purpose::STANDARD, key.as_bytes())
}

/// Decode a verifying key from base64
pub fn decode_verifying_key(encoded: &str) -> SignatureResult<VerifyingKey> {
    let bytes =
        base64::Engine::decode(&base64::engine::general_purpose::STANDARD, encoded.trim())?;
    let bytes_array: [u8; 32] = bytes
        .try_into()
        .map_err(|_| SignatureError::InvalidKey("key must be 32 bytes".to_string()))?;
    VerifyingKey::from_bytes(&bytes_array).map_err(|e| SignatureError::InvalidKey(e.to_string()))
}

/// Load a base64 signing key file
pub fn load_signing_key(path: &Path) -> SignatureResult<SigningKey> {
    decode_signing_key(&fs::read_to_string(path)?)
}

/// Load the `.pubkey` companion of an archive
pub fn load_verifying_key(archive: &Path) -> SignatureResult<VerifyingKey> {
    decode_verifying_key(&fs::read_to_string(pubkey_path(archive))?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> SigningKey {
        SigningKey::generate(&mut rand::thread_rng())
    }

    #[test]
    fn test_parse_config_names() {
        assert_eq!("MD5".parse::<SignatureAlgorithm>().unwrap(), SignatureAlgorithm::Md5);
        assert_eq!("SHA512".parse::<SignatureAlgorithm>().unwrap(), SignatureAlgorithm::Sha512);
        assert_eq!(
            "OPENSSL".parse::<SignatureAlgorithm>().unwrap(),
            SignatureAlgorithm::External
        );
        assert!(matches!(
            "BOGUS".parse::<SignatureAlgorithm>(),
            Err(SignatureError::UnknownAlgorithm(name)) if name == "BOGUS"
        ));
    }

    #[test]
    fn test_default_is_sha1() {
        assert_eq!(SignatureAlgorithm::default(), SignatureAlgorithm::Sha1);
    }

    #[test]
    fn test_flags_round_trip() {
        for alg in [
            SignatureAlgorithm::Md5,
            SignatureAlgorithm::Sha1,
            SignatureAlgorithm::Sha256,
            SignatureAlgorithm::Sha512,
            SignatureAlgorithm::External,
        ] {
            assert_eq!(SignatureAlgorithm::from_flag(alg.flag()).unwrap(), alg);
        }
        assert!(SignatureAlgorithm::from_flag(0x99).is_err());
    }

    #[test]
    fn test_digest_lengths() {
        let body = b"archive body";
        assert_eq!(SignatureAlgorithm::Md5.sign(body, None).unwrap().len(), 16);
        assert_eq!(SignatureAlgorithm::Sha1.sign(body, None).unwrap().len(), 20);
        assert_eq!(SignatureAlgorithm::Sha256.sign(body, None).unwrap().len(), 32);
        assert_eq!(SignatureAlgorithm::Sha512.sign(body, None).unwrap().len(), 64);
    }

    #[test]
    fn test_known_sha1_digest() {
        let sig = SignatureAlgorithm::Sha1.sign(b"abc", None).unwrap();
        assert_eq!(hex::encode(sig), "a9993e364706816aba3e25717850c26c9cd0d89d");
    }

    #[test]
    fn test_digest_verify_detects_tampering() {
        let sig = SignatureAlgorithm::Sha256.sign(b"body", None).unwrap();
        assert!(SignatureAlgorithm::Sha256.verify(b"body", &sig, None).is_ok());
        assert!(matches!(
            SignatureAlgorithm::Sha256.verify(b"b0dy", &sig, None),
            Err(SignatureError::Mismatch)
        ));
    }

    #[test]
    fn test_external_requires_key() {
        assert!(matches!(
            SignatureAlgorithm::External.sign(b"body", None),
            Err(SignatureError::MissingKey(SignatureAlgorithm::External))
        ));
    }

    #[test]
    fn test_external_sign_and_verify() {
        let key = test_key();
        let sig = SignatureAlgorithm::External.sign(b"body", Some(&key)).unwrap();
        assert_eq!(sig.len(), 64);

        let verifying = key.verifying_key();
        assert!(SignatureAlgorithm::External
            .verify(b"body", &sig, Some(&verifying))
            .is_ok());

        let other = test_key().verifying_key();
        assert!(SignatureAlgorithm::External
            .verify(b"body", &sig, Some(&other))
            .is_err());
    }

    #[test]
    fn test_key_encoding() {
        let key = test_key();
        let decoded = decode_signing_key(&encode_signing_key(&key)).unwrap();
        assert_eq!(decoded.to_bytes(), key.to_bytes());

        let verifying = key.verifying_key();
        let decoded = decode_verifying_key(&encode_verifying_key(&verifying)).unwrap();
        assert_eq!(decoded, verifying);

        assert!(matches!(
            decode_signing_key("c2hvcnQ="),
            Err(SignatureError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_pubkey_path() {
        assert_eq!(
            pubkey_path(Path::new("/tmp/out.phar")),
            PathBuf::from("/tmp/out.phar.pubkey")
        );
    }
}
