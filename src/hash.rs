// src/hash.rs

//! File digests for the CSAR manifest
//!
//! The manifest records one digest per packaged file. Only the two
//! algorithms the manifest format allows are supported:
//! - **SHA-256**
//! - **SHA-512**
//!
//! A digest source may also be a remote URL, in which case the content is
//! fetched in full before hashing.

use sha2::{Digest, Sha256, Sha512};
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

/// Read files in 1 MiB chunks while hashing.
const HASH_BLOCK_SIZE: usize = 1 << 20;

/// Hash algorithm accepted in manifest digest blocks.
///
/// Parses the hyphenated and plain spellings case-insensitively
/// (`SHA-256`, `sha256`, ...); displays the canonical hyphenated form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HashAlgorithm {
    #[default]
    Sha256,
    Sha512,
}

impl HashAlgorithm {
    /// Canonical algorithm name as written into manifests.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Sha256 => "SHA-256",
            Self::Sha512 => "SHA-512",
        }
    }

    /// Hex digest length for this algorithm.
    pub const fn hex_len(&self) -> usize {
        match self {
            Self::Sha256 => 64,
            Self::Sha512 => 128,
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for HashAlgorithm {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sha256" | "sha-256" => Ok(Self::Sha256),
            "sha512" | "sha-512" => Ok(Self::Sha512),
            _ => Err(HashError::UnknownAlgorithm(s.to_string())),
        }
    }
}

#[derive(Error, Debug)]
pub enum HashError {
    #[error("unsupported hash algorithm: {0}")]
    UnknownAlgorithm(String),

    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("server at {url} returned a {status} status code")]
    Download { url: String, status: u16 },
}

/// Compute the hex digest of a manifest digest source.
///
/// If `source` parses as an http(s) URL the content is fetched in full;
/// otherwise it is read from `root` joined with the relative path.
/// Deterministic for a given content and algorithm.
pub fn file_digest(
    root: &Path,
    source: &str,
    algorithm: HashAlgorithm,
) -> Result<String, HashError> {
    if is_remote(source) {
        debug!(url = source, %algorithm, "hashing remote digest source");
        let response = reqwest::blocking::get(source)?;
        let status = response.status().as_u16();
        if status != 200 {
            return Err(HashError::Download {
                url: source.to_string(),
                status,
            });
        }
        let body = response.bytes()?;
        digest_reader(body.as_ref(), algorithm).map_err(|e| HashError::Read {
            path: source.to_string(),
            source: e,
        })
    } else {
        let path = root.join(source);
        debug!(path = %path.display(), %algorithm, "hashing local file");
        let file = File::open(&path).map_err(|e| HashError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        digest_reader(file, algorithm).map_err(|e| HashError::Read {
            path: path.display().to_string(),
            source: e,
        })
    }
}

fn is_remote(source: &str) -> bool {
    url::Url::parse(source)
        .map(|u| matches!(u.scheme(), "http" | "https"))
        .unwrap_or(false)
}

fn digest_reader<R: Read>(mut reader: R, algorithm: HashAlgorithm) -> std::io::Result<String> {
    match algorithm {
        HashAlgorithm::Sha256 => {
            let mut hasher = Sha256::new();
            hash_chunks(&mut reader, &mut hasher)?;
            Ok(format!("{:x}", hasher.finalize()))
        }
        HashAlgorithm::Sha512 => {
            let mut hasher = Sha512::new();
            hash_chunks(&mut reader, &mut hasher)?;
            Ok(format!("{:x}", hasher.finalize()))
        }
    }
}

fn hash_chunks<R: Read, D: Digest>(reader: &mut R, hasher: &mut D) -> std::io::Result<()> {
    let mut buf = vec![0u8; HASH_BLOCK_SIZE];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            return Ok(());
        }
        hasher.update(&buf[..n]);
    }
}
