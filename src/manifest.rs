// src/manifest.rs

//! CSAR manifest file parsing and serialization
//!
//! The manifest is a block-structured UTF-8 text file. Blocks are separated
//! by one or more blank (or whitespace-only) lines; every line inside a
//! block is a `Key: value` pair split on the first colon. Four block kinds
//! exist, dispatched on the first line:
//!
//! - `metadata:` is package identification, all four keys required
//! - `non_mano_artifact_sets:` holds named groups of referenced source files
//! - a `-----BEGIN CMS-----` marker opens the detached signature blob
//! - anything starting with a digest key is a file digest block
//!
//! Digest blocks are strict `Source` / `Algorithm` / `Hash` triplets; an
//! `Algorithm` must follow a `Source` and be followed by its `Hash`. A
//! `Source` alone records the file with no digest. Every recorded hash is
//! recomputed on parse and a mismatch is fatal.
//!
//! The format has no forward-compatibility story: unknown keys anywhere are
//! parse errors.

use crate::hash::{self, HashAlgorithm, HashError};
use chrono::DateTime;
use indexmap::IndexMap;
use regex::Regex;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tempfile::{NamedTempFile, TempPath};
use thiserror::Error;
use tracing::debug;

/// Required keys of the `metadata:` block, in serialization order.
pub const METADATA_KEYS: [&str; 4] = [
    "vnf_product_name",
    "vnf_provider_id",
    "vnf_package_version",
    "vnf_release_data_time",
];

const RELEASE_TIME_KEY: &str = "vnf_release_data_time";

const METADATA_BLOCK_KEY: &str = "metadata";
const ARTIFACT_SETS_BLOCK_KEY: &str = "non_mano_artifact_sets";
const SOURCE_KEY: &str = "Source";
const ALGORITHM_KEY: &str = "Algorithm";
const HASH_KEY: &str = "Hash";

/// Signature block delimiters, byte-preserved through a round trip.
pub const CMS_BEGIN: &str = "-----BEGIN CMS-----";
pub const CMS_END: &str = "-----END CMS-----";

/// Artifact set names are dotted lowercase identifiers.
static ARTIFACT_SET_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9a-z_-]+(\.[0-9a-z_-]+)*$").unwrap());

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("failed to read manifest: {0}")]
    Io(#[from] std::io::Error),

    #[error("unrecognized metadata line: {0}")]
    UnrecognizedMetadata(String),

    #[error("missing metadata keys: {0}")]
    MissingMetadataKeys(String),

    #[error("no metadata block in manifest")]
    NoMetadata,

    #[error("{RELEASE_TIME_KEY} is not an RFC 3339 timestamp: {0}")]
    BadTimestamp(String),

    #[error("unknown key in line: {0}")]
    UnknownKey(String),

    #[error("unrecognized file digest line: {0}")]
    BadDigestLine(String),

    #[error("mismatched hash for file {0}")]
    MismatchedHash(String),

    #[error("cannot find end of signature block")]
    UnterminatedSignature,

    #[error("malformed artifact set line: {0}")]
    BadArtifactSetLine(String),

    #[error("artifact set source {0} does not exist")]
    MissingArtifactSource(String),

    #[error(transparent)]
    Hash(#[from] HashError),
}

/// A recorded file digest: algorithm plus hex hash string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDigest {
    pub algorithm: HashAlgorithm,
    pub hash: String,
}

/// The manifest of a CSAR package.
///
/// Parsed from the on-disk file (read path) or updated through
/// [`Manifest::add_file`] while the archive is being written. The digest and
/// artifact-set tables keep insertion order: stripping the signature block
/// must reproduce the exact byte layout the signer saw, whatever order the
/// signer's tool emitted the blocks in.
#[derive(Debug)]
pub struct Manifest {
    root: PathBuf,
    path: PathBuf,
    pub metadata: BTreeMap<String, String>,
    /// Relative source path -> recorded digest, `None` when the file is
    /// listed without one. Parse/insertion order is preserved.
    pub digests: IndexMap<String, Option<FileDigest>>,
    /// Artifact set name -> ordered referenced source paths.
    pub artifact_sets: IndexMap<String, Vec<String>>,
    /// Raw signature block including the CMS markers.
    pub signature: Option<String>,
}

impl Manifest {
    /// Parse the manifest at `root`/`path`, recomputing and checking every
    /// recorded digest against the files under `root`.
    pub fn parse(root: &Path, path: &Path) -> Result<Self, ManifestError> {
        let mut manifest = Manifest {
            root: root.to_path_buf(),
            path: path.to_path_buf(),
            metadata: BTreeMap::new(),
            digests: IndexMap::new(),
            artifact_sets: IndexMap::new(),
            signature: None,
        };
        let content = fs::read_to_string(root.join(path))?;
        for block in split_blocks(&content) {
            manifest.parse_block(&block)?;
        }
        if manifest.metadata.is_empty() {
            return Err(ManifestError::NoMetadata);
        }
        debug!(
            path = %path.display(),
            digests = manifest.digests.len(),
            signed = manifest.signature.is_some(),
            "parsed manifest"
        );
        Ok(manifest)
    }

    fn parse_block(&mut self, block: &[String]) -> Result<(), ManifestError> {
        let first = &block[0];
        if first == CMS_BEGIN {
            return self.parse_signature(block);
        }
        match split_line(first) {
            Some((METADATA_BLOCK_KEY, _)) => self.parse_metadata(&block[1..]),
            Some((ARTIFACT_SETS_BLOCK_KEY, _)) => self.parse_artifact_sets(&block[1..]),
            Some((SOURCE_KEY | ALGORITHM_KEY | HASH_KEY, _)) => self.parse_digests(block),
            _ => Err(ManifestError::UnknownKey(first.clone())),
        }
    }

    fn parse_metadata(&mut self, lines: &[String]) -> Result<(), ManifestError> {
        for line in lines {
            let (key, value) =
                split_line(line).ok_or_else(|| ManifestError::UnrecognizedMetadata(line.clone()))?;
            if METADATA_KEYS.contains(&key) {
                self.metadata.insert(key.to_string(), value.to_string());
            } else {
                return Err(ManifestError::UnrecognizedMetadata(line.clone()));
            }
        }
        let missing: Vec<&str> = METADATA_KEYS
            .iter()
            .filter(|k| !self.metadata.contains_key(**k))
            .copied()
            .collect();
        if !missing.is_empty() {
            return Err(ManifestError::MissingMetadataKeys(missing.join(",")));
        }
        let release = &self.metadata[RELEASE_TIME_KEY];
        DateTime::parse_from_rfc3339(release)
            .map_err(|_| ManifestError::BadTimestamp(release.clone()))?;
        Ok(())
    }

    /// Strict triplet parse: `Source`, then optionally `Algorithm`
    /// immediately followed by `Hash`. Any other ordering is an error.
    fn parse_digests(&mut self, lines: &[String]) -> Result<(), ManifestError> {
        let mut i = 0;
        while i < lines.len() {
            let (key, value) = split_line(&lines[i])
                .ok_or_else(|| ManifestError::BadDigestLine(lines[i].clone()))?;
            if key != SOURCE_KEY {
                return Err(ManifestError::BadDigestLine(lines[i].clone()));
            }
            let source = value.to_string();
            i += 1;

            let algorithm = match lines.get(i).and_then(|l| split_line(l)) {
                Some((ALGORITHM_KEY, algo)) => {
                    i += 1;
                    Some(algo.to_string())
                }
                _ => None,
            };
            match algorithm {
                Some(algo) => {
                    let (_, recorded) = lines
                        .get(i)
                        .and_then(|l| split_line(l))
                        .filter(|(k, _)| *k == HASH_KEY)
                        .ok_or_else(|| {
                            ManifestError::BadDigestLine(
                                lines.get(i).cloned().unwrap_or_else(|| source.clone()),
                            )
                        })?;
                    i += 1;
                    let algorithm: HashAlgorithm = algo.parse()?;
                    let actual = hash::file_digest(&self.root, &source, algorithm)?;
                    if actual != recorded {
                        return Err(ManifestError::MismatchedHash(source));
                    }
                    self.digests.insert(
                        source,
                        Some(FileDigest {
                            algorithm,
                            hash: recorded.to_string(),
                        }),
                    );
                }
                None => {
                    self.digests.insert(source, None);
                }
            }
        }
        Ok(())
    }

    fn parse_artifact_sets(&mut self, lines: &[String]) -> Result<(), ManifestError> {
        let mut current: Option<String> = None;
        for line in lines {
            let (key, value) =
                split_line(line).ok_or_else(|| ManifestError::BadArtifactSetLine(line.clone()))?;
            if key == SOURCE_KEY {
                let set = current
                    .as_ref()
                    .ok_or_else(|| ManifestError::BadArtifactSetLine(line.clone()))?;
                if !self.root.join(value).exists() {
                    return Err(ManifestError::MissingArtifactSource(value.to_string()));
                }
                self.artifact_sets
                    .get_mut(set)
                    .ok_or_else(|| ManifestError::BadArtifactSetLine(line.clone()))?
                    .push(value.to_string());
            } else if value.is_empty() && ARTIFACT_SET_NAME.is_match(key) {
                self.artifact_sets.insert(key.to_string(), Vec::new());
                current = Some(key.to_string());
            } else {
                return Err(ManifestError::BadArtifactSetLine(line.clone()));
            }
        }
        Ok(())
    }

    fn parse_signature(&mut self, block: &[String]) -> Result<(), ManifestError> {
        if block.last().map(String::as_str) != Some(CMS_END) {
            return Err(ManifestError::UnterminatedSignature);
        }
        self.signature = Some(block.join("\n"));
        Ok(())
    }

    /// Record a file in the digest table, computing its digest when an
    /// algorithm was requested.
    pub fn add_file(
        &mut self,
        rel_path: &str,
        algorithm: Option<HashAlgorithm>,
    ) -> Result<(), ManifestError> {
        let digest = match algorithm {
            Some(algorithm) => {
                let hash = hash::file_digest(&self.root, rel_path, algorithm)?;
                Some(FileDigest { algorithm, hash })
            }
            None => None,
        };
        self.digests.insert(rel_path.to_string(), digest);
        Ok(())
    }

    /// Serialize the manifest, including the signature block if present.
    pub fn dump_as_string(&self) -> String {
        self.render(true)
    }

    fn render(&self, include_signature: bool) -> String {
        let mut out = String::new();
        out.push_str("metadata:\n");
        for key in METADATA_KEYS {
            if let Some(value) = self.metadata.get(key) {
                out.push_str(&format!("{}: {}\n", key, value));
            }
        }
        if !self.artifact_sets.is_empty() {
            out.push('\n');
            out.push_str("non_mano_artifact_sets:\n");
            for (name, sources) in &self.artifact_sets {
                out.push_str(&format!("{}:\n", name));
                for source in sources {
                    out.push_str(&format!("Source: {}\n", source));
                }
            }
        }
        for (source, digest) in &self.digests {
            out.push('\n');
            out.push_str(&format!("Source: {}\n", source));
            if let Some(digest) = digest {
                out.push_str(&format!("Algorithm: {}\n", digest.algorithm));
                out.push_str(&format!("Hash: {}\n", digest.hash));
            }
        }
        if include_signature {
            if let Some(signature) = &self.signature {
                out.push('\n');
                out.push_str(signature);
                out.push('\n');
            }
        }
        out
    }

    /// Rewrite the manifest file in place under its root.
    pub fn update_to_file(&self) -> Result<PathBuf, ManifestError> {
        let target = self.root.join(&self.path);
        fs::write(&target, self.render(true))?;
        Ok(target)
    }

    /// Serialize to a scoped temporary file; deleted when the returned
    /// handle drops.
    pub fn save_to_temp(&self) -> Result<TempPath, ManifestError> {
        self.save_temp_rendered(true)
    }

    /// The exact byte content that is signed: the manifest without its
    /// signature block, digest order untouched.
    pub fn save_to_temp_without_signature(&self) -> Result<TempPath, ManifestError> {
        self.save_temp_rendered(false)
    }

    fn save_temp_rendered(&self, include_signature: bool) -> Result<TempPath, ManifestError> {
        let mut file = NamedTempFile::new()?;
        file.write_all(self.render(include_signature).as_bytes())?;
        file.flush()?;
        Ok(file.into_temp_path())
    }

    /// Path of the manifest relative to its root.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Split on the first colon; both sides trimmed. `None` when no colon.
fn split_line(line: &str) -> Option<(&str, &str)> {
    line.split_once(':').map(|(k, v)| (k.trim(), v.trim()))
}

/// Split into blocks separated by blank or whitespace-only lines.
fn split_blocks(content: &str) -> Vec<Vec<String>> {
    let mut blocks = Vec::new();
    let mut current = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            if !current.is_empty() {
                blocks.push(std::mem::take(&mut current));
            }
        } else {
            current.push(line.to_string());
        }
    }
    if !current.is_empty() {
        blocks.push(current);
    }
    blocks
}

#[cfg(test)]
mod tests {
    use super::*;

    const METADATA: &str = "metadata:\n\
        vnf_product_name: test\n\
        vnf_provider_id: test\n\
        vnf_package_version:1.0\n\
        vnf_release_data_time: 2017-09-15T15:00:10+08:00\n";

    const FILE_CONTENT: &str = "needToBeHashed";
    const FILE_DIGEST: &str = "Source: digest\n\
        Algorithm: SHA-256\n\
        Hash: 20a480339aa4371099f9503511dcc5a8051ce3884846678ced5611ec64bbfc9c\n";

    const CMS: &str = "-----BEGIN CMS-----\n\
        MIICmAYJKoZIhvcNAQcCoIICiTCCAoUCAQExDTALBglghkgBZQMEAgEwCwYJKoZI\n\
        hvcNAQcBMYICYjCCAl4CAQEwUjBFMQswCQYDVQQGEwJQVDEPMA0GA1UECAwGTGlz\n\
        Ym9hMQ8wDQYDVQQHDAZMaXNib2ExFDASBgNVBAoMC0V4YW1wbGUgT3JnAgkA6w7o\n\
        0SBbUUwwCwYJYIZIAWUDBAIBoIHkMBgGCSqGSIb3DQEJAzELBgkqhkiG9w0BBwEw\n\
        SzFEv182phI2C5pmjUnf7VG1WMKCH2WNtkYwMUCDcGvbHrh8n+kR8hL/BAs=\n\
        -----END CMS-----";

    fn write_manifest(dir: &Path, content: &str) {
        fs::write(dir.join("test.mf"), content).unwrap();
    }

    fn parse(dir: &Path) -> Result<Manifest, ManifestError> {
        Manifest::parse(dir, Path::new("test.mf"))
    }

    #[test]
    fn metadata_block() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(dir.path(), METADATA);

        let m = parse(dir.path()).unwrap();
        assert_eq!(m.metadata["vnf_product_name"], "test");
        assert_eq!(m.metadata["vnf_provider_id"], "test");
        assert_eq!(m.metadata["vnf_package_version"], "1.0");
        assert_eq!(m.metadata["vnf_release_data_time"], "2017-09-15T15:00:10+08:00");
        assert!(m.digests.is_empty());
    }

    #[test]
    fn metadata_missing_key() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(
            dir.path(),
            "metadata:\nvnf_product_name: test\nvnf_provider_id: test\nvnf_package_version:1.0\n",
        );

        assert!(matches!(
            parse(dir.path()),
            Err(ManifestError::MissingMetadataKeys(_))
        ));
    }

    #[test]
    fn missing_metadata_block() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(dir.path(), "vnf_product_name: test\n");

        assert!(matches!(
            parse(dir.path()),
            Err(ManifestError::UnknownKey(_))
        ));
    }

    #[test]
    fn bad_release_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(
            dir.path(),
            "metadata:\nvnf_product_name: test\nvnf_provider_id: test\n\
             vnf_package_version:1.0\nvnf_release_data_time: yesterday\n",
        );

        assert!(matches!(
            parse(dir.path()),
            Err(ManifestError::BadTimestamp(_))
        ));
    }

    #[test]
    fn digest_block_verified() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("digest"), FILE_CONTENT).unwrap();
        write_manifest(dir.path(), &format!("{}\n{}", METADATA, FILE_DIGEST));

        let m = parse(dir.path()).unwrap();
        let digest = m.digests["digest"].as_ref().unwrap();
        assert_eq!(digest.algorithm, HashAlgorithm::Sha256);
        assert_eq!(
            digest.hash,
            "20a480339aa4371099f9503511dcc5a8051ce3884846678ced5611ec64bbfc9c"
        );
    }

    #[test]
    fn tampered_hash_is_integrity_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("digest"), FILE_CONTENT).unwrap();
        let tampered = FILE_DIGEST.replace("20a48033", "20a48034");
        write_manifest(dir.path(), &format!("{}\n{}", METADATA, tampered));

        assert!(matches!(
            parse(dir.path()),
            Err(ManifestError::MismatchedHash(_))
        ));
    }

    #[test]
    fn tampered_content_is_integrity_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("digest"), "somethingElse").unwrap();
        write_manifest(dir.path(), &format!("{}\n{}", METADATA, FILE_DIGEST));

        assert!(matches!(
            parse(dir.path()),
            Err(ManifestError::MismatchedHash(_))
        ));
    }

    #[test]
    fn unsupported_algorithm() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("digest"), FILE_CONTENT).unwrap();
        write_manifest(
            dir.path(),
            &format!("{}\nSource: digest\nAlgorithm: MD5\nHash: abc\n", METADATA),
        );

        assert!(matches!(
            parse(dir.path()),
            Err(ManifestError::Hash(HashError::UnknownAlgorithm(_)))
        ));
    }

    #[test]
    fn out_of_order_digest_block_rejected() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("digest"), FILE_CONTENT).unwrap();
        write_manifest(
            dir.path(),
            &format!(
                "{}\nAlgorithm: SHA-256\nSource: digest\nHash: 20a480339aa4371099f9503511dcc5a8051ce3884846678ced5611ec64bbfc9c\n",
                METADATA
            ),
        );

        assert!(matches!(
            parse(dir.path()),
            Err(ManifestError::BadDigestLine(_))
        ));
    }

    #[test]
    fn source_without_digest_allowed() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("plain"), "x").unwrap();
        write_manifest(dir.path(), &format!("{}\nSource: plain\n", METADATA));

        let m = parse(dir.path()).unwrap();
        assert!(m.digests["plain"].is_none());
    }

    #[test]
    fn signature_block() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(dir.path(), &format!("{}\n{}\n", METADATA, CMS));

        let m = parse(dir.path()).unwrap();
        assert_eq!(m.signature.as_deref(), Some(CMS));
    }

    #[test]
    fn unterminated_signature_block() {
        let dir = tempfile::tempdir().unwrap();
        let truncated = &CMS[..CMS.len() - 17];
        write_manifest(dir.path(), &format!("{}\n{}\n", METADATA, truncated));

        assert!(matches!(
            parse(dir.path()),
            Err(ManifestError::UnterminatedSignature)
        ));
    }

    #[test]
    fn artifact_sets() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.sh"), "#!/bin/sh\n").unwrap();
        fs::write(dir.path().join("b.sh"), "#!/bin/sh\n").unwrap();
        write_manifest(
            dir.path(),
            &format!(
                "{}\nnon_mano_artifact_sets:\nonap_ves_events:\nSource: a.sh\nSource: b.sh\n",
                METADATA
            ),
        );

        let m = parse(dir.path()).unwrap();
        assert_eq!(m.artifact_sets["onap_ves_events"], vec!["a.sh", "b.sh"]);
    }

    #[test]
    fn artifact_set_bad_name() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(
            dir.path(),
            &format!("{}\nnon_mano_artifact_sets:\nNot.A.Valid.Name:\n", METADATA),
        );

        assert!(matches!(
            parse(dir.path()),
            Err(ManifestError::BadArtifactSetLine(_))
        ));
    }

    #[test]
    fn artifact_set_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(
            dir.path(),
            &format!(
                "{}\nnon_mano_artifact_sets:\nonap_ves_events:\nSource: absent.sh\n",
                METADATA
            ),
        );

        assert!(matches!(
            parse(dir.path()),
            Err(ManifestError::MissingArtifactSource(_))
        ));
    }

    #[test]
    fn round_trip_preserves_tables_and_signature() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("digest"), FILE_CONTENT).unwrap();
        fs::write(dir.path().join("digest2"), FILE_CONTENT).unwrap();
        write_manifest(
            dir.path(),
            &format!("{}\n{}\n{}\n", METADATA, FILE_DIGEST, CMS),
        );

        let mut m1 = parse(dir.path()).unwrap();
        m1.add_file("digest2", Some(HashAlgorithm::Sha256)).unwrap();
        m1.update_to_file().unwrap();

        let m2 = parse(dir.path()).unwrap();
        assert_eq!(m1.metadata, m2.metadata);
        assert_eq!(m1.digests, m2.digests);
        assert_eq!(m2.digests.len(), 2);
        assert_eq!(m2.digests["digest"], m2.digests["digest2"]);
        assert_eq!(m2.signature.as_deref(), Some(CMS));
    }

    #[test]
    fn signed_byte_layout_keeps_digest_order() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(
            dir.path(),
            &format!("{}\nSource: zz\n\nSource: aa\n\n{}\n", METADATA, CMS),
        );

        // A foreign signer may emit digest blocks in any order; the bytes
        // handed to verification must keep that order.
        let m = parse(dir.path()).unwrap();
        let stripped = m.save_to_temp_without_signature().unwrap();
        let text = fs::read_to_string(&stripped).unwrap();
        assert!(!text.contains(CMS_BEGIN));
        assert!(
            text.find("Source: zz").unwrap() < text.find("Source: aa").unwrap(),
            "digest blocks were reordered"
        );
        let full = m.dump_as_string();
        assert!(full.find("Source: zz").unwrap() < full.find("Source: aa").unwrap());
    }

    #[test]
    fn signature_strip_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(dir.path(), &format!("{}\n{}\n", METADATA, CMS));

        let m1 = parse(dir.path()).unwrap();
        let stripped = m1.save_to_temp_without_signature().unwrap();
        let m2 = Manifest::parse(
            stripped.parent().unwrap(),
            Path::new(stripped.file_name().unwrap()),
        )
        .unwrap();
        assert_eq!(m1.metadata, m2.metadata);
        assert!(m2.signature.is_none());
    }
}
