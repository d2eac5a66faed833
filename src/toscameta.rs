// src/toscameta.rs

//! The `TOSCA-Metadata/TOSCA.meta` header
//!
//! A fixed-path `Key: value` header identifying the archive's entry
//! template and auxiliary file locations. Two schema variants exist:
//!
//! - **SOL004 v2.6.1**: entry keys carry an `ETSI-` prefix; manifest,
//!   change log, and licenses directory are required.
//! - **SOL004 v2.4.1**: plain entry keys; only the entry definitions are
//!   required.
//!
//! The variant is a tag plus immutable key tables, selected on read by the
//! presence of any `ETSI-`-prefixed key. File and CSAR versions are pinned
//! constants; a header declaring anything else is rejected.

use crate::error::{Error, Result};
use crate::fsutil;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::Path;
use tracing::debug;

/// Fixed in-archive path of the metadata header.
pub const META_FILE: &str = "TOSCA-Metadata/TOSCA.meta";

pub const META_FILE_VERSION_KEY: &str = "TOSCA-Meta-File-Version";
pub const META_FILE_VERSION_VALUE: &str = "1.0";
pub const META_CSAR_VERSION_KEY: &str = "CSAR-Version";
pub const META_CSAR_VERSION_VALUE: &str = "1.1";
pub const META_CREATED_BY_KEY: &str = "Created-By";
pub const META_CREATED_BY_VALUE: &str = "ONAP VNFSDK pkgtools";
pub const META_ENTRY_DEFINITIONS_KEY: &str = "Entry-Definitions";

/// Per-variant key names and required/optional key lists. Constructed once,
/// never mutated.
struct KeyTable {
    manifest: &'static str,
    history: &'static str,
    tests: &'static str,
    licenses: &'static str,
    certificate: &'static str,
    required: &'static [&'static str],
    optional: &'static [&'static str],
}

static SOL261_KEYS: KeyTable = KeyTable {
    manifest: "ETSI-Entry-Manifest",
    history: "ETSI-Entry-Change-Log",
    tests: "ETSI-Entry-Tests",
    licenses: "ETSI-Entry-Licenses",
    certificate: "ETSI-Entry-Certificate",
    required: &[
        META_FILE_VERSION_KEY,
        META_CSAR_VERSION_KEY,
        META_CREATED_BY_KEY,
        META_ENTRY_DEFINITIONS_KEY,
        "ETSI-Entry-Manifest",
        "ETSI-Entry-Change-Log",
        "ETSI-Entry-Licenses",
    ],
    optional: &["ETSI-Entry-Tests", "ETSI-Entry-Certificate"],
};

static SOL241_KEYS: KeyTable = KeyTable {
    manifest: "Entry-Manifest",
    history: "Entry-Change-Log",
    tests: "Entry-Tests",
    licenses: "Entry-Licenses",
    certificate: "Entry-Certificate",
    required: &[
        META_FILE_VERSION_KEY,
        META_CSAR_VERSION_KEY,
        META_CREATED_BY_KEY,
        META_ENTRY_DEFINITIONS_KEY,
    ],
    optional: &[
        "Entry-Manifest",
        "Entry-Change-Log",
        "Entry-Licenses",
        "Entry-Tests",
        "Entry-Certificate",
    ],
};

/// TOSCA.meta schema variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaVariant {
    /// SOL004 v2.4.1, plain entry keys.
    Sol241,
    /// SOL004 v2.6.1, `ETSI-`-prefixed entry keys.
    Sol261,
}

impl MetaVariant {
    fn keys(&self) -> &'static KeyTable {
        match self {
            MetaVariant::Sol241 => &SOL241_KEYS,
            MetaVariant::Sol261 => &SOL261_KEYS,
        }
    }
}

/// Entry locations recorded in the header, all relative to the archive root.
#[derive(Debug, Clone, Default)]
pub struct MetaEntries {
    pub entry: String,
    pub manifest: Option<String>,
    pub history: Option<String>,
    pub licenses: Option<String>,
    pub tests: Option<String>,
    pub certificate: Option<String>,
}

/// A validated TOSCA.meta header. Immutable once constructed.
#[derive(Debug)]
pub struct ToscaMeta {
    variant: MetaVariant,
    entries: BTreeMap<String, String>,
}

impl ToscaMeta {
    /// Build and validate a header for the tree under `base_dir`, using the
    /// pinned file/CSAR versions and creator.
    pub fn new(base_dir: &Path, variant: MetaVariant, entries: MetaEntries) -> Result<Self> {
        Self::with_versions(
            base_dir,
            variant,
            entries,
            META_FILE_VERSION_VALUE,
            META_CSAR_VERSION_VALUE,
            META_CREATED_BY_VALUE,
        )
    }

    fn with_versions(
        base_dir: &Path,
        variant: MetaVariant,
        entries: MetaEntries,
        file_version: &str,
        csar_version: &str,
        created_by: &str,
    ) -> Result<Self> {
        if file_version != META_FILE_VERSION_VALUE {
            return Err(Error::Validation(format!(
                "TOSCA.meta: {} must be {}",
                META_FILE_VERSION_KEY, META_FILE_VERSION_VALUE
            )));
        }
        if csar_version != META_CSAR_VERSION_VALUE {
            return Err(Error::Validation(format!(
                "TOSCA.meta: {} must be {}",
                META_CSAR_VERSION_KEY, META_CSAR_VERSION_VALUE
            )));
        }

        check_entry_template(base_dir, &entries.entry)?;
        let keys = variant.keys();
        if let Some(manifest) = &entries.manifest {
            fsutil::require_file(
                &base_dir.join(manifest),
                "Please specify a valid manifest file.",
            )?;
        }
        if let Some(history) = &entries.history {
            fsutil::require_file(
                &base_dir.join(history),
                "Please specify a valid change history file.",
            )?;
        }
        if let Some(licenses) = &entries.licenses {
            fsutil::require_dir(
                &base_dir.join(licenses),
                "Please specify a valid license directory.",
            )?;
        }
        if let Some(tests) = &entries.tests {
            fsutil::require_dir(
                &base_dir.join(tests),
                "Please specify a valid test directory.",
            )?;
        }
        if let Some(certificate) = &entries.certificate {
            fsutil::require_file(
                &base_dir.join(certificate),
                "Please specify a valid certificate file.",
            )?;
        }

        let mut map = BTreeMap::new();
        map.insert(META_FILE_VERSION_KEY.to_string(), file_version.to_string());
        map.insert(META_CSAR_VERSION_KEY.to_string(), csar_version.to_string());
        map.insert(META_CREATED_BY_KEY.to_string(), created_by.to_string());
        map.insert(META_ENTRY_DEFINITIONS_KEY.to_string(), entries.entry);
        let optional_pairs = [
            (keys.manifest, entries.manifest),
            (keys.history, entries.history),
            (keys.licenses, entries.licenses),
            (keys.tests, entries.tests),
            (keys.certificate, entries.certificate),
        ];
        for (key, value) in optional_pairs {
            if let Some(value) = value {
                map.insert(key.to_string(), value);
            }
        }

        let missing: Vec<&str> = keys
            .required
            .iter()
            .filter(|k| !map.contains_key(**k))
            .copied()
            .collect();
        if !missing.is_empty() {
            return Err(Error::Validation(format!(
                "TOSCA.meta: missing keys: {}",
                missing.join(",")
            )));
        }

        Ok(ToscaMeta {
            variant,
            entries: map,
        })
    }

    /// Read and re-validate the fixed-path header under `base_dir`,
    /// auto-detecting the schema variant.
    pub fn from_file(base_dir: &Path) -> Result<Self> {
        let meta_path = base_dir.join(META_FILE);
        if !meta_path.exists() {
            return Err(Error::Validation(format!(
                "Metadata file {} is missing from the CSAR",
                meta_path.display()
            )));
        }
        debug!(path = %meta_path.display(), "parsing CSAR metadata header");

        let mut parsed = BTreeMap::new();
        for line in fs::read_to_string(&meta_path)?.lines() {
            let line = line.trim_end();
            if line.is_empty() {
                continue;
            }
            let (key, value) = line.split_once(':').ok_or_else(|| {
                Error::Validation(format!("TOSCA.meta: malformed line: {}", line))
            })?;
            parsed.insert(key.trim().to_string(), value.trim().to_string());
        }

        let variant = if parsed.keys().any(|k| k.starts_with("ETSI-")) {
            MetaVariant::Sol261
        } else {
            MetaVariant::Sol241
        };
        let keys = variant.keys();
        let entries = MetaEntries {
            entry: parsed
                .get(META_ENTRY_DEFINITIONS_KEY)
                .cloned()
                .unwrap_or_default(),
            manifest: parsed.get(keys.manifest).cloned(),
            history: parsed.get(keys.history).cloned(),
            licenses: parsed.get(keys.licenses).cloned(),
            tests: parsed.get(keys.tests).cloned(),
            certificate: parsed.get(keys.certificate).cloned(),
        };
        Self::with_versions(
            base_dir,
            variant,
            entries,
            parsed
                .get(META_FILE_VERSION_KEY)
                .map(String::as_str)
                .unwrap_or_default(),
            parsed
                .get(META_CSAR_VERSION_KEY)
                .map(String::as_str)
                .unwrap_or_default(),
            parsed
                .get(META_CREATED_BY_KEY)
                .map(String::as_str)
                .unwrap_or_default(),
        )
    }

    /// Serialize as `Key: value` lines: required keys in declared order,
    /// then present optional keys in declared order. This order is part of
    /// the on-disk contract.
    pub fn dump_as_string(&self) -> String {
        let keys = self.variant.keys();
        let mut out = String::new();
        for key in keys.required.iter().chain(keys.optional.iter()) {
            if let Some(value) = self.entries.get(*key) {
                out.push_str(&format!("{}: {}\n", key, value));
            }
        }
        out
    }

    pub fn variant(&self) -> MetaVariant {
        self.variant
    }

    pub fn created_by(&self) -> Option<&str> {
        self.get(META_CREATED_BY_KEY)
    }

    pub fn csar_version(&self) -> Option<&str> {
        self.get(META_CSAR_VERSION_KEY)
    }

    pub fn meta_file_version(&self) -> Option<&str> {
        self.get(META_FILE_VERSION_KEY)
    }

    pub fn entry_definitions(&self) -> Option<&str> {
        self.get(META_ENTRY_DEFINITIONS_KEY)
    }

    pub fn entry_manifest_file(&self) -> Option<&str> {
        self.get(self.variant.keys().manifest)
    }

    pub fn entry_history_file(&self) -> Option<&str> {
        self.get(self.variant.keys().history)
    }

    pub fn entry_tests_dir(&self) -> Option<&str> {
        self.get(self.variant.keys().tests)
    }

    pub fn entry_licenses_dir(&self) -> Option<&str> {
        self.get(self.variant.keys().licenses)
    }

    pub fn entry_certificate_file(&self) -> Option<&str> {
        self.get(self.variant.keys().certificate)
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }
}

/// The entry file must exist and parse as a template whose header declares
/// `tosca_definitions_version`. Deep template semantics are out of scope.
fn check_entry_template(base_dir: &Path, entry: &str) -> Result<()> {
    fsutil::require_file(&base_dir.join(entry), "Please specify a valid entry point.")?;
    let entry_file = base_dir.join(entry);
    let parsed: std::result::Result<serde_yaml::Value, _> =
        File::open(&entry_file).map_err(Error::from).and_then(|f| {
            serde_yaml::from_reader(f)
                .map_err(|e| Error::Validation(format!("invalid yaml: {}", e)))
        });
    let declares_version = parsed
        .map(|v| v.get("tosca_definitions_version").is_some())
        .unwrap_or(false);
    if !declares_version {
        return Err(Error::Validation(format!(
            "Entry file {} is not a valid tosca simple yaml file",
            entry_file.display()
        )));
    }
    Ok(())
}
