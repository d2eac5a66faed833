// src/csar.rs

//! CSAR archive write and read
//!
//! Writing walks the source tree into a zip, deferring the manifest so its
//! digest table can be filled while the other files stream in, then signs
//! it if requested, and writes the metadata header last. Reading extracts
//! the zip, reconstructs the metadata and manifest models, and runs the
//! signature verification chain before handing a [`CsarReader`] to
//! downstream validators.

use crate::error::{Error, Result};
use crate::fsutil;
use crate::hash::HashAlgorithm;
use crate::manifest::Manifest;
use crate::signing;
use crate::toscameta::{self, MetaEntries, MetaVariant, ToscaMeta};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Options for [`write`], mirroring the `csar-create` surface.
#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
    /// Manifest file, relative to the source directory.
    pub manifest: Option<String>,
    /// Change history file, relative to the source directory.
    pub history: Option<String>,
    /// Test directory, relative to the source directory.
    pub tests: Option<String>,
    /// License directory, relative to the source directory.
    pub licenses: Option<String>,
    /// Compute a digest of every packaged file into the manifest.
    pub digest: Option<HashAlgorithm>,
    /// Signing certificate, relative to the source directory.
    pub certificate: Option<String>,
    /// Private key for signing, absolute or relative to the working dir.
    pub privkey: Option<PathBuf>,
    /// Emit the SOL004 v2.4.1 header variant instead of v2.6.1.
    pub sol241: bool,
}

/// Assemble `source` into a CSAR zip at `destination`.
pub fn write(source: &Path, entry: &str, destination: &Path, opts: &WriteOptions) -> Result<()> {
    fsutil::require_dir(source, "Please specify the service template directory.")?;
    fsutil::require_absent(
        destination,
        "Please provide a path to where the CSAR should be created.",
    )?;
    fsutil::require_absent(
        &source.join(toscameta::META_FILE),
        "This command generates a meta file for you. Please remove the existing metafile.",
    )?;
    fsutil::require_file(&source.join(entry), "Please specify a valid entry point.")?;

    let mut manifest = match &opts.manifest {
        Some(path) => Some(Manifest::parse(source, Path::new(path))?),
        None if opts.certificate.is_some() || opts.digest.is_some() => {
            return Err(Error::Validation(
                "Must specify manifest file if certificate or digest is specified".to_string(),
            ));
        }
        None => None,
    };

    let privkey = match &opts.certificate {
        Some(_) => {
            let privkey = opts.privkey.as_ref().ok_or_else(|| {
                Error::Validation("Need private key file for signing".to_string())
            })?;
            fsutil::require_file(privkey, "Please specify a valid private key file.")?;
            Some(privkey.clone())
        }
        None => None,
    };

    let variant = if opts.sol241 {
        MetaVariant::Sol241
    } else {
        MetaVariant::Sol261
    };
    let metadata = ToscaMeta::new(
        source,
        variant,
        MetaEntries {
            entry: entry.to_string(),
            manifest: opts.manifest.clone(),
            history: opts.history.clone(),
            licenses: opts.licenses.clone(),
            tests: opts.tests.clone(),
            certificate: opts.certificate.clone(),
        },
    )?;

    debug!(destination = %destination.display(), "compressing source directory to zip");
    let zip_options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut zip = ZipWriter::new(File::create(destination)?);

    for dir_entry in WalkDir::new(source).min_depth(1) {
        let dir_entry = dir_entry.map_err(io::Error::from)?;
        let rel = relative_name(source, dir_entry.path())?;
        if dir_entry.file_type().is_dir() {
            debug!(path = %rel, "writing directory entry");
            zip.add_directory(rel.as_str(), zip_options)?;
        } else {
            // The manifest is deferred so its digest table can still grow.
            if opts.manifest.as_deref() == Some(rel.as_str()) {
                continue;
            }
            debug!(path = %rel, "writing file entry");
            zip.start_file(rel.as_str(), zip_options)?;
            io::copy(&mut File::open(dir_entry.path())?, &mut zip)?;
            if let Some(manifest) = manifest.as_mut() {
                manifest.add_file(&rel, opts.digest)?;
            }
        }
    }

    if let Some(manifest) = manifest.as_mut() {
        let mut staged = manifest.save_to_temp()?;
        if let (Some(certificate), Some(privkey)) = (&opts.certificate, &privkey) {
            debug!("signing staged manifest");
            let signature = signing::sign(&staged, &source.join(certificate), privkey)?;
            manifest.signature = Some(signature.trim_end().to_string());
            staged = manifest.save_to_temp()?;
        }
        let name = manifest.path().display().to_string();
        debug!(path = %name, "writing manifest entry");
        zip.start_file(name.as_str(), zip_options)?;
        io::copy(&mut File::open(&staged)?, &mut zip)?;
    }

    debug!(path = toscameta::META_FILE, "writing metadata header");
    zip.start_file(toscameta::META_FILE, zip_options)?;
    zip.write_all(metadata.dump_as_string().as_bytes())?;
    zip.finish()?;

    info!(destination = %destination.display(), "CSAR written");
    Ok(())
}

/// Read-only view over an extracted CSAR: the extraction directory plus the
/// reconstructed metadata and manifest models.
#[derive(Debug)]
pub struct CsarReader {
    destination: PathBuf,
    metadata: ToscaMeta,
    manifest: Option<Manifest>,
}

impl CsarReader {
    /// Extraction directory.
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    pub fn metadata(&self) -> &ToscaMeta {
        &self.metadata
    }

    pub fn manifest(&self) -> Option<&Manifest> {
        self.manifest.as_ref()
    }

    pub fn created_by(&self) -> Option<&str> {
        self.metadata.created_by()
    }

    pub fn csar_version(&self) -> Option<&str> {
        self.metadata.csar_version()
    }

    pub fn meta_file_version(&self) -> Option<&str> {
        self.metadata.meta_file_version()
    }

    pub fn entry_definitions(&self) -> Option<&str> {
        self.metadata.entry_definitions()
    }

    /// The parsed entry-definitions template.
    pub fn entry_definitions_yaml(&self) -> Result<serde_yaml::Value> {
        let entry = self.entry_definitions().ok_or_else(|| {
            Error::Validation("CSAR metadata has no entry definitions".to_string())
        })?;
        let file = File::open(self.destination.join(entry))?;
        serde_yaml::from_reader(file)
            .map_err(|e| Error::Validation(format!("invalid entry definitions yaml: {}", e)))
    }

    pub fn entry_manifest_file(&self) -> Option<&str> {
        self.metadata.entry_manifest_file()
    }

    pub fn entry_history_file(&self) -> Option<&str> {
        self.metadata.entry_history_file()
    }

    pub fn entry_tests_dir(&self) -> Option<&str> {
        self.metadata.entry_tests_dir()
    }

    pub fn entry_licenses_dir(&self) -> Option<&str> {
        self.metadata.entry_licenses_dir()
    }

    pub fn entry_certificate_file(&self) -> Option<&str> {
        self.metadata.entry_certificate_file()
    }
}

/// Open a CSAR (local path or URL), extract it into `destination`, and run
/// the verification chain. A partially extracted directory is left in place
/// on failure for inspection.
pub fn read(source: &str, destination: &Path, no_verify_cert: bool) -> Result<CsarReader> {
    if destination.is_dir() && fs::read_dir(destination)?.next().is_some() {
        return Err(Error::Validation(format!(
            "{} already exists and is not empty. Please specify the location where \
             the CSAR should be extracted.",
            destination.display()
        )));
    }

    // Downloaded archives land in a scoped temp file, deleted on every
    // exit path when `_download` drops.
    let mut _download: Option<NamedTempFile> = None;
    let local: PathBuf = if source.contains("://") {
        let staged = download(source)?;
        let path = staged.path().to_path_buf();
        _download = Some(staged);
        path
    } else {
        PathBuf::from(source)
    };

    if !local.exists() {
        return Err(Error::Validation(format!(
            "{} does not exist. Please specify a valid CSAR path.",
            local.display()
        )));
    }
    let mut archive = ZipArchive::new(File::open(&local)?)
        .map_err(|_| Error::Validation(format!("{} is not a valid CSAR.", source)))?;

    debug!(destination = %destination.display(), "extracting CSAR contents");
    fs::create_dir_all(destination)?;
    archive.extract(destination)?;

    let metadata = ToscaMeta::from_file(destination)?;
    debug!(entry = ?metadata.entry_definitions(), "CSAR metadata reconstructed");

    let manifest = match metadata.entry_manifest_file() {
        Some(path) => Some(Manifest::parse(destination, Path::new(path))?),
        None => None,
    };

    if let Some(certificate) = metadata.entry_certificate_file() {
        let manifest = manifest.as_ref().ok_or_else(|| {
            Error::Validation(
                "CSAR metadata references a certificate but no manifest".to_string(),
            )
        })?;
        let signature = manifest.signature.as_ref().ok_or_else(|| {
            Error::Validation("manifest carries no signature to verify".to_string())
        })?;
        debug!(certificate, "verifying manifest signature");
        let unsigned = manifest.save_to_temp_without_signature()?;
        signing::verify(
            &unsigned,
            &destination.join(certificate),
            signature,
            no_verify_cert,
        )?;
        info!("manifest signature verified");
    }

    Ok(CsarReader {
        destination: destination.to_path_buf(),
        metadata,
        manifest,
    })
}

fn download(url: &str) -> Result<NamedTempFile> {
    info!(url, "downloading CSAR");
    let mut response = reqwest::blocking::get(url)?;
    let status = response.status().as_u16();
    if status != 200 {
        return Err(Error::Download {
            url: url.to_string(),
            status,
        });
    }
    let mut staged = NamedTempFile::new()?;
    response.copy_to(staged.as_file_mut())?;
    staged.flush()?;
    Ok(staged)
}

/// Archive entry name for `path`, relative to `source`, `/`-separated.
fn relative_name(source: &Path, path: &Path) -> Result<String> {
    let rel = path
        .strip_prefix(source)
        .map_err(|_| Error::Validation(format!("{} escapes the source tree", path.display())))?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Ok(parts.join("/"))
}
