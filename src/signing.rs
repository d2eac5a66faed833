// src/signing.rs

//! Detached CMS signing via the external `openssl` tool
//!
//! The manifest signature is a PEM-wrapped detached CMS blob produced and
//! checked by `openssl cms` as a subprocess. This module only owns the
//! command contract; which bytes get signed is decided by the caller.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;

const OPENSSL: &str = "openssl";

#[derive(Error, Debug)]
pub enum SigningError {
    #[error("failed to run {tool}: {source}")]
    Spawn {
        tool: &'static str,
        source: std::io::Error,
    },

    /// Non-zero exit from the external tool, with its captured output.
    #[error("openssl cms {operation} failed with status {status}: {stderr}")]
    CommandFailed {
        operation: &'static str,
        status: i32,
        stdout: String,
        stderr: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Produce a PEM-wrapped detached CMS signature over `msg_file`.
pub fn sign(msg_file: &Path, cert_file: &Path, key_file: &Path) -> Result<String, SigningError> {
    let output = run_cms(
        "sign",
        &[
            "-sign",
            "-binary",
            "-in",
            &absolute(msg_file)?,
            "-signer",
            &absolute(cert_file)?,
            "-inkey",
            &absolute(key_file)?,
            "-outform",
            "PEM",
        ],
    )?;
    Ok(output)
}

/// Verify a detached CMS signature over `msg_file`.
///
/// The signature text is staged to a temporary file for the duration of the
/// call. `no_verify_cert` skips the certificate chain trust check
/// (`-noverify`), not the signature check itself.
pub fn verify(
    msg_file: &Path,
    cert_file: &Path,
    cms: &str,
    no_verify_cert: bool,
) -> Result<(), SigningError> {
    let mut staged = NamedTempFile::new()?;
    staged.write_all(cms.as_bytes())?;
    staged.flush()?;

    let mut args: Vec<String> = vec!["-verify".into(), "-binary".into()];
    if no_verify_cert {
        args.push("-noverify".into());
    }
    args.extend([
        "-in".into(),
        staged.path().display().to_string(),
        "-inform".into(),
        "PEM".into(),
        "-content".into(),
        absolute(msg_file)?,
        "-certfile".into(),
        absolute(cert_file)?,
    ]);

    let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
    run_cms("verify", &arg_refs)?;
    Ok(())
}

fn absolute(path: &Path) -> Result<String, SigningError> {
    let abs: PathBuf = std::path::absolute(path)?;
    Ok(abs.display().to_string())
}

fn run_cms(operation: &'static str, args: &[&str]) -> Result<String, SigningError> {
    debug!(?args, "invoking openssl cms");
    let output = Command::new(OPENSSL)
        .arg("cms")
        .args(args)
        .output()
        .map_err(|e| SigningError::Spawn {
            tool: OPENSSL,
            source: e,
        })?;

    if !output.status.success() {
        return Err(SigningError::CommandFailed {
            operation,
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
