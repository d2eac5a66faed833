// src/fsutil.rs

//! Expected-path checks shared by the archive writer and the metadata model.

use crate::error::{Error, Result};
use std::path::Path;

/// Fail unless `path` is an existing regular file.
pub fn require_file(path: &Path, msg: &str) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(Error::Validation(format!(
            "{} is not an existing file. {}",
            path.display(),
            msg
        )))
    }
}

/// Fail unless `path` is an existing directory.
pub fn require_dir(path: &Path, msg: &str) -> Result<()> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(Error::Validation(format!(
            "{} is not an existing directory. {}",
            path.display(),
            msg
        )))
    }
}

/// Fail if anything already exists at `path`.
pub fn require_absent(path: &Path, msg: &str) -> Result<()> {
    if path.exists() {
        Err(Error::Validation(format!(
            "{} already exists. {}",
            path.display(),
            msg
        )))
    } else {
        Ok(())
    }
}
