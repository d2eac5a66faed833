// src/error.rs

//! Crate-level error type
//!
//! Per-concern errors (`ManifestError`, `HashError`, `SigningError`) live in
//! their own modules; this aggregates them for callers that drive a whole
//! archive operation.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Manifest(#[from] crate::manifest::ManifestError),

    #[error(transparent)]
    Hash(#[from] crate::hash::HashError),

    #[error(transparent)]
    Signing(#[from] crate::signing::SigningError),

    /// A file or directory was missing, of the wrong kind, or already
    /// present at an expected archive path.
    #[error("{0}")]
    Validation(String),

    /// Remote fetch returned a non-success status.
    #[error("server at {url} returned a {status} status code")]
    Download { url: String, status: u16 },
}
