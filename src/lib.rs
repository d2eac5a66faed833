// src/lib.rs

//! CSAR packaging tools
//!
//! Builds, opens, and validates CSAR service archives: a zip carrying a
//! TOSCA service template, a fixed-path metadata header, an optional
//! manifest of file digests, and an optional detached CMS signature.
//!
//! # Architecture
//!
//! - `toscameta`: the two-variant `TOSCA-Metadata/TOSCA.meta` header
//! - `manifest`: the block-structured manifest text format
//! - `hash`: per-file SHA-256/SHA-512 digests
//! - `signing`: detached CMS sign/verify via the external `openssl` tool
//! - `csar`: archive writer and reader, wiring the above together
//! - `validator` / `vnfreq`: closed registries of template validators and
//!   requirement checkers consuming an opened archive

pub mod csar;
mod error;
pub mod fsutil;
pub mod hash;
pub mod manifest;
pub mod signing;
pub mod toscameta;
pub mod validator;
pub mod vnfreq;

pub use csar::{CsarReader, WriteOptions, read, write};
pub use error::{Error, Result};
pub use hash::HashAlgorithm;
pub use manifest::{Manifest, ManifestError};
pub use toscameta::{MetaVariant, ToscaMeta};
