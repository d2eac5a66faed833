// src/validator.rs

//! Template validator drivers
//!
//! Validators consume an opened [`CsarReader`] and perform template
//! validation. The set of drivers is closed and explicit: a static registry
//! maps each name to a constructor. The built-in driver only performs the
//! shallow structural check; deep TOSCA semantics belong to external
//! tooling.

use crate::csar::CsarReader;
use crate::error::{Error, Result};

/// A validator driver over an opened CSAR.
pub trait Validator: std::fmt::Debug {
    /// Validate the package, retaining the parsed template on success.
    fn validate(&mut self, reader: &CsarReader) -> Result<()>;

    /// The parsed entry-definitions template, once validated.
    fn template(&self) -> Option<&serde_yaml::Value>;
}

type Constructor = fn() -> Box<dyn Validator>;

/// Closed driver registry.
const VALIDATORS: &[(&str, Constructor)] = &[("tosca", || Box::new(ToscaYamlValidator::new()))];

/// Names of all registered validator drivers.
pub fn validator_names() -> Vec<&'static str> {
    VALIDATORS.iter().map(|(name, _)| *name).collect()
}

/// Look up a validator driver by name.
pub fn get_validator(name: &str) -> Result<Box<dyn Validator>> {
    VALIDATORS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, ctor)| ctor())
        .ok_or_else(|| {
            Error::Validation(format!(
                "unknown validator: {} (available: {})",
                name,
                validator_names().join(", ")
            ))
        })
}

/// Parses the entry-definitions template and checks that it declares a
/// definitions version.
#[derive(Debug)]
pub struct ToscaYamlValidator {
    template: Option<serde_yaml::Value>,
}

impl ToscaYamlValidator {
    pub fn new() -> Self {
        ToscaYamlValidator { template: None }
    }
}

impl Default for ToscaYamlValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl Validator for ToscaYamlValidator {
    fn validate(&mut self, reader: &CsarReader) -> Result<()> {
        let template = reader.entry_definitions_yaml()?;
        if template.get("tosca_definitions_version").is_none() {
            return Err(Error::Validation(
                "entry definitions template declares no tosca_definitions_version".to_string(),
            ));
        }
        self.template = Some(template);
        Ok(())
    }

    fn template(&self) -> Option<&serde_yaml::Value> {
        self.template.as_ref()
    }
}
