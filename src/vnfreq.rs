// src/vnfreq.rs

//! VNF requirement checkers
//!
//! Each checker inspects an opened package (and optionally its parsed
//! template) for compliance with a single numbered requirement and reports
//! a zero/error outcome with a human-readable description. As with
//! validators, the set is a closed static registry.

use crate::csar::CsarReader;
use crate::error::{Error, Result};

/// Outcome of one requirement check.
#[derive(Debug)]
pub struct CheckOutcome {
    pub id: &'static str,
    pub description: &'static str,
    /// `None` when the requirement is met.
    pub error: Option<String>,
}

/// A single VNF requirement check.
pub trait Tester: std::fmt::Debug {
    fn id(&self) -> &'static str;
    fn description(&self) -> &'static str;

    /// Returns `None` when the requirement is met, otherwise the failure
    /// reason.
    fn check(&self, reader: &CsarReader, template: Option<&serde_yaml::Value>) -> Option<String>;
}

type Constructor = fn() -> Box<dyn Tester>;

const TESTERS: &[(&str, Constructor)] = &[("R-66070", || Box::new(R66070))];

/// IDs of all registered requirement checkers.
pub fn tester_ids() -> Vec<&'static str> {
    TESTERS.iter().map(|(id, _)| *id).collect()
}

/// Look up a requirement checker by ID.
pub fn get_tester(id: &str) -> Result<Box<dyn Tester>> {
    TESTERS
        .iter()
        .find(|(n, _)| *n == id)
        .map(|(_, ctor)| ctor())
        .ok_or_else(|| {
            Error::Validation(format!(
                "unknown requirement: {} (available: {})",
                id,
                tester_ids().join(", ")
            ))
        })
}

/// Run the named checkers against an opened package. Unknown IDs fail fast.
pub fn check_requirements(
    ids: &[String],
    reader: &CsarReader,
    template: Option<&serde_yaml::Value>,
) -> Result<Vec<CheckOutcome>> {
    let mut outcomes = Vec::with_capacity(ids.len());
    for id in ids {
        let tester = get_tester(id)?;
        outcomes.push(CheckOutcome {
            id: tester.id(),
            description: tester.description(),
            error: tester.check(reader, template),
        });
    }
    Ok(outcomes)
}

/// The VNF package must include identification data for the resource,
/// which the manifest's metadata block carries.
#[derive(Debug)]
struct R66070;

impl Tester for R66070 {
    fn id(&self) -> &'static str {
        "R-66070"
    }

    fn description(&self) -> &'static str {
        "The VNF Package MUST include VNF Identification Data to uniquely identify \
         the resource for a given VNF provider, including an identifier, the name, \
         description, provider, and version of the VNF."
    }

    fn check(&self, reader: &CsarReader, _template: Option<&serde_yaml::Value>) -> Option<String> {
        // A reconstructed manifest has already passed metadata validation.
        if reader.manifest().is_none() {
            Some("No manifest file found".to_string())
        } else {
            None
        }
    }
}
