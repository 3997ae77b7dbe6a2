//! Analysis request model and client-side validation.
//!
//! [`AnalysisRequest::validate`] is the fast-fail check run before any
//! request leaves the client: minimum population counts, the mandatory
//! outgroup, and pairwise disjointness of target, sources and outgroups.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::population::{
    validate_population_name, DatasetType, MANDATORY_OUTGROUP, MIN_RIGHT_POPULATIONS,
    MIN_SOURCE_POPULATIONS,
};
use crate::types::DbId;

// ---------------------------------------------------------------------------
// Target
// ---------------------------------------------------------------------------

/// What the model is fitted for: a reference population, or the user's own
/// uploaded genotype file.
///
/// Flattened into the request body as either `target_population` or
/// `dna_file_id`, so the two are mutually exclusive on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Target {
    #[serde(rename = "target_population")]
    Population(String),
    #[serde(rename = "dna_file_id")]
    DnaFile(DbId),
}

impl Target {
    /// Population label, when the target is a reference population.
    pub fn population(&self) -> Option<&str> {
        match self {
            Self::Population(name) => Some(name),
            Self::DnaFile(_) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// AnalysisRequest
// ---------------------------------------------------------------------------

/// Parameters for one qpAdm run, exactly as submitted to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    #[serde(flatten)]
    pub target: Target,
    /// Candidate source ("left") populations. Order is not significant.
    pub source_populations: Vec<String>,
    /// Outgroup ("right") populations, including [`MANDATORY_OUTGROUP`].
    pub right_populations: Vec<String>,
    pub dataset_type: DatasetType,
}

impl AnalysisRequest {
    /// Build a request, trimming surrounding whitespace from every label.
    pub fn new(
        target: Target,
        source_populations: impl IntoIterator<Item = impl Into<String>>,
        right_populations: impl IntoIterator<Item = impl Into<String>>,
        dataset_type: DatasetType,
    ) -> Self {
        let target = match target {
            Target::Population(name) => Target::Population(name.trim().to_string()),
            other => other,
        };
        Self {
            target,
            source_populations: trim_all(source_populations),
            right_populations: trim_all(right_populations),
            dataset_type,
        }
    }

    /// Validate the request before submission.
    ///
    /// Rules:
    /// - A population target must be a valid label; a DNA file id must be positive.
    /// - Every source and outgroup label must be valid and unique within its set.
    /// - At least `MIN_SOURCE_POPULATIONS` sources and `MIN_RIGHT_POPULATIONS` outgroups.
    /// - The outgroups must include [`MANDATORY_OUTGROUP`].
    /// - Target, sources and outgroups must be pairwise disjoint.
    pub fn validate(&self) -> Result<(), CoreError> {
        match &self.target {
            Target::Population(name) => validate_population_name(name)?,
            Target::DnaFile(id) if *id <= 0 => {
                return Err(CoreError::Validation(format!(
                    "DNA file id must be positive, got {id}"
                )));
            }
            Target::DnaFile(_) => {}
        }

        let sources = validate_set("source", &self.source_populations)?;
        let rights = validate_set("right", &self.right_populations)?;

        if sources.len() < MIN_SOURCE_POPULATIONS {
            return Err(CoreError::Validation(format!(
                "At least {MIN_SOURCE_POPULATIONS} source populations are required, got {}",
                sources.len()
            )));
        }
        if rights.len() < MIN_RIGHT_POPULATIONS {
            return Err(CoreError::Validation(format!(
                "At least {MIN_RIGHT_POPULATIONS} right populations are required, got {}",
                rights.len()
            )));
        }
        if !rights.contains(MANDATORY_OUTGROUP) {
            return Err(CoreError::Validation(format!(
                "Right populations must include {MANDATORY_OUTGROUP}"
            )));
        }

        if let Some(target) = self.target.population() {
            if sources.contains(target) {
                return Err(CoreError::Validation(format!(
                    "Target \"{target}\" cannot also be a source population"
                )));
            }
            if rights.contains(target) {
                return Err(CoreError::Validation(format!(
                    "Target \"{target}\" cannot also be a right population"
                )));
            }
        }

        let mut overlap: Vec<&str> = sources.intersection(&rights).copied().collect();
        if !overlap.is_empty() {
            overlap.sort_unstable();
            return Err(CoreError::Validation(format!(
                "Populations cannot be both source and right: {}",
                overlap.join(", ")
            )));
        }

        Ok(())
    }
}

/// Validate every label of one population set and return it as a set.
fn validate_set<'a>(kind: &str, names: &'a [String]) -> Result<HashSet<&'a str>, CoreError> {
    let mut seen = HashSet::with_capacity(names.len());
    for name in names {
        validate_population_name(name)?;
        if !seen.insert(name.as_str()) {
            return Err(CoreError::Validation(format!(
                "Duplicate {kind} population: \"{name}\""
            )));
        }
    }
    Ok(seen)
}

fn trim_all(names: impl IntoIterator<Item = impl Into<String>>) -> Vec<String> {
    names
        .into_iter()
        .map(|n| n.into().trim().to_string())
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
