//! Population naming rules, dataset panels, and the outgroup selection.
//!
//! The outgroup ("right") set always carries one basal reference
//! population, [`MANDATORY_OUTGROUP`]. [`RightPopulations`] is the editable
//! form of that set and refuses to drop it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Basal outgroup that every right set must include.
pub const MANDATORY_OUTGROUP: &str = "Mbuti.DG";

/// Minimum number of source ("left") populations in a model.
pub const MIN_SOURCE_POPULATIONS: usize = 2;

/// Minimum number of outgroup ("right") populations in a model.
pub const MIN_RIGHT_POPULATIONS: usize = 5;

/// Maximum length of a single population label.
const MAX_POPULATION_NAME_LEN: usize = 128;

// ---------------------------------------------------------------------------
// DatasetType
// ---------------------------------------------------------------------------

/// SNP marker panel the analysis runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DatasetType {
    /// The 1240k capture panel.
    #[default]
    #[serde(rename = "1240k")]
    Panel1240k,
    /// The Human Origins array panel.
    #[serde(rename = "HO")]
    HumanOrigins,
}

impl DatasetType {
    /// Wire identifier, also used as the `dataset` query parameter.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Panel1240k => "1240k",
            Self::HumanOrigins => "HO",
        }
    }
}

impl fmt::Display for DatasetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DatasetType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            v if v.eq_ignore_ascii_case("1240k") => Ok(Self::Panel1240k),
            v if v.eq_ignore_ascii_case("ho") => Ok(Self::HumanOrigins),
            other => Err(CoreError::Validation(format!(
                "Unknown dataset \"{other}\" (expected \"1240k\" or \"HO\")"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate a single population label.
///
/// Rules:
/// - Must not be empty or whitespace-only.
/// - Must not exceed `MAX_POPULATION_NAME_LEN` characters.
/// - Must not contain commas or line breaks (they delimit lists in the
///   textual command format).
pub fn validate_population_name(name: &str) -> Result<(), CoreError> {
    if name.trim().is_empty() {
        return Err(CoreError::Validation(
            "Population name must not be empty".to_string(),
        ));
    }
    if name.len() > MAX_POPULATION_NAME_LEN {
        return Err(CoreError::Validation(format!(
            "Population name must not exceed {MAX_POPULATION_NAME_LEN} characters"
        )));
    }
    if name.contains([',', '\n', '\r']) {
        return Err(CoreError::Validation(format!(
            "Population name \"{name}\" must not contain commas or line breaks"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// RightPopulations
// ---------------------------------------------------------------------------

/// Editable outgroup selection that always contains [`MANDATORY_OUTGROUP`].
///
/// Insertion order is preserved so the list reads back the way the user
/// built it; the mandatory member always comes first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RightPopulations {
    members: Vec<String>,
}

impl RightPopulations {
    /// Create a selection holding only the mandatory outgroup.
    pub fn new() -> Self {
        Self {
            members: vec![MANDATORY_OUTGROUP.to_string()],
        }
    }

    /// Add a population. Returns `false` if it was already present.
    pub fn insert(&mut self, name: impl Into<String>) -> Result<bool, CoreError> {
        let name = name.into().trim().to_string();
        validate_population_name(&name)?;
        if self.contains(&name) {
            return Ok(false);
        }
        self.members.push(name);
        Ok(true)
    }

    /// Remove a population. The mandatory outgroup cannot be removed.
    pub fn remove(&mut self, name: &str) -> Result<bool, CoreError> {
        if name == MANDATORY_OUTGROUP {
            return Err(CoreError::Validation(format!(
                "{MANDATORY_OUTGROUP} is a required outgroup and cannot be removed"
            )));
        }
        let before = self.members.len();
        self.members.retain(|m| m != name);
        Ok(self.members.len() != before)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.members.iter().any(|m| m == name)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Always `false`: the mandatory member is never absent.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.members
    }

    /// Whether the selection meets the minimum outgroup count.
    pub fn is_complete(&self) -> bool {
        self.members.len() >= MIN_RIGHT_POPULATIONS
    }
}

impl Default for RightPopulations {
    fn default() -> Self {
        Self::new()
    }
}

impl From<RightPopulations> for Vec<String> {
    fn from(set: RightPopulations) -> Self {
        set.members
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
