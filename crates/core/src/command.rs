//! Textual command input.
//!
//! An alternative to building a request field by field: newline-separated
//! `key=value` pairs in the style of an ADMIXTOOLS parameter file.
//!
//! ```text
//! geno=v54.1_1240K_public
//! target=Hungary_Conqueror_Elite.SG
//! left=Estonia_BA.SG,Russia_Andronovo.SG
//! right=Mbuti.DG,A.SG,B.SG,C.SG,D.SG
//! ```
//!
//! Blank lines and lines starting with `#` are skipped; unrecognised keys
//! are ignored.

use crate::analysis::{AnalysisRequest, Target};
use crate::error::CoreError;
use crate::population::DatasetType;

/// Keys that must be present, in the order they are checked.
const REQUIRED_KEYS: [&str; 3] = ["target", "left", "right"];

/// A parsed command, before population-level validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInput {
    /// Raw `geno` value, if given.
    pub geno: Option<String>,
    pub target: String,
    pub left: Vec<String>,
    pub right: Vec<String>,
}

impl CommandInput {
    /// Dataset panel selected by `geno`: Human Origins when the value names
    /// an `HO` panel, otherwise 1240k.
    pub fn dataset(&self) -> DatasetType {
        match &self.geno {
            Some(geno) if names_ho_panel(geno) => DatasetType::HumanOrigins,
            _ => DatasetType::Panel1240k,
        }
    }

    /// Convert into a request. Call [`AnalysisRequest::validate`] before
    /// submitting.
    pub fn into_request(self) -> AnalysisRequest {
        let dataset = self.dataset();
        AnalysisRequest::new(
            Target::Population(self.target),
            self.left,
            self.right,
            dataset,
        )
    }
}

/// Parse textual command input.
///
/// Fails with [`CoreError::InvalidCommand`] on a line without `=`, or
/// naming the first of `target`, `left`, `right` that is missing or empty.
pub fn parse_command(input: &str) -> Result<CommandInput, CoreError> {
    let mut geno = None;
    let mut target = None;
    let mut left = None;
    let mut right = None;

    for (lineno, raw) in input.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (key, value) = line.split_once('=').ok_or_else(|| {
            CoreError::InvalidCommand(format!(
                "line {}: expected key=value, got \"{line}\"",
                lineno + 1
            ))
        })?;
        let value = value.trim();
        match key.trim().to_ascii_lowercase().as_str() {
            "geno" => geno = Some(value.to_string()),
            "target" => target = Some(value.to_string()),
            "left" => left = Some(split_list(value)),
            "right" => right = Some(split_list(value)),
            _ => {}
        }
    }

    let missing = |key: &str| CoreError::InvalidCommand(format!("missing required key \"{key}\""));

    let target = target
        .filter(|t| !t.is_empty())
        .ok_or_else(|| missing(REQUIRED_KEYS[0]))?;
    let left = left
        .filter(|l| !l.is_empty())
        .ok_or_else(|| missing(REQUIRED_KEYS[1]))?;
    let right = right
        .filter(|r| !r.is_empty())
        .ok_or_else(|| missing(REQUIRED_KEYS[2]))?;

    Ok(CommandInput {
        geno: geno.filter(|g| !g.is_empty()),
        target,
        left,
        right,
    })
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// `HO`, `v54.1_HO_public`, `ho.geno` all name the Human Origins panel.
fn names_ho_panel(geno: &str) -> bool {
    geno.split(|c: char| !c.is_ascii_alphanumeric())
        .any(|token| token.eq_ignore_ascii_case("ho"))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const FULL: &str = "\
geno=v54.1_1240K_public
target=Hungary_Conqueror_Elite.SG
left=Estonia_BA.SG, Russia_Andronovo.SG
right=Mbuti.DG,A.SG,B.SG,C.SG,D.SG
";

    #[test]
    fn parses_full_command() {
        let cmd = parse_command(FULL).unwrap();
        assert_eq!(cmd.target, "Hungary_Conqueror_Elite.SG");
        assert_eq!(cmd.left, ["Estonia_BA.SG", "Russia_Andronovo.SG"]);
        assert_eq!(cmd.right.len(), 5);
        assert_eq!(cmd.dataset(), DatasetType::Panel1240k);

        let request = cmd.into_request();
        assert!(request.validate().is_ok());
    }

    #[test]
    fn skips_comments_blank_lines_and_unknown_keys() {
        let input = format!("# model 1\n\nallsnps=YES\n{FULL}");
        assert!(parse_command(&input).is_ok());
    }

    #[test]
    fn ho_geno_selects_human_origins() {
        let input = FULL.replace("v54.1_1240K_public", "v54.1_HO_public");
        assert_eq!(parse_command(&input).unwrap().dataset(), DatasetType::HumanOrigins);
    }

    #[test]
    fn geno_is_optional() {
        let input = FULL.lines().skip(1).collect::<Vec<_>>().join("\n");
        let cmd = parse_command(&input).unwrap();
        assert_eq!(cmd.geno, None);
        assert_eq!(cmd.dataset(), DatasetType::Panel1240k);
    }

    #[test]
    fn missing_keys_reported_in_order() {
        assert_matches!(
            parse_command("left=A,B\nright=C"),
            Err(CoreError::InvalidCommand(msg)) if msg.contains("\"target\"")
        );
        assert_matches!(
            parse_command("right=C"),
            Err(CoreError::InvalidCommand(msg)) if msg.contains("\"target\"")
        );
        assert_matches!(
            parse_command("target=T\nright=C"),
            Err(CoreError::InvalidCommand(msg)) if msg.contains("\"left\"")
        );
        assert_matches!(
            parse_command("target=T\nleft=A,B"),
            Err(CoreError::InvalidCommand(msg)) if msg.contains("\"right\"")
        );
    }

    #[test]
    fn empty_list_counts_as_missing() {
        assert_matches!(
            parse_command("target=T\nleft= , \nright=C"),
            Err(CoreError::InvalidCommand(msg)) if msg.contains("\"left\"")
        );
    }

    #[test]
    fn line_without_equals_rejected() {
        assert_matches!(
            parse_command("target=T\nleft A,B"),
            Err(CoreError::InvalidCommand(msg)) if msg.starts_with("line 2")
        );
    }
}
