//! Fuzzy comparison of a parsed bidder trace against an expected shape.
//!
//! Expected values are fragments: a match means the expected string is
//! contained in the actual one, never that they are equal. Actual traces
//! embed generated ids and timestamps that expectations cannot pin.

use std::error::Error;
use std::fmt;
use types::trace::{BidTrace, DecisionStage, Selection};

/// Expected trace content that was not found in the actual trace. Carries
/// the full actual context so a failing test prints enough to diagnose.
#[derive(Debug, Clone)]
pub enum MismatchError {
    /// No targeting record label contains the expected label.
    RecordNotFound {
        expected_label: String,
        actual_labels: Vec<String>,
    },
    /// A matched record has no detail line containing the expected line.
    DetailNotFound {
        label: String,
        expected_line: String,
        actual_lines: Vec<String>,
    },
    /// No actual decision stage satisfies the expected stage.
    StageNotFound {
        expected: Box<DecisionStage>,
        actual: Vec<DecisionStage>,
    },
}

impl fmt::Display for MismatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MismatchError::RecordNotFound {
                expected_label,
                actual_labels,
            } => write!(
                f,
                "no targeting tree record with {expected_label:?} substring found; actual records: {actual_labels:?}"
            ),
            MismatchError::DetailNotFound {
                label,
                expected_line,
                actual_lines,
            } => write!(
                f,
                "record {label:?} has no line containing {expected_line:?}; actual lines: {actual_lines:?}"
            ),
            MismatchError::StageNotFound { expected, actual } => write!(
                f,
                "the decision stage\n{}\nis not found in\n{}",
                render_json(expected),
                render_json(actual)
            ),
        }
    }
}

impl Error for MismatchError {}

fn render_json<T: serde::Serialize + fmt::Debug>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| format!("{value:?}"))
}

/// The core comparator: an unset expectation matches anything; a set
/// expectation needs a set actual value containing it as a substring.
pub fn fuzzy_contains(expected: Option<&str>, actual: Option<&str>) -> bool {
    match expected {
        None => true,
        Some(fragment) => actual.is_some_and(|value| value.contains(fragment)),
    }
}

/// Checks every expected targeting record against the actual tree. The
/// first actual record (in print order) whose label contains the expected
/// label is the one compared; each expected detail line must then appear as
/// a substring of at least one of that record's lines.
pub fn compare_targeting_tree(actual: &BidTrace, expected: &BidTrace) -> Result<(), MismatchError> {
    for (expected_label, expected_lines) in &expected.targeting_tree {
        let (label, actual_lines) = actual
            .targeting_tree
            .iter()
            .find(|(label, _)| label.contains(expected_label.as_str()))
            .ok_or_else(|| MismatchError::RecordNotFound {
                expected_label: expected_label.clone(),
                actual_labels: actual.targeting_tree.keys().cloned().collect(),
            })?;

        for expected_line in expected_lines {
            let found = actual_lines
                .iter()
                .any(|line| line.contains(expected_line.as_str()));
            if !found {
                return Err(MismatchError::DetailNotFound {
                    label: label.clone(),
                    expected_line: expected_line.clone(),
                    actual_lines: actual_lines.clone(),
                });
            }
        }
    }
    Ok(())
}

/// Checks that every expected stage is satisfied by at least one actual
/// stage, independent of position.
pub fn compare_decision_stages(
    actual: &[DecisionStage],
    expected: &[DecisionStage],
) -> Result<(), MismatchError> {
    for expected_stage in expected {
        if !actual.iter().any(|stage| stage_matches(expected_stage, stage)) {
            return Err(MismatchError::StageNotFound {
                expected: Box::new(expected_stage.clone()),
                actual: actual.to_vec(),
            });
        }
    }
    Ok(())
}

/// Applies the tree comparison when the expected tree is non-empty and the
/// stage comparison when expected stages are present.
pub fn compare(actual: &BidTrace, expected: &BidTrace) -> Result<(), MismatchError> {
    if !expected.targeting_tree.is_empty() {
        compare_targeting_tree(actual, expected)?;
    }
    if !expected.decision_stages.is_empty() {
        compare_decision_stages(&actual.decision_stages, &expected.decision_stages)?;
    }
    Ok(())
}

fn stage_matches(expected: &DecisionStage, actual: &DecisionStage) -> bool {
    selection_matches(expected.selection.as_ref(), actual.selection.as_ref())
        && fuzzy_contains(expected.description.as_deref(), actual.description.as_deref())
        && fuzzy_contains(expected.stage_type.as_deref(), actual.stage_type.as_deref())
        && fuzzy_contains(
            expected.status.map(|status| status.name()),
            actual.status.map(|status| status.name()),
        )
}

fn selection_matches(expected: Option<&Selection>, actual: Option<&Selection>) -> bool {
    let Some(expected) = expected else {
        // No expected selection matches any actual stage.
        return true;
    };
    let Some(actual) = actual else {
        return false;
    };
    fuzzy_contains(
        expected.organization_id.as_deref(),
        actual.organization_id.as_deref(),
    ) && fuzzy_contains(expected.account.as_deref(), actual.account.as_deref())
        && fuzzy_contains(expected.campaign.as_deref(), actual.campaign.as_deref())
        && fuzzy_contains(expected.lineitem.as_deref(), actual.lineitem.as_deref())
        && fuzzy_contains(expected.creative.as_deref(), actual.creative.as_deref())
        && fuzzy_contains(expected.assets.as_deref(), actual.assets.as_deref())
}
