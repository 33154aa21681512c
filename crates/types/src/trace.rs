use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A parsed bidder diagnostic trace.
///
/// The bidder explains its decision as free text: a targeting tree (one
/// record per candidate with the rules it hit), a flat list of line items it
/// found eligible, and a JSON block describing each stage of the selection
/// pipeline. An expected trace is the same type with only the fragments a
/// test cares about filled in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BidTrace {
    /// Targeting records in the order the bidder printed them, each with its
    /// detail lines.
    #[serde(default)]
    pub targeting_tree: IndexMap<String, Vec<String>>,
    /// Record labels listed under the `Found:` marker.
    #[serde(default)]
    pub found: Vec<String>,
    /// Decoded selection-pipeline stages.
    #[serde(default)]
    pub decision_stages: Vec<DecisionStage>,
}

/// One step of the bidder's selection pipeline (budget check, creative
/// match, auction, ...) with its outcome.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecisionStage {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub stage_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<StageStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection: Option<Selection>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StageStatus {
    Pass,
    Fail,
    Skip,
}

impl StageStatus {
    /// Wire name, as printed in the trace. Comparisons go through this
    /// rather than enum identity so partial expectations stay string-based.
    pub fn name(self) -> &'static str {
        match self {
            StageStatus::Pass => "PASS",
            StageStatus::Fail => "FAIL",
            StageStatus::Skip => "SKIP",
        }
    }
}

/// The entity a decision stage acted on. Every field is optional; an unset
/// field in an expected selection matches anything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Selection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub campaign: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lineitem: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creative: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assets: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_decoding() {
        let stage: DecisionStage = serde_json::from_str(
            r#"{"type":"AUCTION","description":"won","status":"PASS",
                "selection":{"organizationId":"org-1","lineitem":"li-7"}}"#,
        )
        .unwrap();
        assert_eq!(stage.stage_type.as_deref(), Some("AUCTION"));
        assert_eq!(stage.status, Some(StageStatus::Pass));
        let selection = stage.selection.unwrap();
        assert_eq!(selection.organization_id.as_deref(), Some("org-1"));
        assert_eq!(selection.lineitem.as_deref(), Some("li-7"));
        assert!(selection.campaign.is_none());
    }

    #[test]
    fn test_status_names() {
        assert_eq!(StageStatus::Pass.name(), "PASS");
        assert_eq!(StageStatus::Fail.name(), "FAIL");
        assert_eq!(StageStatus::Skip.name(), "SKIP");
    }

    #[test]
    fn test_unknown_status_is_a_decode_error() {
        let result = serde_json::from_str::<DecisionStage>(r#"{"status":"MAYBE"}"#);
        assert!(result.is_err());
    }
}
