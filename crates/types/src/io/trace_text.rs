//! Parser for the bidder's free-text diagnostic trace.
//!
//! The trace mixes three sub-grammars in one stream: targeting-tree records
//! (a `(org=...)` header line followed by detail lines), a flat list of
//! found line items after a `Found:` marker, and a JSON array of decision
//! stages. Lines are classified by prefix; there are no terminators.

use crate::trace::{BidTrace, DecisionStage};
use indexmap::IndexMap;
use std::error::Error;
use std::fmt;

const FOUND_MARKER: &str = "Found:";
const RECORD_MARKER: &str = "(org=";

#[derive(Debug)]
pub enum TraceError {
    /// The decision-stage block was present but not valid JSON.
    MalformedStages(serde_json::Error),
}

impl fmt::Display for TraceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceError::MalformedStages(err) => {
                write!(f, "decision-stage block is not valid JSON: {err}")
            }
        }
    }
}

impl Error for TraceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            TraceError::MalformedStages(err) => Some(err),
        }
    }
}

/// How a single trimmed line is interpreted, given whether the `Found:`
/// marker has already been seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineKind {
    /// The `Found:` marker itself; not stored anywhere.
    FoundMarker,
    /// A `[` line after `Found:` opens the decision-stage JSON block.
    StageOpen,
    /// A `(org=...)` record header.
    Record,
    /// Anything else.
    Text,
}

fn classify(line: &str, in_found: bool) -> LineKind {
    if line.starts_with(FOUND_MARKER) {
        LineKind::FoundMarker
    } else if line.starts_with('[') && in_found {
        LineKind::StageOpen
    } else if line.starts_with(RECORD_MARKER) {
        LineKind::Record
    } else {
        LineKind::Text
    }
}

/// Parses a raw trace. Line handling is best-effort and never fails:
/// unrecognized lines attach to the open record or are dropped. The only
/// error is a decision-stage block that will not decode.
pub fn parse(text: &str) -> Result<BidTrace, TraceError> {
    let mut tree: IndexMap<String, Vec<String>> = IndexMap::new();
    let mut found = Vec::new();
    let mut stage_block = String::new();
    let mut in_found = false;
    let mut in_stages = false;
    let mut open_record: Option<String> = None;

    for raw in text.lines() {
        let line = raw.trim();
        match classify(line, in_found) {
            LineKind::FoundMarker => in_found = true,
            LineKind::StageOpen => {
                in_stages = true;
                stage_block.push_str(line);
                stage_block.push('\n');
            }
            LineKind::Record => {
                if in_found {
                    found.push(line.to_string());
                } else {
                    tree.insert(line.to_string(), Vec::new());
                    open_record = Some(line.to_string());
                }
            }
            LineKind::Text => {
                if in_stages {
                    stage_block.push_str(line);
                    stage_block.push('\n');
                } else if let Some(record) = &open_record {
                    if let Some(details) = tree.get_mut(record) {
                        details.push(line.to_string());
                    }
                }
            }
        }
    }

    Ok(BidTrace {
        targeting_tree: tree,
        found,
        decision_stages: decode_stages(&stage_block)?,
    })
}

/// Decodes the accumulated decision-stage block. An empty block means the
/// bidder printed no stages.
pub fn decode_stages(block: &str) -> Result<Vec<DecisionStage>, TraceError> {
    if block.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(block).map_err(TraceError::MalformedStages)
}
