use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// OpenRTB placement of the impression being bid on. The numeric value is
/// the wire encoding used by the request builders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlacementType {
    Banner,
    Video,
    Native,
    Audio,
}

impl PlacementType {
    pub const ALL: [PlacementType; 4] = [
        PlacementType::Banner,
        PlacementType::Video,
        PlacementType::Native,
        PlacementType::Audio,
    ];

    pub fn value(self) -> i32 {
        match self {
            PlacementType::Banner => 1,
            PlacementType::Video => 2,
            PlacementType::Native => 3,
            PlacementType::Audio => 4,
        }
    }

    pub fn from_value(value: i32) -> Option<Self> {
        match value {
            1 => Some(PlacementType::Banner),
            2 => Some(PlacementType::Video),
            3 => Some(PlacementType::Native),
            4 => Some(PlacementType::Audio),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PlacementType::Banner => "banner",
            PlacementType::Video => "video",
            PlacementType::Native => "native",
            PlacementType::Audio => "audio",
        }
    }
}

impl FromStr for PlacementType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "banner" => Ok(PlacementType::Banner),
            "video" => Ok(PlacementType::Video),
            "native" => Ok(PlacementType::Native),
            "audio" => Ok(PlacementType::Audio),
            other => Err(format!("unknown placement type: {other}")),
        }
    }
}

impl fmt::Display for PlacementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Which URL field of a bid carries the impression signal for billing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImpressionType {
    /// Impression win nurl.
    Iw,
    /// Impression billable notice burl.
    Ib,
    /// Impression VAST video.
    Iv,
    /// Impression VAST video start event.
    Ives,
    /// Impression native.
    In,
    /// Impression ext.imp.tracker.
    Ieit,
    /// Bid (impression) lost, exchange lurl.
    Il,
}

/// Static description of an exchange integration: where to send bid
/// requests and how it expects impressions to be confirmed per placement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exchange {
    pub name: String,
    /// Bid endpoint URL. Appending `?trace=true` makes the bidder return
    /// its diagnostic trace instead of a bare no-bid.
    pub url: String,
    pub commission: f64,
    pub impression_mappings: HashMap<PlacementType, ImpressionType>,
}

impl Exchange {
    /// Every placement bills through the burl unless an exchange overrides it.
    pub fn default_mapping() -> HashMap<PlacementType, ImpressionType> {
        PlacementType::ALL
            .iter()
            .map(|&placement| (placement, ImpressionType::Ib))
            .collect()
    }

    pub fn new(name: &str, url: &str) -> Self {
        Self::with_commission(name, url, 0.0)
    }

    pub fn with_commission(name: &str, url: &str, commission: f64) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            commission,
            impression_mappings: Self::default_mapping(),
        }
    }

    pub fn with_mappings(
        name: &str,
        url: &str,
        impression_mappings: HashMap<PlacementType, ImpressionType>,
    ) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            commission: 0.0,
            impression_mappings,
        }
    }

    pub fn impression_type(&self, placement: PlacementType) -> Option<ImpressionType> {
        self.impression_mappings.get(&placement).copied()
    }
}
