use serde::{Deserialize, Serialize};

/// An OpenRTB bid response. Only the fields the harness inspects are kept;
/// everything else an exchange returns survives in `Bid::ext`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BidResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub seatbid: Vec<SeatBid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bidid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cur: Option<String>,
    /// No-bid reason code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbr: Option<i32>,
}

impl BidResponse {
    /// The first bid of the first seat. QA scenarios send single-impression
    /// requests, so this is the winning bid in practice.
    pub fn first_bid(&self) -> Option<&Bid> {
        self.seatbid.first().and_then(|seat| seat.bid.first())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeatBid {
    #[serde(default)]
    pub bid: Vec<Bid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seat: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<i32>,
}

/// A single bid. `adm` carries the creative markup (HTML, VAST XML, or
/// native JSON); `nurl`/`burl`/`lurl` are the win/billing/loss notice URLs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bid {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impid: Option<String>,
    #[serde(default)]
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nurl: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub burl: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lurl: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adm: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iurl: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dealid: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attr: Vec<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub w: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub h: Option<i32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub adomain: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ext: Option<serde_json::Value>,
}
