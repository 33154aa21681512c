use crate::io::xml::{self, Element};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// VAST in-stream video markup, reduced to the parts the harness fires
/// trackers from: impressions, the linear creative's clicks, and its
/// tracking events. Wrapper chains are not followed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VastVideo {
    pub version: Option<String>,
    pub ad: Option<VastAd>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VastAd {
    pub id: Option<String>,
    pub in_line: Option<InLine>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InLine {
    pub ad_title: Option<String>,
    pub impressions: Vec<String>,
    pub creatives: Vec<VastCreative>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VastCreative {
    pub linear: Option<Linear>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Linear {
    pub duration: Option<String>,
    pub media_files: Vec<MediaFile>,
    pub video_clicks: Option<VideoClicks>,
    pub tracking_events: Vec<Tracking>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaFile {
    pub delivery: Option<String>,
    pub mime_type: Option<String>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VideoClicks {
    pub click_through: Option<String>,
    pub click_tracking: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tracking {
    pub event: String,
    pub url: String,
}

impl VastVideo {
    /// Parses a VAST document. Returns `None` when the input is not XML or
    /// its root element is not `<VAST>`.
    pub fn parse(input: &str) -> Option<VastVideo> {
        let root = xml::parse(input)?;
        if !root.name.eq_ignore_ascii_case("VAST") {
            return None;
        }
        Some(VastVideo {
            version: root.attr("version").map(str::to_string),
            ad: root.child("Ad").map(read_ad),
        })
    }

    /// All `<Impression>` URLs of the inline ad.
    pub fn impressions(&self) -> &[String] {
        self.ad
            .as_ref()
            .and_then(|ad| ad.in_line.as_ref())
            .map(|in_line| in_line.impressions.as_slice())
            .unwrap_or(&[])
    }

    /// The linear section of the first creative, where clicks and tracking
    /// events live.
    pub fn first_linear(&self) -> Option<&Linear> {
        self.ad
            .as_ref()?
            .in_line
            .as_ref()?
            .creatives
            .first()?
            .linear
            .as_ref()
    }
}

fn read_ad(element: &Element) -> VastAd {
    VastAd {
        id: element.attr("id").map(str::to_string),
        in_line: element.child("InLine").map(read_in_line),
    }
}

fn read_in_line(element: &Element) -> InLine {
    InLine {
        ad_title: element
            .child("AdTitle")
            .map(|e| e.trimmed_text().to_string()),
        impressions: element
            .children_named("Impression")
            .map(|e| e.trimmed_text().to_string())
            .collect(),
        creatives: element
            .child("Creatives")
            .map(|creatives| {
                creatives
                    .children_named("Creative")
                    .map(read_creative)
                    .collect()
            })
            .unwrap_or_default(),
    }
}

fn read_creative(element: &Element) -> VastCreative {
    VastCreative {
        linear: element.child("Linear").map(read_linear),
    }
}

fn read_linear(element: &Element) -> Linear {
    Linear {
        duration: element
            .child("Duration")
            .map(|e| e.trimmed_text().to_string()),
        media_files: element
            .child("MediaFiles")
            .map(|files| files.children_named("MediaFile").map(read_media_file).collect())
            .unwrap_or_default(),
        video_clicks: element.child("VideoClicks").map(|clicks| VideoClicks {
            click_through: clicks
                .child("ClickThrough")
                .map(|e| e.trimmed_text().to_string()),
            click_tracking: clicks
                .children_named("ClickTracking")
                .map(|e| e.trimmed_text().to_string())
                .collect(),
        }),
        tracking_events: element
            .child("TrackingEvents")
            .map(|events| {
                events
                    .children_named("Tracking")
                    .filter_map(|e| {
                        e.attr("event").map(|event| Tracking {
                            event: event.to_string(),
                            url: e.trimmed_text().to_string(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default(),
    }
}

fn read_media_file(element: &Element) -> MediaFile {
    MediaFile {
        delivery: element.attr("delivery").map(str::to_string),
        mime_type: element.attr("type").map(str::to_string),
        width: element.attr("width").and_then(|w| w.parse().ok()),
        height: element.attr("height").and_then(|h| h.parse().ok()),
        url: element.trimmed_text().to_string(),
    }
}

/// Named video progress events a VAST creative can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VastEvent {
    Start,
    FirstQuartile,
    Midpoint,
    ThirdQuartile,
    Complete,
    Skip,
}

impl VastEvent {
    pub const ALL: [VastEvent; 6] = [
        VastEvent::Start,
        VastEvent::FirstQuartile,
        VastEvent::Midpoint,
        VastEvent::ThirdQuartile,
        VastEvent::Complete,
        VastEvent::Skip,
    ];

    /// Wire name, as it appears in the `event` attribute.
    pub fn name(self) -> &'static str {
        match self {
            VastEvent::Start => "start",
            VastEvent::FirstQuartile => "firstQuartile",
            VastEvent::Midpoint => "midpoint",
            VastEvent::ThirdQuartile => "thirdQuartile",
            VastEvent::Complete => "complete",
            VastEvent::Skip => "skip",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        VastEvent::ALL.iter().copied().find(|e| e.name() == name)
    }
}

impl FromStr for VastEvent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VastEvent::from_name(s.trim()).ok_or_else(|| format!("unknown video event: {s}"))
    }
}

impl fmt::Display for VastEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
