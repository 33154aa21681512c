//! Tracker extraction from winning creative markup.
//!
//! Each placement type carries a different markup grammar in `bid.adm`:
//! VAST XML for video, IAB Native JSON for native, plain HTML for banner
//! and audio companions. Extraction resolves all of them into one flat
//! `TrackerSet` the simulator can fire without knowing the grammar.

use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use types::bid::Bid;
use types::exchange::{ImpressionType, PlacementType};
use types::io::html;
use types::nativead::NativeAdResponse;
use types::vast::{VastEvent, VastVideo};

/// Price placeholder the exchange leaves in impression URLs; resolved with
/// the clearing price at fire time.
pub const AUCTION_PRICE_MACRO: &str = "${AUCTION_PRICE}";

/// Every URL the downstream ad-serving lifecycle touches for one bid.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerSet {
    pub placement: PlacementType,
    /// The priced impression signal; may still contain the auction price
    /// macro until `resolve_price_macro` runs.
    pub impression_url: String,
    /// Best-effort trackers fired before the priced impression.
    pub impression_trackers: Vec<String>,
    pub click_through: Option<String>,
    pub click_trackers: Vec<String>,
    /// Video progress trackers keyed by event name.
    pub video_events: HashMap<VastEvent, String>,
}

/// The creative markup does not have the structure its declared placement
/// type promises.
#[derive(Debug, Clone, PartialEq)]
pub enum CreativeError {
    /// `adm` is absent where the placement requires markup.
    MissingMarkup(PlacementType),
    /// `adm` (or `ext`) does not parse under the declared grammar.
    MalformedMarkup(PlacementType),
    /// The markup has no click section (`VideoClicks`, `link`, or anchor).
    MissingClickSection(PlacementType),
    /// No VAST impression entry contains the auction price macro.
    NoPricedImpression,
    /// The exchange mapping names no usable impression URL field.
    NoImpressionSignal {
        placement: PlacementType,
        mapping: Option<ImpressionType>,
    },
    /// The mapped impression field is empty on the bid.
    MissingImpressionField(&'static str),
}

impl fmt::Display for CreativeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CreativeError::MissingMarkup(placement) => {
                write!(f, "{placement} bid has no adm markup")
            }
            CreativeError::MalformedMarkup(placement) => {
                write!(f, "bid markup does not parse as a {placement} creative")
            }
            CreativeError::MissingClickSection(placement) => {
                write!(f, "{placement} creative has no click-through section")
            }
            CreativeError::NoPricedImpression => {
                write!(f, "no VAST impression contains {AUCTION_PRICE_MACRO}")
            }
            CreativeError::NoImpressionSignal { placement, mapping } => write!(
                f,
                "no impression signal for {placement} under mapping {mapping:?}"
            ),
            CreativeError::MissingImpressionField(field) => {
                write!(f, "bid is missing its {field} field")
            }
        }
    }
}

impl Error for CreativeError {}

/// Substitutes the auction price macro with the clearing price rendered as
/// plain decimal text.
pub fn resolve_price_macro(url: &str, price: f64) -> String {
    url.replace(AUCTION_PRICE_MACRO, &price.to_string())
}

/// Resolves the tracker set for a winning bid under the exchange's
/// impression mappings.
pub fn extract(
    bid: &Bid,
    placement: PlacementType,
    mappings: &HashMap<PlacementType, ImpressionType>,
) -> Result<TrackerSet, CreativeError> {
    let mapping = mappings.get(&placement).copied();
    let impression_url = impression_signal(bid, placement, mapping)?;

    let (impression_trackers, click_through, click_trackers, video_events) = match placement {
        PlacementType::Video => extract_video(bid)?,
        PlacementType::Native => extract_native(bid)?,
        PlacementType::Banner | PlacementType::Audio => extract_markup(bid, placement)?,
    };

    Ok(TrackerSet {
        placement,
        impression_url,
        impression_trackers,
        click_through,
        click_trackers,
        video_events,
    })
}

/// Picks the URL that counts as the priced impression for this placement.
fn impression_signal(
    bid: &Bid,
    placement: PlacementType,
    mapping: Option<ImpressionType>,
) -> Result<String, CreativeError> {
    match mapping {
        Some(ImpressionType::Ib) => bid
            .burl
            .clone()
            .ok_or(CreativeError::MissingImpressionField("burl")),
        Some(ImpressionType::Iw) => bid
            .nurl
            .clone()
            .ok_or(CreativeError::MissingImpressionField("nurl")),
        Some(ImpressionType::Iv) => priced_vast_impression(bid),
        other => Err(CreativeError::NoImpressionSignal {
            placement,
            mapping: other,
        }),
    }
}

/// The single `<Impression>` entry carrying the auction price macro.
fn priced_vast_impression(bid: &Bid) -> Result<String, CreativeError> {
    let vast = parse_vast(bid)?;
    vast.impressions()
        .iter()
        .find(|url| url.contains(AUCTION_PRICE_MACRO))
        .map(|url| url.trim().to_string())
        .ok_or(CreativeError::NoPricedImpression)
}

fn parse_vast(bid: &Bid) -> Result<VastVideo, CreativeError> {
    let adm = bid
        .adm
        .as_deref()
        .ok_or(CreativeError::MissingMarkup(PlacementType::Video))?;
    VastVideo::parse(adm).ok_or(CreativeError::MalformedMarkup(PlacementType::Video))
}

type Extracted = (
    Vec<String>,
    Option<String>,
    Vec<String>,
    HashMap<VastEvent, String>,
);

fn extract_video(bid: &Bid) -> Result<Extracted, CreativeError> {
    let vast = parse_vast(bid)?;

    // Impressions without the price macro are the pre-fire tracker fan-out.
    let impression_trackers = vast
        .impressions()
        .iter()
        .filter(|url| !url.contains(AUCTION_PRICE_MACRO))
        .map(|url| url.trim().to_string())
        .collect();

    let linear = vast
        .first_linear()
        .ok_or(CreativeError::MalformedMarkup(PlacementType::Video))?;
    let clicks = linear
        .video_clicks
        .as_ref()
        .ok_or(CreativeError::MissingClickSection(PlacementType::Video))?;

    let click_trackers = clicks
        .click_tracking
        .iter()
        .map(|url| url.trim().to_string())
        .collect();
    let video_events = linear
        .tracking_events
        .iter()
        .filter_map(|tracking| {
            VastEvent::from_name(&tracking.event).map(|event| (event, tracking.url.clone()))
        })
        .collect();

    Ok((
        impression_trackers,
        clicks.click_through.clone(),
        click_trackers,
        video_events,
    ))
}

fn extract_native(bid: &Bid) -> Result<Extracted, CreativeError> {
    let response = NativeAdResponse::from_bid(bid.adm.as_deref(), bid.ext.as_ref())
        .ok_or(CreativeError::MalformedMarkup(PlacementType::Native))?;
    let link = response
        .native
        .link
        .ok_or(CreativeError::MissingClickSection(PlacementType::Native))?;

    Ok((
        response.native.imptrackers,
        link.url,
        link.clicktrackers,
        HashMap::new(),
    ))
}

/// Banner and audio companions: HTML with tracking pixels and an anchor.
fn extract_markup(bid: &Bid, placement: PlacementType) -> Result<Extracted, CreativeError> {
    let adm = bid
        .adm
        .as_deref()
        .ok_or(CreativeError::MissingMarkup(placement))?;
    let click_through = html::click_through(adm);
    if click_through.is_none() {
        return Err(CreativeError::MissingClickSection(placement));
    }

    Ok((
        html::tracking_pixels(adm),
        click_through,
        Vec::new(),
        HashMap::new(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::exchange::Exchange;

    const VAST: &str = concat!(
        "<VAST version=\"2.0\"><Ad><InLine>",
        "<Impression><![CDATA[https://bidder.test/rtb/i-1/iv?p=${AUCTION_PRICE}]]></Impression>",
        "<Impression><![CDATA[https://t1.test/imp]]></Impression>",
        "<Creatives><Creative><Linear>",
        "<VideoClicks>",
        "<ClickThrough><![CDATA[https://advertiser.test/land]]></ClickThrough>",
        "<ClickTracking><![CDATA[https://t1.test/click]]></ClickTracking>",
        "</VideoClicks>",
        "<TrackingEvents>",
        "<Tracking event=\"start\"><![CDATA[https://t1.test/start]]></Tracking>",
        "<Tracking event=\"complete\"><![CDATA[https://t1.test/complete]]></Tracking>",
        "</TrackingEvents>",
        "</Linear></Creative></Creatives>",
        "</InLine></Ad></VAST>"
    );

    fn video_mapping() -> HashMap<PlacementType, ImpressionType> {
        let mut mappings = Exchange::default_mapping();
        mappings.insert(PlacementType::Video, ImpressionType::Iv);
        mappings
    }

    fn video_bid() -> Bid {
        Bid {
            adm: Some(VAST.to_string()),
            price: 2.5,
            ..Bid::default()
        }
    }

    #[test]
    fn test_video_extraction() {
        let trackers = extract(&video_bid(), PlacementType::Video, &video_mapping()).unwrap();
        assert_eq!(
            trackers.impression_url,
            "https://bidder.test/rtb/i-1/iv?p=${AUCTION_PRICE}"
        );
        assert_eq!(
            resolve_price_macro(&trackers.impression_url, 2.5),
            "https://bidder.test/rtb/i-1/iv?p=2.5"
        );
        assert_eq!(trackers.impression_trackers, vec!["https://t1.test/imp"]);
        assert_eq!(
            trackers.click_through.as_deref(),
            Some("https://advertiser.test/land")
        );
        assert_eq!(trackers.click_trackers, vec!["https://t1.test/click"]);
        assert_eq!(
            trackers.video_events.get(&VastEvent::Start).map(String::as_str),
            Some("https://t1.test/start")
        );
        assert_eq!(trackers.video_events.len(), 2);
    }

    #[test]
    fn test_video_without_priced_impression() {
        let bid = Bid {
            adm: Some(VAST.replace("${AUCTION_PRICE}", "0")),
            ..Bid::default()
        };
        assert_eq!(
            extract(&bid, PlacementType::Video, &video_mapping()),
            Err(CreativeError::NoPricedImpression)
        );
    }

    #[test]
    fn test_video_without_clicks_section() {
        let stripped = VAST.replace(
            concat!(
                "<VideoClicks>",
                "<ClickThrough><![CDATA[https://advertiser.test/land]]></ClickThrough>",
                "<ClickTracking><![CDATA[https://t1.test/click]]></ClickTracking>",
                "</VideoClicks>"
            ),
            "",
        );
        let bid = Bid {
            adm: Some(stripped),
            ..Bid::default()
        };
        assert_eq!(
            extract(&bid, PlacementType::Video, &video_mapping()),
            Err(CreativeError::MissingClickSection(PlacementType::Video))
        );
    }

    #[test]
    fn test_banner_extraction() {
        let bid = Bid {
            burl: Some("https://bidder.test/rtb/i-2/ib".to_string()),
            adm: Some(concat!(
                r#"<a href="https://advertiser.test/shop">"#,
                r#"<img src="https://cdn.test/b.png" height="250"></a>"#,
                r#"<img src="https://t2.test/px" height="1" width="1">"#
            )
            .to_string()),
            ..Bid::default()
        };
        let trackers = extract(&bid, PlacementType::Banner, &Exchange::default_mapping()).unwrap();
        assert_eq!(trackers.impression_url, "https://bidder.test/rtb/i-2/ib");
        assert_eq!(trackers.impression_trackers, vec!["https://t2.test/px"]);
        assert_eq!(
            trackers.click_through.as_deref(),
            Some("https://advertiser.test/shop")
        );
        assert!(trackers.click_trackers.is_empty());
    }

    #[test]
    fn test_native_extraction_from_ext() {
        let ext: serde_json::Value = serde_json::from_str(
            r#"{"native":{"link":{"url":"https://advertiser.test/app",
                "clicktrackers":["https://t3.test/c"]},
                "imptrackers":["https://t3.test/i"]}}"#,
        )
        .unwrap();
        let bid = Bid {
            nurl: Some("https://bidder.test/rtb/i-3/iw".to_string()),
            ext: Some(ext),
            ..Bid::default()
        };
        let mut mappings = Exchange::default_mapping();
        mappings.insert(PlacementType::Native, ImpressionType::Iw);

        let trackers = extract(&bid, PlacementType::Native, &mappings).unwrap();
        assert_eq!(trackers.impression_url, "https://bidder.test/rtb/i-3/iw");
        assert_eq!(trackers.impression_trackers, vec!["https://t3.test/i"]);
        assert_eq!(
            trackers.click_through.as_deref(),
            Some("https://advertiser.test/app")
        );
        assert_eq!(trackers.click_trackers, vec!["https://t3.test/c"]);
    }

    #[test]
    fn test_unsupported_impression_mapping() {
        let mut mappings = HashMap::new();
        mappings.insert(PlacementType::Native, ImpressionType::Ieit);
        let result = extract(&Bid::default(), PlacementType::Native, &mappings);
        assert!(matches!(
            result,
            Err(CreativeError::NoImpressionSignal {
                placement: PlacementType::Native,
                mapping: Some(ImpressionType::Ieit),
            })
        ));
    }

    #[test]
    fn test_missing_mapping() {
        let result = extract(&Bid::default(), PlacementType::Banner, &HashMap::new());
        assert!(matches!(
            result,
            Err(CreativeError::NoImpressionSignal { mapping: None, .. })
        ));
    }

    #[test]
    fn test_price_macro_rendering() {
        assert_eq!(resolve_price_macro("x?p=${AUCTION_PRICE}", 2.5), "x?p=2.5");
        assert_eq!(resolve_price_macro("x?p=${AUCTION_PRICE}", 10.0), "x?p=10");
        assert_eq!(resolve_price_macro("x?p=fixed", 2.5), "x?p=fixed");
    }
}
