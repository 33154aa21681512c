use serde::{Deserialize, Serialize};

/// IAB Native 1.x ad response subset: the link section and impression
/// trackers. Asset bodies are kept as raw JSON since the harness only
/// verifies trackers, not rendering.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NativeAdResponse {
    #[serde(rename = "native")]
    pub native: NativeAd,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NativeAd {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ver: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<Link>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub imptrackers: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assets: Vec<serde_json::Value>,
}

/// Default destination of the native ad, with its click trackers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Link {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub clicktrackers: Vec<String>,
}

impl NativeAdResponse {
    /// Decodes the native markup of a bid: the `adm` string when the
    /// exchange inlines it, otherwise the bid's `ext` object re-encoded as
    /// JSON (some exchanges move the native body there).
    pub fn from_bid(adm: Option<&str>, ext: Option<&serde_json::Value>) -> Option<NativeAdResponse> {
        match adm {
            Some(markup) => serde_json::from_str(markup).ok(),
            None => serde_json::from_value(ext?.clone()).ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
      "native": {
        "ver": "1.2",
        "link": {
          "url": "https://advertiser.test/store",
          "clicktrackers": ["https://tracker.test/c1", "https://tracker.test/c2"]
        },
        "imptrackers": ["https://tracker.test/i1"],
        "assets": [{"id": 1, "title": {"text": "QA ad"}}]
      }
    }"#;

    #[test]
    fn test_from_adm() {
        let response = NativeAdResponse::from_bid(Some(SAMPLE), None).unwrap();
        let link = response.native.link.unwrap();
        assert_eq!(link.url.as_deref(), Some("https://advertiser.test/store"));
        assert_eq!(link.clicktrackers.len(), 2);
        assert_eq!(response.native.imptrackers, vec!["https://tracker.test/i1"]);
    }

    #[test]
    fn test_from_ext_when_adm_absent() {
        let ext: serde_json::Value = serde_json::from_str(SAMPLE).unwrap();
        let response = NativeAdResponse::from_bid(None, Some(&ext)).unwrap();
        assert!(response.native.link.is_some());
    }

    #[test]
    fn test_undecodable_markup() {
        assert!(NativeAdResponse::from_bid(Some("<div/>"), None).is_none());
        assert!(NativeAdResponse::from_bid(None, None).is_none());
    }
}
