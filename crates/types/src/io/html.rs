//! Regex scraping of banner creative markup. Display HTML in bid responses
//! is machine-generated and flat; scanning happens per tag.

use once_cell::sync::Lazy;
use regex::Regex;

static IMG_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<img\b[^>]*>").expect("img tag pattern"));
static HEIGHT_ATTR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)\bheight\s*=\s*["']?([^"'\s/>]+)"#).expect("height pattern"));
static SRC_ATTR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)\bsrc\s*=\s*["']?([^"'\s>]+)"#).expect("src pattern"));
static ANCHOR_HREF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?is)<a\b[^>]*?\bhref\s*=\s*["']?([^"'\s>]+)"#).expect("href pattern"));

/// The `src` of every 1px-high `<img>` in the markup. Exchanges embed
/// impression trackers as invisible pixels with `height="1"`.
pub fn tracking_pixels(html: &str) -> Vec<String> {
    IMG_TAG
        .find_iter(html)
        .filter_map(|tag| {
            let tag = tag.as_str();
            let height = HEIGHT_ATTR.captures(tag)?.get(1)?.as_str();
            if height.eq_ignore_ascii_case("1") {
                Some(SRC_ATTR.captures(tag)?.get(1)?.as_str().to_string())
            } else {
                None
            }
        })
        .collect()
}

/// The `href` of the first anchor tag, which is the creative's click-through.
pub fn click_through(html: &str) -> Option<String> {
    ANCHOR_HREF
        .captures(html)
        .and_then(|captures| captures.get(1))
        .map(|href| href.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MARKUP: &str = concat!(
        r#"<div><a href="https://advertiser.test/landing"><img src="https://cdn.test/banner.png" width="300" height="250"></a>"#,
        r#"<img src="https://tracker.test/pixel1" width="1" height="1">"#,
        r#"<IMG HEIGHT='1' WIDTH='1' SRC='https://tracker.test/pixel2'>"#,
        r#"</div>"#
    );

    #[test]
    fn test_tracking_pixels() {
        assert_eq!(
            tracking_pixels(MARKUP),
            vec![
                "https://tracker.test/pixel1".to_string(),
                "https://tracker.test/pixel2".to_string(),
            ]
        );
    }

    #[test]
    fn test_visible_images_are_not_trackers() {
        let html = r#"<img src="https://cdn.test/banner.png" height="250">"#;
        assert!(tracking_pixels(html).is_empty());
    }

    #[test]
    fn test_click_through() {
        assert_eq!(
            click_through(MARKUP).as_deref(),
            Some("https://advertiser.test/landing")
        );
        assert_eq!(click_through("<div>no links</div>"), None);
    }

    #[test]
    fn test_unquoted_attributes() {
        let html = r#"<a href=https://advertiser.test/x><img height=1 src=https://t.test/p></a>"#;
        assert_eq!(click_through(html).as_deref(), Some("https://advertiser.test/x"));
        assert_eq!(tracking_pixels(html), vec!["https://t.test/p".to_string()]);
    }
}
