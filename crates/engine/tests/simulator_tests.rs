use engine::{HttpReply, HttpSender, Simulator, SimulatorError, TrackerSet};
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use types::exchange::PlacementType;
use types::vast::VastEvent;

/// Replays a scripted sequence of replies and records every call made.
struct ScriptedSender {
    replies: RefCell<VecDeque<Result<HttpReply, String>>>,
    calls: RefCell<Vec<(String, bool)>>,
}

impl ScriptedSender {
    fn new(replies: Vec<Result<HttpReply, String>>) -> Self {
        Self {
            replies: RefCell::new(replies.into()),
            calls: RefCell::new(Vec::new()),
        }
    }

    fn next_reply(&self, url: &str, no_redirect: bool) -> Result<HttpReply, String> {
        self.calls.borrow_mut().push((url.to_string(), no_redirect));
        self.replies
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| panic!("unscripted request to {url}"))
    }

    fn calls(&self) -> Vec<(String, bool)> {
        self.calls.borrow().clone()
    }
}

impl HttpSender for ScriptedSender {
    fn get(&self, url: &str) -> Result<HttpReply, String> {
        self.next_reply(url, false)
    }

    fn get_no_redirect(&self, url: &str) -> Result<HttpReply, String> {
        self.next_reply(url, true)
    }
}

fn fast_simulator(sender: ScriptedSender) -> Simulator<ScriptedSender> {
    Simulator::new(sender)
        .with_win_timeout(Duration::from_millis(50))
        .with_poll_interval(Duration::ZERO)
}

fn banner_trackers() -> TrackerSet {
    TrackerSet {
        placement: PlacementType::Banner,
        impression_url: "https://bidder.test/rtb/i-1/ib?p=${AUCTION_PRICE}".to_string(),
        impression_trackers: Vec::new(),
        click_through: Some("https://advertiser.test/land".to_string()),
        click_trackers: Vec::new(),
        video_events: HashMap::new(),
    }
}

#[test]
fn test_click_follows_exactly_one_hop() {
    // 302 -> 302 -> (would be 200): the second response is returned as-is,
    // the third request is never made.
    let sender = ScriptedSender::new(vec![
        Ok(HttpReply::new(302, "").with_header("Location", "https://hop1.test/a")),
        Ok(HttpReply::new(302, "").with_header("Location", "https://hop2.test/b")),
    ]);
    let simulator = fast_simulator(sender);

    let reply = simulator.click("https://start.test").unwrap();
    assert_eq!(reply.status, 302);

    let calls = simulator_calls(&simulator);
    assert_eq!(
        calls,
        vec![
            ("https://start.test".to_string(), true),
            ("https://hop1.test/a".to_string(), false),
        ]
    );
}

#[test]
fn test_click_decodes_location() {
    let sender = ScriptedSender::new(vec![
        Ok(HttpReply::new(302, "")
            .with_header("Location", "https%3A%2F%2Fadvertiser.test%2Fland")),
        Ok(HttpReply::new(200, "landing")),
    ]);
    let simulator = fast_simulator(sender);

    let reply = simulator.click("https://start.test").unwrap();
    assert_eq!(reply.status, 200);
    assert_eq!(
        simulator_calls(&simulator)[1].0,
        "https://advertiser.test/land"
    );
}

#[test]
fn test_click_leaves_other_redirects_alone() {
    // Only 302 is refollowed; a 301 comes back to the caller untouched.
    for status in [301, 303, 307, 308] {
        let sender = ScriptedSender::new(vec![
            Ok(HttpReply::new(status, "").with_header("Location", "https://elsewhere.test"))
        ]);
        let simulator = fast_simulator(sender);
        let reply = simulator.click("https://start.test").unwrap();
        assert_eq!(reply.status, status);
        assert_eq!(simulator_calls(&simulator).len(), 1);
    }
}

#[test]
fn test_click_302_without_location() {
    let sender = ScriptedSender::new(vec![Ok(HttpReply::new(302, ""))]);
    let simulator = fast_simulator(sender);
    assert!(matches!(
        simulator.click("https://start.test"),
        Err(SimulatorError::MissingLocation(_))
    ));
}

#[test]
fn test_win_notice_polls_until_no_content() {
    let sender = ScriptedSender::new(vec![
        Ok(HttpReply::new(200, "pending")),
        Ok(HttpReply::new(200, "pending")),
        Ok(HttpReply::new(204, "")),
    ]);
    let simulator = Simulator::new(sender)
        .with_win_timeout(Duration::from_secs(5))
        .with_poll_interval(Duration::ZERO);

    let reply = simulator.fire_win_notice(&banner_trackers(), 2.5).unwrap();
    assert_eq!(reply.status, 204);

    let calls = simulator_calls(&simulator);
    assert_eq!(calls.len(), 3);
    // The price macro must already be resolved on the first attempt.
    assert_eq!(calls[0].0, "https://bidder.test/rtb/i-1/ib?p=2.5");
}

#[test]
fn test_win_notice_times_out() {
    let sender = ScriptedSender::new(vec![Ok(HttpReply::new(200, "pending")); 1000]);
    let simulator = fast_simulator(sender);

    match simulator.fire_win_notice(&banner_trackers(), 2.5) {
        Err(SimulatorError::WinNoticeTimeout { last_status, .. }) => {
            assert_eq!(last_status, Some(200));
        }
        other => panic!("expected WinNoticeTimeout, got {other:?}"),
    }
}

#[test]
fn test_impression_tracker_failures_are_tolerated() {
    let mut trackers = banner_trackers();
    trackers.impression_trackers = vec![
        "https://t1.test/px".to_string(),
        "https://t2.test/px".to_string(),
    ];
    let sender = ScriptedSender::new(vec![
        Err("connection refused".to_string()), // first pixel fails
        Ok(HttpReply::new(200, "")),           // second pixel
        Ok(HttpReply::new(204, "")),           // win notice
    ]);
    let simulator = fast_simulator(sender);

    let reply = simulator.fire_win_notice(&trackers, 1.0).unwrap();
    assert_eq!(reply.status, 204);
    assert_eq!(simulator_calls(&simulator).len(), 3);
}

#[test]
fn test_click_tracker_failures_do_not_block_click_through() {
    let mut trackers = banner_trackers();
    trackers.click_trackers = vec!["https://t1.test/c".to_string()];
    let sender = ScriptedSender::new(vec![
        Err("dns failure".to_string()),  // click tracker
        Ok(HttpReply::new(200, "land")), // click-through
    ]);
    let simulator = fast_simulator(sender);

    let reply = simulator.fire_clicks(&trackers).unwrap();
    assert_eq!(reply.status, 200);
}

#[test]
fn test_click_through_missing() {
    let mut trackers = banner_trackers();
    trackers.click_through = None;
    let sender = ScriptedSender::new(vec![]);
    let simulator = fast_simulator(sender);
    assert!(matches!(
        simulator.fire_clicks(&trackers),
        Err(SimulatorError::NoClickThrough)
    ));
}

#[test]
fn test_video_events_fire_and_assert_no_content() {
    let mut trackers = banner_trackers();
    trackers.placement = PlacementType::Video;
    trackers
        .video_events
        .insert(VastEvent::Start, "https://t.test/start".to_string());
    trackers
        .video_events
        .insert(VastEvent::Complete, "https://t.test/complete".to_string());

    let sender = ScriptedSender::new(vec![
        Ok(HttpReply::new(204, "")),
        Ok(HttpReply::new(204, "")),
    ]);
    let simulator = fast_simulator(sender);
    simulator
        .fire_video_events(&trackers, &[VastEvent::Start, VastEvent::Complete])
        .unwrap();
}

#[test]
fn test_unknown_video_event() {
    let sender = ScriptedSender::new(vec![]);
    let simulator = fast_simulator(sender);
    assert!(matches!(
        simulator.fire_video_events(&banner_trackers(), &[VastEvent::Midpoint]),
        Err(SimulatorError::UnknownVideoEvent(VastEvent::Midpoint))
    ));
}

#[test]
fn test_video_event_rejected_status() {
    let mut trackers = banner_trackers();
    trackers
        .video_events
        .insert(VastEvent::Skip, "https://t.test/skip".to_string());
    let sender = ScriptedSender::new(vec![Ok(HttpReply::new(200, "nope"))]);
    let simulator = fast_simulator(sender);
    assert!(matches!(
        simulator.fire_video_events(&trackers, &[VastEvent::Skip]),
        Err(SimulatorError::UnexpectedStatus { status: 200, .. })
    ));
}

/// The simulator owns the sender, so tests reach call logs through it.
fn simulator_calls(simulator: &Simulator<ScriptedSender>) -> Vec<(String, bool)> {
    simulator.sender().calls()
}
