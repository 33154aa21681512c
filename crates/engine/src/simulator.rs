//! Drives the downstream ad-serving lifecycle: impression notices, click
//! sequences, and video progress events, against a tracker set.
//!
//! All network traffic goes through an injected [`HttpSender`], so the
//! simulator itself stays synchronous and testable with a scripted fake.

use crate::creative::{resolve_price_macro, TrackerSet};
use std::error::Error;
use std::fmt;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use types::exchange::PlacementType;
use types::vast::VastEvent;

pub const HTTP_NO_CONTENT: u16 = 204;
pub const HTTP_MOVED_TEMP: u16 = 302;

const DEFAULT_WIN_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Minimal view of an HTTP response.
#[derive(Debug, Clone, Default)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
    pub headers: Vec<(String, String)>,
}

impl HttpReply {
    pub fn new(status: u16, body: &str) -> Self {
        Self {
            status,
            body: body.to_string(),
            headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// First header with the given name, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// HTTP GET capability the simulator delegates to. The two methods differ
/// only in whether the transport chases redirects on its own.
pub trait HttpSender {
    fn get(&self, url: &str) -> Result<HttpReply, String>;
    fn get_no_redirect(&self, url: &str) -> Result<HttpReply, String>;
}

#[derive(Debug, Clone)]
pub enum SimulatorError {
    /// The impression URL never answered 204 within the poll budget.
    WinNoticeTimeout {
        url: String,
        waited: Duration,
        last_status: Option<u16>,
    },
    /// The creative declares no tracker for the requested video event.
    UnknownVideoEvent(VastEvent),
    /// A required endpoint answered with an unexpected status.
    UnexpectedStatus { url: String, status: u16 },
    /// The tracker set has no click-through URL.
    NoClickThrough,
    /// A 302 response carried no Location header to follow.
    MissingLocation(String),
    /// The transport failed outright on a required call.
    Transport { url: String, reason: String },
}

impl fmt::Display for SimulatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimulatorError::WinNoticeTimeout {
                url,
                waited,
                last_status,
            } => write!(
                f,
                "win notice {url} not accepted within {waited:?} (last status: {last_status:?})"
            ),
            SimulatorError::UnknownVideoEvent(event) => {
                write!(f, "creative has no {event} tracking event")
            }
            SimulatorError::UnexpectedStatus { url, status } => {
                write!(f, "{url} answered {status}, expected {HTTP_NO_CONTENT}")
            }
            SimulatorError::NoClickThrough => write!(f, "tracker set has no click-through URL"),
            SimulatorError::MissingLocation(url) => {
                write!(f, "redirect from {url} has no Location header")
            }
            SimulatorError::Transport { url, reason } => write!(f, "GET {url} failed: {reason}"),
        }
    }
}

impl Error for SimulatorError {}

/// Fires tracker URLs the way a device rendering the creative would.
pub struct Simulator<S> {
    sender: S,
    win_timeout: Duration,
    poll_interval: Duration,
}

impl<S: HttpSender> Simulator<S> {
    pub fn new(sender: S) -> Self {
        Self {
            sender,
            win_timeout: DEFAULT_WIN_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_win_timeout(mut self, timeout: Duration) -> Self {
        self.win_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn sender(&self) -> &S {
        &self.sender
    }

    /// Fires every impression tracker (best-effort), then polls the priced
    /// impression URL until the exchange bills it with 204.
    ///
    /// Billing pipelines are asynchronous on the exchange side, so a
    /// non-204 answer is retried until the timeout elapses.
    pub fn fire_win_notice(
        &self,
        trackers: &TrackerSet,
        price: f64,
    ) -> Result<HttpReply, SimulatorError> {
        for tracker in &trackers.impression_trackers {
            info!(url = %tracker, "firing impression tracker");
            let result = match trackers.placement {
                // VAST impression entries are plain GETs; HTML pixels go
                // through the same one-hop logic a browser click would.
                PlacementType::Video => self.sender.get(tracker).map(|_| ()),
                _ => self.click(tracker).map(|_| ()).map_err(|err| err.to_string()),
            };
            if let Err(reason) = result {
                warn!(url = %tracker, %reason, "impression tracker failed");
            }
        }

        let url = resolve_price_macro(&trackers.impression_url, price);
        self.poll_no_content(&url)
    }

    /// Fires every click tracker (best-effort), then performs the
    /// click-through and returns the landing response.
    pub fn fire_clicks(&self, trackers: &TrackerSet) -> Result<HttpReply, SimulatorError> {
        for tracker in &trackers.click_trackers {
            info!(url = %tracker, "firing click tracker");
            if let Err(err) = self.click(tracker) {
                warn!(url = %tracker, error = %err, "click tracker failed");
            }
        }

        let click_through = trackers
            .click_through
            .as_deref()
            .ok_or(SimulatorError::NoClickThrough)?;
        self.click(click_through)
    }

    /// Fires the tracker of each requested video event and requires the
    /// exchange to accept it with 204.
    pub fn fire_video_events(
        &self,
        trackers: &TrackerSet,
        events: &[VastEvent],
    ) -> Result<(), SimulatorError> {
        for &event in events {
            let url = trackers
                .video_events
                .get(&event)
                .ok_or(SimulatorError::UnknownVideoEvent(event))?;
            info!(%event, url = %url, "firing video event");
            let reply = self
                .sender
                .get(url)
                .map_err(|reason| SimulatorError::Transport {
                    url: url.clone(),
                    reason,
                })?;
            if reply.status != HTTP_NO_CONTENT {
                return Err(SimulatorError::UnexpectedStatus {
                    url: url.clone(),
                    status: reply.status,
                });
            }
        }
        Ok(())
    }

    /// One GET with redirects disabled; on 302 the percent-decoded Location
    /// is followed for exactly one further hop. Other redirect statuses
    /// (301/303/307/308) are returned unfollowed, as are chains longer
    /// than one hop.
    pub fn click(&self, url: &str) -> Result<HttpReply, SimulatorError> {
        let first = self
            .sender
            .get_no_redirect(url)
            .map_err(|reason| SimulatorError::Transport {
                url: url.to_string(),
                reason,
            })?;

        if first.status != HTTP_MOVED_TEMP {
            return Ok(first);
        }

        let location = first
            .header("Location")
            .ok_or_else(|| SimulatorError::MissingLocation(url.to_string()))?;
        let target = percent_decode(location);
        debug!(from = %url, to = %target, "following redirect hop");
        self.sender
            .get(&target)
            .map_err(|reason| SimulatorError::Transport {
                url: target.clone(),
                reason,
            })
    }

    fn poll_no_content(&self, url: &str) -> Result<HttpReply, SimulatorError> {
        let started = Instant::now();
        let mut last_status = None;
        loop {
            match self.sender.get(url) {
                Ok(reply) if reply.status == HTTP_NO_CONTENT => return Ok(reply),
                Ok(reply) => {
                    debug!(url = %url, status = reply.status, "win notice not accepted yet");
                    last_status = Some(reply.status);
                }
                Err(reason) => debug!(url = %url, %reason, "win notice attempt failed"),
            }
            if started.elapsed() >= self.win_timeout {
                return Err(SimulatorError::WinNoticeTimeout {
                    url: url.to_string(),
                    waited: self.win_timeout,
                    last_status,
                });
            }
            thread::sleep(self.poll_interval);
        }
    }
}

/// Percent-decodes a header value the way a browser decodes a Location
/// before re-requesting it. `+` decodes to a space; invalid escapes pass
/// through untouched.
fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                let high = (bytes[i + 1] as char).to_digit(16);
                let low = (bytes[i + 2] as char).to_digit(16);
                match (high, low) {
                    (Some(high), Some(low)) => {
                        out.push((high * 16 + low) as u8);
                        i += 3;
                        continue;
                    }
                    _ => out.push(b'%'),
                }
            }
            b'+' => out.push(b' '),
            byte => out.push(byte),
        }
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
