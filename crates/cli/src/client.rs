//! Blocking HTTP client for a bidder under test.
//!
//! Wraps reqwest behind the engine's `HttpSender` seam and adds the
//! bidder-specific flows: traced bid requests, bid/no-bid polling, and
//! post-click conversion events.

use engine::{HttpReply, HttpSender, MismatchError};
use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use reqwest::blocking::Client;
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info};
use types::bid::Bid;
use types::exchange::Exchange;
use types::io::trace_text::{self, TraceError};
use types::trace::BidTrace;

const TRACE_QUERY: &str = "?trace=true";
const HTTP_OK: u16 = 200;
const HTTP_NO_CONTENT: u16 = 204;

pub const DEFAULT_BID_TIMEOUT: Duration = Duration::from_secs(30);
const BID_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// reqwest-backed `HttpSender`. Keeps two inner clients because redirect
/// policy is set per client, not per request.
pub struct ReqwestSender {
    follow: Client,
    direct: Client,
}

impl ReqwestSender {
    pub fn new() -> Result<Self, String> {
        let follow = Client::builder()
            .build()
            .map_err(|err| err.to_string())?;
        let direct = Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|err| err.to_string())?;
        Ok(Self { follow, direct })
    }

    fn fetch(client: &Client, url: &str) -> Result<HttpReply, String> {
        let response = client.get(url).send().map_err(|err| err.to_string())?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = response.text().map_err(|err| err.to_string())?;
        Ok(HttpReply {
            status,
            body,
            headers,
        })
    }
}

impl HttpSender for ReqwestSender {
    fn get(&self, url: &str) -> Result<HttpReply, String> {
        Self::fetch(&self.follow, url)
    }

    fn get_no_redirect(&self, url: &str) -> Result<HttpReply, String> {
        Self::fetch(&self.direct, url)
    }
}

#[derive(Debug)]
pub enum BidError {
    /// The exchange never answered 200 within the timeout; carries the
    /// diagnostic trace of the final attempt.
    NoBid {
        attempts: u32,
        timeout: Duration,
        trace: String,
    },
    /// The exchange kept bidding where the scenario expected silence.
    UnexpectedBid { timeout: Duration, trace: String },
    Transport(String),
    Trace(TraceError),
    Mismatch(MismatchError),
}

impl fmt::Display for BidError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BidError::NoBid {
                attempts,
                timeout,
                trace,
            } => write!(
                f,
                "no bid response in {timeout:?} ({attempts} attempts); trace:\n{trace}"
            ),
            BidError::UnexpectedBid { timeout, trace } => {
                write!(f, "still getting bids after {timeout:?}; trace:\n{trace}")
            }
            BidError::Transport(reason) => write!(f, "bid request failed: {reason}"),
            BidError::Trace(err) => write!(f, "trace parsing failed: {err}"),
            BidError::Mismatch(err) => write!(f, "trace mismatch: {err}"),
        }
    }
}

impl Error for BidError {}

impl From<TraceError> for BidError {
    fn from(err: TraceError) -> Self {
        BidError::Trace(err)
    }
}

impl From<MismatchError> for BidError {
    fn from(err: MismatchError) -> Self {
        BidError::Mismatch(err)
    }
}

/// Client for one exchange endpoint of the bidder under test.
pub struct BidderClient {
    exchange: Exchange,
    gzip: bool,
    http: Client,
}

impl BidderClient {
    pub fn new(exchange: Exchange) -> Result<Self, String> {
        Self::with_gzip(exchange, false)
    }

    pub fn with_gzip(exchange: Exchange, gzip: bool) -> Result<Self, String> {
        let http = Client::builder()
            .gzip(gzip)
            .build()
            .map_err(|err| err.to_string())?;
        Ok(Self {
            exchange,
            gzip,
            http,
        })
    }

    pub fn exchange(&self) -> &Exchange {
        &self.exchange
    }

    pub fn gzip(&self) -> bool {
        self.gzip
    }

    /// POSTs a bid request to the exchange endpoint.
    pub fn send_bid_request(&self, body: &str) -> Result<HttpReply, String> {
        self.post(&self.exchange.url, body)
    }

    /// Same request with `?trace=true`, which makes the bidder answer with
    /// its diagnostic trace.
    pub fn send_bid_request_traced(&self, body: &str) -> Result<HttpReply, String> {
        self.post(&format!("{}{}", self.exchange.url, TRACE_QUERY), body)
    }

    fn post(&self, url: &str, body: &str) -> Result<HttpReply, String> {
        debug!(url = %url, "sending bid request");
        let response = self
            .http
            .post(url)
            .header("Content-Type", "application/json")
            .body(body.to_string())
            .send()
            .map_err(|err| err.to_string())?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = response.text().map_err(|err| err.to_string())?;
        Ok(HttpReply {
            status,
            body,
            headers,
        })
    }

    /// Polls until the bidder starts answering with a bid. Campaign changes
    /// propagate asynchronously, so the first requests after a setup step
    /// may legitimately no-bid.
    pub fn wait_for_bid(&self, body: &str, timeout: Duration) -> Result<HttpReply, BidError> {
        let started = Instant::now();
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.send_bid_request(body) {
                Ok(reply) if reply.status == HTTP_OK => {
                    info!(attempts, "bidder started bidding");
                    return Ok(reply);
                }
                Ok(reply) => debug!(status = reply.status, "no bid yet"),
                Err(reason) => debug!(%reason, "bid request attempt failed"),
            }
            if started.elapsed() >= timeout {
                break;
            }
            thread::sleep(BID_POLL_INTERVAL);
        }

        let trace = self.fetch_trace(body);
        Err(BidError::NoBid {
            attempts,
            timeout,
            trace,
        })
    }

    /// Polls until the bidder answers an empty 204.
    pub fn wait_for_no_bid(&self, body: &str, timeout: Duration) -> Result<HttpReply, BidError> {
        let started = Instant::now();
        loop {
            match self.send_bid_request(body) {
                Ok(reply) if reply.status == HTTP_NO_CONTENT && reply.body.is_empty() => {
                    return Ok(reply);
                }
                Ok(reply) => debug!(status = reply.status, "still bidding"),
                Err(reason) => debug!(%reason, "bid request attempt failed"),
            }
            if started.elapsed() >= timeout {
                break;
            }
            thread::sleep(BID_POLL_INTERVAL);
        }

        let trace = self.fetch_trace(body);
        Err(BidError::UnexpectedBid { timeout, trace })
    }

    /// No-bid wait followed by a trace comparison: the diagnostic trace of
    /// the no-bid must contain the expected fragments.
    pub fn wait_for_no_bid_expecting(
        &self,
        body: &str,
        expected: &BidTrace,
        timeout: Duration,
    ) -> Result<HttpReply, BidError> {
        let reply = self.wait_for_no_bid(body, timeout)?;
        let traced = self
            .send_bid_request_traced(body)
            .map_err(BidError::Transport)?;
        let actual = trace_text::parse(&traced.body)?;
        engine::compare(&actual, expected)?;
        Ok(reply)
    }

    fn fetch_trace(&self, body: &str) -> String {
        self.send_bid_request_traced(body)
            .map(|reply| reply.body)
            .unwrap_or_default()
    }

    /// Fires a post-click conversion event against the event tracker. The
    /// impression id is recovered from the bid's billing URL.
    pub fn send_post_click_event(
        &self,
        tracker_url: &str,
        event: &str,
        bid: &Bid,
    ) -> Result<HttpReply, String> {
        static IMPRESSION_ID: Lazy<Regex> =
            Lazy::new(|| Regex::new(r".*/rtb/(.*)/ib").expect("impression id pattern"));

        let burl = bid.burl.as_deref().ok_or("bid has no burl")?;
        let impression = IMPRESSION_ID
            .captures(burl)
            .and_then(|captures| captures.get(1))
            .map(|m| m.as_str())
            .ok_or_else(|| format!("no impression id in {burl}"))?;

        // Installs keep their own path segment; every other event goes
        // through the generic event endpoint with its name as a parameter.
        let path = if event == "install" { "install" } else { "event" };
        let url = format!(
            "{tracker_url}/t/{path}?creativeId={}&campaignId={}&appId={}&impression={}&eventName={}",
            bid.crid.as_deref().unwrap_or_default(),
            bid.cid.as_deref().unwrap_or_default(),
            random_id(),
            impression,
            event,
        );
        info!(%event, url = %url, "sending post-click event");
        let response = self.http.get(&url).send().map_err(|err| err.to_string())?;
        let status = response.status().as_u16();
        let body = response.text().map_err(|err| err.to_string())?;
        Ok(HttpReply {
            status,
            body,
            headers: Vec::new(),
        })
    }

    pub fn send_install_event(&self, tracker_url: &str, bid: &Bid) -> Result<HttpReply, String> {
        self.send_post_click_event(tracker_url, "install", bid)
    }
}

/// Random 32-hex-digit id for synthetic device/app identifiers.
fn random_id() -> String {
    let mut rng = rand::thread_rng();
    (0..32)
        .map(|_| char::from_digit(rng.gen_range(0..16u32), 16).unwrap_or('0'))
        .collect()
}

static CLIENTS: Lazy<Mutex<HashMap<(String, bool), Arc<BidderClient>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Shared client for an exchange, created on first use. At most one client
/// exists per (exchange, gzip) pair, shared by every scenario that asks.
pub fn bidder_client(exchange: &Exchange, gzip: bool) -> Result<Arc<BidderClient>, String> {
    let key = (exchange.name.clone(), gzip);
    let mut clients = CLIENTS
        .lock()
        .map_err(|_| "bidder client cache poisoned".to_string())?;
    if let Some(client) = clients.get(&key) {
        return Ok(Arc::clone(client));
    }
    let client = Arc::new(BidderClient::with_gzip(exchange.clone(), gzip)?);
    clients.insert(key, Arc::clone(&client));
    Ok(client)
}
