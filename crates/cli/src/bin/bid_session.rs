use clap::Parser;
use cli::client::{self, ReqwestSender, DEFAULT_BID_TIMEOUT};
use engine::Simulator;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use types::bid::BidResponse;
use types::exchange::{Exchange, PlacementType};
use types::trace::BidTrace;
use types::vast::VastEvent;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Send a bid request and simulate the ad-serving lifecycle of the winning creative"
)]
struct Args {
    /// Bid request JSON file
    request: PathBuf,

    /// Bid endpoint URL of the exchange under test
    #[arg(short, long)]
    url: String,

    /// Exchange name (client cache key and reporting)
    #[arg(long, default_value = "default")]
    exchange: String,

    /// Placement type of the impression: banner, video, native, or audio
    #[arg(short, long, default_value = "banner")]
    placement: PlacementType,

    /// Video events to fire after the click (start, firstQuartile, midpoint,
    /// thirdQuartile, complete, skip)
    #[arg(long)]
    event: Vec<VastEvent>,

    /// Expected-trace YAML; asserts a no-bid whose diagnostic trace matches,
    /// instead of simulating a win
    #[arg(long)]
    expect_no_bid_trace: Option<PathBuf>,

    /// Seconds to wait for the exchange to start (or stop) bidding
    #[arg(long, default_value_t = DEFAULT_BID_TIMEOUT.as_secs())]
    timeout: u64,

    /// Ask the bidder for gzip-compressed responses
    #[arg(long)]
    gzip: bool,

    /// Skip the click sequence after the win notice
    #[arg(long)]
    no_click: bool,
}

fn main() {
    let args = Args::parse();
    if let Err(err) = run(&args) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), String> {
    let body = fs::read_to_string(&args.request)
        .map_err(|err| format!("cannot read {}: {err}", args.request.display()))?;
    let exchange = Exchange::new(&args.exchange, &args.url);
    let bidder = client::bidder_client(&exchange, args.gzip)?;
    let timeout = Duration::from_secs(args.timeout);

    if let Some(path) = &args.expect_no_bid_trace {
        let expected: BidTrace = serde_yaml::from_str(
            &fs::read_to_string(path).map_err(|err| format!("cannot read {}: {err}", path.display()))?,
        )
        .map_err(|err| format!("bad expected trace: {err}"))?;
        bidder
            .wait_for_no_bid_expecting(&body, &expected, timeout)
            .map_err(|err| err.to_string())?;
        println!("no bid, diagnostic trace matches expectations");
        return Ok(());
    }

    let reply = bidder
        .wait_for_bid(&body, timeout)
        .map_err(|err| err.to_string())?;
    let response: BidResponse =
        serde_json::from_str(&reply.body).map_err(|err| format!("bad bid response: {err}"))?;
    let bid = response
        .first_bid()
        .ok_or("bid response contains no bid")?;
    println!(
        "bid {} on imp {} at {}",
        bid.id.as_deref().unwrap_or("<no id>"),
        bid.impid.as_deref().unwrap_or("<no impid>"),
        bid.price
    );

    let trackers = engine::extract(bid, args.placement, &exchange.impression_mappings)
        .map_err(|err| err.to_string())?;
    let simulator = Simulator::new(ReqwestSender::new()?);

    simulator
        .fire_win_notice(&trackers, bid.price)
        .map_err(|err| err.to_string())?;
    println!("win notice accepted");

    if !args.no_click {
        let landing = simulator
            .fire_clicks(&trackers)
            .map_err(|err| err.to_string())?;
        println!("click-through landed with status {}", landing.status);
    }

    if !args.event.is_empty() {
        simulator
            .fire_video_events(&trackers, &args.event)
            .map_err(|err| err.to_string())?;
        println!(
            "video events accepted: {}",
            args.event
                .iter()
                .map(|event| event.name())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    Ok(())
}
