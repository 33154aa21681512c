use clap::Parser;
use std::fs;
use std::path::PathBuf;
use types::io::trace_text;
use types::trace::BidTrace;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Parse a bidder diagnostic trace and compare it against an expected shape"
)]
struct Args {
    /// Trace text file (a saved `?trace=true` response body)
    trace: PathBuf,

    /// Expected-trace YAML to compare against
    #[arg(short, long)]
    expect: Option<PathBuf>,

    /// Print the parsed trace as JSON instead of a summary
    #[arg(long)]
    json: bool,
}

fn main() {
    let args = Args::parse();
    if let Err(err) = run(&args) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), String> {
    let text = fs::read_to_string(&args.trace)
        .map_err(|err| format!("cannot read {}: {err}", args.trace.display()))?;
    let parsed = trace_text::parse(&text).map_err(|err| err.to_string())?;

    if let Some(path) = &args.expect {
        let expected: BidTrace = serde_yaml::from_str(
            &fs::read_to_string(path)
                .map_err(|err| format!("cannot read {}: {err}", path.display()))?,
        )
        .map_err(|err| format!("bad expected trace: {err}"))?;
        engine::compare(&parsed, &expected).map_err(|err| err.to_string())?;
        println!("trace matches expectations");
    }

    if args.json {
        let rendered = serde_json::to_string_pretty(&parsed).map_err(|err| err.to_string())?;
        println!("{rendered}");
        return Ok(());
    }

    for (label, lines) in &parsed.targeting_tree {
        println!("{label} ({} detail lines)", lines.len());
    }
    if !parsed.found.is_empty() {
        println!("found:");
        for label in &parsed.found {
            println!("  {label}");
        }
    }
    println!("{} decision stages", parsed.decision_stages.len());
    for stage in &parsed.decision_stages {
        println!(
            "  {} [{}] {}",
            stage.stage_type.as_deref().unwrap_or("?"),
            stage.status.map(|status| status.name()).unwrap_or("?"),
            stage.description.as_deref().unwrap_or("")
        );
    }

    Ok(())
}
