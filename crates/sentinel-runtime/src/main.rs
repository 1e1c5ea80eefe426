use std::path::PathBuf;

use anyhow::Context;
use clap::{value_parser, Arg, ArgAction, Command};
use sentinel_runtime::{replay, MonitorConfig, Trace};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Command::new("sentinel-replay")
        .version(sentinel_runtime::VERSION)
        .about("Replay a recorded exam session through the integrity monitor")
        .arg(
            Arg::new("trace")
                .required(true)
                .value_parser(value_parser!(PathBuf))
                .help("Trace file (JSON)"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .value_parser(value_parser!(PathBuf))
                .help("Monitor configuration (TOML); overrides the trace's own"),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .action(ArgAction::SetTrue)
                .help("Output as JSON"),
        );
    let matches = cli.get_matches();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let Some(path) = matches.get_one::<PathBuf>("trace") else {
        anyhow::bail!("missing trace path");
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading trace {}", path.display()))?;
    let mut trace = Trace::from_json(&raw)?;

    if let Some(config_path) = matches.get_one::<PathBuf>("config") {
        let raw = std::fs::read_to_string(config_path)
            .with_context(|| format!("reading config {}", config_path.display()))?;
        trace.config = MonitorConfig::from_toml_str(&raw)?;
    }

    let report = replay(&trace).await?;

    if matches.get_flag("json") {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Replay Report:");
        println!("  Steps: {}", report.steps);
        println!("  Violations: {}", report.counters.violation_count);
        println!("  Seconds Away: {}", report.counters.seconds_away);
        for reason in &report.violations {
            println!("    - {reason}");
        }
        println!("  DevTools Opened: {}", report.devtools_opened);
        println!("  Persisted Writes: {}", report.writes);
        if !report.degraded.is_empty() {
            println!("  Degraded: {:?}", report.degraded);
        }
    }
    Ok(())
}
