//! CLI argument parsing for skipwatch

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Run a recovery worker and bypass units of work that stall
#[derive(Parser, Debug)]
#[command(name = "skipwatch")]
#[command(author, version, about = "Bypass stalled units of a recovery worker", long_about = None)]
#[command(after_help = "Example: skipwatch --min-avg 2 -d 5m -- hashcat -m 0 hashes.txt masks.hcmask")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,

    /// Minimum average recovered per minute before a unit is bypassed (default: 1)
    #[arg(long = "min-avg", value_name = "RATE")]
    pub min_avg: Option<f64>,

    /// How long a unit runs before it is judged, e.g. 90s or 5m (default: 1m)
    #[arg(short = 'd', long, value_name = "DURATION", value_parser = humantime::parse_duration)]
    pub delay: Option<Duration>,

    /// Worker command line; everything after `--` is passed through verbatim
    #[arg(last = true, required = true, value_name = "WORKER")]
    pub worker: Vec<String>,
}
