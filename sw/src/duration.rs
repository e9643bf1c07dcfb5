//! Duration fields from worker status text
//!
//! The worker reports times as free text, e.g.
//! `Time.Started.....: Tue Mar  5 10:00:00 2024 (1 day, 2 hours, 3 mins, 4 secs)`.
//! Parsing is tolerant: anything unrecognised counts as zero.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tracing::debug;

/// Unit patterns with their length in seconds. Only the first match of each unit counts.
static UNITS: LazyLock<[(Regex, u64); 4]> = LazyLock::new(|| {
    [
        (unit_regex("days?"), 24 * 60 * 60),
        (unit_regex("hours?"), 60 * 60),
        (unit_regex("mins?"), 60),
        (unit_regex("secs?"), 1),
    ]
});

fn unit_regex(unit: &str) -> Regex {
    Regex::new(&format!(r"(\d+) {unit}")).expect("unit pattern is valid")
}

/// Sum every `<int> <unit>` component found in `text`
pub fn parse(text: &str) -> Duration {
    let secs = UNITS
        .iter()
        .map(|(re, unit_secs)| component(re, text, *unit_secs))
        .fold(0u64, u64::saturating_add);
    debug!(%text, secs, "duration::parse: parsed");
    Duration::from_secs(secs)
}

fn component(re: &Regex, text: &str, unit_secs: u64) -> u64 {
    re.captures(text)
        .and_then(|caps| caps[1].parse::<u64>().ok())
        .and_then(|n| n.checked_mul(unit_secs))
        .unwrap_or(0)
}
