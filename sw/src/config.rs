//! skipwatch configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::attachment::DEFAULT_BYPASS_KEY;
use crate::cli::Cli;
use crate::policy::{DEFAULT_MIN_AVG, DEFAULT_MIN_ELAPSED, Thresholds};
use crate::supervisor::DEFAULT_STATUS_TIMER;

/// Main skipwatch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Minimum average recovered per minute
    #[serde(rename = "min-avg")]
    pub min_avg: f64,

    /// Time a unit runs before it can be judged
    #[serde(with = "humantime_serde")]
    pub delay: Duration,

    /// Seconds between worker status reports, when skipwatch has to ask for them
    #[serde(rename = "status-timer")]
    pub status_timer: u32,

    /// Key written to the worker's terminal to bypass a unit
    #[serde(rename = "bypass-key")]
    pub bypass_key: char,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            min_avg: DEFAULT_MIN_AVG,
            delay: DEFAULT_MIN_ELAPSED,
            status_timer: DEFAULT_STATUS_TIMER,
            bypass_key: DEFAULT_BYPASS_KEY as char,
            log_level: None,
        }
    }
}

/// Settings for one supervised run, after CLI overrides
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Settings {
    pub thresholds: Thresholds,
    pub status_timer: u32,
    pub bypass_key: u8,
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, it must load
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .skipwatch.yml
        let local_config = PathBuf::from(".skipwatch.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/skipwatch/skipwatch.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("skipwatch").join("skipwatch.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Resolve run settings, CLI flags taking priority over the file
    pub fn settings(&self, cli: &Cli) -> Result<Settings> {
        let min_avg = cli.min_avg.unwrap_or(self.min_avg);
        if !min_avg.is_finite() || min_avg < 0.0 {
            return Err(eyre::eyre!("min-avg must be a non-negative number, got {}", min_avg));
        }
        if !self.bypass_key.is_ascii() {
            return Err(eyre::eyre!("bypass-key must be a single ASCII character, got {:?}", self.bypass_key));
        }

        Ok(Settings {
            thresholds: Thresholds {
                min_avg,
                min_elapsed: cli.delay.unwrap_or(self.delay),
            },
            status_timer: self.status_timer,
            bypass_key: self.bypass_key as u8,
        })
    }
}

mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use tempfile::TempDir;

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["skipwatch"];
        argv.extend_from_slice(args);
        argv.extend_from_slice(&["--", "hashcat"]);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        let settings = config.settings(&cli(&[])).unwrap();

        assert_eq!(settings.thresholds, Thresholds::default());
        assert_eq!(settings.status_timer, 15);
        assert_eq!(settings.bypass_key, b'b');
    }

    #[test]
    fn test_load_from_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("skipwatch.yml");
        fs::write(
            &path,
            "min-avg: 3.5\ndelay: 2m 30s\nstatus-timer: 30\nbypass-key: s\nlog-level: debug\n",
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();

        assert_eq!(config.min_avg, 3.5);
        assert_eq!(config.delay, Duration::from_secs(150));
        assert_eq!(config.status_timer, 30);
        assert_eq!(config.bypass_key, 's');
        assert_eq!(config.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("skipwatch.yml");
        fs::write(&path, "delay: 10m\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();

        assert_eq!(config.min_avg, DEFAULT_MIN_AVG);
        assert_eq!(config.delay, Duration::from_secs(600));
        assert_eq!(config.status_timer, DEFAULT_STATUS_TIMER);
    }

    #[test]
    fn test_missing_explicit_file_fails() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nope.yml");
        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    fn test_bad_delay_fails() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("skipwatch.yml");
        fs::write(&path, "delay: whenever\n").unwrap();
        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    fn test_cli_overrides_config() {
        let config = Config {
            min_avg: 5.0,
            delay: Duration::from_secs(600),
            ..Config::default()
        };

        let settings = config.settings(&cli(&["--min-avg", "0.5", "-d", "45s"])).unwrap();
        assert_eq!(settings.thresholds.min_avg, 0.5);
        assert_eq!(settings.thresholds.min_elapsed, Duration::from_secs(45));

        let settings = config.settings(&cli(&[])).unwrap();
        assert_eq!(settings.thresholds.min_avg, 5.0);
        assert_eq!(settings.thresholds.min_elapsed, Duration::from_secs(600));
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let config = Config::default();
        assert!(config.settings(&cli(&["--min-avg=-1"])).is_err());

        let config = Config {
            bypass_key: 'é',
            ..Config::default()
        };
        assert!(config.settings(&cli(&[])).is_err());
    }

    #[test]
    fn test_roundtrip_delay_format() {
        let yaml = serde_yaml::to_string(&Config::default()).unwrap();
        assert!(yaml.contains("delay: 1m"));
    }
}
