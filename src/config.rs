use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::NaiveDateTime;

use crate::limits::{DEFAULT_REBOOK_BUDGET, MAX_CLOCK_SPEED};

/// Process settings, read from `KITCHEN_*` environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub data_dir: PathBuf,
    /// JSON array of locations; one default location if unset.
    pub locations_file: Option<PathBuf>,
    pub clock_speed: f64,
    /// Simulated start instant; real time if unset and speed is 1.
    pub clock_start: Option<NaiveDateTime>,
    pub escalator_poll: Duration,
    pub rebook_interval: Duration,
    pub rebook_budget: usize,
    pub metrics_port: Option<u16>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            locations_file: None,
            clock_speed: 1.0,
            clock_start: None,
            escalator_poll: Duration::from_millis(250),
            rebook_interval: Duration::from_secs(10),
            rebook_budget: DEFAULT_REBOOK_BUDGET,
            metrics_port: None,
        }
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|s| s.trim().parse().ok())
}

fn parse_start(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M"))
        .ok()
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unparsable values fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let clock_speed = parse_var(&lookup, "KITCHEN_CLOCK_SPEED")
            .filter(|s: &f64| s.is_finite() && *s > 0.0)
            .map(|s| s.min(MAX_CLOCK_SPEED))
            .unwrap_or(defaults.clock_speed);

        Self {
            data_dir: lookup("KITCHEN_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            locations_file: lookup("KITCHEN_LOCATIONS").map(PathBuf::from),
            clock_speed,
            clock_start: lookup("KITCHEN_CLOCK_START").and_then(|s| parse_start(s.trim())),
            escalator_poll: parse_var(&lookup, "KITCHEN_ESCALATOR_POLL_MS")
                .filter(|ms: &u64| *ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(defaults.escalator_poll),
            rebook_interval: parse_var(&lookup, "KITCHEN_REBOOK_INTERVAL_SECS")
                .filter(|s: &u64| *s > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.rebook_interval),
            rebook_budget: parse_var(&lookup, "KITCHEN_REBOOK_BUDGET").unwrap_or(defaults.rebook_budget),
            metrics_port: parse_var(&lookup, "KITCHEN_METRICS_PORT"),
        }
    }

    pub fn orders_path(&self) -> PathBuf {
        self.data_dir.join("orders.json")
    }

    /// Whether the daemon should run on a `SimClock`.
    pub fn simulated(&self) -> bool {
        self.clock_start.is_some() || self.clock_speed != 1.0
    }
}
