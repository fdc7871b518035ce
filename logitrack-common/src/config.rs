//! Configuration loading for the ingestion pipeline
//!
//! Resolution order, lowest to highest priority:
//! 1. Compiled defaults (`IngestConfig::default()`)
//! 2. TOML config file (`--config`, `LOGITRACK_CONFIG`, or `~/.config/logitrack/ingest.toml`)
//! 3. Environment variable overrides (`apply_env_overrides`)
//! 4. Command-line arguments (applied by the binary)
//!
//! Everything is read once at process start.

use crate::types::BoundingBox;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Hugging Face hosted zero-shot model (bart-large-mnli)
pub const DEFAULT_CLASSIFIER_URL: &str =
    "https://api-inference.huggingface.co/models/facebook/bart-large-mnli";

/// AISStream position feed
pub const DEFAULT_FEED_URL: &str = "wss://stream.aisstream.io/v0/stream";

/// Top-level configuration for `logitrack-ingest`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Master switch for the ingestion pipeline
    pub enabled: bool,
    /// Live position feed (true) or synthetic generator (false)
    pub live_mode: bool,
    /// Seconds between ingestion cycles
    pub cycle_interval_secs: u64,
    /// Reports buffered between source and scheduler before the oldest are dropped
    pub queue_capacity: usize,
    /// Address of the health HTTP surface
    pub health_bind: String,
    /// SQLite database file (overridden by `--database`)
    pub database_path: Option<PathBuf>,
    pub logging: LoggingConfig,
    pub feed: FeedConfig,
    pub synthetic: SyntheticConfig,
    pub classifier: ClassifierConfig,
    pub dedup: DedupConfig,
    pub store: StoreConfig,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            live_mode: false,
            cycle_interval_secs: 30,
            queue_capacity: 1024,
            health_bind: "127.0.0.1:5780".to_string(),
            database_path: None,
            logging: LoggingConfig::default(),
            feed: FeedConfig::default(),
            synthetic: SyntheticConfig::default(),
            classifier: ClassifierConfig::default(),
            dedup: DedupConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is not set
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "logitrack_ingest=info,logitrack_common=info".to_string(),
        }
    }
}

/// Live position-stream connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub url: String,
    pub api_key: Option<String>,
    pub bounding_boxes: Vec<BoundingBox>,
    /// Silence longer than this on an established connection forces a reconnect
    pub receive_timeout_secs: u64,
    /// Time allowed between sending the subscription and the first inbound frame
    pub subscribe_ack_timeout_secs: u64,
    pub backoff_initial_ms: u64,
    pub backoff_max_ms: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_FEED_URL.to_string(),
            api_key: None,
            bounding_boxes: vec![BoundingBox::world()],
            receive_timeout_secs: 60,
            subscribe_ack_timeout_secs: 10,
            backoff_initial_ms: 500,
            backoff_max_ms: 60_000,
        }
    }
}

impl FeedConfig {
    pub fn receive_timeout(&self) -> Duration {
        Duration::from_secs(self.receive_timeout_secs)
    }

    pub fn subscribe_ack_timeout(&self) -> Duration {
        Duration::from_secs(self.subscribe_ack_timeout_secs)
    }
}

/// Synthetic generator settings (offline mode)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticConfig {
    pub interval_ms: u64,
    /// Number of distinct synthetic vessel identifiers
    pub vessel_count: usize,
    /// Fixed RNG seed for reproducible runs
    pub seed: Option<u64>,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            interval_ms: 5_000,
            vessel_count: 5,
            seed: None,
        }
    }
}

/// Classification engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub url: String,
    /// No key means every event is classified by the heuristic rules
    pub api_key: Option<String>,
    /// External calls allowed per ingestion cycle
    pub quota_per_cycle: u32,
    pub timeout_ms: u64,
    pub requests_per_second: u32,
    /// Top-label scores below this are treated as a failed call
    pub confidence_floor: f64,
    /// Continuous time at anchor after which a vessel counts as held by congestion
    pub anchor_threshold_secs: u64,
    /// Keyword lists match whole words; a trailing `*` matches any word with that prefix
    pub weather_keywords: Vec<String>,
    pub customs_keywords: Vec<String>,
    pub congestion_keywords: Vec<String>,
    pub delay_keywords: Vec<String>,
    pub delivered_keywords: Vec<String>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_CLASSIFIER_URL.to_string(),
            api_key: None,
            quota_per_cycle: 10,
            timeout_ms: 10_000,
            requests_per_second: 5,
            confidence_floor: 0.3,
            anchor_threshold_secs: 2 * 60 * 60,
            weather_keywords: words(&[
                "weather", "typhoon*", "hurricane*", "storm*", "cyclone*", "gale*", "fog*",
                "monsoon*",
            ]),
            customs_keywords: words(&[
                "customs",
                "paperwork",
                "documentation",
                "inspection*",
                "clearance",
            ]),
            congestion_keywords: words(&["congest*", "queue*", "dock space", "waiting for dock"]),
            delay_keywords: words(&[
                "delay*", "hold*", "held", "behind schedule", "late", "later",
            ]),
            delivered_keywords: words(&[
                "delivered",
                "discharged",
                "unloaded",
                "signed by",
                "arrived at destination",
            ]),
        }
    }
}

impl ClassifierConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn anchor_threshold(&self) -> Duration {
        Duration::from_secs(self.anchor_threshold_secs)
    }
}

/// Near-duplicate suppression thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    pub min_interval_secs: u64,
    pub distance_meters: f64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            min_interval_secs: 30,
            distance_meters: 50.0,
        }
    }
}

impl DedupConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_secs(self.min_interval_secs)
    }
}

/// Store write retry settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub max_attempts: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|w| w.to_string()).collect()
}

impl IngestConfig {
    /// Parse a TOML document; missing keys keep their defaults
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
    }

    /// Load configuration from an explicit file, the default location, or defaults
    ///
    /// An explicitly requested file must exist. A missing default file is not
    /// an error; the compiled defaults are used.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let path = match explicit_path {
            Some(path) => {
                if !path.exists() {
                    return Err(Error::Config(format!(
                        "Config file not found: {}",
                        path.display()
                    )));
                }
                Some(path.to_path_buf())
            }
            None => default_config_path().filter(|p| p.exists()),
        };

        match path {
            Some(path) => {
                let content = std::fs::read_to_string(&path)
                    .map_err(|e| Error::Config(format!("Read TOML failed: {}", e)))?;
                let config = Self::from_toml_str(&content)?;
                info!("Loaded configuration from {}", path.display());
                Ok(config)
            }
            None => {
                warn!("No config file found, using compiled defaults");
                Ok(Self::default())
            }
        }
    }

    /// Apply `LOGITRACK_*` environment overrides
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(value) = env_bool("LOGITRACK_ENABLED")? {
            self.enabled = value;
        }
        if let Some(value) = env_bool("LOGITRACK_LIVE_MODE")? {
            self.live_mode = value;
        }
        if let Some(key) = env_string("LOGITRACK_AIS_API_KEY") {
            self.feed.api_key = Some(key);
        }
        if let Some(key) = env_string("LOGITRACK_HF_API_KEY") {
            self.classifier.api_key = Some(key);
        }
        if let Some(quota) = env_parse::<u32>("LOGITRACK_QUOTA_PER_CYCLE")? {
            self.classifier.quota_per_cycle = quota;
        }
        if let Some(secs) = env_parse::<u64>("LOGITRACK_CYCLE_INTERVAL_SECS")? {
            self.cycle_interval_secs = secs;
        }
        Ok(())
    }

    /// Reject configurations the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.cycle_interval_secs == 0 {
            return Err(Error::Config("cycle_interval_secs must be greater than 0".to_string()));
        }
        if self.queue_capacity == 0 {
            return Err(Error::Config("queue_capacity must be greater than 0".to_string()));
        }
        if self.feed.bounding_boxes.is_empty() {
            return Err(Error::Config("at least one bounding box is required".to_string()));
        }
        if let Some(bad) = self.feed.bounding_boxes.iter().find(|b| !b.is_valid()) {
            return Err(Error::Config(format!("bounding box out of range: {:?}", bad)));
        }
        if self.live_mode && !self.feed.api_key.as_deref().is_some_and(is_valid_key) {
            return Err(Error::Config(
                "live_mode requires a feed API key (feed.api_key or LOGITRACK_AIS_API_KEY)"
                    .to_string(),
            ));
        }
        if self.feed.receive_timeout_secs == 0 || self.feed.subscribe_ack_timeout_secs == 0 {
            return Err(Error::Config(
                "feed receive and subscribe-ack timeouts must be greater than 0".to_string(),
            ));
        }
        if self.feed.backoff_initial_ms == 0
            || self.feed.backoff_max_ms < self.feed.backoff_initial_ms
        {
            return Err(Error::Config(
                "feed backoff must satisfy 0 < backoff_initial_ms <= backoff_max_ms".to_string(),
            ));
        }
        if self.synthetic.interval_ms == 0 || self.synthetic.vessel_count == 0 {
            return Err(Error::Config(
                "synthetic interval_ms and vessel_count must be greater than 0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.classifier.confidence_floor) {
            return Err(Error::Config(
                "classifier.confidence_floor must be within [0, 1]".to_string(),
            ));
        }
        if self.classifier.requests_per_second == 0 {
            return Err(Error::Config(
                "classifier.requests_per_second must be greater than 0".to_string(),
            ));
        }
        if !(self.dedup.distance_meters > 0.0) {
            return Err(Error::Config("dedup.distance_meters must be positive".to_string()));
        }
        if self.store.max_attempts == 0 {
            return Err(Error::Config("store.max_attempts must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn cycle_interval(&self) -> Duration {
        Duration::from_secs(self.cycle_interval_secs)
    }

    /// Database location: CLI/env argument, then TOML, then platform default
    pub fn resolve_database_path(&self, cli_arg: Option<&Path>) -> PathBuf {
        if let Some(path) = cli_arg {
            return path.to_path_buf();
        }
        if let Some(path) = &self.database_path {
            return path.clone();
        }
        default_database_path()
    }
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

/// `~/.config/logitrack/ingest.toml` (platform equivalent elsewhere)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("logitrack").join("ingest.toml"))
}

/// `~/.local/share/logitrack/logitrack.db` (platform equivalent elsewhere)
pub fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("logitrack"))
        .unwrap_or_else(|| PathBuf::from("./logitrack_data"))
        .join("logitrack.db")
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| is_valid_key(v))
}

fn env_bool(name: &str) -> Result<Option<bool>> {
    match env_string(name) {
        None => Ok(None),
        Some(value) => match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            other => Err(Error::Config(format!("{} must be a boolean, got '{}'", name, other))),
        },
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match env_string(name) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| Error::Config(format!("{} has an invalid value: '{}'", name, value))),
    }
}
