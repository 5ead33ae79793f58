use std::path::PathBuf;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

const DEFAULT_BASE_URL: &str = "https://www.counterstats.net";

/// Runtime settings: built-in defaults, then `counters.toml` if present, then `COUNTERS_*` env vars.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub base_url: String,
    pub db_path: PathBuf,
    pub region: String,
    pub default_patch: String,
    pub default_rank: String,
    pub max_retries: u32,
    pub backoff_base_secs: u64,
    pub request_timeout_secs: u64,
    pub batch_delay_ms: u64,
    #[serde(default)]
    pub catalog_path: Option<PathBuf>,
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        Config::builder()
            .set_default("base_url", DEFAULT_BASE_URL)?
            .set_default("db_path", "data/counters.sqlite")?
            .set_default("region", "World")?
            .set_default("default_patch", "latest")?
            .set_default("default_rank", "all")?
            .set_default("max_retries", 3i64)?
            .set_default("backoff_base_secs", 1i64)?
            .set_default("request_timeout_secs", 30i64)?
            .set_default("batch_delay_ms", 2500i64)?
            .add_source(File::with_name("counters").required(false))
            .add_source(Environment::with_prefix("COUNTERS"))
            .build()?
            .try_deserialize()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            db_path: PathBuf::from("data/counters.sqlite"),
            region: "World".to_string(),
            default_patch: "latest".to_string(),
            default_rank: "all".to_string(),
            max_retries: 3,
            backoff_base_secs: 1,
            request_timeout_secs: 30,
            batch_delay_ms: 2500,
            catalog_path: None,
        }
    }
}
