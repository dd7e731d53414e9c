//! Pipeline configuration. Load from TOML or env.

use crate::error::{PipelineError, PipelineResult};
use callscore_asr::{parse_endpoints, Endpoint, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Env var naming the config file.
pub const CONFIG_PATH_ENV: &str = "CALLSCORE_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/callscore.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// SQLite file holding call records.
    pub database_path: String,
    /// sled directory for the pending set.
    pub pending_path: String,
    /// Ordered `host:port` list of ASR services. Env: comma-separated `CALLSCORE_ASR_ENDPOINTS`.
    pub asr_endpoints: Vec<String>,
    /// Records seeded per dispatch tick.
    pub batch_size: usize,
    pub dispatch_interval_secs: u64,
    pub prediction_interval_secs: u64,
    pub probe_timeout_secs: u64,
    pub request_timeout_secs: u64,
    /// Full passes over the endpoint list before a task gives up. 0 = never.
    pub retry_max_rounds: u32,
    pub retry_backoff_ms: u64,
    /// JSON weights for [`crate::scoring::LinearModel`].
    pub model_path: String,
    /// When set, logs also go to a daily-rotated file in this directory.
    #[serde(default)]
    pub log_dir: Option<String>,
}

impl PipelineConfig {
    /// Load config from file and environment. Precedence: env > `CALLSCORE_CONFIG` file
    /// (or `config/callscore.toml`) > defaults.
    pub fn load() -> PipelineResult<Self> {
        let config_path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(Path::new(&config_path))
    }

    /// Same as [`load`](Self::load) with an explicit file path. A missing file is not an error.
    pub fn load_from(path: &Path) -> PipelineResult<Self> {
        let builder = config::Config::builder()
            .set_default("database_path", "./data/records.sqlite")?
            .set_default("pending_path", "./data/pending")?
            .set_default("asr_endpoints", vec!["whisper:9000"])?
            .set_default("batch_size", 2_i64)?
            .set_default("dispatch_interval_secs", 60_i64)?
            .set_default("prediction_interval_secs", 60_i64)?
            .set_default("probe_timeout_secs", 5_i64)?
            .set_default("request_timeout_secs", 600_i64)?
            .set_default("retry_max_rounds", 0_i64)?
            .set_default("retry_backoff_ms", 5000_i64)?
            .set_default("model_path", "./data/model.json")?;

        let builder = if path.exists() {
            builder.add_source(config::File::from(path))
        } else {
            builder
        };

        let built = builder
            .add_source(
                config::Environment::with_prefix("CALLSCORE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("asr_endpoints"),
            )
            .build()?;

        let cfg: Self = built.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> PipelineResult<()> {
        if self.batch_size == 0 {
            return Err(PipelineError::Config("batch_size must be at least 1".into()));
        }
        if self.dispatch_interval_secs == 0 || self.prediction_interval_secs == 0 {
            return Err(PipelineError::Config("tick intervals must be at least 1 second".into()));
        }
        self.endpoints().map(|_| ())
    }

    pub fn endpoints(&self) -> PipelineResult<Vec<Endpoint>> {
        Ok(parse_endpoints(&self.asr_endpoints)?)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default()
            .with_max_rounds(self.retry_max_rounds)
            .with_backoff(Duration::from_millis(self.retry_backoff_ms))
            .with_probe_timeout(Duration::from_secs(self.probe_timeout_secs))
            .with_request_timeout(Duration::from_secs(self.request_timeout_secs))
    }

    pub fn dispatch_interval(&self) -> Duration {
        Duration::from_secs(self.dispatch_interval_secs)
    }

    pub fn prediction_interval(&self) -> Duration {
        Duration::from_secs(self.prediction_interval_secs)
    }
}
