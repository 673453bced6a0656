//! Runtime configuration shared by the CLI subcommands.
//!
//! Every option can come from a flag or an environment variable; a `.env`
//! file in the working directory is loaded before parsing.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use thiserror::Error;

use crate::db::Database;
use crate::generator::{
    ContentGenerator, GeminiClient, GeminiConfig, StudyGenerator, YoutubeTranscripts,
    DEFAULT_GEMINI_BASE_URL, DEFAULT_MODEL,
};
use crate::scheduler::runner::{
    DEFAULT_GENERATION_TIMEOUT_SECS, DEFAULT_STALE_PROCESSING_SECS, DEFAULT_TICK_INTERVAL_SECS,
};
use crate::scheduler::SchedulerConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("GEMINI_API_KEY is not set")]
    MissingApiKey,
    #[error("tick interval must be at least one second")]
    ZeroInterval,
    #[error("generation timeout must be at least one second")]
    ZeroTimeout,
}

#[derive(Debug, Clone, Args)]
pub struct Settings {
    /// Path to the SQLite database (defaults to the platform data directory)
    #[arg(long, env = "STUDY_PLANNER_DB", global = true)]
    pub db: Option<PathBuf>,

    /// Gemini API key
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true, global = true)]
    pub gemini_api_key: Option<String>,

    /// Gemini model used for note generation
    #[arg(long, env = "GEMINI_MODEL", default_value = DEFAULT_MODEL, global = true)]
    pub model: String,

    /// Gemini API base URL
    #[arg(long, env = "GEMINI_BASE_URL", default_value = DEFAULT_GEMINI_BASE_URL, global = true)]
    pub gemini_base_url: String,

    /// Seconds between scheduler ticks
    #[arg(
        long,
        env = "STUDY_PLANNER_TICK_SECS",
        default_value_t = DEFAULT_TICK_INTERVAL_SECS,
        global = true
    )]
    pub tick_secs: u64,

    /// Upper bound on one generation call, in seconds
    #[arg(long, default_value_t = DEFAULT_GENERATION_TIMEOUT_SECS, global = true)]
    pub generation_timeout_secs: u64,

    /// Fail plans stuck in processing for this many seconds on start (0 disables)
    #[arg(long, default_value_t = DEFAULT_STALE_PROCESSING_SECS, global = true)]
    pub stale_processing_secs: u64,
}

impl Settings {
    /// Open and migrate the configured database.
    pub fn open_database(&self) -> anyhow::Result<Database> {
        let db = match &self.db {
            Some(path) => Database::open(path)?,
            None => Database::open_default()?,
        };
        db.migrate()?;
        Ok(db)
    }

    pub fn scheduler_config(&self) -> Result<SchedulerConfig, ConfigError> {
        if self.tick_secs == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        Ok(SchedulerConfig {
            tick_interval: Duration::from_secs(self.tick_secs),
            generation_timeout: self.generation_timeout()?,
            stale_processing_after: (self.stale_processing_secs > 0)
                .then(|| Duration::from_secs(self.stale_processing_secs)),
        })
    }

    pub fn generation_timeout(&self) -> Result<Duration, ConfigError> {
        if self.generation_timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(Duration::from_secs(self.generation_timeout_secs))
    }

    pub fn gemini_config(&self) -> Result<GeminiConfig, ConfigError> {
        let api_key = self
            .gemini_api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or(ConfigError::MissingApiKey)?;
        Ok(GeminiConfig::new(api_key)
            .with_model(&self.model)
            .with_base_url(&self.gemini_base_url))
    }

    /// Transcript-first Gemini generator.
    pub fn build_generator(&self) -> Result<Arc<dyn ContentGenerator>, ConfigError> {
        let model = GeminiClient::new(self.gemini_config()?);
        tracing::debug!(model = model.model(), "configured Gemini generator");
        Ok(Arc::new(StudyGenerator::new(model, YoutubeTranscripts::new())))
    }
}
