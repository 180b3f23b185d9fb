//! Worker configuration.
//!
//! Sources, later wins: built-in defaults → optional config file →
//! `SPINDLE_*` environment variables. The CLI applies its flags on top.

use std::path::Path;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::logging::DEFAULT_LOG_FORMAT;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Size of the pool running blocking handlers.
    pub max_threadpool_threads: usize,
    /// Skip parameter coercion entirely.
    pub no_parse: bool,
    /// Template for captured task logs.
    pub log_collector_format: String,
    pub log_level: String,
    pub log_json: bool,
    /// Task names that must be registered for the worker to start.
    pub expected_tasks: Vec<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_threadpool_threads: 10,
            no_parse: false,
            log_collector_format: DEFAULT_LOG_FORMAT.to_string(),
            log_level: "info".to_string(),
            log_json: false,
            expected_tasks: Vec::new(),
        }
    }
}

impl WorkerConfig {
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        let config = builder
            .add_source(
                Environment::with_prefix("SPINDLE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("expected_tasks"),
            )
            .build()?;

        let cfg: WorkerConfig = config.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_threadpool_threads == 0 {
            return Err(ConfigError::Invalid(
                "max_threadpool_threads must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
