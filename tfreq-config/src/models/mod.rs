pub mod sources;

use std::{path::PathBuf, time::Duration};

use tfreq_core::{
    ReconcilerSettings,
    execution::{DEFAULT_IMAGE_REPOSITORY, DEFAULT_IMAGE_TAG, JobTemplate},
    reconciler::DEFAULT_REQUEUE_DELAY,
};

pub const DEFAULT_MAX_CONCURRENT_RECONCILES: usize = 4;
pub const DEFAULT_RUNNING_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_ERROR_BACKOFF: Duration = Duration::from_secs(5);
pub const DEFAULT_FIELD_MANAGER: &str = "tfreq-operator";
pub const DEFAULT_LOG_FILTER: &str = "info,kube=warn";

/// Fully resolved operator configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub controller: ControllerConfig,
    pub job: JobConfig,
    pub log: LogConfig,
    pub metadata: ConfigMetadata,
}

impl Config {
    /// Settings handed to the core reconciler.
    pub fn reconciler_settings(&self) -> ReconcilerSettings {
        ReconcilerSettings {
            requeue_delay: self.controller.requeue_delay,
            job_template: JobTemplate {
                image_repository: self.job.image_repository.clone(),
                image_tag: self.job.image_tag.clone(),
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Namespace to watch; `None` watches every namespace.
    pub watch_namespace: Option<String>,
    pub max_concurrent_reconciles: usize,
    pub requeue_delay: Duration,
    /// Delay before re-checking a request whose jobs are still running.
    pub running_poll_interval: Duration,
    /// Delay applied by the error policy after a failed reconcile.
    pub error_backoff: Duration,
    pub field_manager: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            watch_namespace: None,
            max_concurrent_reconciles: DEFAULT_MAX_CONCURRENT_RECONCILES,
            requeue_delay: DEFAULT_REQUEUE_DELAY,
            running_poll_interval: DEFAULT_RUNNING_POLL_INTERVAL,
            error_backoff: DEFAULT_ERROR_BACKOFF,
            field_manager: DEFAULT_FIELD_MANAGER.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobConfig {
    pub image_repository: String,
    pub image_tag: String,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            image_repository: DEFAULT_IMAGE_REPOSITORY.to_string(),
            image_tag: DEFAULT_IMAGE_TAG.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

/// Where the configuration came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigMetadata {
    pub config_path: Option<PathBuf>,
    pub env_file_loaded: bool,
}
