use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::util::non_empty;

pub const ENV_CONFIG_PATH: &str = "TFREQ_CONFIG";
pub const ENV_WATCH_NAMESPACE: &str = "TFREQ_WATCH_NAMESPACE";
pub const ENV_MAX_CONCURRENT_RECONCILES: &str =
    "TFREQ_MAX_CONCURRENT_RECONCILES";
pub const ENV_REQUEUE_DELAY: &str = "TFREQ_REQUEUE_DELAY";
pub const ENV_RUNNING_POLL_INTERVAL: &str = "TFREQ_RUNNING_POLL_INTERVAL";
pub const ENV_ERROR_BACKOFF: &str = "TFREQ_ERROR_BACKOFF";
pub const ENV_FIELD_MANAGER: &str = "TFREQ_FIELD_MANAGER";
pub const ENV_JOB_IMAGE_REPOSITORY: &str = "TFREQ_JOB_IMAGE_REPOSITORY";
pub const ENV_JOB_IMAGE_TAG: &str = "TFREQ_JOB_IMAGE_TAG";
pub const ENV_LOG_FILTER: &str = "RUST_LOG";

/// Raw configuration as defined in a TOML file.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub controller: FileControllerConfig,
    #[serde(default)]
    pub job: FileJobConfig,
    #[serde(default)]
    pub log: FileLogConfig,
}

/// Durations stay as strings here so parse failures can name the key.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FileControllerConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub watch_namespace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_concurrent_reconciles: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requeue_delay: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub running_poll_interval: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_backoff: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_manager: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FileJobConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_repository: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_tag: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FileLogConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

/// Raw environment values. Typed parsing happens during composition so errors
/// can name the offending variable.
#[derive(Debug, Default, Clone)]
pub struct EnvConfig {
    pub config_path: Option<PathBuf>,
    pub watch_namespace: Option<String>,
    pub max_concurrent_reconciles: Option<String>,
    pub requeue_delay: Option<String>,
    pub running_poll_interval: Option<String>,
    pub error_backoff: Option<String>,
    pub field_manager: Option<String>,
    pub job_image_repository: Option<String>,
    pub job_image_tag: Option<String>,
    pub log_filter: Option<String>,
}

impl EnvConfig {
    pub fn gather() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the snapshot from an arbitrary lookup. Blank values count as
    /// unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| non_empty(lookup(name));
        Self {
            config_path: var(ENV_CONFIG_PATH).map(PathBuf::from),
            watch_namespace: var(ENV_WATCH_NAMESPACE),
            max_concurrent_reconciles: var(ENV_MAX_CONCURRENT_RECONCILES),
            requeue_delay: var(ENV_REQUEUE_DELAY),
            running_poll_interval: var(ENV_RUNNING_POLL_INTERVAL),
            error_backoff: var(ENV_ERROR_BACKOFF),
            field_manager: var(ENV_FIELD_MANAGER),
            job_image_repository: var(ENV_JOB_IMAGE_REPOSITORY),
            job_image_tag: var(ENV_JOB_IMAGE_TAG),
            log_filter: var(ENV_LOG_FILTER),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn lookup_skips_blank_values() {
        let vars = HashMap::from([
            (ENV_WATCH_NAMESPACE, "infra"),
            (ENV_REQUEUE_DELAY, "  "),
            (ENV_CONFIG_PATH, "/etc/tfreq.toml"),
        ]);
        let env = EnvConfig::from_lookup(|name| {
            vars.get(name).map(|value| value.to_string())
        });

        assert_eq!(env.watch_namespace.as_deref(), Some("infra"));
        assert_eq!(env.requeue_delay, None);
        assert_eq!(env.config_path, Some(PathBuf::from("/etc/tfreq.toml")));
        assert_eq!(env.job_image_tag, None);
    }

    #[test]
    fn file_config_reads_sections() {
        let file: FileConfig = toml::from_str(
            r#"
            [controller]
            watch_namespace = "infra"
            requeue_delay = "10s"

            [job]
            image_tag = "1.10.0"
            "#,
        )
        .expect("parse");

        assert_eq!(file.controller.watch_namespace.as_deref(), Some("infra"));
        assert_eq!(file.controller.requeue_delay.as_deref(), Some("10s"));
        assert_eq!(file.job.image_tag.as_deref(), Some("1.10.0"));
        assert!(file.log.filter.is_none());
    }
}
