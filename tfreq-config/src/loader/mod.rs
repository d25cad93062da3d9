pub mod error;

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{
    models::{
        Config, ConfigMetadata, ControllerConfig, JobConfig, LogConfig,
        sources::{
            ENV_ERROR_BACKOFF, ENV_MAX_CONCURRENT_RECONCILES,
            ENV_REQUEUE_DELAY, ENV_RUNNING_POLL_INTERVAL, EnvConfig,
            FileConfig,
        },
    },
    util::{non_empty, parse_duration, parse_usize},
    validation::{ConfigWarnings, apply_guard_rails},
};

use self::error::ConfigLoadError;

const DEFAULT_CONFIG_LOCATIONS: [&str; 2] =
    ["tfreq.toml", "config/tfreq.toml"];

#[derive(Debug, Default, Clone)]
struct ConfigLoaderOptions {
    config_path: Option<PathBuf>,
    env_file: Option<PathBuf>,
}

#[derive(Debug, Default)]
pub struct ConfigLoader {
    options: ConfigLoaderOptions,
}

/// A resolved configuration plus everything worth telling the operator about
/// how it was resolved.
#[derive(Debug, Clone)]
pub struct ConfigLoad {
    pub config: Config,
    pub warnings: ConfigWarnings,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.config_path = Some(path.into());
        self
    }

    pub fn with_env_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.env_file = Some(path.into());
        self
    }

    /// Loads `.env`, reads the process environment, then composes. An env
    /// file passed explicitly must exist; the default `./.env` is optional.
    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        let env_file_loaded = match &self.options.env_file {
            Some(path) => {
                dotenvy::from_path(path)?;
                true
            }
            None => {
                dotenvy::dotenv().map(|_| true).or_else(|err| match err {
                    dotenvy::Error::Io(_) => Ok(false),
                    _ => Err(err),
                })?
            }
        };

        let mut load = self.load_with_env(EnvConfig::gather())?;
        load.config.metadata.env_file_loaded = env_file_loaded;
        Ok(load)
    }

    /// Composes from an explicit environment snapshot. Leaves the process
    /// environment alone.
    pub fn load_with_env(
        &self,
        env: EnvConfig,
    ) -> Result<ConfigLoad, ConfigLoadError> {
        let (file_config, config_path) = self.load_file_config(&env)?;
        let mut warnings = ConfigWarnings::default();
        if config_path.is_none() {
            warnings.push_with_hint(
                "No tfreq.toml detected; using environment variables and defaults",
                "Pass --config or set TFREQ_CONFIG to use a configuration file",
            );
        }

        let mut config = compose_config(file_config.unwrap_or_default(), env)?;
        config.metadata = ConfigMetadata {
            config_path,
            env_file_loaded: false,
        };
        warnings.extend(apply_guard_rails(&mut config));

        Ok(ConfigLoad { config, warnings })
    }

    fn load_file_config(
        &self,
        env: &EnvConfig,
    ) -> Result<(Option<FileConfig>, Option<PathBuf>), ConfigLoadError> {
        let required = self
            .options
            .config_path
            .clone()
            .or_else(|| env.config_path.clone());

        let path = match required {
            Some(path) if !path.exists() => {
                return Err(ConfigLoadError::MissingConfig { path });
            }
            Some(path) => path,
            None => match DEFAULT_CONFIG_LOCATIONS
                .iter()
                .map(PathBuf::from)
                .find(|candidate| candidate.exists())
            {
                Some(path) => path,
                None => return Ok((None, None)),
            },
        };

        let file_config = read_file_config(&path)?;
        Ok((Some(file_config), Some(path)))
    }
}

fn read_file_config(path: &Path) -> Result<FileConfig, ConfigLoadError> {
    let contents =
        fs::read_to_string(path).map_err(|err| ConfigLoadError::Io {
            path: path.to_path_buf(),
            source: err,
        })?;
    toml::from_str(&contents).map_err(|err| ConfigLoadError::Parse {
        path: path.to_path_buf(),
        source: err,
    })
}

/// Environment over file over defaults, one field at a time.
fn compose_config(
    file: FileConfig,
    env: EnvConfig,
) -> Result<Config, ConfigLoadError> {
    let defaults = ControllerConfig::default();
    let file_controller = file.controller;

    let max_concurrent_reconciles = match env.max_concurrent_reconciles {
        Some(raw) => parse_usize(ENV_MAX_CONCURRENT_RECONCILES, &raw)?,
        None => file_controller
            .max_concurrent_reconciles
            .unwrap_or(defaults.max_concurrent_reconciles),
    };

    let controller = ControllerConfig {
        watch_namespace: env
            .watch_namespace
            .or(non_empty(file_controller.watch_namespace)),
        max_concurrent_reconciles,
        requeue_delay: resolve_duration(
            (ENV_REQUEUE_DELAY, env.requeue_delay),
            ("controller.requeue_delay", file_controller.requeue_delay),
            defaults.requeue_delay,
        )?,
        running_poll_interval: resolve_duration(
            (ENV_RUNNING_POLL_INTERVAL, env.running_poll_interval),
            (
                "controller.running_poll_interval",
                file_controller.running_poll_interval,
            ),
            defaults.running_poll_interval,
        )?,
        error_backoff: resolve_duration(
            (ENV_ERROR_BACKOFF, env.error_backoff),
            ("controller.error_backoff", file_controller.error_backoff),
            defaults.error_backoff,
        )?,
        field_manager: env
            .field_manager
            .or(non_empty(file_controller.field_manager))
            .unwrap_or(defaults.field_manager),
    };

    let job_defaults = JobConfig::default();
    let job = JobConfig {
        image_repository: env
            .job_image_repository
            .or(non_empty(file.job.image_repository))
            .unwrap_or(job_defaults.image_repository),
        image_tag: env
            .job_image_tag
            .or(non_empty(file.job.image_tag))
            .unwrap_or(job_defaults.image_tag),
    };

    let log = LogConfig {
        filter: env
            .log_filter
            .or(non_empty(file.log.filter))
            .unwrap_or_else(|| LogConfig::default().filter),
    };

    Ok(Config {
        controller,
        job,
        log,
        metadata: ConfigMetadata::default(),
    })
}

fn resolve_duration(
    env: (&str, Option<String>),
    file: (&str, Option<String>),
    default: Duration,
) -> Result<Duration, ConfigLoadError> {
    match (env, file) {
        ((origin, Some(raw)), _) | (_, (origin, Some(raw))) => {
            parse_duration(origin, &raw)
        }
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_wins_over_file_per_field() {
        let file: FileConfig = toml::from_str(
            r#"
            [controller]
            requeue_delay = "30s"
            error_backoff = "1m"
            "#,
        )
        .expect("parse");
        let env = EnvConfig {
            requeue_delay: Some("7s".into()),
            ..Default::default()
        };

        let config = compose_config(file, env).expect("compose");
        assert_eq!(config.controller.requeue_delay, Duration::from_secs(7));
        assert_eq!(config.controller.error_backoff, Duration::from_secs(60));
        assert_eq!(
            config.controller.running_poll_interval,
            Duration::from_secs(2)
        );
    }

    #[test]
    fn invalid_env_value_names_variable() {
        let env = EnvConfig {
            max_concurrent_reconciles: Some("many".into()),
            ..Default::default()
        };
        let err = compose_config(FileConfig::default(), env).unwrap_err();
        assert!(matches!(
            err,
            ConfigLoadError::InvalidValue { ref origin, .. }
                if origin == ENV_MAX_CONCURRENT_RECONCILES
        ));
    }

    #[test]
    fn invalid_file_duration_names_key() {
        let mut file = FileConfig::default();
        file.controller.error_backoff = Some("later".into());
        let err = compose_config(file, EnvConfig::default()).unwrap_err();
        assert!(err.to_string().contains("controller.error_backoff"));
    }
}
