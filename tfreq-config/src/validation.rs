use std::time::Duration;

use crate::models::Config;

#[derive(Debug, Clone)]
pub struct ConfigWarning {
    pub message: String,
    pub hint: Option<String>,
}

#[derive(Debug, Default, Clone)]
pub struct ConfigWarnings {
    pub items: Vec<ConfigWarning>,
}

impl ConfigWarnings {
    pub fn push<S: Into<String>>(&mut self, message: S) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: None,
        });
    }

    pub fn push_with_hint<S: Into<String>, H: Into<String>>(
        &mut self,
        message: S,
        hint: H,
    ) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: Some(hint.into()),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn extend(&mut self, other: ConfigWarnings) {
        self.items.extend(other.items);
    }
}

/// Clamps values the controller cannot run with and reports questionable
/// ones. Never fails: every problem found here has a safe fallback.
pub fn apply_guard_rails(config: &mut Config) -> ConfigWarnings {
    let mut warnings = ConfigWarnings::default();

    if config.controller.max_concurrent_reconciles == 0 {
        config.controller.max_concurrent_reconciles = 1;
        warnings.push_with_hint(
            "max_concurrent_reconciles was 0; using 1",
            "Set TFREQ_MAX_CONCURRENT_RECONCILES to a positive number",
        );
    }

    if config.controller.requeue_delay == Duration::ZERO {
        warnings.push_with_hint(
            "requeue_delay is 0; transient failures will be retried without pause",
            "A few seconds keeps retries from hammering the API server",
        );
    }

    if config.controller.running_poll_interval == Duration::ZERO {
        warnings.push(
            "running_poll_interval is 0; running requests are re-checked in a tight loop",
        );
    }

    if config.job.image_tag == "latest" {
        warnings.push_with_hint(
            "job image tag is `latest`; runs are not reproducible",
            "Pin TFREQ_JOB_IMAGE_TAG to a Terraform release",
        );
    }

    warnings
}
