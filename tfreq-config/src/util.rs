use std::time::Duration;

use crate::loader::error::ConfigLoadError;

/// Parse a human-readable duration such as `5s` or `1m 30s`.
pub fn parse_duration(
    origin: &str,
    raw: &str,
) -> Result<Duration, ConfigLoadError> {
    humantime::parse_duration(raw.trim()).map_err(|err| {
        ConfigLoadError::InvalidValue {
            origin: origin.to_string(),
            value: raw.to_string(),
            reason: err.to_string(),
        }
    })
}

pub fn parse_usize(origin: &str, raw: &str) -> Result<usize, ConfigLoadError> {
    raw.trim()
        .parse()
        .map_err(|err: std::num::ParseIntError| ConfigLoadError::InvalidValue {
            origin: origin.to_string(),
            value: raw.to_string(),
            reason: err.to_string(),
        })
}

/// Treats blank values as unset.
pub fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_accept_humantime_forms() {
        assert_eq!(
            parse_duration("test", "5s").unwrap(),
            Duration::from_secs(5)
        );
        assert_eq!(
            parse_duration("test", " 1m 30s ").unwrap(),
            Duration::from_secs(90)
        );
    }

    #[test]
    fn invalid_values_name_their_origin() {
        let err = parse_duration("TFREQ_REQUEUE_DELAY", "soon").unwrap_err();
        assert!(err.to_string().contains("TFREQ_REQUEUE_DELAY"));

        let err = parse_usize("controller.max_concurrent_reconciles", "-1")
            .unwrap_err();
        assert!(err.to_string().contains("max_concurrent_reconciles"));
    }

    #[test]
    fn blank_values_count_as_unset() {
        assert_eq!(non_empty(Some("  ".into())), None);
        assert_eq!(non_empty(Some("x".into())), Some("x".into()));
    }
}
