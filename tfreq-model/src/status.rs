use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Observed lifecycle state of a `TerraformRequest`.
///
/// States only move forward: `"" -> Running -> {Applied, Failed}`. The two
/// terminal states are absorbing; running a request again requires a new
/// request identity.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    JsonSchema,
)]
pub enum AppliedStatus {
    /// Nothing has been launched for the request yet.
    #[default]
    #[serde(rename = "")]
    Unset,
    Running,
    Applied,
    Failed,
}

impl AppliedStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppliedStatus::Unset => "",
            AppliedStatus::Running => "Running",
            AppliedStatus::Applied => "Applied",
            AppliedStatus::Failed => "Failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AppliedStatus::Applied | AppliedStatus::Failed)
    }

    /// Whether moving from `self` to `next` respects the forward-only
    /// lattice. Staying in place is always allowed.
    pub fn can_transition_to(&self, next: AppliedStatus) -> bool {
        if *self == next {
            return true;
        }
        match self {
            AppliedStatus::Unset => matches!(next, AppliedStatus::Running),
            AppliedStatus::Running => next.is_terminal(),
            AppliedStatus::Applied | AppliedStatus::Failed => false,
        }
    }
}

impl fmt::Display for AppliedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppliedStatus::Unset => write!(f, "<unset>"),
            other => f.write_str(other.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_values_match_status_field() {
        assert_eq!(serde_json::to_string(&AppliedStatus::Unset).unwrap(), "\"\"");
        let parsed: AppliedStatus = serde_json::from_str("\"Failed\"").unwrap();
        assert_eq!(parsed, AppliedStatus::Failed);
        assert!(serde_json::from_str::<AppliedStatus>("\"Pending\"").is_err());
    }

    #[test]
    fn terminal_states_are_absorbing() {
        for terminal in [AppliedStatus::Applied, AppliedStatus::Failed] {
            assert!(terminal.is_terminal());
            assert!(!terminal.can_transition_to(AppliedStatus::Unset));
            assert!(!terminal.can_transition_to(AppliedStatus::Running));
            assert!(terminal.can_transition_to(terminal));
        }
        assert!(!AppliedStatus::Applied.can_transition_to(AppliedStatus::Failed));
    }

    #[test]
    fn forward_edges_only() {
        use AppliedStatus::*;
        assert!(Unset.can_transition_to(Running));
        assert!(!Unset.can_transition_to(Applied));
        assert!(!Unset.can_transition_to(Failed));
        assert!(Running.can_transition_to(Applied));
        assert!(Running.can_transition_to(Failed));
        assert!(!Running.can_transition_to(Unset));
    }
}
