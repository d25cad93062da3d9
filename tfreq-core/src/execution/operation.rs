use std::{fmt, str::FromStr};

use crate::error::ControllerError;

/// Terraform subcommands a request may ask for.
///
/// The value ends up inside a `/bin/sh -c` pipeline, so only these literal
/// words are ever interpolated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TerraformOperation {
    Apply,
    Plan,
    Destroy,
}

impl TerraformOperation {
    pub fn all() -> &'static [Self] {
        &[
            TerraformOperation::Apply,
            TerraformOperation::Plan,
            TerraformOperation::Destroy,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TerraformOperation::Apply => "apply",
            TerraformOperation::Plan => "plan",
            TerraformOperation::Destroy => "destroy",
        }
    }
}

impl FromStr for TerraformOperation {
    type Err = ControllerError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        Self::all()
            .iter()
            .copied()
            .find(|op| op.as_str() == trimmed)
            .ok_or_else(|| ControllerError::InvalidOperation(raw.to_string()))
    }
}

impl fmt::Display for TerraformOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
