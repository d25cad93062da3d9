//! Shared configuration library for the TerraformRequest operator.
//!
//! Settings come from, in order of precedence: command-line overrides applied
//! by the binary, environment variables (optionally seeded from `.env`), a TOML
//! file, and built-in defaults.

pub mod loader;
pub mod models;
pub mod util;
pub mod validation;

pub use loader::{ConfigLoad, ConfigLoader, error::ConfigLoadError};
pub use models::{
    Config, ConfigMetadata, ControllerConfig, JobConfig, LogConfig,
};
pub use validation::{ConfigWarning, ConfigWarnings};
