//! Settings error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading or validating settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// An explicitly requested settings file does not exist.
    #[error("settings file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// A layer could not be parsed or did not match the schema.
    #[error("failed to load settings: {0}")]
    Load(Box<figment::Error>),

    /// A value is out of range.
    #[error("invalid setting `{field}`: {reason}")]
    Invalid {
        /// Dotted path of the offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: &'static str,
    },
}

impl From<figment::Error> for SettingsError {
    fn from(err: figment::Error) -> Self {
        Self::Load(Box::new(err))
    }
}

/// Convenience alias for settings results.
pub type Result<T> = std::result::Result<T, SettingsError>;
