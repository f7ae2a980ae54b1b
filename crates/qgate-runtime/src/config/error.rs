//! Configuration errors.

use std::path::PathBuf;

use thiserror::Error;

/// Why a configuration could not be loaded or was rejected.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// An explicitly requested file does not exist.
    #[error("Configuration file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// The file extension is unknown or its format feature is disabled.
    #[error("Unsupported configuration format: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    /// A source could not be read or a value has the wrong shape.
    #[error("Failed to load configuration: {0}")]
    Load(#[source] Box<figment::Error>),

    /// A required value is empty or absent.
    #[error("Missing required configuration field: {0}")]
    MissingField(&'static str),

    /// A value is present but unusable.
    #[error("Invalid `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },

    /// An intent name that matches no known flag.
    #[error("Unknown intent: {0}")]
    UnknownIntent(String),
}

impl ConfigError {
    /// Rejects `field` with `reason`.
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }

    /// The offending field, when the error is about a single value.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            Self::MissingField(field) | Self::Invalid { field, .. } => Some(*field),
            _ => None,
        }
    }
}

impl From<figment::Error> for ConfigError {
    fn from(error: figment::Error) -> Self {
        Self::Load(Box::new(error))
    }
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
