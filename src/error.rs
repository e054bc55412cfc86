//! Error types and handling for the OpenEI rate sensors
//!
//! This module defines the error types used throughout the crate. The
//! coordinator relies on the variants to tell an absorbed condition (rate
//! limit, malformed plan data) apart from a failed update.

use thiserror::Error;

/// Result type alias for OpenEI operations
pub type Result<T> = std::result::Result<T, OpenEiError>;

/// Main error type for the OpenEI rate sensors
#[derive(Debug, Error)]
pub enum OpenEiError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Validation errors
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    /// File I/O errors
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// Network-related errors
    #[error("Network error: {message}")]
    Network { message: String },

    /// Errors reported by the OpenEI API
    #[error("API error: {message}")]
    Api { message: String },

    /// The OpenEI API refused the request because of its rate limit
    #[error("Rate limited: {message}")]
    RateLimited { message: String },

    /// Plan data that does not have the expected shape
    #[error("Malformed response: {message}")]
    MalformedResponse { message: String },

    /// Entry cannot be set up yet; the host should retry later
    #[error("Entry not ready: {message}")]
    NotReady { message: String },

    /// A refresh cycle failed; the last good data is still served
    #[error("Update failed: {message}")]
    UpdateFailed { message: String },

    /// Generic errors with context
    #[error("Error: {message}")]
    Generic { message: String },
}

impl OpenEiError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        OpenEiError::Config {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(field: S, message: S) -> Self {
        OpenEiError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        OpenEiError::Io {
            message: message.into(),
        }
    }

    /// Create a new network error
    pub fn network<S: Into<String>>(message: S) -> Self {
        OpenEiError::Network {
            message: message.into(),
        }
    }

    /// Create a new API error
    pub fn api<S: Into<String>>(message: S) -> Self {
        OpenEiError::Api {
            message: message.into(),
        }
    }

    /// Create a new rate-limit error
    pub fn rate_limited<S: Into<String>>(message: S) -> Self {
        OpenEiError::RateLimited {
            message: message.into(),
        }
    }

    /// Create a new malformed-response error
    pub fn malformed<S: Into<String>>(message: S) -> Self {
        OpenEiError::MalformedResponse {
            message: message.into(),
        }
    }

    /// Create a new not-ready error
    pub fn not_ready<S: Into<String>>(message: S) -> Self {
        OpenEiError::NotReady {
            message: message.into(),
        }
    }

    /// Create a new update-failed error
    pub fn update_failed<S: Into<String>>(message: S) -> Self {
        OpenEiError::UpdateFailed {
            message: message.into(),
        }
    }

    /// Create a new generic error
    pub fn generic<S: Into<String>>(message: S) -> Self {
        OpenEiError::Generic {
            message: message.into(),
        }
    }

    /// Whether this error is the upstream rate-limit signal
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, OpenEiError::RateLimited { .. })
    }

    /// Whether this error is the malformed-plan-data signal
    pub fn is_malformed(&self) -> bool {
        matches!(self, OpenEiError::MalformedResponse { .. })
    }
}

impl From<std::io::Error> for OpenEiError {
    fn from(err: std::io::Error) -> Self {
        OpenEiError::io(err.to_string())
    }
}

impl From<serde_yaml::Error> for OpenEiError {
    fn from(err: serde_yaml::Error) -> Self {
        OpenEiError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for OpenEiError {
    fn from(err: serde_json::Error) -> Self {
        OpenEiError::Serialization {
            message: err.to_string(),
        }
    }
}

#[cfg(feature = "http")]
impl From<reqwest::Error> for OpenEiError {
    fn from(err: reqwest::Error) -> Self {
        OpenEiError::network(err.to_string())
    }
}

impl From<chrono::ParseError> for OpenEiError {
    fn from(err: chrono::ParseError) -> Self {
        OpenEiError::validation("datetime".to_string(), err.to_string())
    }
}
