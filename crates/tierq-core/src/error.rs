use thiserror::Error;

/// Canonical error type shared by every TierQ crate.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A query referenced a table that is not in the metadata registry.
    #[error("table `{name}` is not registered")]
    UnknownTable {
        /// Name of the missing table.
        name: String,
    },

    /// An external collaborator (parser, engine, catalog, transfer) failed.
    #[error("{service} failed: {message}")]
    ExternalService {
        /// Collaborator name (e.g. `"remote-engine"`).
        service: &'static str,
        /// Human-readable failure description.
        message: String,
    },

    /// Invalid paths, credentials or identifiers supplied at construction time.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Input rejected before reaching any collaborator.
    #[error("validation error: {0}")]
    Validation(String),

    /// Operation violates current state machine rules.
    #[error("invalid state: {message}")]
    InvalidState {
        /// Human-readable explanation of the invalid state.
        message: String,
    },

    /// Unexpected internal error occurred.
    #[error("internal error: {message}")]
    Internal {
        /// Human-readable details for debugging purposes.
        message: String,
    },

    /// I/O error from local storage.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// Creates an `UnknownTable` variant.
    #[must_use]
    pub fn unknown_table(name: impl Into<String>) -> Self {
        Self::UnknownTable { name: name.into() }
    }

    /// Creates an `ExternalService` variant.
    #[must_use]
    pub fn external(service: &'static str, message: impl ToString) -> Self {
        Self::ExternalService {
            service,
            message: message.to_string(),
        }
    }

    /// Creates an `InvalidState` variant.
    #[must_use]
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Creates an `Internal` variant.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true for errors raised by an external collaborator.
    #[must_use]
    pub fn is_external(&self) -> bool {
        matches!(self, Self::ExternalService { .. })
    }
}

impl From<config::ConfigError> for CoreError {
    fn from(err: config::ConfigError) -> Self {
        Self::Configuration(err.to_string())
    }
}

/// Convenient result alias for TierQ operations.
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_table_message() {
        let err = CoreError::unknown_table("web_page");
        assert_eq!(err.to_string(), "table `web_page` is not registered");
        assert!(!err.is_external());
    }

    #[test]
    fn test_external_message() {
        let err = CoreError::external("transfer", "bucket not found");
        assert_eq!(err.to_string(), "transfer failed: bucket not found");
        assert!(err.is_external());
    }

    #[test]
    fn test_config_error_conversion() {
        let err: CoreError = config::ConfigError::Message("bad".to_string()).into();
        assert!(matches!(err, CoreError::Configuration(_)));
    }
}
