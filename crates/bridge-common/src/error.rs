//! Error types for the model catalog bridge
//!
//! Errors are structured with fields so a log line is enough to locate the
//! failing registry endpoint, storage key or deployment.

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for bridge operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Input that can never succeed without a change by the caller
    #[error("validation error for {subject}: {message}")]
    Validation {
        /// What was being validated (a key, a name, a config entry)
        subject: String,
        /// Description of what's invalid
        message: String,
    },

    /// Model registry endpoint error
    #[error("registry error [{endpoint}]: {message}")]
    Registry {
        /// Base URL of the registry endpoint
        endpoint: String,
        /// Description of what failed
        message: String,
        /// HTTP status returned by the registry, if any
        status: Option<u16>,
    },

    /// Storage tier error
    #[error("storage error for {key}: {message}")]
    Storage {
        /// Import key (or key list) being written
        key: String,
        /// Description of what failed
        message: String,
        /// HTTP status returned by the storage tier, if any
        status: Option<u16>,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// The format being produced or parsed (if known)
        format: Option<String>,
    },

    /// Configuration error
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of what's wrong
        message: String,
    },

    /// The operation was cancelled before it finished
    #[error("cancelled: {operation}")]
    Cancelled {
        /// Operation that observed the cancellation
        operation: String,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g., "reconciler", "full-pass")
        context: String,
    },
}

impl Error {
    /// Create a validation error without a specific subject
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            subject: UNKNOWN_CONTEXT.to_string(),
            message: msg.into(),
        }
    }

    /// Create a validation error about a specific subject
    pub fn validation_for(subject: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            subject: subject.into(),
            message: msg.into(),
        }
    }

    /// Create a registry error for an endpoint
    pub fn registry(endpoint: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Registry {
            endpoint: endpoint.into(),
            message: msg.into(),
            status: None,
        }
    }

    /// Create a registry error carrying the HTTP status the endpoint returned
    pub fn registry_status(
        endpoint: impl Into<String>,
        status: u16,
        msg: impl Into<String>,
    ) -> Self {
        Self::Registry {
            endpoint: endpoint.into(),
            message: msg.into(),
            status: Some(status),
        }
    }

    /// Create a storage error for a key
    pub fn storage(key: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Storage {
            key: key.into(),
            message: msg.into(),
            status: None,
        }
    }

    /// Create a storage error carrying the HTTP status the storage tier returned
    pub fn storage_status(key: impl Into<String>, status: u16, msg: impl Into<String>) -> Self {
        Self::Storage {
            key: key.into(),
            message: msg.into(),
            status: Some(status),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            format: None,
        }
    }

    /// Create a serialization error for a specific output format
    pub fn serialization_for_format(format: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            format: Some(format.into()),
        }
    }

    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration {
            message: msg.into(),
        }
    }

    /// Create a cancellation error for an operation
    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }

    /// Create an internal error with the given message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: UNKNOWN_CONTEXT.to_string(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Check if this error is retryable
    ///
    /// Validation, serialization and configuration errors need a change from
    /// the caller. Remote errors are retryable unless the remote answered
    /// with a 4xx status.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => !matches!(
                source,
                kube::Error::Api(ae) if (400..500).contains(&ae.code)
            ),
            Error::Validation { .. } => false,
            Error::Registry { status, .. } | Error::Storage { status, .. } => {
                !matches!(status, Some(code) if (400..500).contains(code))
            }
            Error::Serialization { .. } => false,
            Error::Configuration { .. } => false,
            Error::Cancelled { .. } => false,
            Error::Internal { .. } => true,
        }
    }

    /// HTTP status attached to a remote error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Registry { status, .. } | Error::Storage { status, .. } => *status,
            Error::Kube {
                source: kube::Error::Api(ae),
            } => Some(ae.code),
            _ => None,
        }
    }

    /// Whether this is a Kubernetes "not found" response
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::Kube {
                source: kube::Error::Api(ae)
            } if ae.code == 404
        )
    }
}
