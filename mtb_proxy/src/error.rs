//! Error types for the differential-testing proxy.

use thiserror::Error;

/// Errors raised while building a proxy, recording calls or replaying a log.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The capability-set descriptor does not describe a usable interface
    #[error("Invalid capability set {name}: {reason}")]
    InvalidCapabilitySet { name: String, reason: String },

    /// A proxy was requested over zero implementations
    #[error("Proxy for {0} needs at least one implementation")]
    NoImplementations(String),

    /// An argument could not be serialized into the call log
    #[error("Cannot record argument {param} of {operation}: {source}")]
    Capture {
        operation: String,
        param: String,
        #[source]
        source: serde_json::Error,
    },

    /// A logged argument could not be decoded back into its parameter type
    #[error("Cannot decode argument {param} of {operation}: {source}")]
    Decode {
        operation: String,
        param: String,
        #[source]
        source: serde_json::Error,
    },

    /// A logged call carries the wrong number of arguments
    #[error("Operation {operation} expects {expected} argument(s), got {got}")]
    Arity {
        operation: String,
        expected: usize,
        got: usize,
    },

    /// A logged call names an operation the capability set does not have
    #[error("Unknown operation: {0}")]
    UnknownOperation(String),

    /// An implementation was already borrowed when the proxy tried to forward
    #[error("Implementation #{index} is busy while mirroring {operation}")]
    Busy { operation: String, index: usize },

    /// Reading or writing an exported log failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An exported log is not valid JSON
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ProxyError {
    /// Creates an invalid capability set error.
    pub fn invalid(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidCapabilitySet {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Creates an arity error.
    pub fn arity(operation: impl Into<String>, expected: usize, got: usize) -> Self {
        Self::Arity {
            operation: operation.into(),
            expected,
            got,
        }
    }
}
