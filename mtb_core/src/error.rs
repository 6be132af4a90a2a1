//! Error types for the component model.

use mtb_proxy::ProxyError;
use thiserror::Error;

/// Errors raised by components, actions and ports.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Configuration or wiring defect, raised where the mistake is made
    #[error("Modeling error: {0}")]
    Modeling(String),

    /// No structural default can be synthesized for this type
    #[error("No structural default for type {0}")]
    UnsupportedDefault(String),

    /// The component exposes no action with this name
    #[error("Component {component} has no action {action}")]
    UnknownAction { component: String, action: String },

    /// Wrong number of arguments passed to an action
    #[error("Action {action} expects {expected} argument(s), got {got}")]
    Arity {
        action: String,
        expected: usize,
        got: usize,
    },

    /// An argument does not decode into the parameter's type
    #[error("Invalid value for {action} param {param}: {source}")]
    Argument {
        action: String,
        param: String,
        #[source]
        source: serde_json::Error,
    },

    /// The component's state is borrowed outside of its own handlers
    #[error("Component {0} is borrowed elsewhere and cannot run an action")]
    Reentrant(String),

    /// Feedback through the component's ports did not settle
    #[error("Component {component} received more than {limit} feedback deliveries in one invocation")]
    FeedbackLimit { component: String, limit: usize },

    /// The component behind an action or port has been dropped
    #[error("Component {0} no longer exists")]
    Detached(String),

    /// The action itself refused to run
    #[error("Action {action} rejected: {reason}")]
    Rejected { action: String, reason: String },

    /// Serializing a value or default failed
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Recording into a shared call log failed
    #[error(transparent)]
    Proxy(#[from] ProxyError),
}

impl ModelError {
    /// Creates a modeling error.
    pub fn modeling(msg: impl Into<String>) -> Self {
        Self::Modeling(msg.into())
    }

    /// Creates a rejection for `action`.
    pub fn rejected(action: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Rejected {
            action: action.into(),
            reason: reason.into(),
        }
    }

    /// Returns true for configuration/wiring defects.
    pub fn is_modeling(&self) -> bool {
        matches!(self, Self::Modeling(_))
    }
}
