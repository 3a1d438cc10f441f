//! Error types for the authorization engine

use thiserror::Error;

use crate::engine::SecurityCheckResponse;
use crate::guard::GuardError;

/// Authorization engine errors
#[derive(Debug, Error)]
pub enum AuthzError {
    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Principal or resource context missing at decision time
    #[error("Missing {0} context: a decision requires both principal and resource")]
    MissingContext(&'static str),

    /// Invalid rule definition
    #[error("Invalid rule '{name}': {reason}")]
    InvalidRule { name: String, reason: String },

    /// Guard expression failed to compile
    #[error("Invalid guard on rule '{rule}': {source}")]
    InvalidGuard {
        rule: String,
        #[source]
        source: GuardError,
    },

    /// A rule template expanded to nothing
    #[error("Rule template '{0}' expanded to zero rules")]
    EmptyExpansion(String),

    /// The computed decision was DENY
    #[error("Access denied: {}", .0.summary())]
    AccessDenied(Box<SecurityCheckResponse>),

    /// Filter string references a variable that has no value
    #[error("Filter variable '${{{variable}}}' in rule '{rule}' cannot be resolved")]
    UnresolvedFilterVariable { rule: String, variable: String },

    /// Policy not found
    #[error("Policy not found: {0}")]
    PolicyNotFound(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// YAML parse error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AuthzError {
    /// Response attached to an access-denied error, if any
    pub fn denied_response(&self) -> Option<&SecurityCheckResponse> {
        match self {
            Self::AccessDenied(response) => Some(response),
            _ => None,
        }
    }

    /// Whether this error means the index must not be activated
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidRule { .. }
                | Self::InvalidGuard { .. }
                | Self::EmptyExpansion(_)
                | Self::Yaml(_)
                | Self::Config(_)
        )
    }
}

/// Result type for authorization operations
pub type Result<T> = std::result::Result<T, AuthzError>;
