//! Error types for guard expressions

use thiserror::Error;

/// Guard compilation and evaluation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GuardError {
    #[error("syntax error at offset {offset}: {message}")]
    Syntax { offset: usize, message: String },

    #[error("unknown attribute '{0}'")]
    UnknownAttribute(String),

    #[error("'{0}' is list-valued and may only appear on the right of 'in'")]
    ListOutsideIn(String),

    #[error("right side of 'in' must be a list")]
    InRequiresList,

    #[error("expression nests deeper than {0} levels")]
    TooDeep(usize),

    #[error("attribute '{0}' has no value in this request")]
    MissingAttribute(String),
}

impl GuardError {
    pub(crate) fn syntax(offset: usize, message: impl Into<String>) -> Self {
        Self::Syntax {
            offset,
            message: message.into(),
        }
    }

    /// Whether this error can only happen at evaluation time
    pub fn is_runtime(&self) -> bool {
        matches!(self, Self::MissingAttribute(_))
    }
}

/// Result type for guard operations
pub type Result<T> = std::result::Result<T, GuardError>;
