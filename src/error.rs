//! Errors.

use thiserror::Error;

/// Errors that may occur while resolving, loading, or mounting views.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Insufficient or contradictory setup: a missing layout, a missing name, or a declaration of
    /// the wrong shape.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A view class or a remote resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A structured resource could not be parsed.
    #[error("malformed {resource}: {message}")]
    Format {
        /// What was being parsed.
        resource: String,
        /// The parser’s complaint.
        message: String,
    },

    /// No DOM target could be resolved, or component markup has no single root element.
    ///
    /// These are logged rather than raised; a view without a mount point is simply not shown.
    #[error("mount error: {0}")]
    Mount(String),
}

impl Error {
    pub(crate) fn configuration(message: impl Into<String>) -> Error {
        Error::Configuration(message.into())
    }

    pub(crate) fn format(resource: impl Into<String>, message: impl ToString) -> Error {
        Error::Format {
            resource: resource.into(),
            message: message.to_string(),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
