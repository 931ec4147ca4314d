//! Error types.
//!
//! Three layers, three types:
//!
//! - [`Error`]: infrastructure failures such as binding a port.
//! - [`ProcedureError`]: what a handler or middleware returns when it fails.
//! - [`DispatchError`]: the router's classification of a failed request. It
//!   is the only place a failure becomes an HTTP status.
//!
//! Application-level outcomes (401 from an auth middleware, say) are plain
//! [`Response`] values, not errors.

use http::StatusCode;
use serde_json::json;
use thiserror::Error;

use crate::response::Response;
use crate::schema::FieldError;

/// The error type returned by the server's fallible operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid socket address `{0}`")]
    InvalidAddress(String),
}

/// A failure raised by a procedure handler or a middleware.
///
/// `Validation` is the schema layer's error: it reaches the caller as a 400
/// with the structured field list. Everything else is `Internal` and reaches
/// the caller as an opaque 500.
#[derive(Debug, Error)]
pub enum ProcedureError {
    #[error("input validation failed ({} issue(s))", .0.len())]
    Validation(Vec<FieldError>),

    #[error(transparent)]
    Internal(Box<dyn std::error::Error + Send + Sync + 'static>),
}

impl ProcedureError {
    /// An internal error carrying only a message.
    ///
    /// ```rust
    /// use minirpc::ProcedureError;
    ///
    /// let err = ProcedureError::msg("User not found");
    /// assert_eq!(err.to_string(), "User not found");
    /// ```
    pub fn msg(message: impl Into<String>) -> Self {
        let message: String = message.into();
        Self::Internal(message.into())
    }

    /// Wraps any error as an internal failure.
    pub fn internal<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Internal(Box::new(err))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

/// Handler input is decoded with serde after the schema ran, so a decode
/// failure is a schema-layer failure, not an internal one.
impl From<serde_json::Error> for ProcedureError {
    fn from(err: serde_json::Error) -> Self {
        Self::Validation(vec![FieldError::from_serde(&err)])
    }
}

/// Why a request did not produce a handler result.
#[derive(Debug, Error)]
pub(crate) enum DispatchError {
    #[error("procedure `{0}` not found")]
    NotFound(String),

    #[error("request body is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    #[error("input validation failed ({} issue(s))", .0.len())]
    Validation(Vec<FieldError>),

    #[error("internal error: {0}")]
    Internal(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),
}

impl DispatchError {
    pub(crate) fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidJson(_) | Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The one place a failure turns into a wire response. Internal details
    /// never leave the process.
    pub(crate) fn into_response(self) -> Response {
        let status = self.status();
        match self {
            Self::NotFound(_) => Response::error(status, json!("Not found")),
            Self::InvalidJson(_) => Response::error(status, json!("Invalid JSON")),
            Self::Validation(issues) => Response::error(status, json!(issues)),
            Self::Internal(_) => Response::error(status, json!("Unknown error")),
        }
    }
}

impl From<ProcedureError> for DispatchError {
    fn from(err: ProcedureError) -> Self {
        match err {
            ProcedureError::Validation(issues) => Self::Validation(issues),
            ProcedureError::Internal(inner) => Self::Internal(inner),
        }
    }
}
