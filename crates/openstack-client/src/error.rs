//! OpenStack client errors

use reqwest::StatusCode;
use thiserror::Error;

/// Errors that can occur when interacting with the Octavia or Neutron APIs
#[derive(Debug, Error)]
pub enum OpenStackError {
    /// HTTP transport error (connection refused, timeout, TLS, ...)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Resource not found (404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Resource conflict (409)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Request rejected as malformed or not allowed in the current state (400)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Any other non-success status returned by the API
    #[error("API error {status}: {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Response body or context
        message: String,
    },

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The API answered with a body that does not have the expected shape
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Closed set of outcome kinds a backend failure is classified into.
///
/// Callers dispatch on this instead of re-parsing status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseClass {
    /// 404
    NotFound,
    /// 409
    Conflict,
    /// 400
    BadRequest,
    /// 5xx
    ServerError,
    /// Any other 4xx
    ClientError,
    /// The request never produced a response, or the response was unreadable
    Transport,
}

impl OpenStackError {
    /// Build an error from a non-success HTTP status
    pub fn from_status(status: StatusCode, context: &str, body: &str) -> Self {
        let message = if body.is_empty() {
            context.to_string()
        } else {
            format!("{} - {}", context, body)
        };
        match status {
            StatusCode::NOT_FOUND => OpenStackError::NotFound(message),
            StatusCode::CONFLICT => OpenStackError::Conflict(message),
            StatusCode::BAD_REQUEST => OpenStackError::BadRequest(message),
            _ => OpenStackError::Api {
                status: status.as_u16(),
                message,
            },
        }
    }

    /// HTTP status code carried by this error, if any
    pub fn status_code(&self) -> Option<u16> {
        match self {
            OpenStackError::NotFound(_) => Some(404),
            OpenStackError::Conflict(_) => Some(409),
            OpenStackError::BadRequest(_) => Some(400),
            OpenStackError::Api { status, .. } => Some(*status),
            OpenStackError::Http(e) => e.status().map(|s| s.as_u16()),
            OpenStackError::Serialization(_) | OpenStackError::InvalidResponse(_) => None,
        }
    }

    /// Classify this error into a [`ResponseClass`]
    pub fn class(&self) -> ResponseClass {
        match self.status_code() {
            Some(404) => ResponseClass::NotFound,
            Some(409) => ResponseClass::Conflict,
            Some(400) => ResponseClass::BadRequest,
            Some(code) if code >= 500 => ResponseClass::ServerError,
            Some(_) => ResponseClass::ClientError,
            None => ResponseClass::Transport,
        }
    }

    /// Shorthand for `class() == ResponseClass::NotFound`
    pub fn is_not_found(&self) -> bool {
        self.class() == ResponseClass::NotFound
    }

    /// Shorthand for `class() == ResponseClass::Conflict`
    pub fn is_conflict(&self) -> bool {
        self.class() == ResponseClass::Conflict
    }

    /// Whether a failed create may still have created the resource.
    ///
    /// Octavia answers some duplicate creates with a plain 500 instead of 409.
    pub fn is_maybe_exists(&self) -> bool {
        match self.class() {
            ResponseClass::Conflict => true,
            ResponseClass::ServerError => self.status_code() == Some(500),
            _ => false,
        }
    }
}
