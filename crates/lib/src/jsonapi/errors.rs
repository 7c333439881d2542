//! Error types for the network adapter.

use thiserror::Error;

use super::document::ErrorObject;

/// Errors surfaced by network operations.
///
/// Every failure path of a request funnels through here: transport
/// breakage, non-success HTTP statuses and error payloads inside an
/// otherwise successful response. Local mutation never happens once one of
/// these is raised.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum NetworkError {
    /// The server answered with a non-success status.
    #[error("Request failed with status {status}")]
    Http {
        status: u16,
        /// Error objects carried in the response body, if any.
        errors: Vec<ErrorObject>,
    },

    /// A success response carried an error payload in its document.
    #[error("Server returned {} error object(s)", .errors.len())]
    Api { errors: Vec<ErrorObject> },

    /// The request never produced a response.
    #[error("Transport failure: {reason}")]
    Transport { reason: String },

    /// The response body was not a parseable document.
    #[error("Malformed response document: {reason}")]
    Document { reason: String },
}

impl NetworkError {
    /// Check if the server rejected the request, via status or payload.
    pub fn is_rejection(&self) -> bool {
        matches!(self, NetworkError::Http { .. } | NetworkError::Api { .. })
    }

    /// Check if the request failed before a response arrived.
    pub fn is_transport_error(&self) -> bool {
        matches!(self, NetworkError::Transport { .. })
    }

    /// The HTTP status, when one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            NetworkError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Error objects from the response, empty for transport failures.
    pub fn error_objects(&self) -> &[ErrorObject] {
        match self {
            NetworkError::Http { errors, .. } | NetworkError::Api { errors } => errors,
            _ => &[],
        }
    }
}

// Conversion to the main Error type
impl From<NetworkError> for crate::Error {
    fn from(err: NetworkError) -> Self {
        crate::Error::Network(err)
    }
}
