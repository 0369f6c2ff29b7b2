use thiserror::Error;

/// Outcome of a failed round trip to the todo service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error("Not found: {0}")]
    NotFound(String),

    /// The token was rejected (expired, invalid, or lacks access).
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Upstream returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Failed to decode upstream response: {0}")]
    Decode(String),

    #[error("Client misconfigured: {0}")]
    Config(String),
}

impl ServiceError {
    /// HTTP status associated with this error, when one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            ServiceError::NotFound(_) => Some(404),
            ServiceError::Upstream { status, .. } => Some(*status),
            _ => None,
        }
    }
}
