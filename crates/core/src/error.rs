//! Error types for the TodoClaw domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error type; tool-level failures live in
//! [`crate::tool::ToolFailure`] because they travel over the wire.

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

/// Failures of the tool channel itself. Every variant is fatal to the run
/// that owns the channel.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Failed to spawn tool process: {0}")]
    Spawn(String),

    #[error("Tool process did not answer the handshake within {timeout_ms}ms")]
    HandshakeTimeout { timeout_ms: u64 },

    #[error("Tool process exited: {detail}")]
    ProcessExited { detail: String },

    #[error("Tool call {call_id} timed out after {timeout_ms}ms")]
    CallTimeout { call_id: String, timeout_ms: u64 },

    #[error("Protocol violation: {reason}")]
    ProtocolViolation {
        reason: String,
        /// The offending bytes, kept for diagnostics only.
        raw: String,
    },

    #[error("Channel is no longer usable")]
    Unusable,

    #[error("Pipe I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

impl ChannelError {
    pub fn protocol(reason: impl Into<String>, raw: impl Into<String>) -> Self {
        Self::ProtocolViolation {
            reason: reason.into(),
            raw: raw.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = ProviderError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        };
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn channel_error_displays_correctly() {
        let err = ChannelError::CallTimeout {
            call_id: "call_7".into(),
            timeout_ms: 15_000,
        };
        assert!(err.to_string().contains("call_7"));
        assert!(err.to_string().contains("15000ms"));
    }

    #[test]
    fn protocol_violation_keeps_raw_payload_out_of_display() {
        let err = ChannelError::protocol("undecodable frame", "{not json");
        assert_eq!(err.to_string(), "Protocol violation: undecodable frame");
        match err {
            ChannelError::ProtocolViolation { raw, .. } => assert_eq!(raw, "{not json"),
            _ => panic!("Expected ProtocolViolation"),
        }
    }
}
