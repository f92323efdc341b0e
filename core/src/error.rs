//! Error taxonomy (§7). Modernized from the teacher's `error_chain!` block onto `thiserror`,
//! matching how the rest of the retrieval pack shapes fallible subsystems.

use thiserror::Error;

/// A payload (request, response, or event) failed its descriptor's validator (§7.1).
#[derive(Debug, Error, Clone)]
#[error("validation failed for channel '{channel}': {message}")]
pub struct ValidationError {
    pub channel: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(channel: impl Into<String>, message: impl Into<String>) -> Self {
        ValidationError {
            channel: channel.into(),
            message: message.into(),
        }
    }
}

/// A middleware in the inbound or outbound pipeline failed (§4.3, §7).
#[derive(Debug, Error, Clone)]
#[error("middleware error: {0}")]
pub struct MiddlewareError(pub String);

/// Frame could not be turned into an `Envelope` (§7.6): not decodable, or not a JSON object.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("frame was not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("frame did not decode to a JSON object")]
    NotAnObject,
}

/// Errors surfaced by a `Transport` implementation (§6.1, §7.5).
#[derive(Debug, Error)]
#[error("transport error: {0}")]
pub struct TransportError(pub String);

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        TransportError(message.into())
    }
}

/// The error type surfaced to an RPC caller (§7). Every numbered error kind in §7 that can
/// reach the application boundary is a variant here.
#[derive(Debug, Error, Clone)]
pub enum RpcError {
    /// §7.1 — request validation failed before send, or response validation failed on receipt.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// §7.2/§7.3 — a received `rpc_err` envelope, reconstructed from its `code`/`m` fields.
    /// Covers both "unknown method" (code `NOT_FOUND`) and "handler failure" (the handler's
    /// error message, no code) from the caller's point of view — both are just the peer
    /// reporting that this call did not succeed.
    #[error("{message}")]
    Remote { code: Option<String>, message: String },

    /// §7.4 — the call exceeded its configured timeout.
    #[error("RPC call to '{method}' timed out after {timeout_ms}ms")]
    Timeout { method: String, timeout_ms: u64 },

    /// §7.5 — the transport rejected the send, or closed while the call was outstanding.
    #[error("transport failure: {0}")]
    Transport(String),

    /// §4.5.5 / §7.5 — the runtime was closed while this call was outstanding.
    #[error("runtime closed")]
    Shutdown,

    /// A middleware on the outbound path rejected the send (§4.3).
    #[error(transparent)]
    Middleware(#[from] MiddlewareError),
}

impl From<TransportError> for RpcError {
    fn from(e: TransportError) -> Self {
        RpcError::Transport(e.0)
    }
}

/// Wire error code for an inbound `rpc_req` whose channel has no registered handler (§4.5.3, §7.2).
pub const NOT_FOUND_CODE: &str = "NOT_FOUND";

/// Wire error code for a request or response that failed contract validation (§4.2).
pub const VALIDATION_FAILED_CODE: &str = "VALIDATION_FAILED";

impl RpcError {
    pub fn not_found(method: impl AsRef<str>) -> Self {
        RpcError::Remote {
            code: Some(NOT_FOUND_CODE.to_string()),
            message: format!("Method not found: {}", method.as_ref()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_message_contains_method_not_found() {
        let err = RpcError::not_found("missing");
        assert!(err.to_string().contains("Method not found"));
        assert_eq!(
            match &err {
                RpcError::Remote { code, .. } => code.clone(),
                _ => None,
            },
            Some(NOT_FOUND_CODE.to_string())
        );
    }

    #[test]
    fn timeout_message_names_method() {
        let err = RpcError::Timeout { method: "slow".into(), timeout_ms: 50 };
        assert!(err.to_string().contains("slow"));
    }
}
