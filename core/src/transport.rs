//! Transport contract consumed by the core (§6.1). Transports are thin, out-of-scope adapters;
//! this trait is the narrow seam they satisfy.

use async_trait::async_trait;

use crate::error::TransportError;

/// One received or sent frame. Textual transports (the canonical WebSocket case) carry `Text`;
/// transports that already deal in structured values (e.g. an in-process transport, or one atop
/// a binary `msgpack`/CBOR codec) can skip the JSON round-trip by carrying `Value` directly.
#[derive(Debug, Clone)]
pub enum Frame {
    Text(String),
    Value(serde_json::Value),
}

/// A minimal, reliable, ordered, message-framed link. Every adapter (WebSocket, WebRTC
/// DataChannel, WebTransport stream, or an in-process loopback for tests) implements this.
///
/// This collapses the distilled design's push-based `onMessage(handler) -> disposer` into a
/// pull-based `async fn recv`, per Design Note #3: the core's single inbound-dispatch task
/// `.await`s this directly instead of registering and later disposing a callback.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Accepts a frame for sending. The transport converts it to its wire representation.
    async fn send(&self, frame: Frame) -> Result<(), TransportError>;

    /// Awaits the next received frame. Returns `None` once the transport is permanently closed;
    /// duplicates are not deduplicated and at-least-once delivery is not acceptable (§6.1).
    async fn recv(&self) -> Option<Frame>;

    /// Terminates the underlying link. Idempotent.
    async fn close(&self, code: Option<u16>, reason: Option<String>) -> Result<(), TransportError>;

    /// Current open/closed status.
    fn is_open(&self) -> bool;
}
