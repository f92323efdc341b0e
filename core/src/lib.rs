//! Kataribe core: a transport-agnostic, contract-driven bidirectional RPC + event envelope
//! runtime. See `SPEC_FULL.md` at the repository root for the full design.
//!
//! Five cooperating pieces, bottom-up (§2):
//! 1. [`envelope`] — the wire envelope.
//! 2. [`contract`] — declarative RPC/event descriptors with validators.
//! 3. [`middleware`] — the ordered pre-send/post-receive pipeline.
//! 4. [`pending`] — the outbound RPC correlation table.
//! 5. [`client`]/[`server`] — the two peer runtimes, built on the shared [`engine`].
//!
//! Transports are out of scope for this crate beyond the narrow [`transport::Transport`] seam
//! they implement (§1, §6.1).

mod client;
mod config;
mod contract;
mod engine;
mod envelope;
mod error;
mod id;
mod logger;
mod middleware;
mod pending;
mod server;
mod transport;

pub use client::ClientRuntime;
pub use config::RuntimeConfig;
pub use contract::{event, rpc, Contract, ContractBuilder, EventDescriptor, RpcDescriptor, Validator};
pub use engine::{EventHandlerFn, EventSink, FixedEventSink, RpcHandlerFn, RpcHandlerMap};
pub use envelope::{Envelope, EnvelopeKind, Payload};
pub use error::{
    EnvelopeError, MiddlewareError, RpcError, TransportError, ValidationError, NOT_FOUND_CODE,
    VALIDATION_FAILED_CODE,
};
pub use id::{IdGenerator, SharedIdGenerator, UuidV4Generator};
pub use logger::{LogRecord, Logger, RecordingLogger, SharedLogger, TracingLogger};
pub use middleware::{Direction, Middleware, MiddlewareContext, Pipeline};
pub use server::{Connection, ServerRuntime};
pub use transport::{Frame, Transport};
