//! Shared dispatcher behind both `ClientRuntime` and each server-side `Connection` (§4.5).
//!
//! Both runtimes share the same dispatcher structure; they differ only in which direction of
//! RPC they expose as outbound calls vs inbound requests (§4.5). This module implements that
//! shared structure exactly once; `Role` picks which half of the `Contract` is "mine to call"
//! vs "mine to answer".

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio::sync::RwLock;

use crate::contract::{Contract, RpcDescriptor};
use crate::envelope::{Envelope, EnvelopeKind, Payload};
use crate::error::{EnvelopeError, RpcError, VALIDATION_FAILED_CODE};
use crate::middleware::{Direction, Pipeline};
use crate::pending::PendingTable;
use crate::transport::{Frame, Transport};
use crate::RuntimeConfig;

/// A handler for one RPC channel: takes the (already request-validated) payload, returns the
/// (not yet response-validated) result payload or a human-readable failure message (§4.5.3,
/// §7.3 — the message becomes an `rpc_err`'s `m`).
pub type RpcHandlerFn = Arc<dyn Fn(Payload) -> BoxFuture<'static, Result<Payload, String>> + Send + Sync>;

/// A handler for one event channel.
pub type EventHandlerFn = Arc<dyn Fn(Payload) -> BoxFuture<'static, ()> + Send + Sync>;

pub type RpcHandlerMap = HashMap<String, RpcHandlerFn>;

/// Abstracts over how inbound events reach their handler(s): the client holds a dynamic,
/// subscribe/dispose registry (§4.5.4); the server holds a fixed map supplied at construction.
///
/// Note: handlers are `.await`ed directly with no `catch_unwind` boundary. §4.5.4's "an exception
/// in one [subscriber] does not prevent the others from running" holds for a handler returning an
/// error, but a handler that *panics* unwinds the whole per-connection dispatch task, not just
/// that one subscriber.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Invokes the handler(s) registered for `channel`, sequentially. Returns `false` if no
    /// handler is registered for `channel` (the caller then drops the event silently, §4.5.3).
    async fn dispatch(&self, channel: &str, payload: Payload) -> bool;

    /// Whether `channel` has at least one handler registered, without invoking anything. Used to
    /// decide *before* validating a payload whether there's anyone to deliver it to (§4.5.3: a
    /// channel with no handler is dropped silently, never validated).
    async fn has_handler(&self, channel: &str) -> bool;
}

/// Server-side event sink: one handler per channel, fixed at construction (§4.5.4).
pub struct FixedEventSink(pub HashMap<String, EventHandlerFn>);

#[async_trait]
impl EventSink for FixedEventSink {
    async fn dispatch(&self, channel: &str, payload: Payload) -> bool {
        match self.0.get(channel) {
            Some(handler) => {
                handler(payload).await;
                true
            }
            None => false,
        }
    }

    async fn has_handler(&self, channel: &str) -> bool {
        self.0.contains_key(channel)
    }
}

/// Which half of the contract this engine calls vs answers (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

impl Role {
    fn outbound_rpc<'a>(self, contract: &'a Contract) -> &'a HashMap<String, RpcDescriptor> {
        match self {
            Role::Client => &contract.rpc_to_server,
            Role::Server => &contract.rpc_to_client,
        }
    }

    fn inbound_rpc<'a>(self, contract: &'a Contract) -> &'a HashMap<String, RpcDescriptor> {
        match self {
            Role::Client => &contract.rpc_to_client,
            Role::Server => &contract.rpc_to_server,
        }
    }
}

pub struct Engine {
    pub(crate) role: Role,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) config: Arc<RuntimeConfig>,
    pub(crate) contract: Arc<Contract>,
    pub(crate) pending: Arc<PendingTable>,
    pub(crate) inbound_handlers: Arc<RpcHandlerMap>,
    pub(crate) event_sink: Arc<dyn EventSink>,
    pub(crate) pipeline: Pipeline,
    pub(crate) peer_features: RwLock<Vec<String>>,
}

impl Engine {
    pub fn new(
        role: Role,
        transport: Arc<dyn Transport>,
        config: Arc<RuntimeConfig>,
        contract: Arc<Contract>,
        inbound_handlers: Arc<RpcHandlerMap>,
        event_sink: Arc<dyn EventSink>,
    ) -> Arc<Self> {
        let pipeline = Pipeline::new(config.middlewares.clone());
        Arc::new(Engine {
            role,
            transport,
            config,
            contract,
            pending: Arc::new(PendingTable::new()),
            inbound_handlers,
            event_sink,
            pipeline,
            peer_features: RwLock::new(Vec::new()),
        })
    }

    /// Sends the initial advisory `hello` envelope (§4.5.1). Non-blocking: the runtime never
    /// waits for a matching `hello` from the peer.
    pub async fn send_hello(&self) {
        let mut envelope = Envelope::hello(self.config.version, self.config.features.clone());
        if let Err(e) = self.pipeline.run(Direction::Out, &mut envelope).await {
            self.config.logger.warn(&format!("hello middleware failed: {e}"));
            return;
        }
        if let Err(e) = self.send_envelope(envelope).await {
            self.config.logger.warn(&format!("failed to send hello: {e}"));
        }
    }

    /// The capability list most recently advertised by the peer's `hello`, if any (§9 "hello
    /// envelope has no defined negotiation semantics... expose `feat` to the application").
    pub async fn peer_features(&self) -> Vec<String> {
        self.peer_features.read().await.clone()
    }

    async fn send_envelope(&self, envelope: Envelope) -> Result<(), RpcError> {
        let json = serde_json::to_string(&envelope)
            .map_err(|e| RpcError::Transport(format!("failed to encode envelope: {e}")))?;
        self.transport
            .send(Frame::Text(json))
            .await
            .map_err(|e| RpcError::Transport(e.0))
    }

    /// Implements the RPC proxy (§4.5.2): validate, envelope, middleware, send, await, validate.
    pub async fn call(&self, channel: &str, payload: Payload) -> Result<Payload, RpcError> {
        let descriptor = self
            .role
            .outbound_rpc(&self.contract)
            .get(channel)
            .cloned()
            .ok_or_else(|| RpcError::not_found(channel))?;

        let id = self.config.id_generator.generate();
        let rx = self.pending.register(id.clone(), channel.to_string()).await;

        if let Err(e) = self.send_request(&descriptor, &id, channel, payload).await {
            self.pending.abandon(&id).await;
            return Err(e);
        }

        let settlement = match self.config.timeout {
            Some(duration) => match tokio::time::timeout(duration, rx).await {
                Ok(Ok(settlement)) => settlement,
                Ok(Err(_dropped)) => Err(RpcError::Shutdown),
                Err(_elapsed) => {
                    self.pending.abandon(&id).await;
                    Err(RpcError::Timeout {
                        method: channel.to_string(),
                        timeout_ms: duration.as_millis() as u64,
                    })
                }
            },
            None => rx.await.unwrap_or(Err(RpcError::Shutdown)),
        }?;

        descriptor
            .response_validator
            .validate(channel, settlement)
            .await
            .map_err(RpcError::from)
    }

    async fn send_request(
        &self,
        descriptor: &RpcDescriptor,
        id: &str,
        channel: &str,
        payload: Payload,
    ) -> Result<(), RpcError> {
        let validated = descriptor.request_validator.validate(channel, payload).await?;
        let mut envelope = Envelope::rpc_req(self.config.version, id, channel, validated);
        self.pipeline.run(Direction::Out, &mut envelope).await?;
        self.send_envelope(envelope).await
    }

    /// Implements the event emit proxy (§4.5.2). Fire-and-forget: the caller gets the spawned
    /// task handle only so tests can await completion; production callers ignore it.
    pub fn emit(self: &Arc<Self>, channel: String, payload: Payload) -> tokio::task::JoinHandle<()> {
        let engine = Arc::clone(self);
        tokio::spawn(async move { engine.emit_inner(&channel, payload).await })
    }

    async fn emit_inner(&self, channel: &str, payload: Payload) {
        let validator = self
            .contract
            .events
            .get(channel)
            .map(|d| d.validator.clone())
            .unwrap_or_default();

        let validated = match validator.validate(channel, payload).await {
            Ok(v) => v,
            Err(e) => {
                self.config.logger.error(&format!("emit validation failed for '{channel}': {e}"));
                return;
            }
        };

        let mut envelope = Envelope::event(self.config.version, channel, validated);
        if let Err(e) = self.pipeline.run(Direction::Out, &mut envelope).await {
            self.config.logger.error(&format!("emit middleware failed for '{channel}': {e}"));
            return;
        }
        if let Err(e) = self.send_envelope(envelope).await {
            self.config.logger.error(&format!("emit send failed for '{channel}': {e}"));
        }
    }

    /// Runs the inbound-dispatch loop until the transport closes. One task per engine owns this;
    /// it is the sole source of ordering guarantees in §5 — every received frame is fully
    /// processed (middleware, then handler) before the next `recv()`.
    pub async fn run(self: Arc<Self>) {
        while let Some(frame) = self.transport.recv().await {
            self.handle_frame(frame).await;
        }
    }

    async fn handle_frame(&self, frame: Frame) {
        let value = match frame {
            Frame::Text(text) => match serde_json::from_str::<serde_json::Value>(&text) {
                Ok(v) => v,
                Err(e) => {
                    let err = EnvelopeError::from(e);
                    self.config.logger.debug(&format!("dropping malformed frame: {err}"));
                    return;
                }
            },
            Frame::Value(v) => v,
        };

        if !value.is_object() {
            self.config.logger.debug(&format!("dropping malformed frame: {}", EnvelopeError::NotAnObject));
            return;
        }

        let mut envelope: Envelope = match serde_json::from_value(value) {
            Ok(e) => e,
            Err(e) => {
                let err = EnvelopeError::from(e);
                self.config.logger.debug(&format!("dropping malformed frame: {err}"));
                return;
            }
        };

        if let Err(e) = self.pipeline.run(Direction::In, &mut envelope).await {
            self.config.logger.error(&format!("inbound middleware failed: {e}; envelope dropped"));
            return;
        }

        match envelope.kind {
            EnvelopeKind::RpcReq => self.dispatch_rpc_req(envelope).await,
            EnvelopeKind::RpcRes => self.dispatch_rpc_res(envelope).await,
            EnvelopeKind::RpcErr => self.dispatch_rpc_err(envelope).await,
            EnvelopeKind::Event => self.dispatch_event(envelope).await,
            EnvelopeKind::Hello => self.dispatch_hello(envelope).await,
            EnvelopeKind::Unknown => self.dispatch_unknown(envelope).await,
        }
    }

    // The handler call below is a plain `.await`, no `catch_unwind` boundary: a panicking
    // handler unwinds this connection's whole inbound-dispatch task rather than just failing
    // this one request.
    async fn dispatch_rpc_req(&self, envelope: Envelope) {
        let (Some(id), Some(channel)) = (envelope.id.clone(), envelope.ch.clone()) else {
            self.config.logger.debug("dropping rpc_req missing id/ch");
            return;
        };

        let descriptor = match self.role.inbound_rpc(&self.contract).get(&channel) {
            Some(d) => d.clone(),
            None => {
                self.reply_error(&id, &channel, RpcError::not_found(&channel)).await;
                return;
            }
        };
        let handler = match self.inbound_handlers.get(&channel) {
            Some(h) => h.clone(),
            None => {
                self.reply_error(&id, &channel, RpcError::not_found(&channel)).await;
                return;
            }
        };

        let request_payload = envelope.p.unwrap_or(serde_json::Value::Null);
        let validated_request = match descriptor.request_validator.validate(&channel, request_payload).await {
            Ok(v) => v,
            Err(e) => {
                self.reply_error(
                    &id,
                    &channel,
                    RpcError::Remote { code: Some(VALIDATION_FAILED_CODE.to_string()), message: e.to_string() },
                )
                .await;
                return;
            }
        };

        let result = handler(validated_request).await;
        match result {
            Ok(response_payload) => {
                match descriptor.response_validator.validate(&channel, response_payload).await {
                    Ok(validated_response) => self.reply_ok(&id, &channel, validated_response).await,
                    Err(e) => {
                        self.reply_error(
                            &id,
                            &channel,
                            RpcError::Remote { code: Some(VALIDATION_FAILED_CODE.to_string()), message: e.to_string() },
                        )
                        .await
                    }
                }
            }
            Err(message) => self.reply_error(&id, &channel, RpcError::Remote { code: None, message }).await,
        }
    }

    async fn reply_ok(&self, id: &str, channel: &str, payload: Payload) {
        let mut envelope = Envelope::rpc_res(self.config.version, id, channel, payload);
        if let Err(e) = self.pipeline.run(Direction::Out, &mut envelope).await {
            self.config.logger.error(&format!("outbound middleware dropped rpc_res for '{channel}': {e}"));
            return;
        }
        if let Err(e) = self.send_envelope(envelope).await {
            self.config.logger.error(&format!("failed to send rpc_res for '{channel}': {e}"));
        }
    }

    async fn reply_error(&self, id: &str, channel: &str, error: RpcError) {
        let (code, message) = match error {
            RpcError::Remote { code, message } => (code, message),
            other => (None, other.to_string()),
        };
        let mut envelope = Envelope::rpc_err(self.config.version, id, channel, code, message);
        if let Err(e) = self.pipeline.run(Direction::Out, &mut envelope).await {
            // §9 open question: an outbound middleware failure on an rpc_err drops the reply;
            // the caller on the other end is left to its timeout as the backstop.
            self.config.logger.error(&format!("outbound middleware dropped rpc_err for '{channel}': {e}"));
            return;
        }
        if let Err(e) = self.send_envelope(envelope).await {
            self.config.logger.error(&format!("failed to send rpc_err for '{channel}': {e}"));
        }
    }

    async fn dispatch_rpc_res(&self, envelope: Envelope) {
        let Some(id) = envelope.id else { return };
        let payload = envelope.p.unwrap_or(serde_json::Value::Null);
        self.pending.settle(&id, Ok(payload)).await;
    }

    async fn dispatch_rpc_err(&self, envelope: Envelope) {
        let Some(id) = envelope.id else { return };
        let message = envelope.m.unwrap_or_else(|| "RPC call failed".to_string());
        self.pending.settle(&id, Err(RpcError::Remote { code: envelope.code, message })).await;
    }

    async fn dispatch_event(&self, envelope: Envelope) {
        let Some(channel) = envelope.ch else {
            self.config.logger.debug("dropping event missing ch");
            return;
        };

        // §4.5.3: a channel with no registered handler is dropped silently — never validated,
        // so an unvalidatable payload for an unsubscribed channel never logs an error.
        if !self.event_sink.has_handler(&channel).await {
            self.config.logger.debug(&format!("dropping event '{channel}' with no subscriber"));
            return;
        }

        let payload = envelope.p.unwrap_or(serde_json::Value::Null);
        let validator = self.contract.events.get(&channel).map(|d| d.validator.clone()).unwrap_or_default();
        let validated = match validator.validate(&channel, payload).await {
            Ok(v) => v,
            Err(e) => {
                self.config.logger.error(&format!("event validation failed for '{channel}': {e}"));
                return;
            }
        };

        self.event_sink.dispatch(&channel, validated).await;
    }

    async fn dispatch_hello(&self, envelope: Envelope) {
        self.config.logger.info(&format!("received hello, features={:?}", envelope.feat));
        if let Some(feat) = envelope.feat {
            *self.peer_features.write().await = feat;
        }
    }

    async fn dispatch_unknown(&self, envelope: Envelope) {
        match &self.config.on_unknown_envelope {
            Some(hook) => hook(envelope),
            None => self.config.logger.debug("dropping envelope of unknown kind"),
        }
    }

    /// Rejects every outstanding outbound call with `error` and closes the transport (§4.5.5).
    pub async fn shutdown(&self, error: RpcError) {
        self.pending.abandon_all(error).await;
        let _ = self.transport.close(None, None).await;
    }
}
