//! The single structural type exchanged on the wire (§3, §4.1, §6.2).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The discriminant carried by every envelope.
///
/// Serializes to the literal wire tokens `rpc_req`, `rpc_res`, `rpc_err`, `event`, `hello`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeKind {
    RpcReq,
    RpcRes,
    RpcErr,
    Event,
    Hello,
    /// Any `kind` outside the five above (§4.5.3 "any other" row, §7.7). Routed to the
    /// configured `on_unknown_envelope` hook instead of being treated as a malformed frame.
    #[serde(other)]
    Unknown,
}

impl EnvelopeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EnvelopeKind::RpcReq => "rpc_req",
            EnvelopeKind::RpcRes => "rpc_res",
            EnvelopeKind::RpcErr => "rpc_err",
            EnvelopeKind::Event => "event",
            EnvelopeKind::Hello => "hello",
            EnvelopeKind::Unknown => "unknown",
        }
    }
}

/// The untyped payload carried in an envelope's `p` field.
///
/// The core never inspects this structurally; only contract validators specialize it.
pub type Payload = Value;

/// The wire envelope. See SPEC_FULL.md §3 for field semantics and §6.2 for the wire mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub v: u32,
    pub ts: i64,
    pub kind: EnvelopeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p: Option<Payload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub m: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<HashMap<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feat: Option<Vec<String>>,
    /// Fields present on the wire that this version of the envelope doesn't name.
    /// Preserved so middleware can still read them (§6.2); the core itself ignores them.
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

impl Envelope {
    /// Builds a minimal envelope for `kind`, stamping `v` and a `ts` of "now". All other fields
    /// are left unset for the caller to populate (§4.1).
    pub fn new(kind: EnvelopeKind, version: u32) -> Self {
        Envelope {
            v: version,
            ts: now_millis(),
            kind,
            id: None,
            ch: None,
            p: None,
            m: None,
            code: None,
            meta: None,
            feat: None,
            extra: HashMap::new(),
        }
    }

    pub fn hello(version: u32, features: Vec<String>) -> Self {
        let mut env = Envelope::new(EnvelopeKind::Hello, version);
        env.feat = Some(features);
        env
    }

    pub fn rpc_req(version: u32, id: impl Into<String>, ch: impl Into<String>, p: Payload) -> Self {
        let mut env = Envelope::new(EnvelopeKind::RpcReq, version);
        env.id = Some(id.into());
        env.ch = Some(ch.into());
        env.p = Some(p);
        env
    }

    pub fn rpc_res(version: u32, id: impl Into<String>, ch: impl Into<String>, p: Payload) -> Self {
        let mut env = Envelope::new(EnvelopeKind::RpcRes, version);
        env.id = Some(id.into());
        env.ch = Some(ch.into());
        env.p = Some(p);
        env
    }

    pub fn rpc_err(
        version: u32,
        id: impl Into<String>,
        ch: impl Into<String>,
        code: Option<String>,
        message: impl Into<String>,
    ) -> Self {
        let mut env = Envelope::new(EnvelopeKind::RpcErr, version);
        env.id = Some(id.into());
        env.ch = Some(ch.into());
        env.code = code;
        env.m = Some(message.into());
        env
    }

    pub fn event(version: u32, ch: impl Into<String>, p: Payload) -> Self {
        let mut env = Envelope::new(EnvelopeKind::Event, version);
        env.ch = Some(ch.into());
        env.p = Some(p);
        env
    }

    /// Inserts a middleware-supplied metadata key. The "future compatibility hook" from §4.3 —
    /// in this port a plain exclusive borrow suffices (Design Note #4), so `mutate` is just a
    /// thin, documented entry point rather than a callback indirection.
    pub fn mutate(&mut self, f: impl FnOnce(&mut Envelope)) {
        f(self)
    }
}

fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
