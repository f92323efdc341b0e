//! An in-process, channel-backed [`Transport`] pairing two engines without a real socket.
//!
//! Exists for tests and for illustrating the `core` crate against a minimal real transport (§6.1:
//! "an in-process loopback for tests" is named as one of the transports this seam was shaped
//! for). Not published as anything more than a demo/dev-dependency.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use kataribe_core::{Frame, Transport, TransportError};
use tokio::sync::{mpsc, Mutex};

/// Half of a loopback pair. Frames sent on one half arrive, unmodified and in order, as the
/// other half's `recv()`.
pub struct LoopbackTransport {
    sender: Mutex<Option<mpsc::Sender<Frame>>>,
    receiver: Mutex<mpsc::Receiver<Frame>>,
    open: AtomicBool,
}

impl LoopbackTransport {
    /// Builds a connected pair. Each side's outbound frames become the other's inbound frames.
    pub fn pair() -> (Arc<LoopbackTransport>, Arc<LoopbackTransport>) {
        Self::pair_with_capacity(64)
    }

    pub fn pair_with_capacity(capacity: usize) -> (Arc<LoopbackTransport>, Arc<LoopbackTransport>) {
        let (tx_a, rx_b) = mpsc::channel(capacity);
        let (tx_b, rx_a) = mpsc::channel(capacity);

        let a = Arc::new(LoopbackTransport {
            sender: Mutex::new(Some(tx_a)),
            receiver: Mutex::new(rx_a),
            open: AtomicBool::new(true),
        });
        let b = Arc::new(LoopbackTransport {
            sender: Mutex::new(Some(tx_b)),
            receiver: Mutex::new(rx_b),
            open: AtomicBool::new(true),
        });
        (a, b)
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn send(&self, frame: Frame) -> Result<(), TransportError> {
        let guard = self.sender.lock().await;
        match guard.as_ref() {
            Some(tx) => tx
                .send(frame)
                .await
                .map_err(|_| TransportError::new("loopback peer has closed its receiving end")),
            None => Err(TransportError::new("loopback transport is closed")),
        }
    }

    async fn recv(&self) -> Option<Frame> {
        self.receiver.lock().await.recv().await
    }

    async fn close(&self, _code: Option<u16>, _reason: Option<String>) -> Result<(), TransportError> {
        self.open.store(false, Ordering::SeqCst);
        // Dropping our sender ends the peer's recv() loop once its buffer drains, signaling
        // closure the same way a dropped socket would.
        self.sender.lock().await.take();
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn frames_sent_on_one_half_arrive_on_the_other() {
        let (a, b) = LoopbackTransport::pair();
        a.send(Frame::Value(json!({"hello": "world"}))).await.unwrap();
        match b.recv().await {
            Some(Frame::Value(v)) => assert_eq!(v, json!({"hello": "world"})),
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[tokio::test]
    async fn closing_one_half_ends_the_others_recv_loop() {
        let (a, b) = LoopbackTransport::pair();
        a.close(None, None).await.unwrap();
        assert!(b.recv().await.is_none());
        assert!(!a.is_open());
    }

    #[tokio::test]
    async fn send_after_close_is_an_error() {
        let (a, _b) = LoopbackTransport::pair();
        a.close(None, None).await.unwrap();
        let err = a.send(Frame::Value(json!(null))).await.unwrap_err();
        assert!(err.to_string().contains("closed"));
    }
}
