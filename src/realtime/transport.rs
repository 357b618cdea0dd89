//! In-process duplex event transport.
//!
//! Each side of a realtime connection is a bounded channel pair carrying raw
//! JSON frames. Embedders bridge these endpoints to their actual socket
//! layer; tests drive both ends directly. A dropped peer surfaces as
//! end-of-stream on the receiver and as [`RealtimeError::PeerClosed`] on the
//! sender, which is what lets closure propagate within one receive cycle.

use super::RealtimeError;
use futures::Stream;
use serde_json::Value;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

/// Default per-direction channel capacity.
pub const DEFAULT_CAPACITY: usize = 64;

/// Sending half of one direction. Cloneable: both forwarding loops may write
/// to the same peer.
#[derive(Clone)]
pub struct EventSender {
    tx: mpsc::Sender<Value>,
}

impl EventSender {
    pub async fn send(&self, event: Value) -> Result<(), RealtimeError> {
        self.tx
            .send(event)
            .await
            .map_err(|_| RealtimeError::PeerClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Receiving half of one direction.
pub struct EventReceiver {
    rx: mpsc::Receiver<Value>,
}

impl EventReceiver {
    /// Receive the next frame; `None` when the peer is gone.
    pub async fn recv(&mut self) -> Option<Value> {
        self.rx.recv().await
    }

    /// Close this receiver, signalling the peer's sender.
    pub fn close(&mut self) {
        self.rx.close();
    }
}

impl Stream for EventReceiver {
    type Item = Value;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Value>> {
        self.rx.poll_recv(cx)
    }
}

/// One direction of event flow.
pub fn event_channel(capacity: usize) -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::channel(capacity);
    (EventSender { tx }, EventReceiver { rx })
}

/// One side of a duplex connection.
pub struct Duplex {
    /// Frames addressed to the peer.
    pub sender: EventSender,
    /// Frames arriving from the peer.
    pub receiver: EventReceiver,
}

/// A cross-wired pair of duplex endpoints: what one side sends, the other
/// receives.
pub fn duplex_pair(capacity: usize) -> (Duplex, Duplex) {
    let (a_tx, b_rx) = event_channel(capacity);
    let (b_tx, a_rx) = event_channel(capacity);
    (
        Duplex {
            sender: a_tx,
            receiver: a_rx,
        },
        Duplex {
            sender: b_tx,
            receiver: b_rx,
        },
    )
}
