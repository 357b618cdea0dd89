//! Realtime guardrail interception.
//!
//! A realtime session is a persistent duplex connection pair (one client
//! side, one model-serving backend side) carrying a live voice/text
//! conversation. Guardrails must gate individual events mid-stream rather
//! than whole requests: a user utterance has to be inspected *before* the
//! backend generates a spoken reply to it.
//!
//! ## Topology
//!
//! [`RealtimeBridge`] runs two forwarding loops for the lifetime of the
//! session:
//!
//! - client → backend: intercepts user text items, forwards the rest
//! - backend → client: handles session setup, intercepts completed speech
//!   transcriptions, buffers in-flight audio parts, forwards the rest
//!
//! A small session-control actor owns the violation counter; the loops report
//! violations through its mailbox and never share mutable state directly.
//! Closing either side cancels the shared token, and the sibling loop shuts
//! down within one receive cycle.
//!
//! ## Interception
//!
//! On session setup the bridge disables the backend's automatic response
//! generation, then explicitly requests a response after each transcription
//! that clears the guardrails. A blocked utterance produces an in-band error
//! event plus a synthetic spoken warning; the session stays open unless the
//! guardrail's violation policy or threshold says otherwise.
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`RealtimeBridge`] | Session coordinator: two loops + control actor |
//! | [`SessionConfig`] | Per-session guardrail selection and identity |
//! | [`SessionSummary`] | Violations and close reason, returned on shutdown |
//! | [`Duplex`] | One side of an event connection (sender + receiver) |
//! | [`events`] | Wire-event constructors and the incoming classifier |
//! | [`AudioBuffer`] | Audio content-part buffering sub-rule |

pub mod bridge;
pub mod buffer;
pub mod events;
pub mod session;
pub mod transport;

pub use bridge::RealtimeBridge;
pub use buffer::AudioBuffer;
pub use session::{CloseReason, SessionConfig, SessionSummary};
pub use transport::{duplex_pair, event_channel, Duplex, EventReceiver, EventSender};

use crate::guardrail::EventHook;
use thiserror::Error;

/// Hooks whose guardrails gate realtime events.
pub const REALTIME_HOOKS: [EventHook; 3] = [
    EventHook::RealtimeInputTranscription,
    EventHook::PreCall,
    EventHook::PostCall,
];

/// Realtime transport errors.
#[derive(Debug, Error)]
pub enum RealtimeError {
    /// The peer's side of the connection is gone.
    #[error("peer connection closed")]
    PeerClosed,
}
