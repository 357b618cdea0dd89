//! Audio content-part buffering.
//!
//! Once a `response.content_part.added` declares an audio part, that item's
//! transcript-delta and raw-audio-delta frames are held back until the
//! matching `response.audio_transcript.done` arrives; the whole utterance is
//! then released in original order, followed by the done frame. This gives
//! any consumer that wants to inspect a complete utterance a well-defined
//! cutover point. Text parts are never buffered.

use serde_json::Value;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Default)]
pub struct AudioBuffer {
    /// Items currently declared as audio-typed output.
    audio_items: HashSet<String>,
    /// Held-back frames per item, in arrival order.
    pending: HashMap<String, Vec<Value>>,
}

impl AudioBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a content-part declaration. The declaration frame itself is
    /// always forwarded by the caller.
    pub fn on_content_part_added(&mut self, item_id: &str, audio: bool) {
        if audio {
            self.audio_items.insert(item_id.to_string());
        }
    }

    /// Offer a delta frame. Returns the frame back when it should be
    /// forwarded immediately; `None` when it was buffered.
    pub fn offer_delta(&mut self, item_id: &str, event: Value) -> Option<Value> {
        if self.audio_items.contains(item_id) {
            self.pending.entry(item_id.to_string()).or_default().push(event);
            None
        } else {
            Some(event)
        }
    }

    /// The transcript for `item_id` is complete: drain its buffered frames in
    /// original order. The caller forwards these, then the done frame.
    pub fn complete(&mut self, item_id: &str) -> Vec<Value> {
        self.audio_items.remove(item_id);
        self.pending.remove(item_id).unwrap_or_default()
    }

    pub fn is_buffering(&self, item_id: &str) -> bool {
        self.audio_items.contains(item_id)
    }
}
