//! Realtime wire events.
//!
//! The transport carries raw `serde_json::Value` frames: unknown event types
//! must forward verbatim and malformed frames must be skippable, so typed
//! views apply only to the frames the state machine interprets. Outbound
//! control messages are built here with their exact wire field names.

use serde_json::{json, Value};

/// Disable the backend's automatic response generation, so no model output
/// exists before a guardrail has inspected the corresponding utterance.
pub fn disable_auto_response() -> Value {
    json!({
        "type": "session.update",
        "session": {
            "turn_detection": {
                "create_response": false
            }
        }
    })
}

/// Cancel any in-flight response generation.
pub fn response_cancel() -> Value {
    json!({"type": "response.cancel"})
}

/// Ask the backend to generate a response now.
pub fn response_create() -> Value {
    json!({"type": "response.create"})
}

/// A synthetic user message instructing the model to speak a guardrail
/// warning, so voice sessions still produce an audible reply for a blocked
/// turn.
pub fn synthetic_warning_item(instruction: &str) -> Value {
    json!({
        "type": "conversation.item.create",
        "item": {
            "type": "message",
            "role": "user",
            "content": [
                {"type": "input_text", "text": instruction}
            ]
        }
    })
}

/// Default instruction template for [`synthetic_warning_item`].
pub fn warning_instruction(message: &str) -> String {
    format!(
        "Politely repeat the following moderation notice to the user, exactly as written: {message}"
    )
}

/// Client-bound structured error event for a guardrail violation.
pub fn guardrail_violation_error(message: &str) -> Value {
    json!({
        "type": "error",
        "error": {
            "type": "guardrail_violation",
            "message": message,
            "code": "content_policy_violation"
        }
    })
}

/// Typed view over the incoming frames the state machine interprets.
#[derive(Debug, Clone, PartialEq)]
pub enum IncomingEvent {
    /// Backend session-ready signal.
    SessionCreated,
    /// A completed speech-to-text transcription of a user utterance.
    TranscriptionCompleted {
        transcript: String,
        item_id: Option<String>,
    },
    /// A client-submitted user text message.
    UserTextItem { text: String },
    /// A client "generate a response" request. `plain` when it carries no
    /// response overrides of its own.
    ResponseCreate { plain: bool },
    /// A new output content part was declared.
    ContentPartAdded { item_id: String, audio: bool },
    AudioTranscriptDelta { item_id: String },
    AudioDelta { item_id: String },
    AudioTranscriptDone { item_id: String },
    /// Recognized as a frame, but not one the machine interprets.
    Other,
    /// No usable `"type"` field.
    Malformed,
}

/// Classify a raw frame.
pub fn classify(event: &Value) -> IncomingEvent {
    let Some(event_type) = event.get("type").and_then(Value::as_str) else {
        return IncomingEvent::Malformed;
    };

    match event_type {
        "session.created" => IncomingEvent::SessionCreated,
        "conversation.item.input_audio_transcription.completed" => {
            IncomingEvent::TranscriptionCompleted {
                transcript: event
                    .get("transcript")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                item_id: event
                    .get("item_id")
                    .and_then(Value::as_str)
                    .map(String::from),
            }
        }
        "conversation.item.create" => match user_item_text(event) {
            Some(text) => IncomingEvent::UserTextItem { text },
            None => IncomingEvent::Other,
        },
        "response.create" => IncomingEvent::ResponseCreate {
            plain: event
                .get("response")
                .map_or(true, |r| r.as_object().is_some_and(|o| o.is_empty())),
        },
        "response.content_part.added" => match event.get("item_id").and_then(Value::as_str) {
            Some(item_id) => IncomingEvent::ContentPartAdded {
                item_id: item_id.to_string(),
                audio: event
                    .pointer("/part/type")
                    .and_then(Value::as_str)
                    .is_some_and(|t| t == "audio"),
            },
            None => IncomingEvent::Other,
        },
        "response.audio_transcript.delta" => {
            item_event(event, |item_id| IncomingEvent::AudioTranscriptDelta { item_id })
        }
        "response.audio.delta" => item_event(event, |item_id| IncomingEvent::AudioDelta { item_id }),
        "response.audio_transcript.done" => {
            item_event(event, |item_id| IncomingEvent::AudioTranscriptDone { item_id })
        }
        _ => IncomingEvent::Other,
    }
}

fn item_event(event: &Value, make: impl FnOnce(String) -> IncomingEvent) -> IncomingEvent {
    match event.get("item_id").and_then(Value::as_str) {
        Some(item_id) => make(item_id.to_string()),
        None => IncomingEvent::Other,
    }
}

/// Combined text of a user message item's `input_text` parts, if the frame
/// is a user text message.
fn user_item_text(event: &Value) -> Option<String> {
    let item = event.get("item")?;
    if item.get("type").and_then(Value::as_str) != Some("message")
        || item.get("role").and_then(Value::as_str) != Some("user")
    {
        return None;
    }
    let parts: Vec<&str> = item
        .get("content")?
        .as_array()?
        .iter()
        .filter(|part| part.get("type").and_then(Value::as_str) == Some("input_text"))
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" "))
    }
}
