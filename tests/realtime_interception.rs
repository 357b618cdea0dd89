//! Realtime interception state-machine tests: the bridge sits between a
//! simulated client and a simulated backend, both driven directly through
//! duplex endpoints.

mod common;

use common::MarkerGuardrail;
use llm_guardrails_rust::audit::{AuditDispatcher, AuditEvent, InMemoryAuditSink};
use llm_guardrails_rust::guardrail::{
    GuardrailDescriptor, GuardrailRegistry, ViolationAction,
};
use llm_guardrails_rust::realtime::{
    duplex_pair, CloseReason, Duplex, EventReceiver, RealtimeBridge, SessionConfig,
    SessionSummary,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

const MARKER: &str = "FORBIDDEN";

fn session_created() -> Value {
    json!({"type": "session.created", "session": {"id": "sess_1"}})
}

fn transcription(text: &str) -> Value {
    json!({
        "type": "conversation.item.input_audio_transcription.completed",
        "transcript": text,
        "item_id": "item_1"
    })
}

fn user_text_item(text: &str) -> Value {
    json!({
        "type": "conversation.item.create",
        "item": {
            "type": "message",
            "role": "user",
            "content": [{"type": "input_text", "text": text}]
        }
    })
}

async fn recv_within(rx: &mut EventReceiver, ms: u64) -> Option<Value> {
    tokio::time::timeout(Duration::from_millis(ms), rx.recv())
        .await
        .ok()
        .flatten()
}

async fn expect_event(rx: &mut EventReceiver, event_type: &str) -> Value {
    let frame = recv_within(rx, 1000)
        .await
        .unwrap_or_else(|| panic!("expected '{event_type}', channel was silent"));
    assert_eq!(frame["type"], event_type, "unexpected frame: {frame}");
    frame
}

async fn expect_silence(rx: &mut EventReceiver) {
    if let Some(frame) = recv_within(rx, 100).await {
        panic!("expected silence, got: {frame}");
    }
}

struct Harness {
    client: Duplex,
    backend: Duplex,
    session: JoinHandle<SessionSummary>,
}

impl Harness {
    /// Start a bridge whose registry holds one marker guardrail built from
    /// `descriptor`, and complete session setup.
    async fn start(descriptor: GuardrailDescriptor) -> Self {
        Self::start_with_registry({
            let registry = Arc::new(GuardrailRegistry::new());
            registry
                .register(MarkerGuardrail::new(descriptor, MARKER))
                .unwrap();
            registry
        })
        .await
    }

    async fn start_with_registry(registry: Arc<GuardrailRegistry>) -> Self {
        common::init_tracing();
        let (bridge_client, client) = duplex_pair(64);
        let (bridge_backend, backend) = duplex_pair(64);
        let bridge = RealtimeBridge::new(registry.clone())
            .with_config(SessionConfig::new());
        let session = tokio::spawn(bridge.run(bridge_client, bridge_backend));
        let mut harness = Self {
            client,
            backend,
            session,
        };

        harness.backend.sender.send(session_created()).await.unwrap();
        expect_event(&mut harness.client.receiver, "session.created").await;
        if !registry.is_empty() {
            let update = expect_event(&mut harness.backend.receiver, "session.update").await;
            assert_eq!(update["session"]["turn_detection"]["create_response"], false);
        }
        harness
    }

    /// Close both remote ends and collect the summary.
    async fn finish(self) -> SessionSummary {
        drop(self.client);
        drop(self.backend);
        self.session.await.expect("bridge task panicked")
    }
}

#[tokio::test]
async fn setup_forwards_session_created_then_disables_auto_response() {
    // Harness::start asserts the setup ordering: session.created reaches the
    // client, then exactly one session.update reaches the backend.
    let mut harness = Harness::start(GuardrailDescriptor::new("marker")).await;
    expect_silence(&mut harness.backend.receiver).await;
    expect_silence(&mut harness.client.receiver).await;
    harness.finish().await;
}

#[tokio::test]
async fn clean_transcript_passes_through_and_triggers_one_response() {
    let mut harness = Harness::start(GuardrailDescriptor::new("marker")).await;

    harness
        .backend
        .sender
        .send(transcription("tell me a story"))
        .await
        .unwrap();

    let forwarded = expect_event(
        &mut harness.client.receiver,
        "conversation.item.input_audio_transcription.completed",
    )
    .await;
    assert_eq!(forwarded["transcript"], "tell me a story");

    let frame = expect_event(&mut harness.backend.receiver, "response.create").await;
    assert_eq!(frame, json!({"type": "response.create"}));

    // No second generation request, no client error events.
    expect_silence(&mut harness.backend.receiver).await;
    expect_silence(&mut harness.client.receiver).await;

    let summary = harness.finish().await;
    assert_eq!(summary.violations, 0);
}

#[tokio::test]
async fn blocked_transcript_suppresses_generation_and_warns() {
    let mut harness = Harness::start(GuardrailDescriptor::new("marker")).await;

    harness
        .backend
        .sender
        .send(transcription(&format!("please {MARKER} now")))
        .await
        .unwrap();

    // The user still sees what was heard.
    expect_event(
        &mut harness.client.receiver,
        "conversation.item.input_audio_transcription.completed",
    )
    .await;

    // Backend: cancel, synthetic warning turn, then the generation request
    // for that synthetic turn only, never a bare response.create.
    expect_event(&mut harness.backend.receiver, "response.cancel").await;
    let item = expect_event(&mut harness.backend.receiver, "conversation.item.create").await;
    assert_eq!(item["item"]["role"], "user");
    let instruction = item["item"]["content"][0]["text"].as_str().unwrap();
    assert!(instruction.contains("content violates policy"));
    expect_event(&mut harness.backend.receiver, "response.create").await;
    expect_silence(&mut harness.backend.receiver).await;

    // Client: one structured guardrail error.
    let error = expect_event(&mut harness.client.receiver, "error").await;
    assert_eq!(error["error"]["type"], "guardrail_violation");
    assert_eq!(error["error"]["code"], "content_policy_violation");
    expect_silence(&mut harness.client.receiver).await;

    let summary = harness.finish().await;
    assert_eq!(summary.violations, 1);
}

#[tokio::test]
async fn blocked_client_text_is_withheld_and_next_response_request_suppressed() {
    let mut harness = Harness::start(GuardrailDescriptor::new("marker")).await;

    harness
        .backend
        .sender
        .send(json!({"type": "response.created", "response": {"id": "resp_0"}}))
        .await
        .unwrap();
    expect_event(&mut harness.client.receiver, "response.created").await;

    harness
        .client
        .sender
        .send(user_text_item(&format!("{MARKER} text")))
        .await
        .unwrap();

    // The original item never reaches the backend; the interception sequence
    // does.
    expect_event(&mut harness.backend.receiver, "response.cancel").await;
    expect_event(&mut harness.backend.receiver, "conversation.item.create").await;
    expect_event(&mut harness.backend.receiver, "response.create").await;
    expect_event(&mut harness.client.receiver, "error").await;

    // The client's own follow-up generation request is swallowed once.
    harness
        .client
        .sender
        .send(json!({"type": "response.create"}))
        .await
        .unwrap();
    expect_silence(&mut harness.backend.receiver).await;

    // The flag is cleared: the next request forwards normally.
    harness
        .client
        .sender
        .send(json!({"type": "response.create"}))
        .await
        .unwrap();
    expect_event(&mut harness.backend.receiver, "response.create").await;

    let summary = harness.finish().await;
    assert_eq!(summary.violations, 1);
}

#[tokio::test]
async fn clean_client_text_forwards_verbatim() {
    let mut harness = Harness::start(GuardrailDescriptor::new("marker")).await;

    let item = user_text_item("a perfectly fine message");
    harness.client.sender.send(item.clone()).await.unwrap();
    let forwarded = recv_within(&mut harness.backend.receiver, 1000)
        .await
        .expect("clean item should forward");
    assert_eq!(forwarded, item);

    let summary = harness.finish().await;
    assert_eq!(summary.violations, 0);
}

#[tokio::test]
async fn violation_threshold_terminates_the_session() {
    let descriptor = GuardrailDescriptor::builder("marker")
        .end_session_after_n_fails(2)
        .build();
    let mut harness = Harness::start(descriptor).await;

    for _ in 0..2 {
        harness
            .backend
            .sender
            .send(transcription(MARKER))
            .await
            .unwrap();
        expect_event(
            &mut harness.client.receiver,
            "conversation.item.input_audio_transcription.completed",
        )
        .await;
        expect_event(&mut harness.backend.receiver, "response.cancel").await;
        expect_event(&mut harness.backend.receiver, "conversation.item.create").await;
        expect_event(&mut harness.backend.receiver, "response.create").await;
        expect_event(&mut harness.client.receiver, "error").await;
    }

    // The bridge closes on its own; both remote ends observe the closure.
    let summary = harness.session.await.expect("bridge task panicked");
    assert_eq!(summary.violations, 2);
    assert_eq!(summary.close_reason, CloseReason::ViolationPolicy);
    assert!(recv_within(&mut harness.client.receiver, 1000).await.is_none());
}

#[tokio::test]
async fn end_session_policy_terminates_on_first_violation() {
    let descriptor = GuardrailDescriptor::builder("marker")
        .on_violation(ViolationAction::EndSession)
        .build();
    let mut harness = Harness::start(descriptor).await;

    harness
        .backend
        .sender
        .send(transcription(MARKER))
        .await
        .unwrap();
    expect_event(
        &mut harness.client.receiver,
        "conversation.item.input_audio_transcription.completed",
    )
    .await;
    expect_event(&mut harness.client.receiver, "error").await;

    let summary = harness.session.await.expect("bridge task panicked");
    assert_eq!(summary.violations, 1);
    assert_eq!(summary.close_reason, CloseReason::ViolationPolicy);
}

#[tokio::test]
async fn peer_closure_propagates_to_the_other_side() {
    let harness = Harness::start(GuardrailDescriptor::new("marker")).await;
    let Harness {
        mut client,
        backend,
        session,
    } = harness;

    drop(backend);
    let summary = session.await.expect("bridge task panicked");
    assert_eq!(summary.close_reason, CloseReason::BackendClosed);
    // The bridge released its client side too.
    assert!(recv_within(&mut client.receiver, 1000).await.is_none());
}

#[tokio::test]
async fn sessions_without_eligible_guardrails_never_touch_the_stream() {
    let registry = Arc::new(GuardrailRegistry::new());
    let mut harness = Harness::start_with_registry(registry).await;

    // No session.update was sent at setup (asserted in start); a transcript
    // forwards without any generated control traffic.
    harness
        .backend
        .sender
        .send(transcription("anything at all"))
        .await
        .unwrap();
    expect_event(
        &mut harness.client.receiver,
        "conversation.item.input_audio_transcription.completed",
    )
    .await;
    expect_silence(&mut harness.backend.receiver).await;

    let summary = harness.finish().await;
    assert_eq!(summary.violations, 0);
}

#[tokio::test]
async fn audio_parts_buffer_until_transcript_done() {
    let mut harness = Harness::start(GuardrailDescriptor::new("marker")).await;

    let added = json!({
        "type": "response.content_part.added",
        "item_id": "item_7",
        "part": {"type": "audio"}
    });
    harness.backend.sender.send(added).await.unwrap();
    expect_event(&mut harness.client.receiver, "response.content_part.added").await;

    let deltas = [
        json!({"type": "response.audio_transcript.delta", "item_id": "item_7", "delta": "he"}),
        json!({"type": "response.audio.delta", "item_id": "item_7", "delta": "UklGR…"}),
        json!({"type": "response.audio_transcript.delta", "item_id": "item_7", "delta": "llo"}),
    ];
    for delta in &deltas {
        harness.backend.sender.send(delta.clone()).await.unwrap();
    }
    // Nothing reaches the client while the part is in flight.
    expect_silence(&mut harness.client.receiver).await;

    harness
        .backend
        .sender
        .send(json!({"type": "response.audio_transcript.done", "item_id": "item_7"}))
        .await
        .unwrap();

    // Buffered frames release in original order, then the done frame.
    for delta in &deltas {
        let released = recv_within(&mut harness.client.receiver, 1000).await.unwrap();
        assert_eq!(&released, delta);
    }
    expect_event(&mut harness.client.receiver, "response.audio_transcript.done").await;

    harness.finish().await;
}

#[tokio::test]
async fn malformed_setup_frame_closes_the_session() {
    common::init_tracing();
    let registry = Arc::new(GuardrailRegistry::new());
    registry
        .register(MarkerGuardrail::new(
            GuardrailDescriptor::new("marker"),
            MARKER,
        ))
        .unwrap();

    let (bridge_client, client) = duplex_pair(64);
    let (bridge_backend, backend) = duplex_pair(64);
    let session = tokio::spawn(RealtimeBridge::new(registry).run(bridge_client, bridge_backend));

    // A typeless frame carrying a session payload before setup completed:
    // auto-response can never be negotiated, so the session is torn down.
    backend
        .sender
        .send(json!({"session": {"id": "sess_broken"}}))
        .await
        .unwrap();

    let summary = session.await.expect("bridge task panicked");
    assert_eq!(summary.close_reason, CloseReason::ProtocolError);
    drop(client);
    drop(backend);
}

#[tokio::test]
async fn hook_bound_guardrails_join_only_when_the_session_requests_them() {
    let registry = Arc::new(GuardrailRegistry::new());
    registry
        .register(MarkerGuardrail::new(
            GuardrailDescriptor::builder("opt-in")
                .event_hook(llm_guardrails_rust::guardrail::EventHook::RealtimeInputTranscription)
                .build(),
            MARKER,
        ))
        .unwrap();

    // Not requested: the guardrail is not eligible, setup injects nothing.
    common::init_tracing();
    let (bridge_client, mut client) = duplex_pair(64);
    let (bridge_backend, mut backend) = duplex_pair(64);
    let session = tokio::spawn(
        RealtimeBridge::new(registry.clone()).run(bridge_client, bridge_backend),
    );
    backend.sender.send(session_created()).await.unwrap();
    expect_event(&mut client.receiver, "session.created").await;
    expect_silence(&mut backend.receiver).await;
    drop(client);
    drop(backend);
    session.await.unwrap();

    // Requested by name: the guardrail gates the session.
    let (bridge_client, mut client) = duplex_pair(64);
    let (bridge_backend, mut backend) = duplex_pair(64);
    let config = SessionConfig::new().with_guardrails(["opt-in"]);
    let session = tokio::spawn(
        RealtimeBridge::new(registry)
            .with_config(config)
            .run(bridge_client, bridge_backend),
    );
    backend.sender.send(session_created()).await.unwrap();
    expect_event(&mut client.receiver, "session.created").await;
    expect_event(&mut backend.receiver, "session.update").await;

    backend.sender.send(transcription(MARKER)).await.unwrap();
    expect_event(
        &mut client.receiver,
        "conversation.item.input_audio_transcription.completed",
    )
    .await;
    expect_event(&mut client.receiver, "error").await;

    drop(client);
    drop(backend);
    let summary = session.await.unwrap();
    assert_eq!(summary.violations, 1);
}

#[tokio::test]
async fn malformed_frames_are_skipped_without_ending_the_session() {
    let mut harness = Harness::start(GuardrailDescriptor::new("marker")).await;

    harness
        .backend
        .sender
        .send(json!({"no_type_field": true}))
        .await
        .unwrap();
    harness
        .client
        .sender
        .send(json!({"also_untyped": 1}))
        .await
        .unwrap();

    // The session is still alive and forwarding.
    harness
        .backend
        .sender
        .send(transcription("still here"))
        .await
        .unwrap();
    expect_event(
        &mut harness.client.receiver,
        "conversation.item.input_audio_transcription.completed",
    )
    .await;

    harness.finish().await;
}

#[tokio::test]
async fn realtime_blocks_are_audited() {
    common::init_tracing();
    let sink = Arc::new(InMemoryAuditSink::new(32));
    let dispatcher = AuditDispatcher::spawn(sink.clone(), 16);

    let registry = Arc::new(GuardrailRegistry::new());
    registry
        .register(MarkerGuardrail::new(
            GuardrailDescriptor::new("marker"),
            MARKER,
        ))
        .unwrap();

    let (bridge_client, mut client) = duplex_pair(64);
    let (bridge_backend, mut backend) = duplex_pair(64);
    let config = SessionConfig::new();
    let session_id = config.session_id.clone();
    let bridge = RealtimeBridge::new(registry)
        .with_config(config)
        .with_audit(dispatcher.handle());
    let session = tokio::spawn(bridge.run(bridge_client, bridge_backend));

    backend.sender.send(session_created()).await.unwrap();
    expect_event(&mut client.receiver, "session.created").await;
    expect_event(&mut backend.receiver, "session.update").await;

    backend.sender.send(transcription(MARKER)).await.unwrap();
    expect_event(
        &mut client.receiver,
        "conversation.item.input_audio_transcription.completed",
    )
    .await;
    expect_event(&mut client.receiver, "error").await;

    drop(client);
    drop(backend);
    let summary = session.await.unwrap();
    assert_eq!(summary.violations, 1);

    dispatcher.shutdown().await;
    let events = sink.events_for(&session_id);
    assert!(events
        .iter()
        .any(|e| matches!(e, AuditEvent::GuardrailBlocked { guardrail, .. } if guardrail == "marker")));
    assert!(events.iter().any(|e| matches!(
        e,
        AuditEvent::SessionClosed { violations: 1, .. }
    )));
}
