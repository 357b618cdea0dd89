//! The realtime session coordinator and its two forwarding loops.

use super::buffer::AudioBuffer;
use super::events::{self, IncomingEvent};
use super::session::{control_loop, CloseReason, SessionConfig, SessionSummary, ViolationReport};
use super::transport::{Duplex, EventReceiver, EventSender};
use super::REALTIME_HOOKS;
use crate::audit::{AuditEvent, AuditHandle};
use crate::guardrail::{
    Direction, Guardrail, GuardrailInputs, GuardrailRegistry, Verdict, Violation, ViolationAction,
};
use crate::types::RequestContext;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Bridges a client duplex connection and a backend duplex connection for
/// the lifetime of one realtime session, intercepting gated events.
///
/// The registry is consulted once at session start to resolve the eligible
/// guardrail set; both loops then share that immutable set.
pub struct RealtimeBridge {
    registry: Arc<GuardrailRegistry>,
    config: SessionConfig,
    audit: Option<AuditHandle>,
}

impl RealtimeBridge {
    pub fn new(registry: Arc<GuardrailRegistry>) -> Self {
        Self {
            registry,
            config: SessionConfig::default(),
            audit: None,
        }
    }

    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_audit(mut self, audit: AuditHandle) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Drive the session until either side closes or a violation policy ends
    /// it. Consumes both endpoints; a new session needs fresh connections.
    pub async fn run(self, client: Duplex, backend: Duplex) -> SessionSummary {
        let guards: Arc<[Arc<dyn Guardrail>]> = self
            .registry
            .eligible_for(&self.config.requested_guardrails, &REALTIME_HOOKS)
            .into();
        debug!(
            session_id = %self.config.session_id,
            eligible = guards.len(),
            "realtime session starting"
        );

        let mut ctx = RequestContext::new(Vec::new())
            .with_guardrails(self.config.requested_guardrails.clone());
        ctx.call_id = self.config.session_id.clone();

        let token = CancellationToken::new();
        let (reports, report_rx) = mpsc::channel::<ViolationReport>(16);
        let control = tokio::spawn(control_loop(report_rx, token.clone()));

        let client_loop = ClientToBackend {
            rx: client.receiver,
            to_backend: backend.sender.clone(),
            to_client: client.sender.clone(),
            guards: guards.clone(),
            reports: reports.clone(),
            token: token.clone(),
            ctx: ctx.clone(),
            audit: self.audit.clone(),
            pending_guardrail_message: None,
        };
        let backend_loop = BackendToClient {
            rx: backend.receiver,
            to_client: client.sender,
            to_backend: backend.sender,
            guards,
            reports,
            token: token.clone(),
            ctx,
            audit: self.audit.clone(),
            buffer: AudioBuffer::new(),
            setup_done: false,
        };

        let client_task = tokio::spawn(client_loop.run());
        let backend_task = tokio::spawn(backend_loop.run());

        let (client_reason, backend_reason) = tokio::join!(client_task, backend_task);
        let client_reason = client_reason.unwrap_or(CloseReason::Cancelled);
        let backend_reason = backend_reason.unwrap_or(CloseReason::Cancelled);

        // Both loops (and their report senders) are gone; the control actor
        // drains and returns the final tally.
        let (violations, terminated) = control.await.unwrap_or((0, false));

        let close_reason = if terminated {
            CloseReason::ViolationPolicy
        } else {
            [client_reason, backend_reason]
                .into_iter()
                .find(|r| *r != CloseReason::Cancelled)
                .unwrap_or(CloseReason::Cancelled)
        };

        if let Some(audit) = &self.audit {
            audit.record(AuditEvent::SessionClosed {
                session_id: self.config.session_id.clone(),
                violations,
                reason: close_reason.as_str().to_string(),
            });
        }
        debug!(
            session_id = %self.config.session_id,
            violations,
            reason = close_reason.as_str(),
            "realtime session closed"
        );

        SessionSummary {
            session_id: self.config.session_id,
            violations,
            close_reason,
        }
    }
}

/// How a gated text fared against the session's guardrails.
enum Gate {
    Pass,
    Blocked {
        violation: Violation,
        end_session: bool,
        threshold: Option<u32>,
    },
    Faulted {
        guardrail: String,
        message: String,
    },
}

/// Run the eligible guardrails over one text, threading rewrites between
/// them in registration order. First block wins.
async fn run_gate(guards: &[Arc<dyn Guardrail>], ctx: &RequestContext, text: &str) -> Gate {
    let mut inputs = GuardrailInputs::from_texts([text]);
    for guard in guards {
        match guard.apply(inputs.clone(), ctx, Direction::Request).await {
            Ok(Verdict::Pass(None)) => {}
            Ok(Verdict::Pass(Some(rewritten))) => inputs = rewritten,
            Ok(Verdict::Blocked(violation)) => {
                let descriptor = guard.descriptor();
                return Gate::Blocked {
                    violation,
                    end_session: descriptor.on_violation == ViolationAction::EndSession,
                    threshold: descriptor.end_session_after_n_fails,
                };
            }
            Err(e) => {
                return Gate::Faulted {
                    guardrail: guard.name().to_string(),
                    message: e.to_string(),
                }
            }
        }
    }
    Gate::Pass
}

async fn forward(
    sender: &EventSender,
    frame: Value,
    on_closed: CloseReason,
) -> Result<(), CloseReason> {
    sender.send(frame).await.map_err(|_| on_closed)
}

/// The full interception sequence for a blocked utterance: cancel any
/// in-flight generation (closing the race where the backend auto-started
/// before the check finished), notify the client in-band, and have the model
/// speak the warning through a synthetic turn.
async fn intercept_blocked(
    to_backend: &EventSender,
    to_client: &EventSender,
    message: &str,
) -> Result<(), CloseReason> {
    forward(to_backend, events::response_cancel(), CloseReason::BackendClosed).await?;
    forward(
        to_client,
        events::guardrail_violation_error(message),
        CloseReason::ClientClosed,
    )
    .await?;
    forward(
        to_backend,
        events::synthetic_warning_item(&events::warning_instruction(message)),
        CloseReason::BackendClosed,
    )
    .await?;
    forward(to_backend, events::response_create(), CloseReason::BackendClosed).await
}

/// Fail-safe path for an unevaluable check: suppress generation and tell the
/// client, but trigger no synthetic turn and count no violation.
async fn intercept_faulted(
    to_backend: &EventSender,
    to_client: &EventSender,
    guardrail: &str,
) -> Result<(), CloseReason> {
    forward(to_backend, events::response_cancel(), CloseReason::BackendClosed).await?;
    forward(
        to_client,
        events::guardrail_violation_error(&format!(
            "guardrail '{guardrail}' could not be evaluated; the message was not processed"
        )),
        CloseReason::ClientClosed,
    )
    .await
}

/// Client → backend forwarding loop. Sole owner of the pending-message flag.
struct ClientToBackend {
    rx: EventReceiver,
    to_backend: EventSender,
    to_client: EventSender,
    guards: Arc<[Arc<dyn Guardrail>]>,
    reports: mpsc::Sender<ViolationReport>,
    token: CancellationToken,
    ctx: RequestContext,
    audit: Option<AuditHandle>,
    /// Text of the last blocked client message; set on block, cleared when
    /// the follow-up response request is suppressed.
    pending_guardrail_message: Option<String>,
}

impl ClientToBackend {
    async fn run(mut self) -> CloseReason {
        let reason = loop {
            let frame = tokio::select! {
                _ = self.token.cancelled() => break CloseReason::Cancelled,
                frame = self.rx.recv() => match frame {
                    None => break CloseReason::ClientClosed,
                    Some(frame) => frame,
                },
            };
            if let Err(reason) = self.handle(frame).await {
                break reason;
            }
        };
        self.token.cancel();
        reason
    }

    async fn handle(&mut self, frame: Value) -> Result<(), CloseReason> {
        match events::classify(&frame) {
            IncomingEvent::UserTextItem { text } if !self.guards.is_empty() => {
                match run_gate(&self.guards, &self.ctx, &text).await {
                    Gate::Pass => {
                        forward(&self.to_backend, frame, CloseReason::BackendClosed).await
                    }
                    Gate::Blocked {
                        violation,
                        end_session,
                        threshold,
                    } => {
                        debug!(guardrail = %violation.guardrail, "client text message blocked");
                        self.pending_guardrail_message = Some(text);
                        if let Some(audit) = &self.audit {
                            audit.record(AuditEvent::GuardrailBlocked {
                                call_id: self.ctx.call_id.clone(),
                                guardrail: violation.guardrail.clone(),
                                message: violation.message.clone(),
                            });
                        }
                        intercept_blocked(&self.to_backend, &self.to_client, &violation.message)
                            .await?;
                        let _ = self
                            .reports
                            .send(ViolationReport {
                                end_session,
                                threshold,
                            })
                            .await;
                        Ok(())
                    }
                    Gate::Faulted { guardrail, message } => {
                        warn!(%guardrail, %message, "guardrail check failed; blocking message");
                        self.pending_guardrail_message = Some(text);
                        if let Some(audit) = &self.audit {
                            audit.record(AuditEvent::GuardrailErrored {
                                call_id: self.ctx.call_id.clone(),
                                guardrail: guardrail.clone(),
                                message,
                            });
                        }
                        intercept_faulted(&self.to_backend, &self.to_client, &guardrail).await
                    }
                }
            }
            IncomingEvent::ResponseCreate { plain }
                if plain && self.pending_guardrail_message.is_some() =>
            {
                // The synthetic warning already triggered its own generation.
                debug!("suppressing response request for a blocked message");
                self.pending_guardrail_message = None;
                Ok(())
            }
            IncomingEvent::Malformed => {
                warn!("skipping malformed client frame");
                Ok(())
            }
            _ => forward(&self.to_backend, frame, CloseReason::BackendClosed).await,
        }
    }
}

/// Backend → client forwarding loop. Owns session setup state and the audio
/// buffering sub-rule.
struct BackendToClient {
    rx: EventReceiver,
    to_client: EventSender,
    to_backend: EventSender,
    guards: Arc<[Arc<dyn Guardrail>]>,
    reports: mpsc::Sender<ViolationReport>,
    token: CancellationToken,
    ctx: RequestContext,
    audit: Option<AuditHandle>,
    buffer: AudioBuffer,
    setup_done: bool,
}

impl BackendToClient {
    async fn run(mut self) -> CloseReason {
        let reason = loop {
            let frame = tokio::select! {
                _ = self.token.cancelled() => break CloseReason::Cancelled,
                frame = self.rx.recv() => match frame {
                    None => break CloseReason::BackendClosed,
                    Some(frame) => frame,
                },
            };
            if let Err(reason) = self.handle(frame).await {
                break reason;
            }
        };
        self.token.cancel();
        reason
    }

    async fn handle(&mut self, frame: Value) -> Result<(), CloseReason> {
        match events::classify(&frame) {
            IncomingEvent::SessionCreated => {
                // The client sees the session-ready signal unmodified, then
                // auto-response is disabled so nothing generates before a
                // guardrail has seen the corresponding utterance.
                forward(&self.to_client, frame, CloseReason::ClientClosed).await?;
                if !self.guards.is_empty() {
                    forward(
                        &self.to_backend,
                        events::disable_auto_response(),
                        CloseReason::BackendClosed,
                    )
                    .await?;
                }
                self.setup_done = true;
                Ok(())
            }
            IncomingEvent::TranscriptionCompleted { transcript, .. } => {
                // The user always sees what was heard; gating applies to the
                // model's reply, not the transcript itself.
                forward(&self.to_client, frame, CloseReason::ClientClosed).await?;
                if self.guards.is_empty() {
                    return Ok(());
                }
                match run_gate(&self.guards, &self.ctx, &transcript).await {
                    Gate::Pass => {
                        forward(
                            &self.to_backend,
                            events::response_create(),
                            CloseReason::BackendClosed,
                        )
                        .await
                    }
                    Gate::Blocked {
                        violation,
                        end_session,
                        threshold,
                    } => {
                        debug!(guardrail = %violation.guardrail, "transcript blocked");
                        if let Some(audit) = &self.audit {
                            audit.record(AuditEvent::GuardrailBlocked {
                                call_id: self.ctx.call_id.clone(),
                                guardrail: violation.guardrail.clone(),
                                message: violation.message.clone(),
                            });
                        }
                        intercept_blocked(&self.to_backend, &self.to_client, &violation.message)
                            .await?;
                        let _ = self
                            .reports
                            .send(ViolationReport {
                                end_session,
                                threshold,
                            })
                            .await;
                        Ok(())
                    }
                    Gate::Faulted { guardrail, message } => {
                        warn!(%guardrail, %message, "guardrail check failed; suppressing response");
                        if let Some(audit) = &self.audit {
                            audit.record(AuditEvent::GuardrailErrored {
                                call_id: self.ctx.call_id.clone(),
                                guardrail: guardrail.clone(),
                                message,
                            });
                        }
                        intercept_faulted(&self.to_backend, &self.to_client, &guardrail).await
                    }
                }
            }
            IncomingEvent::ContentPartAdded { item_id, audio } => {
                self.buffer.on_content_part_added(&item_id, audio);
                forward(&self.to_client, frame, CloseReason::ClientClosed).await
            }
            IncomingEvent::AudioTranscriptDelta { item_id }
            | IncomingEvent::AudioDelta { item_id } => {
                match self.buffer.offer_delta(&item_id, frame) {
                    Some(frame) => {
                        forward(&self.to_client, frame, CloseReason::ClientClosed).await
                    }
                    None => Ok(()),
                }
            }
            IncomingEvent::AudioTranscriptDone { item_id } => {
                for buffered in self.buffer.complete(&item_id) {
                    forward(&self.to_client, buffered, CloseReason::ClientClosed).await?;
                }
                forward(&self.to_client, frame, CloseReason::ClientClosed).await
            }
            IncomingEvent::Malformed => {
                if !self.setup_done && frame.get("session").is_some() {
                    // A broken setup frame leaves the session unrecoverable:
                    // auto-response was never negotiated.
                    warn!("malformed setup frame; closing session");
                    return Err(CloseReason::ProtocolError);
                }
                warn!("skipping malformed backend frame");
                Ok(())
            }
            _ => forward(&self.to_client, frame, CloseReason::ClientClosed).await,
        }
    }
}
