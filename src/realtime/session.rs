//! Per-session configuration, control actor, and shutdown bookkeeping.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Per-session settings, fixed at session start.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Unique session identifier, doubles as the guardrail call id.
    pub session_id: String,
    /// Guardrail names explicitly requested for this session.
    pub requested_guardrails: Vec<String>,
}

impl SessionConfig {
    pub fn new() -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            requested_guardrails: Vec::new(),
        }
    }

    pub fn with_guardrails<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.requested_guardrails = names.into_iter().map(Into::into).collect();
        self
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The client side closed its connection.
    ClientClosed,
    /// The backend side closed its connection.
    BackendClosed,
    /// A guardrail violation policy or threshold terminated the session.
    ViolationPolicy,
    /// An unrecoverable protocol error (e.g. setup never completing).
    ProtocolError,
    /// Shut down because the sibling loop ended.
    Cancelled,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::ClientClosed => "client_closed",
            CloseReason::BackendClosed => "backend_closed",
            CloseReason::ViolationPolicy => "violation_policy",
            CloseReason::ProtocolError => "protocol_error",
            CloseReason::Cancelled => "cancelled",
        }
    }
}

/// Final accounting for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub session_id: String,
    /// Deliberate guardrail interventions over the session's lifetime.
    pub violations: u32,
    pub close_reason: CloseReason,
}

/// A violation report from either forwarding loop.
#[derive(Debug)]
pub(crate) struct ViolationReport {
    /// The intervening guardrail's `on_violation` policy says end now.
    pub end_session: bool,
    /// The intervening guardrail's violation threshold, if configured.
    pub threshold: Option<u32>,
}

/// Session-control actor: sole owner of the violation counter.
///
/// Both forwarding loops report through the mailbox; the actor applies the
/// termination policy and cancels the shared token. Runs until every report
/// sender is dropped, then returns the final count and whether it terminated
/// the session.
pub(crate) async fn control_loop(
    mut reports: mpsc::Receiver<ViolationReport>,
    token: CancellationToken,
) -> (u32, bool) {
    let mut violations: u32 = 0;
    let mut terminated = false;
    while let Some(report) = reports.recv().await {
        violations += 1;
        let threshold_hit = report.threshold.is_some_and(|n| violations >= n);
        if (report.end_session || threshold_hit) && !terminated {
            terminated = true;
            info!(
                violations,
                end_session = report.end_session,
                "violation policy terminating realtime session"
            );
            token.cancel();
        }
    }
    (violations, terminated)
}
