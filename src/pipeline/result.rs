//! Pipeline execution results.

use super::config::StepAction;
use crate::guardrail::Violation;
use crate::types::RequestContext;
use std::time::Duration;

/// How a single step's guardrail invocation resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The guardrail passed the content (possibly rewritten).
    Pass,
    /// The guardrail deliberately blocked the content.
    Fail,
    /// The guardrail could not be evaluated (missing, or technical failure).
    Error,
}

/// Data a step handed back, when it rewrote anything.
#[derive(Debug, Clone, PartialEq)]
pub enum StepData {
    Request(RequestContext),
    Response(serde_json::Value),
}

/// Record of one executed (or resolved) step. Appended to the run history
/// in order, never mutated afterward.
#[derive(Debug, Clone)]
pub struct PipelineStepResult {
    pub guardrail_name: String,
    pub outcome: StepOutcome,
    /// The action the step resolved to (`on_pass` or `on_fail`).
    pub action_taken: StepAction,
    /// Rewritten data returned by the guardrail, if any.
    pub modified_data: Option<StepData>,
    /// Human-readable detail for fail/error outcomes.
    pub error_detail: Option<String>,
    /// Structured violation detail when the guardrail intervened.
    pub violation: Option<Violation>,
    /// Wall-clock time of the single guardrail invocation.
    pub duration: Duration,
}

impl PipelineStepResult {
    pub fn duration_seconds(&self) -> f64 {
        self.duration.as_secs_f64()
    }
}

/// Terminal decision of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalAction {
    Allow,
    Block,
    ModifyResponse,
}

/// The complete outcome of one pipeline run. The executor resolves every
/// guardrail failure into one of these; it never raises on a guardrail's
/// behalf.
#[derive(Debug, Clone)]
pub struct PipelineExecutionResult {
    pub terminal_action: TerminalAction,
    /// Ordered, complete step history.
    pub step_results: Vec<PipelineStepResult>,
    /// Final working request context, when it differs from the input (or on
    /// fall-through, unconditionally).
    pub modified_request: Option<RequestContext>,
    /// Final working response, post-call mode only, same convention.
    pub modified_response: Option<serde_json::Value>,
    /// Set when the terminal action is `block`.
    pub error_message: Option<String>,
    /// Set when the terminal action is `modify_response`.
    pub modify_response_message: Option<String>,
}

impl PipelineExecutionResult {
    pub fn is_blocked(&self) -> bool {
        self.terminal_action == TerminalAction::Block
    }

    pub fn is_allowed(&self) -> bool {
        self.terminal_action == TerminalAction::Allow
    }

    /// Names of guardrails that were resolved, in execution order.
    pub fn executed_guardrails(&self) -> Vec<&str> {
        self.step_results
            .iter()
            .map(|s| s.guardrail_name.as_str())
            .collect()
    }
}
