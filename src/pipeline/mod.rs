//! Guardrail pipeline execution engine.
//!
//! A pipeline is an ordered, conditional sequence of guardrail steps with
//! explicit pass/fail branching: a policy escalation ladder rather than a
//! set of independent checks. A cheap heuristic can run first and only
//! escalate to an expensive vendor check when inconclusive, and a masking
//! step can hand its redacted text to a stricter filter later in the chain.
//! That requires strict ordering and data threading between steps, so steps
//! never execute concurrently within one run.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`PipelinePolicy`] | Declarative policy: mode + ordered steps |
//! | [`PipelineStep`] | One step: guardrail name, on_pass/on_fail actions |
//! | [`PipelineExecutor`] | Sequential step loop with action resolution |
//! | [`PipelineExecutionResult`] | Terminal action + full step history |
//!
//! ## Action semantics
//!
//! Each step resolves to one of four actions, chosen from `on_pass` when the
//! guardrail passed and `on_fail` when it blocked or errored:
//!
//! - `allow`: terminate the pipeline, let the request through
//! - `block`: terminate the pipeline, reject the request
//! - `next`: escalate to the following step
//! - `modify_response`: terminate with a response-rewrite instruction
//!
//! The executor never returns an error on behalf of a guardrail: every
//! failure (a deliberate block, a vendor outage, even a step naming an
//! unregistered guardrail) resolves into a terminal action through `on_fail`.
//! An unevaluable check must not silently default to allow.

pub mod config;
pub mod executor;
pub mod result;


pub use config::{PipelineMode, PipelinePolicy, PipelineStep, PolicyFile, StepAction};
pub use executor::PipelineExecutor;
pub use result::{
    PipelineExecutionResult, PipelineStepResult, StepData, StepOutcome, TerminalAction,
};

use thiserror::Error;

/// Policy configuration errors, raised at load time only.
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("Policy parse error: {0}")]
    Parse(String),

    #[error("Policy '{policy}' is invalid: {reason}")]
    Invalid { policy: String, reason: String },

    #[error("Duplicate policy name: {0}")]
    DuplicateName(String),
}
