//! # llm-guardrails-rust
//!
//! Guardrail evaluation runtime for LLM proxies: intercept requests and
//! responses flowing through a gateway, run pluggable safety checks against
//! them, and decide whether to allow, block, modify, or escalate.
//!
//! ## Overview
//!
//! Three pieces of control logic make up the core:
//!
//! - **Applicability routing**: [`guardrail::should_run_guardrail`] decides
//!   whether a guardrail instance participates in an event, from its hook
//!   binding and the request's per-call guardrail selection.
//! - **Pipeline execution**: [`pipeline::PipelineExecutor`] runs an ordered,
//!   conditional sequence of guardrail steps with per-step pass/fail actions,
//!   data threading between steps, and a single terminal decision.
//! - **Realtime interception**: [`realtime::RealtimeBridge`] coordinates the
//!   two forwarding loops of a live voice/text session, gating completed
//!   transcriptions and user text messages mid-stream.
//!
//! Guardrails themselves are opaque plugins behind the
//! [`guardrail::Guardrail`] trait; checks return a tagged
//! [`guardrail::Verdict`] (pass, optionally rewritten, or blocked with
//! structured violation detail) rather than signalling policy through errors.
//!
//! ## Quick Start
//!
//! ```rust
//! use llm_guardrails_rust::guardrail::{GuardrailDescriptor, GuardrailRegistry, PatternGuardrail};
//! use llm_guardrails_rust::pipeline::{PipelineExecutor, PipelinePolicy};
//! use llm_guardrails_rust::types::{Message, RequestContext};
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = Arc::new(GuardrailRegistry::new());
//! registry.register(Arc::new(PatternGuardrail::pii(
//!     GuardrailDescriptor::new("pii"),
//! )))?;
//!
//! let policy = PipelinePolicy::from_yaml_str(
//!     "name: default\nmode: pre_call\nsteps:\n  - guardrail: pii\n",
//! )?;
//!
//! let ctx = RequestContext::new(vec![Message::user("My SSN is 123-45-6789")]);
//! let result = PipelineExecutor::new(registry).execute(&policy, &ctx).await;
//! assert!(result.is_blocked());
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`guardrail`] | Capability contract, descriptors, applicability, registry |
//! | [`pipeline`] | Conditional step pipelines and their executor |
//! | [`realtime`] | Duplex session bridging with mid-stream interception |
//! | [`streaming`] | Sampled guardrail checks over chunked responses |
//! | [`audit`] | Best-effort decision logging, decoupled from the hot path |
//! | [`types`] | Messages, tools, and the per-call request context |

pub mod audit;
pub mod guardrail;
pub mod pipeline;
pub mod realtime;
pub mod streaming;
pub mod types;

// Re-export main types for convenience
pub use guardrail::{
    should_run_guardrail, EventHook, Guardrail, GuardrailDescriptor, GuardrailInputs,
    GuardrailRegistry, Verdict, Violation,
};
pub use pipeline::{PipelineExecutor, PipelineExecutionResult, PipelinePolicy, TerminalAction};
pub use realtime::{RealtimeBridge, SessionConfig, SessionSummary};
pub use types::{Message, MessageRole, RequestContext};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};
