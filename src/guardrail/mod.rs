//! Guardrail capability contract and supporting types.
//!
//! A guardrail is a pluggable policy check attached to one or more lifecycle
//! hooks of an LLM call. The runtime treats every guardrail as an opaque unit
//! behind the [`Guardrail`] trait; where it runs is decided by the
//! applicability engine in [`descriptor`], and in what order by the pipeline
//! executor in [`crate::pipeline`].
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`Guardrail`] | The capability contract every plugin implements |
//! | [`GuardrailDescriptor`] | Immutable per-instance configuration |
//! | [`GuardrailRegistry`] | Name-keyed registry with atomic snapshots |
//! | [`Verdict`] | Tagged check outcome: pass (optionally rewritten) or blocked |
//! | [`GuardrailInputs`] | The text/image/tool payload handed to `apply` |
//! | [`PatternGuardrail`] | Built-in regex reference implementation |
//!
//! ## Outcome model
//!
//! A check returns `Result<Verdict<T>>` with three clearly separated channels:
//!
//! - `Ok(Verdict::Pass(None))`: content allowed unchanged
//! - `Ok(Verdict::Pass(Some(t)))`: content allowed with a rewrite (e.g. PII
//!   masking)
//! - `Ok(Verdict::Blocked(violation))`: a deliberate policy stop, carrying a
//!   human-readable message and structured violation details
//! - `Err(e)`: a technical failure (the check could not be evaluated)
//!
//! Blocking is data, not an error: callers branch on the verdict instead of
//! classifying exception shapes.

pub mod builtin;
pub mod descriptor;
pub mod registry;

pub use builtin::{PatternGuardrail, PatternRule, RuleAction};
pub use descriptor::{
    should_run_guardrail, DescriptorBuilder, EventHook, GuardrailDescriptor, ViolationAction,
};
pub use registry::GuardrailRegistry;

use crate::types::{ContentBlock, MessageContent, RequestContext, ToolDef};
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Which side of the model call a payload belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Request,
    Response,
}

/// The extracted payload handed to [`Guardrail::apply`].
///
/// `apply` must return a same-shaped payload: rewrites replace entries in
/// place, they never add or drop them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GuardrailInputs {
    pub texts: Vec<String>,
    pub images: Vec<String>,
    pub tools: Vec<ToolDef>,
}

impl GuardrailInputs {
    pub fn from_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            texts: texts.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }
}

/// A deliberate policy stop, with structured detail where available.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    /// Name of the guardrail that intervened.
    pub guardrail: String,
    /// Human-readable explanation, safe to surface to the caller.
    pub message: String,
    /// Names of the rules that were violated.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<String>,
    /// The matched patterns or fragments (may be masked).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub matched: Vec<String>,
}

impl Violation {
    pub fn new(guardrail: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            guardrail: guardrail.into(),
            message: message.into(),
            rules: Vec::new(),
            matched: Vec::new(),
        }
    }

    pub fn with_rule(mut self, rule: impl Into<String>) -> Self {
        self.rules.push(rule.into());
        self
    }

    pub fn with_match(mut self, matched: impl Into<String>) -> Self {
        self.matched.push(matched.into());
        self
    }
}

/// Outcome of a single guardrail check.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict<T> {
    /// Content may proceed. `Some` carries a rewritten payload.
    Pass(Option<T>),
    /// The guardrail decided to stop this content.
    Blocked(Violation),
}

impl<T> Verdict<T> {
    pub fn is_blocked(&self) -> bool {
        matches!(self, Verdict::Blocked(_))
    }

    /// Map the rewritten payload, preserving the verdict shape.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Verdict<U> {
        match self {
            Verdict::Pass(data) => Verdict::Pass(data.map(f)),
            Verdict::Blocked(v) => Verdict::Blocked(v),
        }
    }
}

/// The capability contract every guardrail plugin implements.
///
/// `apply` is the one required method; the lifecycle hooks have default
/// implementations that extract the relevant payload, run `apply`, and write
/// rewritten texts back. Plugins with hook-specific behavior override the
/// hooks directly.
#[async_trait]
pub trait Guardrail: Send + Sync {
    /// This instance's immutable configuration.
    fn descriptor(&self) -> &GuardrailDescriptor;

    /// Unique name, used for registry lookup and per-request selection.
    fn name(&self) -> &str {
        &self.descriptor().name
    }

    /// Evaluate (and optionally rewrite) an extracted payload.
    async fn apply(
        &self,
        inputs: GuardrailInputs,
        ctx: &RequestContext,
        direction: Direction,
    ) -> Result<Verdict<GuardrailInputs>>;

    /// Check a request before it is dispatched to the model.
    async fn pre_call_check(&self, ctx: &RequestContext) -> Result<Verdict<RequestContext>> {
        let inputs = collect_inputs(ctx);
        let verdict = self.apply(inputs, ctx, Direction::Request).await?;
        Ok(verdict.map(|rewritten| restore_texts(ctx, &rewritten.texts)))
    }

    /// Check a request while the model call is in flight.
    async fn during_call_check(&self, _ctx: &RequestContext) -> Result<Verdict<RequestContext>> {
        Ok(Verdict::Pass(None))
    }

    /// Check a model response before it is returned to the caller.
    async fn post_call_check(
        &self,
        ctx: &RequestContext,
        response: &serde_json::Value,
    ) -> Result<Verdict<serde_json::Value>> {
        let texts = extract_response_texts(response);
        if texts.is_empty() {
            return Ok(Verdict::Pass(None));
        }
        let verdict = self
            .apply(
                GuardrailInputs::from_texts(texts),
                ctx,
                Direction::Response,
            )
            .await?;
        Ok(verdict.map(|rewritten| restore_response_texts(response, &rewritten.texts)))
    }
}

/// Extract the checkable payload from a request context.
pub fn collect_inputs(ctx: &RequestContext) -> GuardrailInputs {
    let mut texts = Vec::new();
    let mut images = Vec::new();
    for message in &ctx.messages {
        match &message.content {
            MessageContent::Text(text) => texts.push(text.clone()),
            MessageContent::Blocks(blocks) => {
                for block in blocks {
                    match block {
                        ContentBlock::Text { text } => texts.push(text.clone()),
                        ContentBlock::Image { source } => images.push(source.data.clone()),
                    }
                }
            }
        }
    }
    GuardrailInputs {
        texts,
        images,
        tools: ctx.tools.clone(),
    }
}

/// Write rewritten texts back into a clone of `ctx`, in extraction order.
///
/// The rewrite contract is same-shaped, so the text count matches
/// [`collect_inputs`]; any surplus slots keep their original content.
pub fn restore_texts(ctx: &RequestContext, texts: &[String]) -> RequestContext {
    let mut rewritten = ctx.clone();
    let mut cursor = texts.iter();
    for message in &mut rewritten.messages {
        match &mut message.content {
            MessageContent::Text(text) => {
                if let Some(next) = cursor.next() {
                    *text = next.clone();
                }
            }
            MessageContent::Blocks(blocks) => {
                for block in blocks {
                    if let ContentBlock::Text { text } = block {
                        if let Some(next) = cursor.next() {
                            *text = next.clone();
                        }
                    }
                }
            }
        }
    }
    rewritten
}

/// Pull the assistant-visible texts out of a response value.
///
/// Understands the common `{"choices":[{"message":{"content": …}}]}` shape
/// and falls back to a top-level `"content"` string.
fn extract_response_texts(response: &serde_json::Value) -> Vec<String> {
    if let Some(choices) = response.get("choices").and_then(|c| c.as_array()) {
        return choices
            .iter()
            .filter_map(|choice| {
                choice
                    .pointer("/message/content")
                    .and_then(|c| c.as_str())
                    .map(String::from)
            })
            .collect();
    }
    response
        .get("content")
        .and_then(|c| c.as_str())
        .map(|s| vec![s.to_string()])
        .unwrap_or_default()
}

/// Write rewritten texts back into a clone of the response value.
fn restore_response_texts(response: &serde_json::Value, texts: &[String]) -> serde_json::Value {
    let mut rewritten = response.clone();
    let mut cursor = texts.iter();
    if let Some(choices) = rewritten.get_mut("choices").and_then(|c| c.as_array_mut()) {
        for choice in choices {
            if let Some(content) = choice.pointer_mut("/message/content") {
                if content.is_string() {
                    if let Some(next) = cursor.next() {
                        *content = serde_json::Value::String(next.clone());
                    }
                }
            }
        }
        return rewritten;
    }
    if let Some(content) = rewritten.get_mut("content") {
        if content.is_string() {
            if let Some(next) = cursor.next() {
                *content = serde_json::Value::String(next.clone());
            }
        }
    }
    rewritten
}
