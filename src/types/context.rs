//! Per-call request context.
//!
//! The context is an explicit struct with a defined set of fields rather than
//! a free-form map: pipeline steps receive a clone of the caller's context and
//! hand back rewritten copies, so the caller's original is never mutated.

use super::message::Message;
use super::tool::ToolDef;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Mutable per-call state threaded through guardrail checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestContext {
    /// Unique identifier for this call.
    pub call_id: String,
    /// Ordered conversation history.
    pub messages: Vec<Message>,
    /// Tools declared on the request, if any.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDef>,
    pub metadata: RequestMetadata,
}

impl RequestContext {
    /// Create a context with a fresh call id.
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            call_id: uuid::Uuid::new_v4().to_string(),
            messages,
            tools: Vec::new(),
            metadata: RequestMetadata::default(),
        }
    }

    /// Set the guardrails explicitly requested for this call.
    pub fn with_guardrails<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.metadata.guardrails = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolDef>) -> Self {
        self.tools = tools;
        self
    }

    /// Overlay a rewritten context onto this one.
    ///
    /// Messages and tools are replaced wholesale; metadata extras merge
    /// key-by-key with the rewrite winning on conflicts. The call id is
    /// stable for the lifetime of the call and never overwritten.
    pub fn absorb(&mut self, rewritten: RequestContext) {
        self.messages = rewritten.messages;
        self.tools = rewritten.tools;
        self.metadata.guardrails = rewritten.metadata.guardrails;
        for (k, v) in rewritten.metadata.extra {
            self.metadata.extra.insert(k, v);
        }
    }
}

/// Request metadata relevant to guardrail routing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestMetadata {
    /// Guardrail names explicitly requested for this call. Empty means
    /// "no explicit selection".
    #[serde(default)]
    pub guardrails: Vec<String>,
    /// Free-form metadata carried for downstream consumers.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}
