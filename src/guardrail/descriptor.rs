//! Guardrail configuration and the applicability engine.
//!
//! [`GuardrailDescriptor::should_run`] is the single decision point for
//! whether a guardrail instance participates in an event. It is consulted by
//! the pipeline executor once per step and by the realtime bridge once per
//! session per eligible hook, so it stays allocation-free: slice scans over
//! short name lists only.

use crate::types::RequestContext;
use serde::{Deserialize, Serialize};

/// Lifecycle point at which a guardrail may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventHook {
    PreCall,
    DuringCall,
    PostCall,
    PreMcpCall,
    DuringMcpCall,
    RealtimeInputTranscription,
    /// Telemetry-only hook: fires regardless of per-request selection.
    LoggingOnly,
}

/// What a realtime session does when this guardrail blocks an utterance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationAction {
    /// Warn the peer and keep the session open.
    #[default]
    Warn,
    /// Terminate the session on the first violation.
    EndSession,
}

/// Immutable per-instance guardrail configuration.
///
/// Created once at registration time and never mutated afterward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardrailDescriptor {
    /// Unique registry key.
    pub name: String,
    /// Hooks this implementation is capable of serving.
    #[serde(default)]
    pub supported_event_hooks: Vec<EventHook>,
    /// Hook(s) this instance is bound to. `None` means "run whenever
    /// explicitly named".
    #[serde(default)]
    pub event_hook: Option<Vec<EventHook>>,
    /// Run for every request, independent of per-request selection.
    #[serde(default)]
    pub default_on: bool,
    /// Realtime policy when this guardrail blocks.
    #[serde(default)]
    pub on_violation: ViolationAction,
    /// Terminate a realtime session once this many violations accumulate.
    #[serde(default)]
    pub end_session_after_n_fails: Option<u32>,
    /// Check every Nth chunk in streaming responses (None = every chunk).
    #[serde(default)]
    pub streaming_sampling_rate: Option<u32>,
}

impl GuardrailDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            supported_event_hooks: Vec::new(),
            event_hook: None,
            default_on: false,
            on_violation: ViolationAction::default(),
            end_session_after_n_fails: None,
            streaming_sampling_rate: None,
        }
    }

    pub fn builder(name: impl Into<String>) -> DescriptorBuilder {
        DescriptorBuilder::new(name)
    }

    /// Whether this instance is bound to `hook`.
    pub fn binds(&self, hook: EventHook) -> bool {
        match &self.event_hook {
            Some(bound) => bound.contains(&hook),
            None => false,
        }
    }

    /// Decide whether this guardrail participates in `event` for a request
    /// that selected `requested` guardrails by name.
    ///
    /// The rules, in order and with no other precedence:
    ///
    /// 1. A hook-bound instance runs only when explicitly named in the
    ///    request's selection, unless the event is [`EventHook::LoggingOnly`]
    ///    (telemetry always fires) or the instance is `default_on`.
    /// 2. A hook-bound instance never runs for an event outside its binding,
    ///    even when explicitly named.
    /// 3. Otherwise it runs.
    pub fn should_run(&self, requested: &[String], event: EventHook) -> bool {
        if let Some(bound) = &self.event_hook {
            let named = requested.iter().any(|n| n == &self.name);
            if !named && !self.default_on && event != EventHook::LoggingOnly {
                return false;
            }
            if !bound.contains(&event) {
                return false;
            }
        }
        true
    }
}

/// Decide whether `descriptor` should run for the given request and event.
///
/// Reads the request's `metadata.guardrails` selection; no side effects.
pub fn should_run_guardrail(
    descriptor: &GuardrailDescriptor,
    ctx: &RequestContext,
    event: EventHook,
) -> bool {
    descriptor.should_run(&ctx.metadata.guardrails, event)
}

/// Builder for [`GuardrailDescriptor`].
#[derive(Debug)]
pub struct DescriptorBuilder {
    descriptor: GuardrailDescriptor,
}

impl DescriptorBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            descriptor: GuardrailDescriptor::new(name),
        }
    }

    pub fn supported_hooks(mut self, hooks: Vec<EventHook>) -> Self {
        self.descriptor.supported_event_hooks = hooks;
        self
    }

    /// Bind this instance to a single hook.
    pub fn event_hook(mut self, hook: EventHook) -> Self {
        self.descriptor.event_hook = Some(vec![hook]);
        self
    }

    /// Bind this instance to several hooks.
    pub fn event_hooks(mut self, hooks: Vec<EventHook>) -> Self {
        self.descriptor.event_hook = Some(hooks);
        self
    }

    pub fn default_on(mut self, on: bool) -> Self {
        self.descriptor.default_on = on;
        self
    }

    pub fn on_violation(mut self, action: ViolationAction) -> Self {
        self.descriptor.on_violation = action;
        self
    }

    pub fn end_session_after_n_fails(mut self, n: u32) -> Self {
        self.descriptor.end_session_after_n_fails = Some(n);
        self
    }

    pub fn streaming_sampling_rate(mut self, every_n: u32) -> Self {
        self.descriptor.streaming_sampling_rate = Some(every_n);
        self
    }

    pub fn build(self) -> GuardrailDescriptor {
        self.descriptor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Message;

    fn requested(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn unbound_guardrail_runs_for_any_event() {
        let d = GuardrailDescriptor::new("free");
        assert!(d.should_run(&[], EventHook::PreCall));
        assert!(d.should_run(&[], EventHook::PostCall));
        assert!(d.should_run(&requested(&["other"]), EventHook::DuringCall));
    }

    #[test]
    fn bound_guardrail_requires_explicit_selection() {
        let d = GuardrailDescriptor::builder("pii")
            .event_hook(EventHook::PreCall)
            .build();
        assert!(!d.should_run(&[], EventHook::PreCall));
        assert!(d.should_run(&requested(&["pii"]), EventHook::PreCall));
        assert!(!d.should_run(&requested(&["other"]), EventHook::PreCall));
    }

    #[test]
    fn hook_mismatch_refuses_even_when_named() {
        // A guardrail bound to pre_call never fires for post_call.
        let d = GuardrailDescriptor::builder("pii")
            .event_hook(EventHook::PreCall)
            .build();
        assert!(!d.should_run(&requested(&["pii"]), EventHook::PostCall));
    }

    #[test]
    fn logging_only_event_bypasses_selection() {
        let d = GuardrailDescriptor::builder("audit")
            .event_hook(EventHook::LoggingOnly)
            .build();
        assert!(d.should_run(&[], EventHook::LoggingOnly));
    }

    #[test]
    fn logging_only_event_still_respects_hook_binding() {
        let d = GuardrailDescriptor::builder("pii")
            .event_hook(EventHook::PreCall)
            .build();
        // Rule 1 passes for logging_only, rule 2 still refuses the mismatch.
        assert!(!d.should_run(&[], EventHook::LoggingOnly));
    }

    #[test]
    fn default_on_bypasses_selection_but_not_hook_binding() {
        let d = GuardrailDescriptor::builder("pii")
            .event_hook(EventHook::PreCall)
            .default_on(true)
            .build();
        assert!(d.should_run(&[], EventHook::PreCall));
        assert!(!d.should_run(&[], EventHook::PostCall));
    }

    #[test]
    fn multi_hook_binding_matches_any_bound_hook() {
        let d = GuardrailDescriptor::builder("both")
            .event_hooks(vec![EventHook::PreCall, EventHook::PostCall])
            .build();
        assert!(d.should_run(&requested(&["both"]), EventHook::PreCall));
        assert!(d.should_run(&requested(&["both"]), EventHook::PostCall));
        assert!(!d.should_run(&requested(&["both"]), EventHook::DuringCall));
    }

    #[test]
    fn free_function_reads_request_metadata() {
        let d = GuardrailDescriptor::builder("pii")
            .event_hook(EventHook::PreCall)
            .build();
        let ctx =
            RequestContext::new(vec![Message::user("hi")]).with_guardrails(["pii"]);
        assert!(should_run_guardrail(&d, &ctx, EventHook::PreCall));
        assert!(!should_run_guardrail(&d, &ctx, EventHook::PostCall));

        let unselected = RequestContext::new(vec![Message::user("hi")]);
        assert!(!should_run_guardrail(&d, &unselected, EventHook::PreCall));
    }
}
