//! Sequential pipeline step executor.

use super::config::{PipelineMode, PipelinePolicy, StepAction};
use super::result::{
    PipelineExecutionResult, PipelineStepResult, StepData, StepOutcome, TerminalAction,
};
use crate::audit::{AuditEvent, AuditHandle};
use crate::guardrail::{GuardrailRegistry, Verdict};
use crate::types::RequestContext;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Executes pipeline policies against a registry of live guardrails.
///
/// One `execute` call serves one inbound request; concurrent requests run
/// their pipelines independently, sharing only the read-only registry
/// snapshot. The registry and the optional audit handle are explicit
/// dependencies, injected at construction.
pub struct PipelineExecutor {
    registry: Arc<GuardrailRegistry>,
    audit: Option<AuditHandle>,
}

impl PipelineExecutor {
    pub fn new(registry: Arc<GuardrailRegistry>) -> Self {
        Self {
            registry,
            audit: None,
        }
    }

    pub fn with_audit(mut self, audit: AuditHandle) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Run a pre-call policy over `ctx`.
    ///
    /// In `post_call` mode with no response payload the response-side checks
    /// see an empty document; prefer [`Self::execute_with_response`] there.
    pub async fn execute(
        &self,
        policy: &PipelinePolicy,
        ctx: &RequestContext,
    ) -> PipelineExecutionResult {
        self.run(policy, ctx, &serde_json::Value::Null).await
    }

    /// Run a post-call policy over `ctx` and the model's response.
    pub async fn execute_with_response(
        &self,
        policy: &PipelinePolicy,
        ctx: &RequestContext,
        response: &serde_json::Value,
    ) -> PipelineExecutionResult {
        self.run(policy, ctx, response).await
    }

    async fn run(
        &self,
        policy: &PipelinePolicy,
        ctx: &RequestContext,
        response: &serde_json::Value,
    ) -> PipelineExecutionResult {
        // Work on copies; the caller's context and response are never touched.
        let mut working_ctx = ctx.clone();
        let mut working_response = response.clone();
        let mut step_results: Vec<PipelineStepResult> = Vec::with_capacity(policy.steps.len());

        let mut terminal: Option<TerminalAction> = None;
        let mut error_message: Option<String> = None;
        let mut modify_response_message: Option<String> = None;

        for step in &policy.steps {
            let started = Instant::now();

            let (outcome, modified, error_detail, violation) =
                match self.registry.get(&step.guardrail) {
                    None => {
                        let detail = format!("Guardrail '{}' not found", step.guardrail);
                        warn!(policy = %policy.name, guardrail = %step.guardrail, "{detail}");
                        (StepOutcome::Error, None, Some(detail), None)
                    }
                    Some(guardrail) => {
                        // A step's membership in the policy is itself sufficient
                        // authorization: the step's guardrail becomes the working
                        // selection, so the applicability engine admits it.
                        working_ctx.metadata.guardrails = vec![step.guardrail.clone()];

                        if !guardrail
                            .descriptor()
                            .should_run(&working_ctx.metadata.guardrails, policy.mode.event_hook())
                        {
                            debug!(
                                policy = %policy.name,
                                guardrail = %step.guardrail,
                                mode = ?policy.mode,
                                "step skipped: guardrail not bound to this mode's hook"
                            );
                            (StepOutcome::Pass, None, None, None)
                        } else {
                            match policy.mode {
                                PipelineMode::PreCall => {
                                    match guardrail.pre_call_check(&working_ctx).await {
                                        Ok(Verdict::Pass(data)) => (
                                            StepOutcome::Pass,
                                            data.map(StepData::Request),
                                            None,
                                            None,
                                        ),
                                        Ok(Verdict::Blocked(v)) => (
                                            StepOutcome::Fail,
                                            None,
                                            Some(v.message.clone()),
                                            Some(v),
                                        ),
                                        Err(e) => {
                                            (StepOutcome::Error, None, Some(e.to_string()), None)
                                        }
                                    }
                                }
                                PipelineMode::PostCall => {
                                    match guardrail
                                        .post_call_check(&working_ctx, &working_response)
                                        .await
                                    {
                                        Ok(Verdict::Pass(data)) => (
                                            StepOutcome::Pass,
                                            data.map(StepData::Response),
                                            None,
                                            None,
                                        ),
                                        Ok(Verdict::Blocked(v)) => (
                                            StepOutcome::Fail,
                                            None,
                                            Some(v.message.clone()),
                                            Some(v),
                                        ),
                                        Err(e) => {
                                            (StepOutcome::Error, None, Some(e.to_string()), None)
                                        }
                                    }
                                }
                            }
                        }
                    }
                };

            // Errors resolve through on_fail just like deliberate blocks: an
            // unevaluable check must not silently default to allow.
            let action = if outcome == StepOutcome::Pass {
                step.on_pass
            } else {
                step.on_fail
            };

            debug!(
                policy = %policy.name,
                guardrail = %step.guardrail,
                outcome = ?outcome,
                action = action.as_str(),
                "pipeline step resolved"
            );

            if let Some(v) = &violation {
                self.record(AuditEvent::GuardrailBlocked {
                    call_id: ctx.call_id.clone(),
                    guardrail: step.guardrail.clone(),
                    message: v.message.clone(),
                });
            } else if outcome == StepOutcome::Error {
                self.record(AuditEvent::GuardrailErrored {
                    call_id: ctx.call_id.clone(),
                    guardrail: step.guardrail.clone(),
                    message: error_detail.clone().unwrap_or_default(),
                });
            }

            if step.pass_data {
                match &modified {
                    Some(StepData::Request(rewritten)) => working_ctx.absorb(rewritten.clone()),
                    Some(StepData::Response(rewritten)) => working_response = rewritten.clone(),
                    None => {}
                }
            }

            step_results.push(PipelineStepResult {
                guardrail_name: step.guardrail.clone(),
                outcome,
                action_taken: action,
                modified_data: modified,
                error_detail: error_detail.clone(),
                violation,
                duration: started.elapsed(),
            });

            match action {
                StepAction::Allow => {
                    terminal = Some(TerminalAction::Allow);
                    break;
                }
                StepAction::Block => {
                    terminal = Some(TerminalAction::Block);
                    error_message = error_detail;
                    break;
                }
                StepAction::ModifyResponse => {
                    terminal = Some(TerminalAction::ModifyResponse);
                    modify_response_message = step
                        .modify_response_message
                        .clone()
                        .or(error_detail);
                    break;
                }
                StepAction::Next => continue,
            }
        }

        // Restore the caller's selection: the singleton injection above is an
        // executor-internal authorization detail, not a rewrite.
        working_ctx.metadata.guardrails = ctx.metadata.guardrails.clone();

        let fell_through = terminal.is_none();
        let terminal_action = terminal.unwrap_or(TerminalAction::Allow);

        // Early allow reports data only when something changed; fall-through
        // allow always carries the final working data.
        let request_changed = working_ctx != *ctx;
        let response_changed = working_response != *response;
        let (modified_request, modified_response) = match (terminal_action, policy.mode) {
            (TerminalAction::Allow, PipelineMode::PreCall) => (
                (fell_through || request_changed).then(|| working_ctx.clone()),
                None,
            ),
            (TerminalAction::Allow, PipelineMode::PostCall) => (
                None,
                (fell_through || response_changed).then(|| working_response.clone()),
            ),
            _ => (None, None),
        };

        self.record(AuditEvent::PipelineCompleted {
            call_id: ctx.call_id.clone(),
            policy: policy.name.clone(),
            terminal_action,
            steps: step_results.len(),
            total_duration: step_results.iter().map(|s| s.duration).sum::<Duration>(),
        });

        PipelineExecutionResult {
            terminal_action,
            step_results,
            modified_request,
            modified_response,
            error_message,
            modify_response_message,
        }
    }

    fn record(&self, event: AuditEvent) {
        if let Some(audit) = &self.audit {
            audit.record(event);
        }
    }
}
