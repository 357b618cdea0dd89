//! Shared test fixtures.

use async_trait::async_trait;
use llm_guardrails_rust::guardrail::{
    Direction, Guardrail, GuardrailDescriptor, GuardrailInputs, Verdict, Violation,
};
use llm_guardrails_rust::types::RequestContext;
use llm_guardrails_rust::Result;
use std::sync::Arc;

/// Blocks any text containing a fixed marker string; passes everything else.
pub struct MarkerGuardrail {
    descriptor: GuardrailDescriptor,
    marker: String,
}

impl MarkerGuardrail {
    pub fn new(descriptor: GuardrailDescriptor, marker: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            descriptor,
            marker: marker.into(),
        })
    }
}

#[async_trait]
impl Guardrail for MarkerGuardrail {
    fn descriptor(&self) -> &GuardrailDescriptor {
        &self.descriptor
    }

    async fn apply(
        &self,
        inputs: GuardrailInputs,
        _ctx: &RequestContext,
        _direction: Direction,
    ) -> Result<Verdict<GuardrailInputs>> {
        for text in &inputs.texts {
            if text.contains(&self.marker) {
                return Ok(Verdict::Blocked(
                    Violation::new(&self.descriptor.name, "content violates policy")
                        .with_rule("marker")
                        .with_match(&self.marker),
                ));
            }
        }
        Ok(Verdict::Pass(None))
    }
}

/// Install a tracing subscriber for test diagnostics (idempotent).
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}
