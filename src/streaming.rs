//! Guardrail sampling for streamed (chunked) responses.
//!
//! Running a guardrail on every delta of a streamed response multiplies its
//! cost by the chunk count. The runner instead accumulates the stream and
//! checks the accumulated text every Nth chunk, as configured by the
//! descriptor's `streaming_sampling_rate`. A full-history check always
//! executed at stream end, so nothing escapes inspection entirely.

use crate::guardrail::{Direction, Guardrail, GuardrailInputs, Verdict, Violation};
use crate::types::RequestContext;
use crate::Result;
use std::sync::Arc;
use tracing::debug;

/// Per-stream guardrail runner. One instance per (stream, guardrail) pair.
pub struct StreamingGuardrailRunner {
    guardrail: Arc<dyn Guardrail>,
    sampling_rate: u32,
    accumulated: String,
    chunk_index: u64,
    /// Set once a check blocks; later chunks are not re-checked.
    blocked: Option<Violation>,
}

impl StreamingGuardrailRunner {
    pub fn new(guardrail: Arc<dyn Guardrail>) -> Self {
        let sampling_rate = guardrail
            .descriptor()
            .streaming_sampling_rate
            .unwrap_or(1)
            .max(1);
        Self {
            guardrail,
            sampling_rate,
            accumulated: String::new(),
            chunk_index: 0,
            blocked: None,
        }
    }

    /// Number of chunks observed so far.
    pub fn chunks_seen(&self) -> u64 {
        self.chunk_index
    }

    /// Feed one chunk. Returns the guardrail's verdict over the accumulated
    /// text when this chunk falls on a sampling boundary, `Pass(None)`
    /// otherwise.
    pub async fn on_chunk(
        &mut self,
        chunk: &str,
        ctx: &RequestContext,
    ) -> Result<Verdict<String>> {
        self.accumulated.push_str(chunk);
        self.chunk_index += 1;

        if let Some(violation) = &self.blocked {
            return Ok(Verdict::Blocked(violation.clone()));
        }
        if self.chunk_index % u64::from(self.sampling_rate) != 0 {
            return Ok(Verdict::Pass(None));
        }
        debug!(
            guardrail = self.guardrail.name(),
            chunk = self.chunk_index,
            "sampled streaming check"
        );
        self.check(ctx).await
    }

    /// Final full-history check. Always runs, regardless of sampling rate.
    pub async fn on_stream_end(&mut self, ctx: &RequestContext) -> Result<Verdict<String>> {
        if let Some(violation) = &self.blocked {
            return Ok(Verdict::Blocked(violation.clone()));
        }
        self.check(ctx).await
    }

    async fn check(&mut self, ctx: &RequestContext) -> Result<Verdict<String>> {
        let inputs = GuardrailInputs::from_texts([self.accumulated.as_str()]);
        let verdict = self
            .guardrail
            .apply(inputs, ctx, Direction::Response)
            .await?;
        match verdict {
            Verdict::Pass(rewritten) => Ok(Verdict::Pass(
                rewritten.and_then(|r| r.texts.into_iter().next()),
            )),
            Verdict::Blocked(violation) => {
                self.blocked = Some(violation.clone());
                Ok(Verdict::Blocked(violation))
            }
        }
    }
}
