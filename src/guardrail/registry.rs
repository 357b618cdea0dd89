//! Guardrail registry.
//!
//! Read-mostly: every pipeline step and every realtime event resolves
//! guardrails by name, while registration happens only at startup or config
//! reload. Lookups therefore load an immutable snapshot via `arc-swap`;
//! registration clones the map and swaps the snapshot atomically. The
//! registry is an explicit dependency of the executor and the bridge; there
//! is no process-wide instance.

use super::descriptor::EventHook;
use super::Guardrail;
use crate::{Error, ErrorContext, Result};
use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::sync::Arc;

type Snapshot = HashMap<String, Arc<dyn Guardrail>>;

pub struct GuardrailRegistry {
    snapshot: ArcSwap<Snapshot>,
}

impl GuardrailRegistry {
    pub fn new() -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(Snapshot::new()),
        }
    }

    /// Register a guardrail under its descriptor name.
    ///
    /// Replaces any previous registration with the same name. Descriptor
    /// problems (empty name, a hook binding outside the declared supported
    /// set) are configuration errors and refuse the registration.
    pub fn register(&self, guardrail: Arc<dyn Guardrail>) -> Result<()> {
        let descriptor = guardrail.descriptor();
        if descriptor.name.trim().is_empty() {
            return Err(Error::validation_with_context(
                "guardrail name must be non-empty",
                ErrorContext::new()
                    .with_field_path("descriptor.name")
                    .with_source("guardrail_registry"),
            ));
        }
        if let Some(bound) = &descriptor.event_hook {
            if !descriptor.supported_event_hooks.is_empty() {
                if let Some(unsupported) = bound
                    .iter()
                    .find(|h| !descriptor.supported_event_hooks.contains(h))
                {
                    return Err(Error::validation_with_context(
                        format!(
                            "guardrail '{}' is bound to {:?}, which it does not support",
                            descriptor.name, unsupported
                        ),
                        ErrorContext::new()
                            .with_field_path("descriptor.event_hook")
                            .with_details(format!(
                                "supported: {:?}",
                                descriptor.supported_event_hooks
                            ))
                            .with_source("guardrail_registry"),
                    ));
                }
            }
        }

        let name = descriptor.name.clone();
        let mut next = Snapshot::clone(&self.snapshot.load());
        next.insert(name, guardrail);
        self.snapshot.store(Arc::new(next));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Guardrail>> {
        self.snapshot.load().get(name).cloned()
    }

    pub fn has(&self, name: &str) -> bool {
        self.snapshot.load().contains_key(name)
    }

    pub fn list(&self) -> Vec<Arc<dyn Guardrail>> {
        self.snapshot.load().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.snapshot.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot.load().is_empty()
    }

    /// Guardrails applicable to any of `hooks` for a request that selected
    /// `requested` by name. Used by the realtime bridge to resolve its
    /// eligible set once per session.
    pub fn eligible_for(
        &self,
        requested: &[String],
        hooks: &[EventHook],
    ) -> Vec<Arc<dyn Guardrail>> {
        let mut eligible: Vec<Arc<dyn Guardrail>> = self
            .snapshot
            .load()
            .values()
            .filter(|g| {
                hooks
                    .iter()
                    .any(|hook| g.descriptor().should_run(requested, *hook))
            })
            .cloned()
            .collect();
        // Deterministic invocation order for multi-guardrail sessions.
        eligible.sort_by(|a, b| a.name().cmp(b.name()));
        eligible
    }
}

impl Default for GuardrailRegistry {
    fn default() -> Self {
        Self::new()
    }
}
