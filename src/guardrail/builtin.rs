//! Built-in pattern guardrail.
//!
//! The crate's reference implementation of the [`Guardrail`] contract: an
//! ordered set of regex rules, each either blocking the content or masking
//! the matched spans. Masking exercises the rewrite path
//! (`Verdict::Pass(Some(_))`), blocking the intervention path. Vendor
//! guardrails live behind the same trait out of tree.

use super::descriptor::GuardrailDescriptor;
use super::{Direction, Guardrail, GuardrailInputs, Verdict, Violation};
use crate::types::RequestContext;
use crate::Result;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

/// What to do when a rule matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleAction {
    /// Stop the content with a violation.
    Block,
    /// Replace the matched span and pass the rewrite along.
    Mask,
}

/// A compiled pattern rule.
#[derive(Debug, Clone)]
pub struct PatternRule {
    name: String,
    pattern: Regex,
    action: RuleAction,
}

impl PatternRule {
    pub fn new(name: impl Into<String>, pattern: Regex, action: RuleAction) -> Self {
        Self {
            name: name.into(),
            pattern,
            action,
        }
    }
}

static EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}").unwrap());
static SSN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[0-9]{3}-[0-9]{2}-[0-9]{4}\b").unwrap());
static CREDIT_CARD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:4[0-9]{12}(?:[0-9]{3})?|5[1-5][0-9]{14}|3[47][0-9]{13})\b").unwrap()
});
static PERSON_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[A-Z][a-z]+ [A-Z][a-z]+\b").unwrap());

/// Regex-rule guardrail with per-rule block/mask actions.
pub struct PatternGuardrail {
    descriptor: GuardrailDescriptor,
    rules: Vec<PatternRule>,
    mask_replacement: String,
}

impl PatternGuardrail {
    pub fn new(descriptor: GuardrailDescriptor, rules: Vec<PatternRule>) -> Self {
        Self {
            descriptor,
            rules,
            mask_replacement: "[REDACTED]".to_string(),
        }
    }

    pub fn with_mask_replacement(mut self, replacement: impl Into<String>) -> Self {
        self.mask_replacement = replacement.into();
        self
    }

    /// PII preset: masks emails and person-name pairs, blocks SSNs and
    /// credit card numbers.
    pub fn pii(descriptor: GuardrailDescriptor) -> Self {
        Self::new(
            descriptor,
            vec![
                PatternRule::new("ssn", SSN.clone(), RuleAction::Block),
                PatternRule::new("credit_card", CREDIT_CARD.clone(), RuleAction::Block),
                PatternRule::new("email", EMAIL.clone(), RuleAction::Mask),
                PatternRule::new("person_name", PERSON_NAME.clone(), RuleAction::Mask),
            ],
        )
    }

    fn check_texts(&self, texts: &[String]) -> Verdict<Vec<String>> {
        // Blocking rules take precedence over masking ones regardless of
        // rule order: a blocked payload must not leak a partial rewrite.
        for rule in self.rules.iter().filter(|r| r.action == RuleAction::Block) {
            for text in texts {
                if let Some(m) = rule.pattern.find(text) {
                    return Verdict::Blocked(
                        Violation::new(
                            &self.descriptor.name,
                            format!("content matched blocked pattern '{}'", rule.name),
                        )
                        .with_rule(&rule.name)
                        .with_match(m.as_str()),
                    );
                }
            }
        }

        let mut rewritten = texts.to_vec();
        let mut changed = false;
        for rule in self.rules.iter().filter(|r| r.action == RuleAction::Mask) {
            for text in &mut rewritten {
                if rule.pattern.is_match(text) {
                    *text = rule
                        .pattern
                        .replace_all(text, self.mask_replacement.as_str())
                        .into_owned();
                    changed = true;
                }
            }
        }
        Verdict::Pass(changed.then_some(rewritten))
    }
}

#[async_trait]
impl Guardrail for PatternGuardrail {
    fn descriptor(&self) -> &GuardrailDescriptor {
        &self.descriptor
    }

    async fn apply(
        &self,
        inputs: GuardrailInputs,
        _ctx: &RequestContext,
        _direction: Direction,
    ) -> Result<Verdict<GuardrailInputs>> {
        Ok(self.check_texts(&inputs.texts).map(|texts| GuardrailInputs {
            texts,
            images: inputs.images.clone(),
            tools: inputs.tools.clone(),
        }))
    }
}
