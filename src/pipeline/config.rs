//! Declarative pipeline policy configuration.
//!
//! Policies are data, consumed at load time. Action and mode enums use
//! closed serde representations, so an unknown action string is a parse
//! error; invalid configuration never survives into a running pipeline.

use super::PolicyError;
use crate::guardrail::EventHook;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Per-step branching action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepAction {
    Allow,
    Block,
    Next,
    ModifyResponse,
}

impl StepAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepAction::Allow => "allow",
            StepAction::Block => "block",
            StepAction::Next => "next",
            StepAction::ModifyResponse => "modify_response",
        }
    }
}

/// Which guardrail capability method a pipeline invokes per step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineMode {
    PreCall,
    PostCall,
}

impl PipelineMode {
    /// The event hook the applicability engine is queried with.
    pub fn event_hook(&self) -> EventHook {
        match self {
            PipelineMode::PreCall => EventHook::PreCall,
            PipelineMode::PostCall => EventHook::PostCall,
        }
    }
}

/// One step of a pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineStep {
    /// Name reference, resolved against the registry at execution time.
    pub guardrail: String,
    #[serde(default = "default_on_pass")]
    pub on_pass: StepAction,
    #[serde(default = "default_on_fail")]
    pub on_fail: StepAction,
    /// Merge this step's rewritten data into the working context before the
    /// next step runs.
    #[serde(default)]
    pub pass_data: bool,
    /// Override message for the `modify_response` terminal action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modify_response_message: Option<String>,
}

fn default_on_pass() -> StepAction {
    StepAction::Allow
}

fn default_on_fail() -> StepAction {
    StepAction::Block
}

impl PipelineStep {
    pub fn new(guardrail: impl Into<String>) -> Self {
        Self {
            guardrail: guardrail.into(),
            on_pass: default_on_pass(),
            on_fail: default_on_fail(),
            pass_data: false,
            modify_response_message: None,
        }
    }

    pub fn on_pass(mut self, action: StepAction) -> Self {
        self.on_pass = action;
        self
    }

    pub fn on_fail(mut self, action: StepAction) -> Self {
        self.on_fail = action;
        self
    }

    pub fn pass_data(mut self, pass: bool) -> Self {
        self.pass_data = pass;
        self
    }

    pub fn modify_response_message(mut self, message: impl Into<String>) -> Self {
        self.modify_response_message = Some(message.into());
        self
    }
}

/// A named pipeline policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelinePolicy {
    pub name: String,
    pub mode: PipelineMode,
    pub steps: Vec<PipelineStep>,
}

impl PipelinePolicy {
    pub fn new(name: impl Into<String>, mode: PipelineMode, steps: Vec<PipelineStep>) -> Self {
        Self {
            name: name.into(),
            mode,
            steps,
        }
    }

    /// Load-time structural validation.
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.name.trim().is_empty() {
            return Err(PolicyError::Invalid {
                policy: self.name.clone(),
                reason: "policy name must be non-empty".to_string(),
            });
        }
        if self.steps.is_empty() {
            return Err(PolicyError::Invalid {
                policy: self.name.clone(),
                reason: "policy must declare at least one step".to_string(),
            });
        }
        for (i, step) in self.steps.iter().enumerate() {
            if step.guardrail.trim().is_empty() {
                return Err(PolicyError::Invalid {
                    policy: self.name.clone(),
                    reason: format!("steps[{}].guardrail must be non-empty", i),
                });
            }
        }
        Ok(())
    }

    /// Parse and validate a single policy from YAML.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, PolicyError> {
        let policy: PipelinePolicy =
            serde_yaml::from_str(yaml).map_err(|e| PolicyError::Parse(e.to_string()))?;
        policy.validate()?;
        Ok(policy)
    }
}

/// A collection of named policies, the usual on-disk configuration unit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyFile {
    #[serde(default)]
    pub policies: Vec<PipelinePolicy>,
}

impl PolicyFile {
    /// Parse and validate a policy file from YAML.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, PolicyError> {
        let file: PolicyFile =
            serde_yaml::from_str(yaml).map_err(|e| PolicyError::Parse(e.to_string()))?;
        let mut seen = HashSet::new();
        for policy in &file.policies {
            policy.validate()?;
            if !seen.insert(policy.name.clone()) {
                return Err(PolicyError::DuplicateName(policy.name.clone()));
            }
        }
        Ok(file)
    }

    pub fn get(&self, name: &str) -> Option<&PipelinePolicy> {
        self.policies.iter().find(|p| p.name == name)
    }
}
