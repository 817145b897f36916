//! Compiled workflow document and its structural checks

use super::expression::Expression;
use super::step::{walk_steps, Step, StepKind};
use super::types::{ValueType, VariableSpec};
use crate::config::CompilerConfig;
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use thiserror::Error;
use ulid::Ulid;

/// Errors that can occur when creating workflow-related types
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// Workflow name cannot be empty or whitespace only
    #[error("Workflow name cannot be empty or whitespace only")]
    EmptyWorkflowName,
}

/// Result type for workflow operations
pub type WorkflowResult<T> = std::result::Result<T, WorkflowError>;

/// Name of a compiled workflow
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkflowName(String);

impl WorkflowName {
    /// Create a workflow name, returning an error for empty input
    pub fn try_new(name: impl Into<String>) -> WorkflowResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(WorkflowError::EmptyWorkflowName);
        }
        Ok(Self(name))
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for WorkflowName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for WorkflowName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Capability tags a workflow may declare
pub mod capability {
    /// Assigns variables
    pub const VARIABLES: &str = "variables";
    /// Branches, loops, returns or breaks
    pub const CONTROL_FLOW: &str = "control_flow";
    /// Waits
    pub const TIMERS: &str = "timers";
    /// Calls external endpoints
    pub const INTEGRATIONS: &str = "integrations";
    /// Runs classification models
    pub const AI: &str = "ai";
    /// Describes UI
    pub const UI: &str = "ui";
}

/// A compiled workflow: ordered steps plus declared inputs and outputs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    /// Unique identifier of this compilation
    pub id: Ulid,
    /// Workflow name
    pub name: WorkflowName,
    /// Semantic version
    pub version: String,
    /// Capability tags derived from the step kinds present
    pub capabilities: Vec<String>,
    /// When the workflow was compiled
    pub created_at: DateTime<Utc>,
    /// Top-level steps in line order
    pub steps: Vec<Step>,
    /// Variables read before anything in the workflow assigns them
    pub inputs: BTreeMap<String, VariableSpec>,
    /// Variables the workflow assigns
    pub outputs: BTreeMap<String, VariableSpec>,
    /// Bookkeeping metadata
    pub metadata: BTreeMap<String, String>,
}

impl Workflow {
    /// Assemble a workflow document from compiled steps and inferred types
    pub fn assemble(
        steps: Vec<Step>,
        types: &BTreeMap<String, ValueType>,
        config: &CompilerConfig,
    ) -> Self {
        let mut collector = VariableCollector::default();
        collector.visit(&steps);

        let spec_for = |name: &str| VariableSpec::from(types.get(name).copied().unwrap_or_default());
        let inputs = collector
            .inputs
            .iter()
            .map(|name| (name.to_string(), spec_for(name)))
            .collect();
        let outputs = collector
            .outputs
            .iter()
            .map(|name| (name.to_string(), spec_for(name)))
            .collect();

        let mut metadata = BTreeMap::new();
        metadata.insert("compiler".to_string(), "stepwise".to_string());
        metadata.insert("compiler_version".to_string(), crate::VERSION.to_string());

        Self {
            id: Ulid::new(),
            name: WorkflowName(config.workflow_name.clone()),
            version: config.workflow_version.clone(),
            capabilities: derive_capabilities(&steps),
            created_at: Utc::now(),
            steps,
            inputs,
            outputs,
            metadata,
        }
    }

    /// Number of steps including nested ones
    pub fn step_count(&self) -> usize {
        let mut count = 0;
        walk_steps(&self.steps, &mut |_| count += 1);
        count
    }

    /// Validate the workflow structure beyond what the schema expresses
    pub fn validate_structure(&self) -> std::result::Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.name.as_str().trim().is_empty() {
            errors.push("Workflow name cannot be empty".to_string());
        }

        let mut seen = HashSet::new();
        let mut previous: Option<u64> = None;
        walk_steps(&self.steps, &mut |step| {
            if !seen.insert(step.id.clone()) {
                errors.push(format!("Duplicate step id '{}'", step.id));
                return;
            }
            match step.id.number() {
                Some(n) => {
                    if let Some(prev) = previous {
                        if n <= prev {
                            errors.push(format!(
                                "Step id '{}' is not greater than the preceding step_{}",
                                step.id, prev
                            ));
                        }
                    }
                    previous = Some(n);
                }
                None => errors.push(format!("Step id '{}' has no numeric part", step.id)),
            }
        });

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Serialize to the JSON document form checked by the schema gate
    pub fn to_value(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Serialize to pretty-printed JSON
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Serialize to YAML
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Read a workflow document back from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Collects variable reads and writes in pre-order
///
/// A read counts as an input only when no earlier step assigned the name.
#[derive(Default)]
struct VariableCollector<'a> {
    assigned: BTreeSet<&'a str>,
    inputs: BTreeSet<&'a str>,
    outputs: BTreeSet<&'a str>,
}

impl<'a> VariableCollector<'a> {
    fn visit(&mut self, steps: &'a [Step]) {
        for step in steps {
            self.visit_step(step);
        }
    }

    fn read_expression(&mut self, expr: &'a Expression) {
        let mut names = BTreeSet::new();
        expr.collect_variables(&mut names);
        self.read(names);
    }

    fn read(&mut self, names: BTreeSet<&'a str>) {
        for name in names {
            if !self.assigned.contains(name) {
                self.inputs.insert(name);
            }
        }
    }

    fn write(&mut self, name: &'a str) {
        self.assigned.insert(name);
        self.outputs.insert(name);
    }

    fn visit_step(&mut self, step: &'a Step) {
        match &step.kind {
            StepKind::Set { target, value } => {
                self.read_expression(value);
                self.write(target);
            }
            StepKind::If {
                condition,
                then,
                otherwise,
            } => {
                let mut names = BTreeSet::new();
                condition.collect_variables(&mut names);
                self.read(names);
                self.visit(then);
                self.visit(otherwise);
            }
            StepKind::While { condition, body } => {
                let mut names = BTreeSet::new();
                condition.collect_variables(&mut names);
                self.read(names);
                self.visit(body);
            }
            StepKind::Return { value } => self.read_expression(value),
            StepKind::AiClassify { input, target, .. } => {
                self.read_expression(input);
                self.write(target);
            }
            StepKind::Call { target, .. } => self.write(target),
            StepKind::UiState { initial, .. } => self.read_expression(initial),
            StepKind::Wait { .. }
            | StepKind::Break
            | StepKind::UiRender { .. }
            | StepKind::CssStyle { .. }
            | StepKind::UiEvent { .. } => {}
        }
    }
}

fn derive_capabilities(steps: &[Step]) -> Vec<String> {
    let mut tags = BTreeSet::new();
    walk_steps(steps, &mut |step| {
        let tag = match &step.kind {
            StepKind::Set {
                value: Expression::Classify { .. },
                ..
            }
            | StepKind::AiClassify { .. } => capability::AI,
            StepKind::Set { .. } => capability::VARIABLES,
            StepKind::If { .. }
            | StepKind::While { .. }
            | StepKind::Return { .. }
            | StepKind::Break => capability::CONTROL_FLOW,
            StepKind::Wait { .. } => capability::TIMERS,
            StepKind::Call { .. } => capability::INTEGRATIONS,
            StepKind::UiRender { .. }
            | StepKind::UiState { .. }
            | StepKind::CssStyle { .. }
            | StepKind::UiEvent { .. } => capability::UI,
        };
        tags.insert(tag);
    });
    tags.into_iter().map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::test_helpers::{assemble_lines, set_step};

    #[test]
    fn test_workflow_name_validation() {
        assert!(WorkflowName::try_new("report").is_ok());
        assert!(matches!(
            WorkflowName::try_new("   "),
            Err(WorkflowError::EmptyWorkflowName)
        ));
    }

    #[test]
    fn test_inputs_and_outputs() {
        let workflow = assemble_lines(&["set total to price * qty", "return total"]);
        assert_eq!(
            workflow.inputs.keys().collect::<Vec<_>>(),
            vec!["price", "qty"]
        );
        assert_eq!(workflow.outputs.keys().collect::<Vec<_>>(), vec!["total"]);
        assert_eq!(workflow.outputs["total"].value_type, ValueType::Number);
        assert_eq!(workflow.inputs["price"].value_type, ValueType::String);
    }

    #[test]
    fn test_assigned_before_read_is_not_input() {
        let workflow = assemble_lines(&["set x to 0", "repeat set x to x + 1 3 times"]);
        assert!(workflow.inputs.is_empty());
        assert!(workflow.outputs.contains_key("x"));
        assert!(workflow.outputs.contains_key("step_2_counter"));
    }

    #[test]
    fn test_condition_variables_are_inputs() {
        let workflow = assemble_lines(&["if message contains hello then set greeted to true"]);
        assert!(workflow.inputs.contains_key("message"));
        assert_eq!(workflow.outputs["greeted"].value_type, ValueType::Boolean);
    }

    #[test]
    fn test_capabilities() {
        let workflow = assemble_lines(&[
            "set x to 1",
            "wait 2 seconds",
            "call api into result",
            "if x > 0 then analyze result with sentiment",
            "render chart as main",
        ]);
        assert_eq!(
            workflow.capabilities,
            vec!["ai", "control_flow", "integrations", "timers", "ui", "variables"]
        );
    }

    #[test]
    fn test_validate_structure_accepts_compiled_ids() {
        let workflow = assemble_lines(&[
            "if a > 1 then set b to 2 else set b to 3",
            "repeat wait 1 seconds 2 times",
        ]);
        assert!(workflow.validate_structure().is_ok());
        assert_eq!(workflow.step_count(), 7);
    }

    #[test]
    fn test_validate_structure_reports_every_problem() {
        let mut workflow = assemble_lines(&["set a to 1"]);
        workflow.steps = vec![set_step(2, "a"), set_step(2, "b"), set_step(1, "c")];
        let errors = workflow.validate_structure().unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors[0].contains("Duplicate step id 'step_2'"));
        assert!(errors[1].contains("step_1"));
    }

    #[test]
    fn test_json_and_yaml_export() {
        let workflow = assemble_lines(&["set x to 1"]);
        let json = workflow.to_json_pretty().unwrap();
        let back = Workflow::from_json(&json).unwrap();
        assert_eq!(back, workflow);

        let yaml = workflow.to_yaml().unwrap();
        assert!(yaml.contains("type: set"));
        assert!(yaml.contains("name: compiled-workflow"));
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        let err = Workflow::from_json("{ not json").unwrap_err();
        assert!(matches!(err, crate::error::StepwiseError::Json(_)));
    }
}
