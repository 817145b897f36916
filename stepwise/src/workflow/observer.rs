//! Hand-off of compiled steps to an execution or logging collaborator

use super::definition::Workflow;
use super::step::{walk_steps, Step};
use crate::error::Result;
use std::collections::BTreeMap;

/// Receives one call per step of a compiled workflow
///
/// `input` is the step's natural-language phrase and `output` its JSON
/// document; neither is interpreted by the compiler.
pub trait StepObserver {
    /// Called for each step, in pre-order
    fn on_step(
        &mut self,
        operation: &str,
        input: &[u8],
        output: &[u8],
        metadata: &BTreeMap<String, String>,
    );
}

fn step_metadata(workflow: &Workflow, step: &Step) -> BTreeMap<String, String> {
    let mut metadata = BTreeMap::new();
    metadata.insert("workflow_id".to_string(), workflow.id.to_string());
    metadata.insert("workflow_name".to_string(), workflow.name.to_string());
    metadata.insert("step_id".to_string(), step.id.to_string());
    metadata.insert("roles".to_string(), join(&step.access.roles));
    metadata.insert("permissions".to_string(), join(&step.access.permissions));
    metadata
}

fn join<'a>(items: impl IntoIterator<Item = &'a String>) -> String {
    items
        .into_iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(",")
}

/// Pass every step of `workflow` to `observer`, in pre-order
pub fn notify_steps(workflow: &Workflow, observer: &mut dyn StepObserver) -> Result<usize> {
    let mut steps = Vec::new();
    walk_steps(&workflow.steps, &mut |step| steps.push(step));

    for step in &steps {
        let output = serde_json::to_vec(step)?;
        observer.on_step(
            step.kind.type_name(),
            step.natural_language.as_bytes(),
            &output,
            &step_metadata(workflow, step),
        );
    }
    Ok(steps.len())
}

/// Observer that records each step through `tracing`
#[derive(Debug, Default)]
pub struct TracingObserver {
    seen: usize,
}

impl TracingObserver {
    /// Create a new observer
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of steps observed so far
    pub fn seen(&self) -> usize {
        self.seen
    }
}

impl StepObserver for TracingObserver {
    fn on_step(
        &mut self,
        operation: &str,
        input: &[u8],
        output: &[u8],
        metadata: &BTreeMap<String, String>,
    ) {
        self.seen += 1;
        tracing::info!(
            operation = operation,
            step_id = metadata.get("step_id").map(String::as_str).unwrap_or_default(),
            output_bytes = output.len(),
            "{}",
            String::from_utf8_lossy(input)
        );
    }
}
