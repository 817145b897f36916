//! Test helper functions for workflow module

#![cfg(test)]

use crate::config::CompilerConfig;
use crate::workflow::context::CompilationContext;
use crate::workflow::definition::Workflow;
use crate::workflow::expression::Expression;
use crate::workflow::registry::parse_sentence;
use crate::workflow::step::{walk_steps, AccessControl, Step, StepId, StepKind};

/// Parse one line with a fresh default context
pub fn parse_line(line: &str) -> (Vec<Step>, CompilationContext) {
    let mut ctx = CompilationContext::default();
    let steps = parse_sentence(line, &mut ctx);
    (steps, ctx)
}

/// Numeric ids of every step, in pre-order
pub fn step_ids(steps: &[Step]) -> Vec<u64> {
    let mut ids = Vec::new();
    walk_steps(steps, &mut |step| ids.push(step.id.number().unwrap_or(0)));
    ids
}

/// Assemble a workflow from lines without running the schema gate
pub fn assemble_lines(lines: &[&str]) -> Workflow {
    let config = CompilerConfig::default();
    let mut ctx = CompilationContext::new(&config);
    let steps = lines
        .iter()
        .flat_map(|line| parse_sentence(line, &mut ctx))
        .collect();
    let (types, _) = ctx.finish();
    Workflow::assemble(steps, &types, &config)
}

/// A `set NAME to 1` step with the given id number
pub fn set_step(id: u64, target: &str) -> Step {
    Step::new(
        StepId::from_number(id),
        format!("Set {} to 1", target),
        format!("set {} to 1", target),
        AccessControl::default(),
        StepKind::Set {
            target: target.to_string(),
            value: Expression::number(1.0),
        },
    )
}
