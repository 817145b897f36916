//! Workflow compiler front end
//!
//! Turns line-oriented pseudo-English commands into a typed, validated
//! workflow document and renders its control flow as a diagram.

mod builders;
mod compiler;
mod condition;
mod context;
mod definition;
mod expression;
mod observer;
mod registry;
mod schema;
mod step;
#[cfg(test)]
mod test_helpers;
mod types;
mod visualization;

pub use compiler::{compile, CompileOutput, WorkflowCompiler};
pub use condition::{parse_condition, ComparisonOperator, Condition};
pub use context::CompilationContext;
pub use definition::{capability, Workflow, WorkflowError, WorkflowName, WorkflowResult};
pub use expression::{
    is_identifier, parse_expression, parse_literal, parse_value, sanitize, tokenize,
    BinaryOperator, Expression, Scalar,
};
pub use observer::{notify_steps, StepObserver, TracingObserver};
pub use registry::{parse_sentence, BuildFn, CommandRegistry, CommandRule};
pub use schema::{workflow_schema, ValidationError, WorkflowSchemaValidator};
pub use step::{walk_steps, AccessControl, Step, StepError, StepId, StepKind, StepResult};
pub use types::{infer_type, ValueType, VariableSpec};
pub use visualization::{render, VisualizationFormat, WorkflowVisualizer};
