//! # Stepwise
//!
//! A compiler from short, line-oriented pseudo-English commands to typed,
//! validated workflow documents.
//!
//! ## Features
//!
//! - **Expressions and conditions**: precedence-climbing arithmetic and a small condition grammar
//! - **Command dispatch**: an ordered rule table covering assignment, branches, loops and macros
//! - **Validation gate**: every compiled document is checked against a JSON Schema
//! - **Diagrams**: Mermaid or Graphviz DOT renderings of the control flow
//!
//! ## Quick Start
//!
//! ```rust
//! use stepwise::compile;
//!
//! let output = compile("set x to 0\nrepeat set x to x + 1 3 times\nreturn x");
//! let workflow = output.workflow.expect("program is valid");
//!
//! assert_eq!(workflow.outputs["x"].value_type.as_str(), "number");
//! println!("{}", output.graph.unwrap_or_default());
//! ```

#![warn(missing_docs)]

/// Shared utilities
pub mod common;

/// Compiler configuration
pub mod config;

/// Error types used throughout the library
pub mod error;

/// Workflow compiler front end
pub mod workflow;

pub use config::{CompilerConfig, ConfigError};
pub use error::{ErrorChainExt, ErrorContext, Result, StepwiseError};
pub use workflow::{
    compile, render, CompileOutput, Step, StepId, StepKind, ValueType, VisualizationFormat,
    Workflow, WorkflowCompiler, WorkflowName,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        compile, render, CompileOutput, CompilerConfig, Result, Step, StepKind, StepwiseError,
        ValueType, VisualizationFormat, Workflow, WorkflowCompiler,
    };

    pub use crate::workflow::{
        parse_condition, parse_expression, Condition, Expression, StepObserver,
        WorkflowSchemaValidator,
    };
}
