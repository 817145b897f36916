//! Compile pseudo-English command text into a validated workflow

use super::context::CompilationContext;
use super::definition::Workflow;
use super::registry::parse_sentence;
use super::schema::WorkflowSchemaValidator;
use super::visualization::{VisualizationFormat, WorkflowVisualizer};
use crate::config::CompilerConfig;
use crate::error::{ErrorChainExt, Result, StepwiseError};
use std::sync::Arc;
use std::time::Instant;

/// Result of one compilation
#[derive(Debug, Clone)]
pub struct CompileOutput {
    /// The workflow, or `None` if the document failed validation
    pub workflow: Option<Workflow>,
    /// Line diagnostics followed by validation errors, in order
    pub diagnostics: Vec<String>,
    /// Diagram of the workflow; only produced on success
    pub graph: Option<String>,
}

impl CompileOutput {
    /// Whether a workflow was produced
    pub fn is_success(&self) -> bool {
        self.workflow.is_some()
    }
}

/// Compiler holding configuration and a schema gate
///
/// The compiler itself is stateless between calls; every `compile` builds a
/// fresh [`CompilationContext`].
#[derive(Debug, Clone)]
pub struct WorkflowCompiler {
    config: CompilerConfig,
    validator: Arc<WorkflowSchemaValidator>,
    visualizer: WorkflowVisualizer,
}

impl WorkflowCompiler {
    /// Create a compiler with the built-in schema
    pub fn new(config: CompilerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            validator: WorkflowSchemaValidator::builtin()?,
            visualizer: WorkflowVisualizer::default(),
        })
    }

    /// Create a compiler using the process-wide configuration
    pub fn from_env() -> Result<Self> {
        Self::new(CompilerConfig::global().clone())
    }

    /// Replace the schema gate
    pub fn with_validator(mut self, validator: Arc<WorkflowSchemaValidator>) -> Self {
        self.validator = validator;
        self
    }

    /// Choose the diagram format
    pub fn with_format(mut self, format: VisualizationFormat) -> Self {
        self.visualizer = WorkflowVisualizer::new(format);
        self
    }

    /// Configuration in use
    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Compile command text, one command per line
    ///
    /// Never fails: line problems and validation errors are returned as
    /// diagnostics, and any validation error discards the workflow.
    pub fn compile(&self, input: &str) -> CompileOutput {
        let start = Instant::now();
        let mut ctx = CompilationContext::new(&self.config);

        let mut steps = Vec::new();
        for line in input.lines().map(str::trim).filter(|l| !l.is_empty()) {
            tracing::debug!("Compiling line: {}", line);
            steps.extend(parse_sentence(line, &mut ctx));
        }

        let (types, mut diagnostics) = ctx.finish();
        let workflow = Workflow::assemble(steps, &types, &self.config);

        let mut rejected = false;
        match workflow.to_value() {
            Ok(document) => {
                if let Err(errors) = self.validator.validate(&document) {
                    rejected = true;
                    diagnostics.extend(errors.iter().map(|e| {
                        if e.path.is_empty() {
                            format!("Validation error: {}", e.message)
                        } else {
                            format!("Validation error at '{}': {}", e.path, e.message)
                        }
                    }));
                }
            }
            Err(e) => {
                rejected = true;
                diagnostics.push(format!("Validation error: {}", e));
            }
        }
        if let Err(errors) = workflow.validate_structure() {
            rejected = true;
            diagnostics.extend(errors.into_iter().map(|e| format!("Validation error: {}", e)));
        }

        if rejected {
            tracing::info!(
                "Rejected workflow after {:?} with {} diagnostics",
                start.elapsed(),
                diagnostics.len()
            );
            return CompileOutput {
                workflow: None,
                diagnostics,
                graph: None,
            };
        }

        let graph = self.visualizer.render(&workflow);
        tracing::info!(
            "Compiled workflow '{}' with {} steps and {} diagnostics in {:?}",
            workflow.name,
            workflow.step_count(),
            diagnostics.len(),
            start.elapsed()
        );
        CompileOutput {
            workflow: Some(workflow),
            diagnostics,
            graph: Some(graph),
        }
    }
}

/// Compile with the process-wide configuration and built-in schema
pub fn compile(input: &str) -> CompileOutput {
    match WorkflowCompiler::from_env() {
        Ok(compiler) => compiler.compile(input),
        Err(e) => unavailable(&e),
    }
}

fn unavailable(error: &StepwiseError) -> CompileOutput {
    tracing::error!("{}", error.error_chain());
    CompileOutput {
        workflow: None,
        diagnostics: vec![format!("Compiler unavailable: {}", error)],
        graph: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::step::StepKind;
    use crate::workflow::types::ValueType;

    fn compiler() -> WorkflowCompiler {
        WorkflowCompiler::new(CompilerConfig::default()).unwrap()
    }

    #[test]
    fn test_compile_simple_program() {
        let output = compiler().compile("set x to 0\nrepeat set x to x + 1 3 times\nreturn x");
        assert!(output.is_success(), "{:?}", output.diagnostics);
        assert!(output.diagnostics.is_empty());
        let workflow = output.workflow.unwrap();
        assert_eq!(workflow.outputs["x"].value_type, ValueType::Number);
        assert!(output.graph.unwrap().starts_with("flowchart TD"));
    }

    #[test]
    fn test_blank_lines_ignored() {
        let output = compiler().compile("\n\n   set x to 1   \n\n");
        assert_eq!(output.workflow.unwrap().steps.len(), 1);
    }

    #[test]
    fn test_unrecognized_only_is_rejected() {
        let output = compiler().compile("frobnicate the whatsit");
        assert!(output.workflow.is_none());
        assert!(output.graph.is_none());
        assert_eq!(output.diagnostics[0], "Unrecognized command: frobnicate the whatsit");
        assert!(output.diagnostics.len() > 1);
    }

    #[test]
    fn test_bad_line_does_not_abort() {
        let output = compiler().compile("set x to 1\nfrobnicate\nwait 2 seconds");
        assert!(output.is_success());
        assert_eq!(output.diagnostics, vec!["Unrecognized command: frobnicate".to_string()]);
        let workflow = output.workflow.unwrap();
        assert_eq!(workflow.steps.len(), 2);
        assert!(matches!(workflow.steps[1].kind, StepKind::Wait { seconds: 2 }));
    }

    #[test]
    fn test_empty_then_rejects_document() {
        let output = compiler().compile("if ready then frobnicate");
        assert!(output.workflow.is_none());
        assert!(output
            .diagnostics
            .iter()
            .any(|d| d.starts_with("Validation error")));
    }

    #[test]
    fn test_config_name_and_version() {
        let config = CompilerConfig {
            workflow_name: "nightly".to_string(),
            workflow_version: "2.1.0".to_string(),
            ..CompilerConfig::default()
        };
        let output = WorkflowCompiler::new(config).unwrap().compile("break");
        let workflow = output.workflow.unwrap();
        assert_eq!(workflow.name.as_str(), "nightly");
        assert_eq!(workflow.version, "2.1.0");
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = CompilerConfig {
            workflow_version: "latest".to_string(),
            ..CompilerConfig::default()
        };
        assert!(WorkflowCompiler::new(config).is_err());
    }

    #[test]
    fn test_custom_validator_and_format() {
        let permissive = WorkflowSchemaValidator::from_json_str(r#"{ "type": "object" }"#).unwrap();
        let compiler = compiler()
            .with_validator(Arc::new(permissive))
            .with_format(VisualizationFormat::Dot);
        // An empty document passes a permissive schema
        let output = compiler.compile("");
        assert!(output.is_success());
        assert!(output.graph.unwrap().starts_with("digraph workflow"));
    }

    #[test]
    fn test_unavailable_compiler_reports_diagnostic() {
        let output = unavailable(&StepwiseError::Schema("bad $ref".to_string()));
        assert!(!output.is_success());
        assert!(output.graph.is_none());
        assert_eq!(
            output.diagnostics,
            vec!["Compiler unavailable: Schema error: bad $ref".to_string()]
        );
    }

    #[test]
    fn test_free_function_uses_defaults() {
        let output = compile("set y to 2");
        assert!(output.is_success());
    }
}
