//! Structural contract for compiled workflow documents
//!
//! The gate is fail-closed: every violation is collected, and a document
//! with any violation is rejected as a whole.

use crate::error::{ErrorContext, Result, StepwiseError};
use jsonschema::Validator;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::{Arc, OnceLock};

/// JSON Schema for compiled workflow documents.
pub fn workflow_schema() -> Value {
    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "type": "object",
        "required": ["id", "name", "version", "capabilities", "steps", "inputs", "outputs"],
        "properties": {
            "id": {
                "type": "string",
                "minLength": 1
            },
            "name": {
                "type": "string",
                "minLength": 1
            },
            "version": {
                "type": "string",
                "pattern": "^[0-9]+\\.[0-9]+\\.[0-9]+$",
                "description": "Semantic version (e.g., 1.0.0)"
            },
            "capabilities": {
                "type": "array",
                "uniqueItems": true,
                "items": {
                    "enum": ["variables", "control_flow", "timers", "integrations", "ai", "ui"]
                }
            },
            "created_at": {
                "type": "string"
            },
            "steps": {
                "type": "array",
                "minItems": 1,
                "items": { "$ref": "#/$defs/step" },
                "description": "Top-level steps in line order"
            },
            "inputs": { "$ref": "#/$defs/variables" },
            "outputs": { "$ref": "#/$defs/variables" },
            "metadata": {
                "type": "object",
                "additionalProperties": { "type": "string" }
            }
        },
        "$defs": {
            "variables": {
                "type": "object",
                "propertyNames": { "pattern": "^[A-Za-z_][A-Za-z0-9_]*$" },
                "additionalProperties": {
                    "type": "object",
                    "required": ["type"],
                    "properties": {
                        "type": { "enum": ["number", "boolean", "string", "tensor"] }
                    }
                }
            },
            "access": {
                "type": "object",
                "required": ["roles", "permissions"],
                "properties": {
                    "roles": { "type": "array", "items": { "type": "string" } },
                    "permissions": { "type": "array", "items": { "type": "string" } }
                }
            },
            "expression": {
                "type": "object",
                "required": ["kind"],
                "properties": {
                    "kind": { "enum": ["literal", "variable", "binary", "classify"] }
                },
                "allOf": [
                    { "if": { "properties": { "kind": { "const": "literal" } } },
                      "then": { "required": ["value"] } },
                    { "if": { "properties": { "kind": { "const": "variable" } } },
                      "then": { "required": ["name"] } },
                    { "if": { "properties": { "kind": { "const": "binary" } } },
                      "then": {
                          "required": ["op", "left", "right"],
                          "properties": {
                              "left": { "$ref": "#/$defs/expression" },
                              "right": { "$ref": "#/$defs/expression" }
                          }
                      } },
                    { "if": { "properties": { "kind": { "const": "classify" } } },
                      "then": {
                          "required": ["model", "input"],
                          "properties": { "input": { "$ref": "#/$defs/expression" } }
                      } }
                ]
            },
            "condition": {
                "type": "object",
                "required": ["kind"],
                "properties": {
                    "kind": { "enum": ["compare", "and", "or", "contains"] }
                },
                "allOf": [
                    { "if": { "properties": { "kind": { "const": "compare" } } },
                      "then": {
                          "required": ["left", "op", "right"],
                          "properties": {
                              "left": { "$ref": "#/$defs/expression" },
                              "op": { "enum": [">", "<", ">=", "<=", "==", "!=", "===", "!=="] },
                              "right": { "$ref": "#/$defs/expression" }
                          }
                      } },
                    { "if": { "properties": { "kind": { "enum": ["and", "or"] } } },
                      "then": {
                          "required": ["left", "right"],
                          "properties": {
                              "left": { "$ref": "#/$defs/condition" },
                              "right": { "$ref": "#/$defs/condition" }
                          }
                      } },
                    { "if": { "properties": { "kind": { "const": "contains" } } },
                      "then": { "required": ["variable", "pattern"] } }
                ]
            },
            "stepList": {
                "type": "array",
                "items": { "$ref": "#/$defs/step" }
            },
            "step": {
                "type": "object",
                "required": ["id", "type", "natural_language", "examples", "access"],
                "properties": {
                    "id": { "type": "string", "pattern": "^step_[0-9]+$" },
                    "type": {
                        "enum": [
                            "set", "if", "while", "wait", "return", "break", "call",
                            "ai_classify", "ui_render", "ui_state", "css_style", "ui_event"
                        ]
                    },
                    "natural_language": { "type": "string", "minLength": 1 },
                    "examples": {
                        "type": "array",
                        "minItems": 1,
                        "items": { "type": "string" }
                    },
                    "access": { "$ref": "#/$defs/access" },
                    "condition": { "$ref": "#/$defs/condition" },
                    "value": { "$ref": "#/$defs/expression" },
                    "input": { "$ref": "#/$defs/expression" },
                    "initial": { "$ref": "#/$defs/expression" },
                    "then": { "$ref": "#/$defs/stepList" },
                    "else": { "$ref": "#/$defs/stepList" },
                    "body": { "$ref": "#/$defs/stepList" },
                    "seconds": { "type": "integer", "minimum": 0 },
                    "properties": {
                        "type": "object",
                        "minProperties": 1,
                        "additionalProperties": { "type": "string" }
                    }
                },
                "allOf": [
                    { "if": { "properties": { "type": { "const": "set" } } },
                      "then": { "required": ["target", "value"] } },
                    { "if": { "properties": { "type": { "const": "if" } } },
                      "then": {
                          "required": ["condition", "then"],
                          "properties": { "then": { "minItems": 1 } }
                      } },
                    { "if": { "properties": { "type": { "const": "while" } } },
                      "then": { "required": ["condition", "body"] } },
                    { "if": { "properties": { "type": { "const": "wait" } } },
                      "then": { "required": ["seconds"] } },
                    { "if": { "properties": { "type": { "const": "return" } } },
                      "then": { "required": ["value"] } },
                    { "if": { "properties": { "type": { "const": "call" } } },
                      "then": { "required": ["target", "endpoint"] } },
                    { "if": { "properties": { "type": { "const": "ai_classify" } } },
                      "then": { "required": ["model", "input", "target"] } },
                    { "if": { "properties": { "type": { "const": "ui_render" } } },
                      "then": { "required": ["component", "target"] } },
                    { "if": { "properties": { "type": { "const": "ui_state" } } },
                      "then": { "required": ["name", "initial"] } },
                    { "if": { "properties": { "type": { "const": "css_style" } } },
                      "then": { "required": ["selector", "properties"] } },
                    { "if": { "properties": { "type": { "const": "ui_event" } } },
                      "then": { "required": ["event", "handler"] } }
                ]
            }
        }
    })
}

/// A validation error with path information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// JSON pointer to the invalid element.
    pub path: String,
    /// Error message.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.path.is_empty() || self.path == "/" {
            write!(f, "{}", self.message)
        } else {
            write!(f, "at '{}': {}", self.path, self.message)
        }
    }
}

/// Compiled validator for workflow documents.
pub struct WorkflowSchemaValidator {
    validator: Validator,
}

impl std::fmt::Debug for WorkflowSchemaValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowSchemaValidator").finish_non_exhaustive()
    }
}

impl WorkflowSchemaValidator {
    /// Compile the built-in workflow schema.
    pub fn new() -> Result<Self> {
        Self::from_schema(&workflow_schema())
    }

    /// Compile a caller-provided schema document.
    pub fn from_schema(schema: &Value) -> Result<Self> {
        let validator = Validator::new(schema)
            .map_err(|e| StepwiseError::Schema(format!("Invalid workflow schema: {}", e)))?;
        Ok(Self { validator })
    }

    /// Compile a schema from JSON text.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let schema: Value = serde_json::from_str(text).context("Failed to parse workflow schema")?;
        Self::from_schema(&schema)
    }

    /// Compile a schema stored in a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read workflow schema from {}", path.display()))?;
        Self::from_json_str(&text)
    }

    /// The built-in validator, compiled once per process.
    pub fn builtin() -> Result<Arc<Self>> {
        static BUILTIN: OnceLock<std::result::Result<Arc<WorkflowSchemaValidator>, String>> =
            OnceLock::new();
        BUILTIN
            .get_or_init(|| {
                tracing::debug!("Compiling built-in workflow schema");
                WorkflowSchemaValidator::new()
                    .map(Arc::new)
                    .map_err(|e| e.to_string())
            })
            .clone()
            .map_err(StepwiseError::Schema)
    }

    /// Validate a document, collecting every violation.
    pub fn validate(&self, document: &Value) -> std::result::Result<(), Vec<ValidationError>> {
        let errors: Vec<ValidationError> = self
            .validator
            .iter_errors(document)
            .map(|error| ValidationError {
                path: error.instance_path.to_string(),
                message: error.to_string(),
            })
            .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Check validity without collecting errors.
    pub fn is_valid(&self, document: &Value) -> bool {
        self.validator.is_valid(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::test_helpers::assemble_lines;

    fn validator() -> Arc<WorkflowSchemaValidator> {
        WorkflowSchemaValidator::builtin().unwrap()
    }

    #[test]
    fn test_compiled_document_is_valid() {
        let workflow = assemble_lines(&[
            "set x to 0",
            "repeat set x to x + 1 3 times",
            "if x > 2 then set y to 1 else set y to 0",
            "style .btn with color: red",
            "analyze review with sentiment",
            "return x",
        ]);
        let document = workflow.to_value().unwrap();
        assert_eq!(validator().validate(&document), Ok(()));
    }

    #[test]
    fn test_builtin_is_cached() {
        assert!(Arc::ptr_eq(&validator(), &validator()));
    }

    #[test]
    fn test_empty_steps_rejected() {
        let document = assemble_lines(&[]).to_value().unwrap();
        let errors = validator().validate(&document).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].path, "/steps");
    }

    #[test]
    fn test_collects_all_errors() {
        let mut document = assemble_lines(&["set x to 1", "wait 3 seconds"])
            .to_value()
            .unwrap();
        document["steps"][0]["id"] = json!("first");
        document["steps"][0]
            .as_object_mut()
            .unwrap()
            .remove("target");
        document["steps"][1]
            .as_object_mut()
            .unwrap()
            .remove("seconds");
        document.as_object_mut().unwrap().remove("outputs");

        let errors = validator().validate(&document).unwrap_err();
        assert!(errors.len() >= 4, "expected every violation, got {:?}", errors);
        assert!(errors.iter().any(|e| e.path == "/steps/0/id"));
        assert!(errors.iter().any(|e| e.path == "/steps/1"));
        assert!(errors.iter().any(|e| e.message.contains("outputs")));
    }

    #[test]
    fn test_nested_steps_are_checked() {
        let mut document = assemble_lines(&["if ready then set x to 1"])
            .to_value()
            .unwrap();
        document["steps"][0]["then"][0]["id"] = json!("oops");
        let errors = validator().validate(&document).unwrap_err();
        assert!(errors.iter().any(|e| e.path == "/steps/0/then/0/id"));
    }

    #[test]
    fn test_custom_schema_source() {
        let custom = WorkflowSchemaValidator::from_json_str(
            r#"{ "type": "object", "required": ["steps"] }"#,
        )
        .unwrap();
        assert!(custom.is_valid(&json!({ "steps": [] })));
        assert!(!custom.is_valid(&json!({})));
    }

    #[test]
    fn test_bad_schema_text() {
        let err = WorkflowSchemaValidator::from_json_str("{ nope").unwrap_err();
        assert!(err.to_string().contains("Failed to parse workflow schema"));

        let err = WorkflowSchemaValidator::from_schema(&json!({ "type": 12 })).unwrap_err();
        assert!(matches!(err, StepwiseError::Schema(_)));
    }

    #[test]
    fn test_missing_schema_file() {
        let err = WorkflowSchemaValidator::from_file("/nonexistent/stepwise-schema.json")
            .unwrap_err();
        assert!(err.to_string().contains("Failed to read workflow schema"));
    }

    #[test]
    fn test_schema_file_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("workflow.schema.json");
        std::fs::write(&path, serde_json::to_string_pretty(&workflow_schema()).unwrap()).unwrap();

        let from_disk = WorkflowSchemaValidator::from_file(&path).unwrap();
        let document = assemble_lines(&["set x to 1"]).to_value().unwrap();
        assert!(from_disk.is_valid(&document));
        assert!(!from_disk.is_valid(&json!({ "steps": [] })));
    }

    #[test]
    fn test_validation_error_display() {
        let error = ValidationError {
            path: "/steps/0/id".to_string(),
            message: "bad id".to_string(),
        };
        assert_eq!(error.to_string(), "at '/steps/0/id': bad id");
    }
}
