//! Configuration management for Stepwise
//!
//! Compiler settings come from environment variables prefixed with
//! `STEPWISE_`, falling back to defaults for anything unset or unparseable.

use crate::common::env_loader::EnvLoader;
use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

const ENV_PREFIX: &str = "STEPWISE";
const DEFAULT_WORKFLOW_NAME: &str = "compiled-workflow";
const DEFAULT_WORKFLOW_VERSION: &str = "1.0.0";
const DEFAULT_MAX_NESTING_DEPTH: usize = 16;
const MAX_NESTING_DEPTH_LIMIT: usize = 256;
const DEFAULT_MAX_LINE_LENGTH: usize = 4096;

/// Errors that can occur when validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Invalid configuration value for a specific field
    #[error("Invalid configuration value for '{field}': {value}\n{hint}")]
    InvalidValue {
        /// Name of the configuration field that has an invalid value
        field: String,
        /// The invalid value that was provided
        value: String,
        /// Helpful hint about how to fix the issue
        hint: String,
    },
}

/// Settings that shape every compilation
#[derive(Debug, Clone, PartialEq)]
pub struct CompilerConfig {
    /// Name written into produced workflow documents (default: "compiled-workflow")
    pub workflow_name: String,
    /// Semantic version written into produced workflow documents (default: "1.0.0")
    pub workflow_version: String,
    /// Deepest allowed recursion of nested sentences (default: 16)
    pub max_nesting_depth: usize,
    /// Longest accepted input line in bytes (default: 4096)
    pub max_line_length: usize,
    /// Roles granted by the default access descriptor (default: ["user"])
    pub default_roles: Vec<String>,
    /// Permissions granted by the default access descriptor (default: ["read", "execute"])
    pub default_permissions: Vec<String>,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            workflow_name: DEFAULT_WORKFLOW_NAME.to_string(),
            workflow_version: DEFAULT_WORKFLOW_VERSION.to_string(),
            max_nesting_depth: DEFAULT_MAX_NESTING_DEPTH,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            default_roles: vec!["user".to_string()],
            default_permissions: vec!["read".to_string(), "execute".to_string()],
        }
    }
}

impl CompilerConfig {
    /// Create a configuration from `STEPWISE_*` environment variables and defaults
    pub fn new() -> Self {
        Self::from_env_prefix(ENV_PREFIX)
    }

    fn from_env_prefix(prefix: &str) -> Self {
        let defaults = Self::default();
        let loader = EnvLoader::new(prefix);

        let config = Self {
            workflow_name: loader.load_string("WORKFLOW_NAME", &defaults.workflow_name),
            workflow_version: loader.load_string("WORKFLOW_VERSION", &defaults.workflow_version),
            max_nesting_depth: loader.load_validated(
                "MAX_NESTING_DEPTH",
                defaults.max_nesting_depth,
                |depth| (1..=MAX_NESTING_DEPTH_LIMIT).contains(depth),
            ),
            max_line_length: loader.load_validated(
                "MAX_LINE_LENGTH",
                defaults.max_line_length,
                |len| *len > 0,
            ),
            default_roles: loader.load_list("DEFAULT_ROLES", &["user"]),
            default_permissions: loader.load_list("DEFAULT_PERMISSIONS", &["read", "execute"]),
        };

        match config.validate() {
            Ok(()) => config,
            Err(e) => {
                tracing::warn!(
                    "Invalid environment configuration: {}. Falling back to defaults.",
                    e
                );
                defaults
            }
        }
    }

    /// Get the global configuration instance
    pub fn global() -> &'static Self {
        static CONFIG: OnceLock<CompilerConfig> = OnceLock::new();
        CONFIG.get_or_init(CompilerConfig::new)
    }

    /// Check that every field holds a usable value
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workflow_name.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "workflow_name".to_string(),
                value: self.workflow_name.clone(),
                hint: "Workflow name cannot be empty or whitespace only".to_string(),
            });
        }

        if !is_semver(&self.workflow_version) {
            return Err(ConfigError::InvalidValue {
                field: "workflow_version".to_string(),
                value: self.workflow_version.clone(),
                hint: "Use a semantic version such as 1.0.0".to_string(),
            });
        }

        if !(1..=MAX_NESTING_DEPTH_LIMIT).contains(&self.max_nesting_depth) {
            return Err(ConfigError::InvalidValue {
                field: "max_nesting_depth".to_string(),
                value: self.max_nesting_depth.to_string(),
                hint: format!("Nesting depth must be between 1 and {}", MAX_NESTING_DEPTH_LIMIT),
            });
        }

        if self.max_line_length == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_line_length".to_string(),
                value: "0".to_string(),
                hint: "Line length limit must be greater than zero".to_string(),
            });
        }

        Ok(())
    }
}

fn is_semver(version: &str) -> bool {
    static SEMVER: OnceLock<Option<Regex>> = OnceLock::new();
    SEMVER
        .get_or_init(|| Regex::new(r"^[0-9]+\.[0-9]+\.[0-9]+$").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(version))
}
