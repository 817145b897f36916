//! Per-compilation state shared by every command rule

use super::step::{walk_steps, AccessControl, Step, StepId};
use super::types::ValueType;
use crate::config::CompilerConfig;
use std::collections::{BTreeMap, HashMap};

/// Mutable state for exactly one compilation
///
/// Nested rule invocations share one context so step ids and diagnostics
/// stay globally ordered. A context is never reused across compilations.
#[derive(Debug)]
pub struct CompilationContext {
    next_id: u64,
    type_map: BTreeMap<String, ValueType>,
    macros: HashMap<String, Vec<Step>>,
    diagnostics: Vec<String>,
    depth: usize,
    max_depth: usize,
    max_line_length: usize,
    default_access: AccessControl,
}

impl CompilationContext {
    /// Create a fresh context using limits and access defaults from `config`
    pub fn new(config: &CompilerConfig) -> Self {
        Self {
            next_id: 1,
            type_map: BTreeMap::new(),
            macros: HashMap::new(),
            diagnostics: Vec::new(),
            depth: 0,
            max_depth: config.max_nesting_depth,
            max_line_length: config.max_line_length,
            default_access: AccessControl::new(
                config.default_roles.iter().cloned(),
                config.default_permissions.iter().cloned(),
            ),
        }
    }

    /// Allocate the next step id
    pub fn next_step_id(&mut self) -> StepId {
        let id = StepId::from_number(self.next_id);
        self.next_id += 1;
        id
    }

    /// Record the inferred type of a variable; the latest write wins
    pub fn record_type(&mut self, name: impl Into<String>, value_type: ValueType) {
        let name = name.into();
        if let Some(previous) = self.type_map.insert(name.clone(), value_type) {
            if previous != value_type {
                tracing::debug!(
                    "Variable '{}' retyped from {} to {}",
                    name,
                    previous,
                    value_type
                );
            }
        }
    }

    /// Inferred type of a variable, if it was ever assigned
    pub fn type_of(&self, name: &str) -> Option<ValueType> {
        self.type_map.get(name).copied()
    }

    /// All inferred variable types
    pub fn type_map(&self) -> &BTreeMap<String, ValueType> {
        &self.type_map
    }

    /// Store a macro template, replacing any earlier definition of the name
    pub fn define_macro(&mut self, name: impl Into<String>, steps: Vec<Step>) {
        let name = name.into();
        tracing::debug!("Defined macro '{}' with {} steps", name, steps.len());
        self.macros.insert(name, steps);
    }

    /// Whether a macro with this name has been defined
    pub fn has_macro(&self, name: &str) -> bool {
        self.macros.contains_key(name)
    }

    /// Clone a macro template, giving every cloned step a fresh id
    pub fn instantiate_macro(&mut self, name: &str) -> Option<Vec<Step>> {
        let mut steps = self.macros.get(name)?.clone();
        for step in &mut steps {
            step.reassign_ids(&mut || self.next_step_id());
        }

        let mut counters = Vec::new();
        walk_steps(&steps, &mut |step| counters.extend(step.loop_counter()));
        for counter in counters {
            self.record_type(&counter, ValueType::Number);
        }
        Some(steps)
    }

    /// Record a recoverable problem; compilation continues
    pub fn diagnostic(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("{}", message);
        self.diagnostics.push(message);
    }

    /// Diagnostics recorded so far, in order
    pub fn diagnostics(&self) -> &[String] {
        &self.diagnostics
    }

    /// Consume the context, returning its type map and diagnostics
    pub fn finish(self) -> (BTreeMap<String, ValueType>, Vec<String>) {
        (self.type_map, self.diagnostics)
    }

    /// Enter a nested sentence; `false` if that would exceed the depth limit
    pub fn enter(&mut self) -> bool {
        if self.depth >= self.max_depth {
            return false;
        }
        self.depth += 1;
        true
    }

    /// Leave a nested sentence
    pub fn exit(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    /// Longest accepted line
    pub fn max_line_length(&self) -> usize {
        self.max_line_length
    }

    /// Nesting limit
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Access descriptor attached to generated steps
    pub fn default_access(&self) -> AccessControl {
        self.default_access.clone()
    }
}

impl Default for CompilationContext {
    fn default() -> Self {
        Self::new(&CompilerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::expression::Expression;
    use crate::workflow::registry::parse_sentence;
    use crate::workflow::step::StepKind;

    fn set_step(ctx: &mut CompilationContext, target: &str) -> Step {
        let id = ctx.next_step_id();
        Step::new(
            id,
            format!("Set {}", target),
            format!("set {} to 1", target),
            ctx.default_access(),
            StepKind::Set {
                target: target.to_string(),
                value: Expression::number(1.0),
            },
        )
    }

    #[test]
    fn test_ids_start_at_one_and_increase() {
        let mut ctx = CompilationContext::default();
        assert_eq!(ctx.next_step_id().as_str(), "step_1");
        assert_eq!(ctx.next_step_id().as_str(), "step_2");
    }

    #[test]
    fn test_last_write_wins() {
        let mut ctx = CompilationContext::default();
        ctx.record_type("x", ValueType::Number);
        ctx.record_type("x", ValueType::String);
        assert_eq!(ctx.type_of("x"), Some(ValueType::String));
        assert_eq!(ctx.type_of("missing"), None);
    }

    #[test]
    fn test_macro_instances_get_fresh_ids() {
        let mut ctx = CompilationContext::default();
        let template = vec![set_step(&mut ctx, "x")];
        ctx.define_macro("inc", template);

        let first = ctx.instantiate_macro("inc").unwrap();
        let second = ctx.instantiate_macro("inc").unwrap();
        assert_eq!(first[0].id.as_str(), "step_2");
        assert_eq!(second[0].id.as_str(), "step_3");
        assert!(ctx.instantiate_macro("missing").is_none());
    }

    #[test]
    fn test_has_macro() {
        let mut ctx = CompilationContext::default();
        assert!(!ctx.has_macro("inc"));
        ctx.define_macro("inc", Vec::new());
        assert!(ctx.has_macro("inc"));
    }

    #[test]
    fn test_macro_loop_counter_follows_new_id() {
        let mut ctx = CompilationContext::default();
        parse_sentence("macro twice repeat wait 1 seconds 2 times", &mut ctx);
        let steps = parse_sentence("call twice", &mut ctx);

        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].id.as_str(), "step_5");
        assert_eq!(steps[0].loop_counter().as_deref(), Some("step_5_counter"));
        match &steps[0].kind {
            StepKind::While { condition, body } => {
                assert_eq!(condition.to_string(), "step_5_counter < 2");
                assert_eq!(body[0].natural_language, "Initialize step_5_counter to 0");
                for step in [&body[0], &body[2]] {
                    assert!(matches!(
                        &step.kind,
                        StepKind::Set { target, .. } if target == "step_5_counter"
                    ));
                }
            }
            other => panic!("expected while, got {:?}", other),
        }
        assert_eq!(ctx.type_of("step_5_counter"), Some(ValueType::Number));
        assert!(ctx.diagnostics().is_empty());
    }

    #[test]
    fn test_depth_limit() {
        let config = CompilerConfig {
            max_nesting_depth: 2,
            ..CompilerConfig::default()
        };
        let mut ctx = CompilationContext::new(&config);
        assert!(ctx.enter());
        assert!(ctx.enter());
        assert!(!ctx.enter());
        ctx.exit();
        assert!(ctx.enter());
    }

    #[test]
    fn test_default_access_from_config() {
        let ctx = CompilationContext::default();
        let access = ctx.default_access();
        assert!(access.roles.contains("user"));
        assert!(access.permissions.contains("execute"));
    }

    #[test]
    fn test_diagnostics_accumulate() {
        let mut ctx = CompilationContext::default();
        ctx.diagnostic("first");
        ctx.diagnostic("second");
        let (_, diagnostics) = ctx.finish();
        assert_eq!(diagnostics, vec!["first".to_string(), "second".to_string()]);
    }
}
