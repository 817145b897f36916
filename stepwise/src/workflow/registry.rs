//! Ordered command dispatch
//!
//! Each input line is matched against the rules below in declaration order
//! and handed to the first rule that matches. Order matters: `call X into Y`
//! must be tried before `call X`, and the specific control-flow verbs before
//! the leaf verbs.

use super::builders;
use super::context::CompilationContext;
use super::step::Step;
use crate::error::{Result, StepwiseError};
use regex::{Captures, Regex};
use std::sync::OnceLock;

/// Builds the steps for one matched line
pub type BuildFn = fn(&Captures<'_>, &str, &mut CompilationContext) -> Vec<Step>;

/// A single dispatch rule
pub struct CommandRule {
    verb: &'static str,
    pattern: Regex,
    build: BuildFn,
}

impl CommandRule {
    /// Verb this rule handles
    pub fn verb(&self) -> &'static str {
        self.verb
    }
}

impl std::fmt::Debug for CommandRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRule")
            .field("verb", &self.verb)
            .field("pattern", &self.pattern.as_str())
            .finish()
    }
}

const RULES: &[(&str, &str, BuildFn)] = &[
    (
        "macro",
        r"(?i)^macro\s+([A-Za-z_][A-Za-z0-9_]*)\s+(.+)$",
        builders::build_macro,
    ),
    (
        "call_endpoint",
        r"(?i)^call\s+(\S+)\s+into\s+(\S+)$",
        builders::build_call_endpoint,
    ),
    ("call", r"(?i)^call\s+(\S+)$", builders::build_call_macro),
    (
        "if",
        r"(?i)^if\s+(.+?)\s+then\s+(.+?)(?:\s+else\s+(.+))?$",
        builders::build_if,
    ),
    (
        "repeat",
        r"(?i)^(?:repeat|loop)\s+(.+?)\s+([0-9]+)\s+times?$",
        builders::build_repeat,
    ),
    (
        "for",
        r"(?i)^for\s+([0-9]+)\s+times?\s+(?:do\s+)?(.+)$",
        builders::build_for,
    ),
    (
        "while",
        r"(?i)^while\s+(.+?)\s+do\s+(.+)$",
        builders::build_while,
    ),
    (
        "set",
        r"(?i)^(?:set|assign)\s+(.+?)\s+to\s+(.+)$",
        builders::build_set,
    ),
    (
        "wait",
        r"(?i)^wait\s+(\S+)(?:\s+seconds?)?$",
        builders::build_wait,
    ),
    ("return", r"(?i)^return(?:\s+(.*))?$", builders::build_return),
    ("break", r"(?i)^break$", builders::build_break),
    (
        "analyze",
        r"(?i)^analyze\s+(.+?)\s+with\s+(\S+)(?:\s+(?:into|as)\s+(\S+))?$",
        builders::build_analyze,
    ),
    (
        "render",
        r"(?i)^render\s+(\S+)\s+as\s+(.+)$",
        builders::build_render,
    ),
    (
        "state",
        r"(?i)^state\s+(\S+)\s+as\s+(.+)$",
        builders::build_state,
    ),
    (
        "style",
        r"(?i)^style\s+(.+?)\s+with\s+(.+)$",
        builders::build_style,
    ),
    (
        "on",
        r"(?i)^on\s+(\S+)\s+execute\s+(.+)$",
        builders::build_event,
    ),
];

/// Ordered list of command rules, first match wins
#[derive(Debug)]
pub struct CommandRegistry {
    rules: Vec<CommandRule>,
}

impl CommandRegistry {
    /// Compile the built-in rule table
    pub fn new() -> Result<Self> {
        let rules = RULES
            .iter()
            .map(|&(verb, pattern, build)| {
                let pattern = Regex::new(pattern).map_err(|e| {
                    StepwiseError::Other(format!("Failed to compile {} pattern: {}", verb, e))
                })?;
                Ok(CommandRule {
                    verb,
                    pattern,
                    build,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    /// Process-wide registry, compiled on first use
    pub fn global() -> std::result::Result<&'static Self, &'static str> {
        static REGISTRY: OnceLock<std::result::Result<CommandRegistry, String>> = OnceLock::new();
        REGISTRY
            .get_or_init(|| CommandRegistry::new().map_err(|e| e.to_string()))
            .as_ref()
            .map_err(|e| e.as_str())
    }

    /// Rules in dispatch order
    pub fn rules(&self) -> &[CommandRule] {
        &self.rules
    }

    /// Verb of the rule that would handle `line`, if any
    pub fn match_verb(&self, line: &str) -> Option<&'static str> {
        let line = line.trim();
        self.rules
            .iter()
            .find(|rule| rule.pattern.is_match(line))
            .map(|rule| rule.verb)
    }

    /// Build steps for one line through the first matching rule
    ///
    /// A line no rule matches is recorded as a diagnostic and yields no steps.
    pub fn dispatch(&self, line: &str, ctx: &mut CompilationContext) -> Vec<Step> {
        let line = line.trim();
        for rule in &self.rules {
            if let Some(caps) = rule.pattern.captures(line) {
                tracing::debug!("Matched '{}' rule for line: {}", rule.verb, line);
                return (rule.build)(&caps, line, ctx);
            }
        }
        ctx.diagnostic(format!("Unrecognized command: {}", line));
        Vec::new()
    }
}

/// Parse one sentence into steps, recursing for nested bodies
///
/// Enforces the line-length and nesting limits of the context; a violation
/// is recorded as a diagnostic and yields no steps.
pub fn parse_sentence(text: &str, ctx: &mut CompilationContext) -> Vec<Step> {
    let line = text.trim();
    if line.is_empty() {
        return Vec::new();
    }

    if line.len() > ctx.max_line_length() {
        ctx.diagnostic(format!(
            "Line exceeds maximum length of {} characters",
            ctx.max_line_length()
        ));
        return Vec::new();
    }

    let registry = match CommandRegistry::global() {
        Ok(registry) => registry,
        Err(e) => {
            ctx.diagnostic(format!("Command registry unavailable: {}", e));
            return Vec::new();
        }
    };

    if !ctx.enter() {
        ctx.diagnostic(format!(
            "Maximum nesting depth of {} exceeded: {}",
            ctx.max_depth(),
            line
        ));
        return Vec::new();
    }
    let steps = registry.dispatch(line, ctx);
    ctx.exit();
    steps
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompilerConfig;
    use crate::workflow::step::StepKind;

    fn registry() -> &'static CommandRegistry {
        CommandRegistry::global().unwrap()
    }

    #[test]
    fn test_all_rules_compile() {
        let registry = CommandRegistry::new().unwrap();
        assert_eq!(registry.rules().len(), RULES.len());
        assert_eq!(registry.rules()[0].verb(), "macro");
    }

    #[test]
    fn test_rule_order_precedence() {
        let cases = [
            ("call weather_api into forecast", "call_endpoint"),
            ("call greet", "call"),
            ("if x > 1 then set y to 2", "if"),
            ("repeat set x to 1 3 times", "repeat"),
            ("loop wait 1 seconds 2 times", "repeat"),
            ("for 3 times set x to 1", "for"),
            ("while x < 3 do set x to x + 1", "while"),
            ("set x to 1", "set"),
            ("Assign y to 2", "set"),
            ("wait 5 seconds", "wait"),
            ("return x", "return"),
            ("BREAK", "break"),
            ("analyze review with sentiment", "analyze"),
            ("render button as submit", "render"),
            ("state count as 0", "state"),
            ("style .btn with color: red", "style"),
            ("on click execute submit_form", "on"),
        ];
        for (line, verb) in cases {
            assert_eq!(registry().match_verb(line), Some(verb), "for {}", line);
        }
    }

    #[test]
    fn test_if_containing_set_dispatches_as_if() {
        // `set` would also match part of this line; `if` comes first
        assert_eq!(
            registry().match_verb("if ready then set total to 10"),
            Some("if")
        );
    }

    #[test]
    fn test_unrecognized_line() {
        let mut ctx = CompilationContext::default();
        let steps = parse_sentence("frobnicate the whatsit", &mut ctx);
        assert!(steps.is_empty());
        assert_eq!(
            ctx.diagnostics(),
            &["Unrecognized command: frobnicate the whatsit".to_string()]
        );
    }

    #[test]
    fn test_line_length_limit() {
        let config = CompilerConfig {
            max_line_length: 10,
            ..CompilerConfig::default()
        };
        let mut ctx = CompilationContext::new(&config);
        assert!(parse_sentence("set total to 100", &mut ctx).is_empty());
        assert!(ctx.diagnostics()[0].contains("maximum length of 10"));
    }

    #[test]
    fn test_nesting_depth_limit() {
        let config = CompilerConfig {
            max_nesting_depth: 2,
            ..CompilerConfig::default()
        };
        let mut ctx = CompilationContext::new(&config);
        let steps = parse_sentence("if a then if b then set x to 1", &mut ctx);

        // Outer `if` survives with an empty `then`
        assert_eq!(steps.len(), 1);
        match &steps[0].kind {
            StepKind::If { then, .. } => {
                assert_eq!(then.len(), 1);
                match &then[0].kind {
                    StepKind::If { then, .. } => assert!(then.is_empty()),
                    other => panic!("expected nested if, got {:?}", other),
                }
            }
            other => panic!("expected if, got {:?}", other),
        }
        assert!(ctx.diagnostics()[0].contains("Maximum nesting depth of 2"));
    }

    #[test]
    fn test_blank_line_yields_nothing() {
        let mut ctx = CompilationContext::default();
        assert!(parse_sentence("   ", &mut ctx).is_empty());
        assert!(ctx.diagnostics().is_empty());
    }
}
