//! Boolean conditions for branches and loops
//!
//! Condition text is recognised in a fixed order, first match wins:
//! substring containment, a single logical split on `&&`/`||`, a comparison
//! against a closed operator set, and finally a bare boolean variable.
//! Anything else degrades to a constant-false comparison instead of failing.

use super::expression::{is_identifier, operand_from_token, parse_decimal, Expression, Scalar};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::OnceLock;

/// Comparison operators accepted in conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComparisonOperator {
    /// `>`
    #[serde(rename = ">")]
    Greater,
    /// `<`
    #[serde(rename = "<")]
    Less,
    /// `>=`
    #[serde(rename = ">=")]
    GreaterOrEqual,
    /// `<=`
    #[serde(rename = "<=")]
    LessOrEqual,
    /// `==`
    #[serde(rename = "==")]
    Equal,
    /// `!=`
    #[serde(rename = "!=")]
    NotEqual,
    /// `===`
    #[serde(rename = "===")]
    IdentityEqual,
    /// `!==`
    #[serde(rename = "!==")]
    IdentityNotEqual,
}

impl ComparisonOperator {
    /// Get the infix symbol for the operator
    pub fn symbol(&self) -> &'static str {
        match self {
            ComparisonOperator::Greater => ">",
            ComparisonOperator::Less => "<",
            ComparisonOperator::GreaterOrEqual => ">=",
            ComparisonOperator::LessOrEqual => "<=",
            ComparisonOperator::Equal => "==",
            ComparisonOperator::NotEqual => "!=",
            ComparisonOperator::IdentityEqual => "===",
            ComparisonOperator::IdentityNotEqual => "!==",
        }
    }

    /// Look up an operator by its symbol
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            ">" => Some(ComparisonOperator::Greater),
            "<" => Some(ComparisonOperator::Less),
            ">=" => Some(ComparisonOperator::GreaterOrEqual),
            "<=" => Some(ComparisonOperator::LessOrEqual),
            "==" => Some(ComparisonOperator::Equal),
            "!=" => Some(ComparisonOperator::NotEqual),
            "===" => Some(ComparisonOperator::IdentityEqual),
            "!==" => Some(ComparisonOperator::IdentityNotEqual),
            _ => None,
        }
    }
}

impl fmt::Display for ComparisonOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// A boolean condition tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Condition {
    /// Binary comparison of two expressions
    Compare {
        /// Left operand
        left: Expression,
        /// Operator
        op: ComparisonOperator,
        /// Right operand
        right: Expression,
    },
    /// Both sides must hold
    And {
        /// Left clause
        left: Box<Condition>,
        /// Right clause
        right: Box<Condition>,
    },
    /// Either side must hold
    Or {
        /// Left clause
        left: Box<Condition>,
        /// Right clause
        right: Box<Condition>,
    },
    /// The variable's text contains a literal substring
    Contains {
        /// Variable searched
        variable: String,
        /// Regex-escaped literal to find
        pattern: String,
    },
}

impl Condition {
    /// Comparison constructor
    pub fn compare(left: Expression, op: ComparisonOperator, right: Expression) -> Self {
        Condition::Compare { left, op, right }
    }

    /// The condition unparseable text degrades to: `false === true`
    pub fn always_false() -> Self {
        Condition::compare(
            Expression::boolean(false),
            ComparisonOperator::IdentityEqual,
            Expression::boolean(true),
        )
    }

    /// Whether this is the degraded constant-false condition
    pub fn is_always_false(&self) -> bool {
        *self == Self::always_false()
    }

    /// Collect the names of every variable read by this condition
    pub fn collect_variables<'a>(&'a self, out: &mut BTreeSet<&'a str>) {
        match self {
            Condition::Compare { left, right, .. } => {
                left.collect_variables(out);
                right.collect_variables(out);
            }
            Condition::And { left, right } | Condition::Or { left, right } => {
                left.collect_variables(out);
                right.collect_variables(out);
            }
            Condition::Contains { variable, .. } => {
                out.insert(variable.as_str());
            }
        }
    }

    /// Replace every read of `from` with a read of `to`
    pub fn rename_variable(&mut self, from: &str, to: &str) {
        match self {
            Condition::Compare { left, right, .. } => {
                left.rename_variable(from, to);
                right.rename_variable(from, to);
            }
            Condition::And { left, right } | Condition::Or { left, right } => {
                left.rename_variable(from, to);
                right.rename_variable(from, to);
            }
            Condition::Contains { variable, .. } => {
                if variable == from {
                    *variable = to.to_string();
                }
            }
        }
    }

    fn is_logical(&self) -> bool {
        matches!(self, Condition::And { .. } | Condition::Or { .. })
    }

    fn fmt_clause(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_logical() {
            write!(f, "({})", self)
        } else {
            write!(f, "{}", self)
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Compare { left, op, right } => write!(f, "{} {} {}", left, op, right),
            Condition::And { left, right } => {
                left.fmt_clause(f)?;
                write!(f, " && ")?;
                right.fmt_clause(f)
            }
            Condition::Or { left, right } => {
                left.fmt_clause(f)?;
                write!(f, " || ")?;
                right.fmt_clause(f)
            }
            Condition::Contains { variable, pattern } => {
                write!(f, "{} contains \"{}\"", variable, pattern)
            }
        }
    }
}

struct ConditionPatterns {
    contains: Regex,
    logical: Regex,
    comparison: Regex,
}

fn patterns() -> Option<&'static ConditionPatterns> {
    static PATTERNS: OnceLock<Option<ConditionPatterns>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| {
            Some(ConditionPatterns {
                contains: Regex::new(r"(?i)^(.+?)\s+contains\s+(.+)$").ok()?,
                logical: Regex::new(r"^(.+?)\s*(&&|\|\|)\s*(.+)$").ok()?,
                // Longer operators precede their prefixes in the alternation.
                comparison: Regex::new(r"^([A-Za-z0-9_]+)\s*(>=|<=|===|!==|==|!=|>|<)\s*(\S+)$")
                    .ok()?,
            })
        })
        .as_ref()
}

fn comparison_operand(token: &str) -> Expression {
    if let Some(n) = parse_decimal(token) {
        return Expression::number(n);
    }
    let unquoted = token.trim_matches('"');
    if unquoted.len() != token.len() {
        return Expression::Literal {
            value: Scalar::String(unquoted.to_string()),
        };
    }
    operand_from_token(token)
}

/// Parse condition text; never fails
pub fn parse_condition(text: &str) -> Condition {
    let cleaned: String = text
        .chars()
        .filter(|c| !matches!(c, '{' | '}'))
        .collect();
    let cleaned = cleaned.trim();

    let Some(patterns) = patterns() else {
        tracing::warn!("Condition patterns unavailable; treating '{}' as false", cleaned);
        return Condition::always_false();
    };

    if let Some(caps) = patterns.contains.captures(cleaned) {
        let variable = caps[1].trim();
        if is_identifier(variable) {
            let literal = caps[2].trim().trim_matches('"').trim_matches('\'');
            return Condition::Contains {
                variable: variable.to_string(),
                pattern: regex::escape(literal),
            };
        }
    }

    if let Some(caps) = patterns.logical.captures(cleaned) {
        let left = Box::new(parse_condition(&caps[1]));
        let right = Box::new(parse_condition(&caps[3]));
        return match &caps[2] {
            "&&" => Condition::And { left, right },
            _ => Condition::Or { left, right },
        };
    }

    if let Some(caps) = patterns.comparison.captures(cleaned) {
        if let Some(op) = ComparisonOperator::from_symbol(&caps[2]) {
            return Condition::compare(operand_from_token(&caps[1]), op, comparison_operand(&caps[3]));
        }
    }

    if is_identifier(cleaned) {
        return Condition::compare(
            Expression::variable(cleaned),
            ComparisonOperator::IdentityEqual,
            Expression::boolean(true),
        );
    }

    tracing::warn!("Unparseable condition '{}' degraded to false", cleaned);
    Condition::always_false()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compare(left: Expression, op: ComparisonOperator, right: Expression) -> Condition {
        Condition::compare(left, op, right)
    }

    #[test]
    fn test_simple_comparison() {
        assert_eq!(
            parse_condition("x > 2"),
            compare(
                Expression::variable("x"),
                ComparisonOperator::Greater,
                Expression::number(2.0)
            )
        );
    }

    #[test]
    fn test_longer_operators_win() {
        let cases = [
            ("a >= 1", ComparisonOperator::GreaterOrEqual),
            ("a <= 1", ComparisonOperator::LessOrEqual),
            ("a === 1", ComparisonOperator::IdentityEqual),
            ("a !== 1", ComparisonOperator::IdentityNotEqual),
            ("a == 1", ComparisonOperator::Equal),
            ("a != 1", ComparisonOperator::NotEqual),
            ("a < 1", ComparisonOperator::Less),
            ("a>=1", ComparisonOperator::GreaterOrEqual),
        ];
        for (text, expected) in cases {
            match parse_condition(text) {
                Condition::Compare { op, .. } => assert_eq!(op, expected, "for {}", text),
                other => panic!("expected comparison for {}, got {:?}", text, other),
            }
        }
    }

    #[test]
    fn test_right_operand_variable() {
        assert_eq!(
            parse_condition("count < limit"),
            compare(
                Expression::variable("count"),
                ComparisonOperator::Less,
                Expression::variable("limit")
            )
        );
    }

    #[test]
    fn test_operands_are_finite_decimals() {
        let huge = format!("9{}", "9".repeat(400));
        match parse_condition(&format!("x > {}", huge)) {
            Condition::Compare { right, .. } => assert_eq!(right, Expression::text(huge.as_str())),
            other => panic!("expected comparison, got {:?}", other),
        }
        match parse_condition("x < 1e5") {
            Condition::Compare { right, .. } => assert_eq!(right, Expression::variable("1e5")),
            other => panic!("expected comparison, got {:?}", other),
        }
        match parse_condition("x >= -2.5") {
            Condition::Compare { right, .. } => assert_eq!(right, Expression::number(-2.5)),
            other => panic!("expected comparison, got {:?}", other),
        }
    }

    #[test]
    fn test_contains_escapes_literal() {
        assert_eq!(
            parse_condition("name contains \"a.b*\""),
            Condition::Contains {
                variable: "name".to_string(),
                pattern: r"a\.b\*".to_string(),
            }
        );
    }

    #[test]
    fn test_logical_split() {
        let condition = parse_condition("x > 1 && y < 2");
        assert!(matches!(condition, Condition::And { .. }));
        assert_eq!(condition.to_string(), "x > 1 && y < 2");
    }

    #[test]
    fn test_logical_chain_is_right_associative() {
        let condition = parse_condition("a && b || c");
        match condition {
            Condition::And { left, right } => {
                assert!(matches!(*left, Condition::Compare { .. }));
                assert!(matches!(*right, Condition::Or { .. }));
            }
            other => panic!("expected And, got {:?}", other),
        }
    }

    #[test]
    fn test_bare_variable_is_boolean_check() {
        assert_eq!(
            parse_condition("ready"),
            compare(
                Expression::variable("ready"),
                ComparisonOperator::IdentityEqual,
                Expression::boolean(true)
            )
        );
    }

    #[test]
    fn test_unparseable_degrades_to_false() {
        assert!(parse_condition("the moon is full").is_always_false());
        assert!(parse_condition("").is_always_false());
        assert!(parse_condition("x ~ 3").is_always_false());
    }

    #[test]
    fn test_braces_are_stripped() {
        assert_eq!(parse_condition("{x} > 2"), parse_condition("x > 2"));
    }

    #[test]
    fn test_collect_variables() {
        let condition = parse_condition("a > b || text contains foo");
        let mut vars = BTreeSet::new();
        condition.collect_variables(&mut vars);
        assert_eq!(vars.into_iter().collect::<Vec<_>>(), vec!["a", "b", "text"]);
    }
}
