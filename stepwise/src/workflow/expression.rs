//! Arithmetic expressions: tokenizer, precedence-climbing parser, and printing
//!
//! The grammar is deliberately small:
//!
//! ```text
//! add_sub := mul_div (("+" | "-") mul_div)*
//! mul_div := primary (("*" | "/") primary)*
//! primary := NUMBER | IDENT | "(" add_sub ")"
//! ```
//!
//! Characters outside the token set are dropped by the tokenizer rather than
//! reported, so callers must treat a `None` parse as "not an expression" and
//! fall back to a literal or a bare variable reference.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::OnceLock;

/// A literal scalar value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    /// Numeric literal
    Number(f64),
    /// Boolean literal
    Bool(bool),
    /// Raw text literal
    String(String),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Number(n) => write!(f, "{}", format_number(*n)),
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::String(s) => write!(f, "\"{}\"", s),
        }
    }
}

/// Arithmetic operators, in two precedence levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOperator {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
}

impl BinaryOperator {
    /// Get the infix symbol for the operator
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Sub => "-",
            BinaryOperator::Mul => "*",
            BinaryOperator::Div => "/",
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            BinaryOperator::Add | BinaryOperator::Sub => 1,
            BinaryOperator::Mul | BinaryOperator::Div => 2,
        }
    }

    fn from_token(token: &str) -> Option<Self> {
        match token {
            "+" => Some(BinaryOperator::Add),
            "-" => Some(BinaryOperator::Sub),
            "*" => Some(BinaryOperator::Mul),
            "/" => Some(BinaryOperator::Div),
            _ => None,
        }
    }
}

/// An owned expression tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Expression {
    /// A constant
    Literal {
        /// The constant value
        value: Scalar,
    },
    /// A read of a named variable
    Variable {
        /// Variable name
        name: String,
    },
    /// An arithmetic operation over two sub-expressions
    Binary {
        /// Operator
        op: BinaryOperator,
        /// Left operand
        left: Box<Expression>,
        /// Right operand
        right: Box<Expression>,
    },
    /// Classification of an input by a named model
    Classify {
        /// Model name
        model: String,
        /// Classified input
        input: Box<Expression>,
    },
}

impl Expression {
    /// Numeric literal
    pub fn number(value: f64) -> Self {
        Expression::Literal {
            value: Scalar::Number(value),
        }
    }

    /// Boolean literal
    pub fn boolean(value: bool) -> Self {
        Expression::Literal {
            value: Scalar::Bool(value),
        }
    }

    /// Text literal
    pub fn text(value: impl Into<String>) -> Self {
        Expression::Literal {
            value: Scalar::String(value.into()),
        }
    }

    /// Variable reference
    pub fn variable(name: impl Into<String>) -> Self {
        Expression::Variable { name: name.into() }
    }

    /// Binary operation
    pub fn binary(op: BinaryOperator, left: Expression, right: Expression) -> Self {
        Expression::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Collect the names of every variable read by this expression
    pub fn collect_variables<'a>(&'a self, out: &mut BTreeSet<&'a str>) {
        match self {
            Expression::Literal { .. } => {}
            Expression::Variable { name } => {
                out.insert(name.as_str());
            }
            Expression::Binary { left, right, .. } => {
                left.collect_variables(out);
                right.collect_variables(out);
            }
            Expression::Classify { input, .. } => input.collect_variables(out),
        }
    }

    /// Replace every read of `from` with a read of `to`
    pub fn rename_variable(&mut self, from: &str, to: &str) {
        match self {
            Expression::Literal { .. } => {}
            Expression::Variable { name } => {
                if name == from {
                    *name = to.to_string();
                }
            }
            Expression::Binary { left, right, .. } => {
                left.rename_variable(from, to);
                right.rename_variable(from, to);
            }
            Expression::Classify { input, .. } => input.rename_variable(from, to),
        }
    }

    /// Evaluate the expression numerically against fixed variable bindings
    ///
    /// Returns `None` for unbound variables and for non-numeric literals or
    /// classifications.
    pub fn evaluate(&self, bindings: &HashMap<String, f64>) -> Option<f64> {
        match self {
            Expression::Literal {
                value: Scalar::Number(n),
            } => Some(*n),
            Expression::Literal { .. } | Expression::Classify { .. } => None,
            Expression::Variable { name } => bindings.get(name).copied(),
            Expression::Binary { op, left, right } => {
                let l = left.evaluate(bindings)?;
                let r = right.evaluate(bindings)?;
                Some(match op {
                    BinaryOperator::Add => l + r,
                    BinaryOperator::Sub => l - r,
                    BinaryOperator::Mul => l * r,
                    BinaryOperator::Div => l / r,
                })
            }
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            Expression::Binary { op, .. } => op.precedence(),
            _ => u8::MAX,
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Literal { value } => write!(f, "{}", value),
            Expression::Variable { name } => write!(f, "{}", name),
            Expression::Binary { op, left, right } => {
                let prec = op.precedence();
                // Operators are left-associative, so an equal-precedence right
                // operand keeps its parentheses.
                if left.precedence() < prec {
                    write!(f, "({})", left)?;
                } else {
                    write!(f, "{}", left)?;
                }
                write!(f, " {} ", op.symbol())?;
                if right.precedence() <= prec {
                    write!(f, "({})", right)
                } else {
                    write!(f, "{}", right)
                }
            }
            Expression::Classify { model, input } => {
                write!(f, "classify {} with {}", input, model)
            }
        }
    }
}

fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

fn token_regex() -> Option<&'static Regex> {
    static TOKENS: OnceLock<Option<Regex>> = OnceLock::new();
    TOKENS
        .get_or_init(|| Regex::new(r"[0-9]+\.[0-9]+|[A-Za-z0-9_]+|[+\-*/()]").ok())
        .as_ref()
}

fn decimal_regex() -> Option<&'static Regex> {
    static DECIMAL: OnceLock<Option<Regex>> = OnceLock::new();
    DECIMAL
        .get_or_init(|| Regex::new(r"^[+-]?[0-9]+(?:\.[0-9]+)?$").ok())
        .as_ref()
}

/// A decimal literal with an optional fraction, if it fits a finite `f64`
pub(crate) fn parse_decimal(text: &str) -> Option<f64> {
    if !decimal_regex().is_some_and(|re| re.is_match(text)) {
        return None;
    }
    text.parse::<f64>().ok().filter(|n| n.is_finite())
}

fn identifier_regex() -> Option<&'static Regex> {
    static IDENT: OnceLock<Option<Regex>> = OnceLock::new();
    IDENT
        .get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").ok())
        .as_ref()
}

/// Whether `text` is a bare identifier (`[A-Za-z_][A-Za-z0-9_]*`)
pub fn is_identifier(text: &str) -> bool {
    identifier_regex().is_some_and(|re| re.is_match(text))
}

/// Remove the characters `< > { }` and surrounding whitespace
pub fn sanitize(text: &str) -> String {
    text.chars()
        .filter(|c| !matches!(c, '<' | '>' | '{' | '}'))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Split text into expression tokens, silently dropping anything unrecognised
pub fn tokenize(text: &str) -> Vec<&str> {
    match token_regex() {
        Some(re) => re.find_iter(text).map(|m| m.as_str()).collect(),
        None => Vec::new(),
    }
}

/// Interpret a single word token as a literal or a variable reference
///
/// Digits too large for a finite number stay as text.
pub(crate) fn operand_from_token(token: &str) -> Expression {
    if let Some(n) = parse_decimal(token) {
        return Expression::number(n);
    }
    if decimal_regex().is_some_and(|re| re.is_match(token)) {
        return Expression::text(token);
    }
    match token {
        "true" => Expression::boolean(true),
        "false" => Expression::boolean(false),
        _ => Expression::variable(token),
    }
}

struct ExpressionParser<'a> {
    tokens: Vec<&'a str>,
    pos: usize,
    depth: i32,
}

impl<'a> ExpressionParser<'a> {
    fn peek(&self) -> Option<&'a str> {
        self.tokens.get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<&'a str> {
        let token = self.peek()?;
        self.pos += 1;
        Some(token)
    }

    fn parse_add_sub(&mut self) -> Option<Expression> {
        let mut left = self.parse_mul_div()?;
        while let Some(op) = self
            .peek()
            .and_then(BinaryOperator::from_token)
            .filter(|op| op.precedence() == 1)
        {
            self.pos += 1;
            let right = self.parse_mul_div()?;
            left = Expression::binary(op, left, right);
        }
        Some(left)
    }

    fn parse_mul_div(&mut self) -> Option<Expression> {
        let mut left = self.parse_primary()?;
        while let Some(op) = self
            .peek()
            .and_then(BinaryOperator::from_token)
            .filter(|op| op.precedence() == 2)
        {
            self.pos += 1;
            let right = self.parse_primary()?;
            left = Expression::binary(op, left, right);
        }
        Some(left)
    }

    fn parse_primary(&mut self) -> Option<Expression> {
        match self.advance()? {
            "(" => {
                self.depth += 1;
                let inner = self.parse_add_sub()?;
                if self.advance()? != ")" {
                    return None;
                }
                self.depth -= 1;
                Some(inner)
            }
            ")" | "+" | "-" | "*" | "/" => None,
            token => Some(operand_from_token(token)),
        }
    }
}

/// Parse arithmetic text into an expression tree
///
/// Returns `None` unless every token is consumed and all parentheses balance;
/// a partial tree is never returned.
pub fn parse_expression(text: &str) -> Option<Expression> {
    let cleaned = sanitize(text);
    let tokens = tokenize(&cleaned);
    if tokens.is_empty() {
        return None;
    }

    let mut parser = ExpressionParser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let expr = parser.parse_add_sub()?;
    if parser.depth != 0 || parser.pos != parser.tokens.len() {
        return None;
    }
    Some(expr)
}

/// Parse a value position: an expression, else a bare variable, else a literal
pub fn parse_value(text: &str) -> Expression {
    if is_quoted(text.trim()) {
        return parse_literal(text);
    }
    if let Some(expr) = parse_expression(text) {
        return expr;
    }

    let trimmed = text.trim();
    if is_identifier(trimmed) {
        return operand_from_token(trimmed);
    }
    parse_literal(trimmed)
}

fn is_quoted(text: &str) -> bool {
    text.len() >= 2
        && ((text.starts_with('"') && text.ends_with('"'))
            || (text.starts_with('\'') && text.ends_with('\'')))
}

/// A literal: numeric for a signed decimal that fits a finite number,
/// boolean for `true`/`false`, otherwise the raw text
pub fn parse_literal(text: &str) -> Expression {
    let trimmed = text.trim();
    if let Some(n) = parse_decimal(trimmed) {
        return Expression::number(n);
    }
    match trimmed {
        "true" => Expression::boolean(true),
        "false" => Expression::boolean(false),
        _ if is_quoted(trimmed) => Expression::text(&trimmed[1..trimmed.len() - 1]),
        _ => Expression::text(trimmed),
    }
}
