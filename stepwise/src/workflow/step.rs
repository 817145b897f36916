//! Step types for compiled workflows

use super::condition::Condition;
use super::expression::Expression;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

const STEP_ID_PREFIX: &str = "step_";

/// Errors that can occur when creating step-related types
#[derive(Debug, Error)]
pub enum StepError {
    /// Step ID does not have the form `step_<number>`
    #[error("Invalid step ID '{0}': expected 'step_' followed by a number")]
    InvalidStepId(String),
}

/// Result type for step operations
pub type StepResult<T> = Result<T, StepError>;

/// Unique identifier for a step, `step_<n>` with `n` counting from 1
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StepId(String);

impl StepId {
    /// Create the ID for the `n`th step
    pub fn from_number(n: u64) -> Self {
        Self(format!("{}{}", STEP_ID_PREFIX, n))
    }

    /// Parse an ID, returning an error unless it has the form `step_<n>`
    pub fn try_new(id: impl Into<String>) -> StepResult<Self> {
        let id = id.into();
        let valid = id
            .strip_prefix(STEP_ID_PREFIX)
            .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()));
        if valid {
            Ok(Self(id))
        } else {
            Err(StepError::InvalidStepId(id))
        }
    }

    /// The numeric part of the ID
    pub fn number(&self) -> Option<u64> {
        self.0.strip_prefix(STEP_ID_PREFIX)?.parse().ok()
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the synthetic counter driven by the count loop with this ID
    pub fn counter_name(&self) -> String {
        format!("{}_counter", self.0)
    }
}

impl std::fmt::Display for StepId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Roles and permissions required to run a step
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AccessControl {
    /// Roles allowed to run the step
    pub roles: BTreeSet<String>,
    /// Permissions the step needs
    pub permissions: BTreeSet<String>,
}

impl AccessControl {
    /// Create an access descriptor from role and permission names
    pub fn new<R, P>(roles: R, permissions: P) -> Self
    where
        R: IntoIterator,
        R::Item: Into<String>,
        P: IntoIterator,
        P::Item: Into<String>,
    {
        Self {
            roles: roles.into_iter().map(Into::into).collect(),
            permissions: permissions.into_iter().map(Into::into).collect(),
        }
    }
}

/// The operation a step performs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepKind {
    /// Assign a value to a variable
    Set {
        /// Assigned variable
        target: String,
        /// Assigned value
        value: Expression,
    },
    /// Conditional branch
    If {
        /// Branch condition
        condition: Condition,
        /// Steps run when the condition holds
        then: Vec<Step>,
        /// Steps run otherwise
        #[serde(rename = "else", default)]
        otherwise: Vec<Step>,
    },
    /// Loop while the condition holds
    While {
        /// Loop condition
        condition: Condition,
        /// Loop body
        body: Vec<Step>,
    },
    /// Pause
    Wait {
        /// Pause length
        seconds: u32,
    },
    /// Finish with a value
    Return {
        /// Returned value
        value: Expression,
    },
    /// Leave the innermost loop
    Break,
    /// Call an external endpoint and store the response
    Call {
        /// Variable receiving the response
        target: String,
        /// Endpoint called
        endpoint: String,
    },
    /// Classify an input with a model
    AiClassify {
        /// Model name
        model: String,
        /// Classified input
        input: Expression,
        /// Variable receiving the classification
        target: String,
    },
    /// Render a UI component
    UiRender {
        /// Component type
        component: String,
        /// Render target
        target: String,
    },
    /// Declare a piece of UI state
    UiState {
        /// State name
        name: String,
        /// Initial value
        initial: Expression,
    },
    /// Apply CSS properties to a selector
    CssStyle {
        /// CSS selector
        selector: String,
        /// Property name to value
        properties: BTreeMap<String, String>,
    },
    /// Bind a handler to a UI event
    UiEvent {
        /// Event name
        event: String,
        /// Handler to execute
        handler: String,
    },
}

impl StepKind {
    /// The `type` tag this kind serializes with
    pub fn type_name(&self) -> &'static str {
        match self {
            StepKind::Set { .. } => "set",
            StepKind::If { .. } => "if",
            StepKind::While { .. } => "while",
            StepKind::Wait { .. } => "wait",
            StepKind::Return { .. } => "return",
            StepKind::Break => "break",
            StepKind::Call { .. } => "call",
            StepKind::AiClassify { .. } => "ai_classify",
            StepKind::UiRender { .. } => "ui_render",
            StepKind::UiState { .. } => "ui_state",
            StepKind::CssStyle { .. } => "css_style",
            StepKind::UiEvent { .. } => "ui_event",
        }
    }
}

/// One node of a compiled workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Unique identifier, assigned in creation order
    pub id: StepId,
    /// Human readable description of the step
    pub natural_language: String,
    /// Example phrasings that produce this step
    pub examples: Vec<String>,
    /// Access requirements
    pub access: AccessControl,
    /// What the step does
    #[serde(flatten)]
    pub kind: StepKind,
}

impl Step {
    /// Create a step with a single example phrase
    pub fn new(
        id: StepId,
        natural_language: impl Into<String>,
        example: impl Into<String>,
        access: AccessControl,
        kind: StepKind,
    ) -> Self {
        Self {
            id,
            natural_language: natural_language.into(),
            examples: vec![example.into()],
            access,
            kind,
        }
    }

    /// Nested step lists, in document order
    pub fn children(&self) -> Vec<&[Step]> {
        match &self.kind {
            StepKind::If {
                then, otherwise, ..
            } => vec![then.as_slice(), otherwise.as_slice()],
            StepKind::While { body, .. } => vec![body.as_slice()],
            _ => Vec::new(),
        }
    }

    /// Visit this step and all nested steps in pre-order
    pub fn walk<'a, F>(&'a self, visit: &mut F)
    where
        F: FnMut(&'a Step),
    {
        visit(self);
        for list in self.children() {
            for child in list {
                child.walk(visit);
            }
        }
    }

    /// Give this step and all nested steps new IDs, in pre-order
    ///
    /// A count loop's counter is named after the loop's ID, so it is renamed
    /// along with the loop.
    pub fn reassign_ids<F>(&mut self, next_id: &mut F)
    where
        F: FnMut() -> StepId,
    {
        let previous = std::mem::replace(&mut self.id, next_id());
        let counter = previous.counter_name();
        if self.condition_reads(&counter) {
            let renamed = self.id.counter_name();
            self.rename_variable(&counter, &renamed);
        }

        match &mut self.kind {
            StepKind::If {
                then, otherwise, ..
            } => {
                for child in then.iter_mut().chain(otherwise.iter_mut()) {
                    child.reassign_ids(next_id);
                }
            }
            StepKind::While { body, .. } => {
                for child in body.iter_mut() {
                    child.reassign_ids(next_id);
                }
            }
            _ => {}
        }
    }

    /// The synthetic counter this step loops over, if it is a count loop
    pub fn loop_counter(&self) -> Option<String> {
        let counter = self.id.counter_name();
        self.condition_reads(&counter).then_some(counter)
    }

    fn condition_reads(&self, name: &str) -> bool {
        match &self.kind {
            StepKind::While { condition, .. } => {
                let mut names = BTreeSet::new();
                condition.collect_variables(&mut names);
                names.contains(name)
            }
            _ => false,
        }
    }

    /// Rename a variable in this step and all nested steps, phrases included
    pub fn rename_variable(&mut self, from: &str, to: &str) {
        if self.natural_language.contains(from) {
            self.natural_language = self.natural_language.replace(from, to);
        }
        match &mut self.kind {
            StepKind::Set { target, value } => {
                rename(target, from, to);
                value.rename_variable(from, to);
            }
            StepKind::If {
                condition,
                then,
                otherwise,
            } => {
                condition.rename_variable(from, to);
                for child in then.iter_mut().chain(otherwise.iter_mut()) {
                    child.rename_variable(from, to);
                }
            }
            StepKind::While { condition, body } => {
                condition.rename_variable(from, to);
                for child in body.iter_mut() {
                    child.rename_variable(from, to);
                }
            }
            StepKind::Return { value } => value.rename_variable(from, to),
            StepKind::Call { target, .. } => rename(target, from, to),
            StepKind::AiClassify { input, target, .. } => {
                input.rename_variable(from, to);
                rename(target, from, to);
            }
            StepKind::Wait { .. }
            | StepKind::Break
            | StepKind::UiRender { .. }
            | StepKind::UiState { .. }
            | StepKind::CssStyle { .. }
            | StepKind::UiEvent { .. } => {}
        }
    }
}

fn rename(name: &mut String, from: &str, to: &str) {
    if name == from {
        *name = to.to_string();
    }
}

/// Visit every step of a list, and all nested steps, in pre-order
pub fn walk_steps<'a, F>(steps: &'a [Step], visit: &mut F)
where
    F: FnMut(&'a Step),
{
    for step in steps {
        step.walk(visit);
    }
}
