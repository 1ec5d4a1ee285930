use crate::ast::Span;
use crate::semantic::DottedName;
use thiserror::Error;

/// Location of a syntax error inside a formula
#[derive(Debug, Clone, PartialEq)]
pub struct SyntaxErrorDetails {
    pub rule: String,
    pub formula: String,
    pub message: String,
    pub span: Span,
}

/// Errors raised while compiling a model, setting a situation or evaluating
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PublicodesError {
    /// Malformed formula
    #[error("{}", format_syntax(.0))]
    Syntax(Box<SyntaxErrorDetails>),

    /// Malformed rule declaration (unknown key, wrong value shape)
    #[error("Invalid rule '{rule}' (key '{key}'): {message}")]
    RuleDefinition {
        rule: String,
        key: String,
        message: String,
    },

    #[error("Unknown reference '{reference}' in rule '{rule}'")]
    UnknownReference { rule: String, reference: String },

    #[error("Circular reference: {}", .cycle.join(" → "))]
    CircularReference { cycle: Vec<String> },

    #[error("Circular reference in rule '{rule}' did not converge after {iterations} iterations")]
    Convergence { rule: String, iterations: usize },

    #[error("Division by zero{}", in_rule(.rule))]
    DivisionByZero { rule: Option<String> },

    #[error("Rounding precision must be strictly positive, got {precision}{}", in_rule(.rule))]
    Rounding {
        rule: Option<String>,
        precision: String,
    },

    #[error("Unit error{}: {message}", in_rule(.rule))]
    Unit {
        rule: Option<String>,
        message: String,
    },

    /// Operand of the wrong kind (e.g. a text in an addition)
    #[error("Type error{}: {message}", in_rule(.rule))]
    Type {
        rule: Option<String>,
        message: String,
    },

    #[error("Invalid situation for '{rule}': {message}")]
    Situation { rule: String, message: String },

    #[error("La règle '{0}' n'existe pas")]
    RuleNotFound(String),

    #[error("Resource limit exceeded: {limit_name} (limit: {limit_value}, actual: {actual_value}). {suggestion}")]
    ResourceLimitExceeded {
        limit_name: String,
        limit_value: String,
        actual_value: String,
        suggestion: String,
    },

    /// Every error found while compiling a model
    #[error("{}", format_multiple(.0))]
    Multiple(Vec<PublicodesError>),
}

fn format_syntax(details: &SyntaxErrorDetails) -> String {
    format!(
        "Syntax error in rule '{}' at {}: {}",
        details.rule, details.span, details.message
    )
}

fn in_rule(rule: &Option<String>) -> String {
    rule.as_ref()
        .map(|rule| format!(" in rule '{}'", rule))
        .unwrap_or_default()
}

fn format_multiple(errors: &[PublicodesError]) -> String {
    let mut out = format!("{} errors:", errors.len());
    for error in errors {
        out.push_str("\n  - ");
        out.push_str(&error.to_string());
    }
    out
}

impl PublicodesError {
    pub fn syntax(
        rule: &DottedName,
        formula: impl Into<String>,
        message: impl Into<String>,
        span: Span,
    ) -> Self {
        Self::Syntax(Box::new(SyntaxErrorDetails {
            rule: rule.to_string(),
            formula: formula.into(),
            message: message.into(),
            span,
        }))
    }

    pub fn rule_definition(
        rule: &DottedName,
        key: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::RuleDefinition {
            rule: rule.to_string(),
            key: key.into(),
            message: message.into(),
        }
    }

    pub fn unit(message: impl Into<String>) -> Self {
        Self::Unit {
            rule: None,
            message: message.into(),
        }
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::Type {
            rule: None,
            message: message.into(),
        }
    }

    /// Collapse a list of errors: a single error stays itself
    pub fn from_errors(mut errors: Vec<PublicodesError>) -> Self {
        if errors.len() == 1 {
            errors.remove(0)
        } else {
            Self::Multiple(errors)
        }
    }

    /// Attach the rule being evaluated to errors that do not name one yet
    pub fn in_rule(mut self, name: &DottedName) -> Self {
        match &mut self {
            Self::DivisionByZero { rule }
            | Self::Rounding { rule, .. }
            | Self::Unit { rule, .. }
            | Self::Type { rule, .. } => {
                if rule.is_none() {
                    *rule = Some(name.to_string());
                }
            }
            _ => {}
        }
        self
    }

    /// Rule the error is about, when it names one
    pub fn rule(&self) -> Option<&str> {
        match self {
            Self::Syntax(details) => Some(&details.rule),
            Self::RuleDefinition { rule, .. }
            | Self::UnknownReference { rule, .. }
            | Self::Convergence { rule, .. }
            | Self::Situation { rule, .. } => Some(rule),
            Self::DivisionByZero { rule }
            | Self::Rounding { rule, .. }
            | Self::Unit { rule, .. }
            | Self::Type { rule, .. } => rule.as_deref(),
            Self::RuleNotFound(rule) => Some(rule),
            Self::CircularReference { .. }
            | Self::ResourceLimitExceeded { .. }
            | Self::Multiple(_) => None,
        }
    }

    /// Flatten nested `Multiple` errors
    pub fn into_errors(self) -> Vec<PublicodesError> {
        match self {
            Self::Multiple(errors) => errors.into_iter().flat_map(Self::into_errors).collect(),
            other => vec![other],
        }
    }
}
