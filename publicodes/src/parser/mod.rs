use crate::ast::Span;
use crate::error::PublicodesError;
use crate::resource_limits::ResourceLimits;
use crate::semantic::{DottedName, Expression};
use pest::Parser;
use pest_derive::Parser;

pub mod expressions;
pub mod literals;
pub mod mechanisms;
pub mod rules;
pub mod units;

pub use rules::parse_rules;
pub use units::{format_unit, parse_unit};

#[derive(Parser)]
#[grammar = "src/parser/publicodes.pest"]
pub struct PublicodesParser;

/// Nesting bookkeeping while lowering a parse tree
pub(crate) struct DepthTracker {
    depth: usize,
    max_depth: usize,
}

impl DepthTracker {
    pub(crate) fn new(max_depth: usize) -> Self {
        Self {
            depth: 0,
            max_depth,
        }
    }

    pub(crate) fn push(&mut self) -> Result<(), PublicodesError> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(PublicodesError::ResourceLimitExceeded {
                limit_name: "max_expression_depth".to_string(),
                limit_value: self.max_depth.to_string(),
                actual_value: self.depth.to_string(),
                suggestion: "Split the formula into intermediate rules".to_string(),
            });
        }
        Ok(())
    }

    pub(crate) fn pop(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }
}

/// Parse a formula found in rule `rule` into an unresolved expression tree
pub fn parse_formula(
    formula: &str,
    rule: &DottedName,
    limits: &ResourceLimits,
) -> Result<Expression, PublicodesError> {
    if formula.len() > limits.max_formula_bytes {
        return Err(PublicodesError::ResourceLimitExceeded {
            limit_name: "max_formula_bytes".to_string(),
            limit_value: format!("{} bytes", limits.max_formula_bytes),
            actual_value: format!("{} bytes", formula.len()),
            suggestion: "Split the formula into intermediate rules".to_string(),
        });
    }

    let mut pairs = PublicodesParser::parse(Rule::formula, formula).map_err(|e| {
        let span = match e.line_col {
            pest::error::LineColLocation::Pos((line, col)) => Span {
                start: 0,
                end: 0,
                line,
                col,
            },
            pest::error::LineColLocation::Span((line, col), (_, _)) => Span {
                start: 0,
                end: 0,
                line,
                col,
            },
        };
        let span = match e.location {
            pest::error::InputLocation::Pos(start) => Span {
                start,
                end: start,
                ..span
            },
            pest::error::InputLocation::Span((start, end)) => Span { start, end, ..span },
        };
        PublicodesError::syntax(rule, formula, e.variant.message().to_string(), span)
    })?;

    let formula_pair = pairs.next().ok_or_else(|| {
        PublicodesError::syntax(rule, formula, "empty formula", Span {
            start: 0,
            end: 0,
            line: 1,
            col: 1,
        })
    })?;

    let mut depth = DepthTracker::new(limits.max_expression_depth);
    for inner in formula_pair.into_inner() {
        if inner.as_rule() == Rule::expression {
            return expressions::parse_expression(inner, &mut depth)
                .map_err(|e| with_formula_context(e, rule, formula));
        }
    }
    Err(PublicodesError::syntax(rule, formula, "empty formula", Span {
        start: 0,
        end: formula.len(),
        line: 1,
        col: 1,
    }))
}

/// Literal errors are raised without knowing which rule they come from
fn with_formula_context(error: PublicodesError, rule: &DottedName, formula: &str) -> PublicodesError {
    match error {
        PublicodesError::Syntax(mut details) => {
            details.rule = rule.to_string();
            details.formula = formula.to_string();
            PublicodesError::Syntax(details)
        }
        other => other,
    }
}
