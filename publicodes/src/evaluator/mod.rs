//! Lazy, memoized evaluation of compiled rules
//!
//! Evaluation is demand-driven: asking for a rule evaluates exactly the
//! subexpressions its value depends on. Every result carries:
//! 1. its value and unit
//! 2. the inputs still missing to compute it, weighted by occurrence
//! 3. the rules traversed to compute it

pub mod context;
pub mod datetime;
pub mod expression;
pub mod operations;
pub mod rules;
pub mod units;

pub use context::EvaluationContext;
pub use expression::evaluate_expression;
pub use rules::evaluate_rule;

use crate::semantic::{DottedName, Unit, Value};
use std::collections::{BTreeMap, BTreeSet};

/// Result of evaluating an expression or a rule
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub value: Value,
    pub unit: Unit,
    /// Inputs whose absence prevents a definitive answer, with their weight
    pub missing: BTreeMap<DottedName, u32>,
    /// Rules dereferenced while computing the value
    pub needed: BTreeSet<DottedName>,
}

impl Default for Evaluation {
    fn default() -> Self {
        Self::new(Value::Missing, Unit::default())
    }
}

impl Evaluation {
    pub fn new(value: Value, unit: Unit) -> Self {
        Self {
            value,
            unit,
            missing: BTreeMap::new(),
            needed: BTreeSet::new(),
        }
    }

    pub fn unitless(value: Value) -> Self {
        Self::new(value, Unit::default())
    }

    /// The value of an unanswered input
    pub fn missing_input(name: &DottedName) -> Self {
        let mut evaluation = Self::unitless(Value::Missing);
        evaluation.missing.insert(name.clone(), 1);
        evaluation.needed.insert(name.clone());
        evaluation
    }

    /// Merge the missing inputs and traversed rules of `other` into `self`
    pub fn absorb(&mut self, other: &Evaluation) {
        for (name, weight) in &other.missing {
            let total = self.missing.entry(name.clone()).or_default();
            *total = total.saturating_add(*weight);
        }
        self.needed.extend(other.needed.iter().cloned());
    }

    /// Replace value and unit, keeping the bookkeeping
    pub fn with_value(mut self, value: Value, unit: Unit) -> Self {
        self.value = value;
        self.unit = unit;
        self
    }

    /// A result built from several evaluated operands
    pub fn combine(value: Value, unit: Unit, operands: &[&Evaluation]) -> Self {
        let mut evaluation = Self::new(value, unit);
        for operand in operands {
            evaluation.absorb(operand);
        }
        evaluation
    }
}
