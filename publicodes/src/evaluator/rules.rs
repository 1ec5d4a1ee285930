//! Rule evaluation: memoization, applicability and circular references
//!
//! A rule is not applicable when one of its namespaces is not: an ancestor
//! whose gates close, or whose value is `non` or `non applicable`, switches
//! off all its descendants.

use super::context::EvaluationContext;
use super::expression::evaluate_expression;
use super::{operations, Evaluation};
use crate::error::PublicodesError;
use crate::semantic::{DottedName, Expression, ExpressionKind, GateKind, Rule, Value};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::debug;

/// Outcome of an `applicable si` / `non applicable si` condition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    Open,
    Closed,
    Unknown,
}

pub fn gate_outcome(kind: GateKind, condition: &Value) -> Result<GateOutcome, PublicodesError> {
    let outcome = match (kind, condition) {
        (_, Value::Missing) => GateOutcome::Unknown,
        (GateKind::ApplicableIf, Value::Boolean(true)) => GateOutcome::Open,
        (GateKind::ApplicableIf, Value::Boolean(false) | Value::NotApplicable) => {
            GateOutcome::Closed
        }
        (GateKind::NotApplicableIf, Value::Boolean(true)) => GateOutcome::Closed,
        (GateKind::NotApplicableIf, Value::Boolean(false) | Value::NotApplicable) => {
            GateOutcome::Open
        }
        (_, other) => {
            return Err(PublicodesError::type_error(format!(
                "an applicability condition must be a boolean, got {}",
                other.type_name()
            )))
        }
    };
    Ok(outcome)
}

/// Evaluate rule `name`, at most once per situation and `contexte` frame
pub fn evaluate_rule(
    name: &DottedName,
    ctx: &mut EvaluationContext,
) -> Result<Evaluation, PublicodesError> {
    if let Some(evaluation) = ctx.override_for(name) {
        return Ok(evaluation.clone());
    }
    if let Some(seed) = ctx.seed(name) {
        return Ok(seed.clone());
    }
    if let Some(evaluation) = ctx.cached(name) {
        return Ok(evaluation.clone());
    }

    ctx.enter(name)?;
    let result = compute_rule(name, ctx).map_err(|e| e.in_rule(name));
    ctx.leave();

    let evaluation = result?;
    ctx.store(name, evaluation.clone());
    Ok(evaluation)
}

fn compute_rule(
    name: &DottedName,
    ctx: &mut EvaluationContext,
) -> Result<Evaluation, PublicodesError> {
    let rules = ctx.rules;
    let rule = rules
        .get(name)
        .ok_or_else(|| PublicodesError::RuleNotFound(name.to_string()))?;

    let mut applicability = Evaluation::unitless(Value::Boolean(true));
    for ancestor in name.ancestors() {
        let Some(parent) = rules.get(&ancestor) else {
            continue;
        };
        let status = parent_status(parent, ctx)?;
        applicability.absorb(&status);
        if !matches!(status.value, Value::Boolean(true)) {
            return Ok(applicability.with_value(status.value, Default::default()));
        }
    }

    let situation = ctx.situation;
    let mut evaluation = match situation.get(name) {
        Some(answer) => evaluate_answer(rule, answer, ctx)?,
        None => evaluate_expression(&rule.body, ctx)?,
    };
    evaluation.absorb(&applicability);
    Ok(evaluation)
}

/// Whether a namespace lets its children apply. Its gates are checked first,
/// then its value: `non` and `non applicable` switch the children off.
/// Children depend on the inputs of a parent that has a formula or asks a
/// question, never on a bare namespace.
fn parent_status(
    parent: &Rule,
    ctx: &mut EvaluationContext,
) -> Result<Evaluation, PublicodesError> {
    let mut status = evaluate_gates(parent, ctx)?;
    if !matches!(status.value, Value::Boolean(true)) {
        return Ok(status);
    }

    // A parent computed from its own children is being evaluated already
    let value = match evaluate_rule(&parent.name, ctx) {
        Ok(value) => value,
        Err(PublicodesError::CircularReference { .. }) => return Ok(status),
        Err(error) => return Err(error),
    };
    match value.value {
        Value::Boolean(false) | Value::NotApplicable => {
            status.absorb(&value);
            status.value = Value::NotApplicable;
        }
        _ if is_namespace(parent) => {}
        _ => status.absorb(&value),
    }
    Ok(status)
}

fn is_namespace(rule: &Rule) -> bool {
    rule.question.is_none()
        && !rule.has_default
        && matches!(rule.ungated_body().kind, ExpressionKind::Input(_))
}

/// `oui` when every top-level gate of `rule` is open
fn evaluate_gates(rule: &Rule, ctx: &mut EvaluationContext) -> Result<Evaluation, PublicodesError> {
    let mut status = Evaluation::unitless(Value::Boolean(true));
    for (kind, condition) in rule.gates() {
        let evaluation = evaluate_expression(condition, ctx)?;
        status.absorb(&evaluation);
        match gate_outcome(kind, &evaluation.value)? {
            GateOutcome::Open => {}
            GateOutcome::Closed => {
                status.value = Value::NotApplicable;
                return Ok(status);
            }
            GateOutcome::Unknown => {
                status.value = Value::Missing;
                return Ok(status);
            }
        }
    }
    Ok(status)
}

/// A situation value replaces the formula of a rule, not its gates
fn evaluate_answer(
    rule: &Rule,
    answer: &Expression,
    ctx: &mut EvaluationContext,
) -> Result<Evaluation, PublicodesError> {
    let gates = evaluate_gates(rule, ctx)?;
    if !matches!(gates.value, Value::Boolean(true)) {
        let value = gates.value.clone();
        return Ok(gates.with_value(value, Default::default()));
    }

    let mut evaluation = evaluate_expression(answer, ctx)?;
    if let (Some(unit), Value::Number(number)) = (&rule.unit, &evaluation.value) {
        let (converted, unit) = operations::align_units(
            unit,
            *number,
            &evaluation.unit,
            ctx.strict_units,
        )?;
        evaluation.value = Value::Number(converted);
        evaluation.unit = unit;
    }
    evaluation.absorb(&gates);
    Ok(evaluation)
}

/// Fixed-point iteration for rules that opt into circular references
///
/// The rule starts at 0 and its formula is evaluated again with the previous
/// result until two successive values agree to 15 significant digits.
pub fn evaluate_circular(
    rule: &DottedName,
    value: &Expression,
    ctx: &mut EvaluationContext,
) -> Result<Evaluation, PublicodesError> {
    let max_iterations = ctx.limits.max_circular_iterations;
    let mut seed = Evaluation::unitless(Value::Number(Decimal::ZERO));

    for iteration in 0..max_iterations {
        ctx.set_seed(rule, seed.clone());
        ctx.push_frame(HashMap::new());
        let stack = ctx.suspend_stack();
        let result = evaluate_expression(value, ctx);
        ctx.restore_stack(stack);
        ctx.pop_frame();

        let result = match result {
            Ok(result) => result,
            Err(error) => {
                ctx.clear_seed(rule);
                return Err(error);
            }
        };
        let solved = match (&seed.value, &result.value) {
            (Value::Number(previous), Value::Number(next)) => {
                operations::converged(*previous, *next)
            }
            (_, Value::Number(_)) => false,
            _ => true,
        };
        if solved {
            ctx.clear_seed(rule);
            debug!(rule = %rule, iterations = iteration + 1, "circular reference solved");
            return Ok(result);
        }
        seed = Evaluation::new(result.value, result.unit);
    }

    ctx.clear_seed(rule);
    Err(PublicodesError::Convergence {
        rule: rule.to_string(),
        iterations: max_iterations,
    })
}
