//! Expression evaluation with three-valued semantics
//!
//! `NotApplicable` is neutral in sums and absorbing in products, `Missing`
//! propagates unless the result is already decided (`0 * x`, `non et x`).
//! Operands are only evaluated when they can change the result.

use super::context::EvaluationContext;
use super::rules::{evaluate_circular, evaluate_rule, gate_outcome, GateOutcome};
use super::{datetime, operations, units, Evaluation};
use crate::error::PublicodesError;
use crate::semantic::{
    BinaryOperator, BoundKind, Expression, ExpressionKind, ExtremumKind, PredicateKind,
    Reference, Scale, Unit, Value,
};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::warn;

pub fn evaluate_expression(
    expr: &Expression,
    ctx: &mut EvaluationContext,
) -> Result<Evaluation, PublicodesError> {
    match &expr.kind {
        ExpressionKind::Constant(value, unit) => Ok(Evaluation::new(value.clone(), unit.clone())),
        ExpressionKind::Input(name) => Ok(Evaluation::missing_input(name)),
        ExpressionKind::Reference(reference) => evaluate_reference(reference, ctx),
        ExpressionKind::Binary { op, left, right } => evaluate_binary(*op, left, right, ctx),
        ExpressionKind::Unary { operand, .. } => {
            let operand = evaluate_expression(operand, ctx)?;
            negate(operand)
        }
        ExpressionKind::Sum(items) => {
            let mut total = Evaluation::unitless(Value::Number(Decimal::ZERO));
            for item in items {
                let item = evaluate_expression(item, ctx)?;
                total = additive(BinaryOperator::Add, total, item, ctx.strict_units)?;
            }
            Ok(total)
        }
        ExpressionKind::Product(items) => {
            let mut total = Evaluation::unitless(Value::Number(Decimal::ONE));
            for item in items {
                if total.value.is_zero() {
                    break;
                }
                let item = evaluate_expression(item, ctx)?;
                total = multiply(total, item, ctx.strict_units)?;
            }
            Ok(total)
        }
        ExpressionKind::Condition {
            condition,
            consequence,
            alternative,
        } => {
            let condition = evaluate_expression(condition, ctx)?;
            let branch = match condition.value {
                Value::Boolean(true) => consequence,
                Value::Boolean(false) | Value::NotApplicable => alternative,
                Value::Missing => return Ok(condition.with_value(Value::Missing, Unit::default())),
                ref other => {
                    return Err(PublicodesError::type_error(format!(
                        "a condition must be a boolean, got {}",
                        other.type_name()
                    )))
                }
            };
            let mut result = evaluate_expression(branch, ctx)?;
            result.absorb(&condition);
            Ok(result)
        }
        ExpressionKind::Bareme(scale) => evaluate_scale(scale, true, ctx),
        ExpressionKind::Grille(scale) => evaluate_scale(scale, false, ctx),
        ExpressionKind::Round {
            mode,
            value,
            precision,
        } => {
            let value = evaluate_expression(value, ctx)?;
            if value.value.is_missing() {
                return Ok(value);
            }
            let precision = evaluate_expression(precision, ctx)?;
            let rounded = operations::round_value(*mode, &value.value, &precision.value)?;
            let unit = value.unit.clone();
            Ok(Evaluation::combine(rounded, unit, &[&value, &precision]))
        }
        ExpressionKind::Clamp {
            bound,
            value,
            limit,
        } => evaluate_clamp(*bound, value, limit, ctx),
        ExpressionKind::Abatement { value, abatement } => evaluate_abatement(value, abatement, ctx),
        ExpressionKind::Extremum { kind, items } => evaluate_extremum(*kind, items, ctx),
        ExpressionKind::Context { overrides, value } => evaluate_context(overrides, value, ctx),
        ExpressionKind::Replace {
            original,
            candidates,
        } => {
            let mut skipped = Evaluation::default();
            for candidate in candidates {
                let mut evaluation = evaluate_expression(candidate, ctx)?;
                if evaluation.value.is_not_applicable() {
                    skipped.absorb(&evaluation);
                    continue;
                }
                evaluation.absorb(&skipped);
                return Ok(evaluation);
            }
            let mut evaluation = evaluate_expression(original, ctx)?;
            evaluation.absorb(&skipped);
            Ok(evaluation)
        }
        ExpressionKind::DefaultValue { value, default } => {
            let value = evaluate_expression(value, ctx)?;
            if !value.value.is_missing() {
                return Ok(value);
            }
            let mut result = evaluate_expression(default, ctx)?;
            result.absorb(&value);
            Ok(result)
        }
        ExpressionKind::OneOf(items) => evaluate_any(items, ctx),
        ExpressionKind::AllOf(items) => evaluate_all(items, ctx),
        ExpressionKind::Duration { from, to, unit } => {
            let from = evaluate_expression(from, ctx)?;
            let to = evaluate_expression(to, ctx)?;
            datetime::evaluate_duration(&from, &to, unit)
        }
        ExpressionKind::Predicate { kind, operand } => {
            let operand = evaluate_expression(operand, ctx)?;
            Ok(evaluate_predicate(*kind, operand))
        }
        ExpressionKind::Gate {
            kind,
            condition,
            value,
        } => {
            let condition = evaluate_expression(condition, ctx)?;
            match gate_outcome(*kind, &condition.value)? {
                GateOutcome::Open => {
                    let mut result = evaluate_expression(value, ctx)?;
                    result.absorb(&condition);
                    Ok(result)
                }
                GateOutcome::Closed => {
                    Ok(condition.with_value(Value::NotApplicable, Unit::default()))
                }
                GateOutcome::Unknown => Ok(condition.with_value(Value::Missing, Unit::default())),
            }
        }
        ExpressionKind::UnitConversion { value, unit } => {
            let evaluation = evaluate_expression(value, ctx)?;
            convert_evaluation(evaluation, unit, ctx.strict_units)
        }
        ExpressionKind::CircularResolution { rule, value } => evaluate_circular(rule, value, ctx),
    }
}

fn evaluate_reference(
    reference: &Reference,
    ctx: &mut EvaluationContext,
) -> Result<Evaluation, PublicodesError> {
    let name = reference
        .resolved
        .as_ref()
        .ok_or_else(|| {
            PublicodesError::type_error(format!("unresolved reference '{}'", reference.name))
        })?;
    let mut evaluation = evaluate_rule(name, ctx)?;
    evaluation.needed.insert(name.clone());
    Ok(evaluation)
}

fn type_mismatch(op: BinaryOperator, left: &Value, right: &Value) -> PublicodesError {
    PublicodesError::type_error(format!(
        "cannot apply '{}' to {} and {}",
        op,
        left.type_name(),
        right.type_name()
    ))
}

fn evaluate_binary(
    op: BinaryOperator,
    left: &Expression,
    right: &Expression,
    ctx: &mut EvaluationContext,
) -> Result<Evaluation, PublicodesError> {
    let strict = ctx.strict_units;
    let l = evaluate_expression(left, ctx)?;
    match op {
        BinaryOperator::Add | BinaryOperator::Subtract => {
            let r = evaluate_expression(right, ctx)?;
            additive(op, l, r, strict)
        }
        BinaryOperator::Multiply => {
            // 0 × anything is 0, even when the other side is unknown
            if l.value.is_zero() {
                return Ok(l);
            }
            let r = evaluate_expression(right, ctx)?;
            multiply(l, r, strict)
        }
        BinaryOperator::Divide | BinaryOperator::FloorDivide => {
            let r = evaluate_expression(right, ctx)?;
            divide(op, l, r, strict)
        }
        BinaryOperator::Power => {
            let r = evaluate_expression(right, ctx)?;
            let value = match (&l.value, &r.value) {
                (Value::NotApplicable, _) | (_, Value::NotApplicable) => {
                    return Ok(Evaluation::combine(Value::NotApplicable, Unit::default(), &[&l, &r]))
                }
                (Value::Missing, _) | (_, Value::Missing) => {
                    return Ok(Evaluation::combine(Value::Missing, Unit::default(), &[&l, &r]))
                }
                (Value::Number(a), Value::Number(b)) => {
                    operations::arithmetic(op, *a, &l.unit, *b, &r.unit, strict)?
                }
                (a, b) => return Err(type_mismatch(op, a, b)),
            };
            Ok(Evaluation::combine(Value::Number(value.0), value.1, &[&l, &r]))
        }
        BinaryOperator::Equal | BinaryOperator::NotEqual => {
            let r = evaluate_expression(right, ctx)?;
            let value = match (&l.value, &r.value) {
                (Value::Missing, _) | (_, Value::Missing) => Value::Missing,
                (Value::NotApplicable, Value::NotApplicable) => {
                    Value::Boolean(op == BinaryOperator::Equal)
                }
                (Value::NotApplicable, _) | (_, Value::NotApplicable) => {
                    Value::Boolean(op == BinaryOperator::NotEqual)
                }
                (a, b) => Value::Boolean(operations::compare(op, a, &l.unit, b, &r.unit, strict)?),
            };
            Ok(Evaluation::combine(value, Unit::default(), &[&l, &r]))
        }
        BinaryOperator::LessThan
        | BinaryOperator::LessThanOrEqual
        | BinaryOperator::GreaterThan
        | BinaryOperator::GreaterThanOrEqual => {
            let r = evaluate_expression(right, ctx)?;
            let value = match (&l.value, &r.value) {
                (Value::NotApplicable, _) | (_, Value::NotApplicable) => Value::NotApplicable,
                (Value::Missing, _) | (_, Value::Missing) => Value::Missing,
                (a, b) => Value::Boolean(operations::compare(op, a, &l.unit, b, &r.unit, strict)?),
            };
            Ok(Evaluation::combine(value, Unit::default(), &[&l, &r]))
        }
        BinaryOperator::And => match l.value {
            Value::Boolean(false) | Value::NotApplicable => {
                Ok(l.with_value(Value::Boolean(false), Unit::default()))
            }
            Value::Boolean(true) => {
                let r = evaluate_expression(right, ctx)?;
                let value = truthiness(&r.value)?;
                Ok(Evaluation::combine(value, Unit::default(), &[&l, &r]))
            }
            Value::Missing => {
                let r = evaluate_expression(right, ctx)?;
                let value = match truthiness(&r.value)? {
                    Value::Boolean(false) => Value::Boolean(false),
                    _ => Value::Missing,
                };
                Ok(Evaluation::combine(value, Unit::default(), &[&l, &r]))
            }
            ref other => Err(PublicodesError::type_error(format!(
                "'et' expects booleans, got {}",
                other.type_name()
            ))),
        },
        BinaryOperator::Or => match l.value {
            Value::Boolean(true) => Ok(l),
            Value::Boolean(false) | Value::NotApplicable => {
                let r = evaluate_expression(right, ctx)?;
                let value = truthiness(&r.value)?;
                Ok(Evaluation::combine(value, Unit::default(), &[&l, &r]))
            }
            Value::Missing => {
                let r = evaluate_expression(right, ctx)?;
                let value = match truthiness(&r.value)? {
                    Value::Boolean(true) => Value::Boolean(true),
                    _ => Value::Missing,
                };
                Ok(Evaluation::combine(value, Unit::default(), &[&l, &r]))
            }
            ref other => Err(PublicodesError::type_error(format!(
                "'ou' expects booleans, got {}",
                other.type_name()
            ))),
        },
    }
}

/// Boolean operand of `et`/`ou`: not applicable counts as `non`
fn truthiness(value: &Value) -> Result<Value, PublicodesError> {
    match value {
        Value::Boolean(b) => Ok(Value::Boolean(*b)),
        Value::NotApplicable => Ok(Value::Boolean(false)),
        Value::Missing => Ok(Value::Missing),
        other => Err(PublicodesError::type_error(format!(
            "expected a boolean, got {}",
            other.type_name()
        ))),
    }
}

/// `+` and `-`: not applicable counts as 0
fn additive(
    op: BinaryOperator,
    l: Evaluation,
    r: Evaluation,
    strict: bool,
) -> Result<Evaluation, PublicodesError> {
    if l.value.is_missing() || r.value.is_missing() {
        return Ok(Evaluation::combine(Value::Missing, Unit::default(), &[&l, &r]));
    }
    let as_number = |evaluation: &Evaluation| match &evaluation.value {
        Value::Number(n) => Some((*n, evaluation.unit.clone())),
        Value::NotApplicable => Some((Decimal::ZERO, Unit::default())),
        _ => None,
    };
    let ((a, a_unit), (b, b_unit)) = match (as_number(&l), as_number(&r)) {
        (Some(a), Some(b)) => (a, b),
        _ => return Err(type_mismatch(op, &l.value, &r.value)),
    };
    let (value, unit) = operations::arithmetic(op, a, &a_unit, b, &b_unit, strict)?;
    Ok(Evaluation::combine(Value::Number(value), unit, &[&l, &r]))
}

/// `*` once both sides are known: 0 wins, then not applicable, then missing
fn multiply(l: Evaluation, r: Evaluation, strict: bool) -> Result<Evaluation, PublicodesError> {
    let op = BinaryOperator::Multiply;
    if l.value.is_zero() || r.value.is_zero() {
        let unit = units::infer_unit(op, &l.unit, &r.unit);
        return Ok(Evaluation::combine(Value::Number(Decimal::ZERO), unit, &[&l, &r]));
    }
    match (&l.value, &r.value) {
        (Value::NotApplicable, _) | (_, Value::NotApplicable) => Ok(Evaluation::combine(
            Value::NotApplicable,
            Unit::default(),
            &[&l, &r],
        )),
        (Value::Missing, _) | (_, Value::Missing) => {
            Ok(Evaluation::combine(Value::Missing, Unit::default(), &[&l, &r]))
        }
        (Value::Number(a), Value::Number(b)) => {
            let (value, unit) = operations::arithmetic(op, *a, &l.unit, *b, &r.unit, strict)?;
            Ok(Evaluation::combine(Value::Number(value), unit, &[&l, &r]))
        }
        (a, b) => Err(type_mismatch(op, a, b)),
    }
}

/// `/` and `//`: dividing a number (or an unknown) by 0 is an error, dividing
/// `non applicable` by anything is not applicable
fn divide(
    op: BinaryOperator,
    l: Evaluation,
    r: Evaluation,
    strict: bool,
) -> Result<Evaluation, PublicodesError> {
    if r.value.is_zero() {
        if l.value.is_not_applicable() {
            return Ok(Evaluation::combine(Value::NotApplicable, Unit::default(), &[&l, &r]));
        }
        if matches!(l.value, Value::Number(_) | Value::Missing) {
            return Err(PublicodesError::DivisionByZero { rule: None });
        }
    }
    match (&l.value, &r.value) {
        (Value::NotApplicable, _) | (_, Value::NotApplicable) => Ok(Evaluation::combine(
            Value::NotApplicable,
            Unit::default(),
            &[&l, &r],
        )),
        (Value::Missing, _) | (_, Value::Missing) => {
            Ok(Evaluation::combine(Value::Missing, Unit::default(), &[&l, &r]))
        }
        (Value::Number(a), Value::Number(b)) => {
            let (value, unit) = operations::arithmetic(op, *a, &l.unit, *b, &r.unit, strict)?;
            Ok(Evaluation::combine(Value::Number(value), unit, &[&l, &r]))
        }
        (a, b) => Err(type_mismatch(op, a, b)),
    }
}

fn negate(operand: Evaluation) -> Result<Evaluation, PublicodesError> {
    let value = match operand.value {
        Value::Missing => return Ok(operand),
        Value::NotApplicable => {
            return Ok(operand.with_value(Value::Number(Decimal::ZERO), Unit::default()))
        }
        Value::Number(n) => Value::Number(-n),
        ref other => {
            return Err(PublicodesError::type_error(format!(
                "cannot negate {}",
                other.type_name()
            )))
        }
    };
    let unit = operand.unit.clone();
    Ok(operand.with_value(value, unit))
}

/// Attach `unit` to a unitless number, or convert a number to it
fn convert_evaluation(
    mut evaluation: Evaluation,
    unit: &Unit,
    strict: bool,
) -> Result<Evaluation, PublicodesError> {
    let Value::Number(number) = evaluation.value else {
        if evaluation.value.is_defined() {
            warn!(%unit, value = %evaluation.value, "unit declared on a non-numeric value");
        }
        return Ok(evaluation);
    };
    if evaluation.unit.is_empty() || evaluation.unit.is_equivalent(unit) {
        evaluation.unit = unit.clone();
        return Ok(evaluation);
    }
    match units::convert_unit(&evaluation.unit, unit, number) {
        Ok(converted) => {
            evaluation.value = Value::Number(converted);
            evaluation.unit = unit.clone();
            Ok(evaluation)
        }
        Err(error) if strict => Err(error),
        Err(error) => {
            warn!(%error, "keeping the computed unit");
            Ok(evaluation)
        }
    }
}

/// Number of an evaluated operand of a mechanism expecting numbers
fn expect_number(evaluation: &Evaluation, mechanism: &str) -> Result<Decimal, PublicodesError> {
    evaluation.value.as_number().ok_or_else(|| {
        PublicodesError::type_error(format!(
            "'{}' expects a number, got {}",
            mechanism,
            evaluation.value.type_name()
        ))
    })
}

/// `barème` sums `taux × portion` over the brackets crossed by the base;
/// `grille` returns the `montant` of the bracket containing it
fn evaluate_scale(
    scale: &Scale,
    marginal: bool,
    ctx: &mut EvaluationContext,
) -> Result<Evaluation, PublicodesError> {
    let mechanism = if marginal { "barème" } else { "grille" };
    let strict = ctx.strict_units;

    let base = evaluate_expression(&scale.base, ctx)?;
    if !base.value.is_defined() {
        let value = base.value.clone();
        return Ok(base.with_value(value, Unit::default()));
    }
    let amount = expect_number(&base, mechanism)?;

    let multiplier = evaluate_expression(&scale.multiplier, ctx)?;
    let mut result = Evaluation::combine(Value::Missing, Unit::default(), &[&base, &multiplier]);
    let factor = match &multiplier.value {
        Value::Missing => return Ok(result),
        Value::NotApplicable => Decimal::ONE,
        _ => expect_number(&multiplier, mechanism)?,
    };

    let mut total = Decimal::ZERO;
    let mut total_unit: Option<Unit> = None;
    let mut lower = Decimal::ZERO;
    for tranche in &scale.tranches {
        let upper = match &tranche.ceiling {
            None => None,
            Some(ceiling) => {
                let ceiling = evaluate_expression(ceiling, ctx)?;
                result.absorb(&ceiling);
                if ceiling.value.is_missing() {
                    return Ok(result);
                }
                let (value, unit) = operations::arithmetic(
                    BinaryOperator::Multiply,
                    expect_number(&ceiling, mechanism)?,
                    &ceiling.unit,
                    factor,
                    &multiplier.unit,
                    strict,
                )?;
                Some(operations::align_units(&base.unit, value, &unit, strict)?.0)
            }
        };

        if marginal {
            if amount <= lower {
                break;
            }
            let rate = evaluate_expression(&tranche.amount, ctx)?;
            result.absorb(&rate);
            if rate.value.is_missing() {
                return Ok(result);
            }
            let slice_top = upper.map_or(amount, |upper| amount.min(upper));
            let portion = slice_top.checked_sub(lower).ok_or_else(operations::overflow)?;
            if !rate.value.is_not_applicable() {
                let (rate_value, rate_unit) = as_ratio(expect_number(&rate, mechanism)?, &rate.unit);
                let (value, unit) = operations::arithmetic(
                    BinaryOperator::Multiply,
                    portion,
                    &base.unit,
                    rate_value,
                    &rate_unit,
                    strict,
                )?;
                total = total.checked_add(value).ok_or_else(operations::overflow)?;
                total_unit = Some(unit);
            }
        } else if upper.map_or(true, |upper| amount < upper) {
            let mut montant = evaluate_expression(&tranche.amount, ctx)?;
            montant.absorb(&result);
            return Ok(montant);
        }

        match upper {
            Some(upper) => lower = upper,
            None => break,
        }
    }

    if marginal {
        let unit = total_unit.unwrap_or_else(|| base.unit.clone());
        Ok(result.with_value(Value::Number(total.normalize()), unit))
    } else {
        Ok(result.with_value(Value::NotApplicable, Unit::default()))
    }
}

/// A bracket rate in percent applies as a plain ratio
fn as_ratio(rate: Decimal, unit: &Unit) -> (Decimal, Unit) {
    if unit.is_percent() {
        (rate / Decimal::ONE_HUNDRED, Unit::default())
    } else {
        (rate, unit.clone())
    }
}

fn evaluate_clamp(
    bound: BoundKind,
    value: &Expression,
    limit: &Expression,
    ctx: &mut EvaluationContext,
) -> Result<Evaluation, PublicodesError> {
    let mechanism = match bound {
        BoundKind::Lower => "plancher",
        BoundKind::Upper => "plafond",
    };
    let value = evaluate_expression(value, ctx)?;
    if !value.value.is_defined() {
        return Ok(value);
    }
    let limit = evaluate_expression(limit, ctx)?;
    let mut result = Evaluation::combine(value.value.clone(), value.unit.clone(), &[&value, &limit]);
    match &limit.value {
        Value::Missing => return Ok(result.with_value(Value::Missing, Unit::default())),
        Value::NotApplicable => return Ok(result),
        _ => {}
    }

    let number = expect_number(&value, mechanism)?;
    let (bound_value, unit) = operations::align_units(
        &value.unit,
        expect_number(&limit, mechanism)?,
        &limit.unit,
        ctx.strict_units,
    )?;
    let clamped = match bound {
        BoundKind::Lower => number.max(bound_value),
        BoundKind::Upper => number.min(bound_value),
    };
    result.value = Value::Number(clamped);
    result.unit = unit;
    Ok(result)
}

/// `abattement`: subtract an amount (never below 0) or a percentage
fn evaluate_abatement(
    value: &Expression,
    abatement: &Expression,
    ctx: &mut EvaluationContext,
) -> Result<Evaluation, PublicodesError> {
    let value = evaluate_expression(value, ctx)?;
    if !value.value.is_defined() {
        return Ok(value);
    }
    let abatement = evaluate_expression(abatement, ctx)?;
    let result = Evaluation::combine(value.value.clone(), value.unit.clone(), &[&value, &abatement]);
    match &abatement.value {
        Value::Missing => return Ok(result.with_value(Value::Missing, Unit::default())),
        Value::NotApplicable => return Ok(result),
        _ => {}
    }

    let number = expect_number(&value, "abattement")?;
    let reduction = expect_number(&abatement, "abattement")?;
    if abatement.unit.is_percent() {
        let remaining = Decimal::ONE
            .checked_sub(reduction / Decimal::ONE_HUNDRED)
            .ok_or_else(operations::overflow)?;
        let unit = value.unit.clone();
        let reduced = number
            .checked_mul(remaining.max(Decimal::ZERO))
            .ok_or_else(operations::overflow)?
            .normalize();
        return Ok(result.with_value(Value::Number(reduced), unit));
    }
    let (reduction, unit) =
        operations::align_units(&value.unit, reduction, &abatement.unit, ctx.strict_units)?;
    let reduced = number
        .checked_sub(reduction)
        .ok_or_else(operations::overflow)?
        .max(Decimal::ZERO);
    Ok(result.with_value(Value::Number(reduced), unit))
}

/// `le maximum de` / `le minimum de`: not applicable items are ignored
fn evaluate_extremum(
    kind: ExtremumKind,
    items: &[Expression],
    ctx: &mut EvaluationContext,
) -> Result<Evaluation, PublicodesError> {
    let mechanism = match kind {
        ExtremumKind::Max => "le maximum de",
        ExtremumKind::Min => "le minimum de",
    };
    let mut evaluations = Vec::with_capacity(items.len());
    for item in items {
        evaluations.push(evaluate_expression(item, ctx)?);
    }
    let operands: Vec<&Evaluation> = evaluations.iter().collect();
    let mut result = Evaluation::combine(Value::NotApplicable, Unit::default(), &operands);
    if evaluations.iter().any(|e| e.value.is_missing()) {
        return Ok(result.with_value(Value::Missing, Unit::default()));
    }

    let mut best: Option<(Decimal, Unit)> = None;
    for evaluation in evaluations.iter().filter(|e| e.value.is_defined()) {
        let number = expect_number(evaluation, mechanism)?;
        best = Some(match best {
            None => (number, evaluation.unit.clone()),
            Some((current, unit)) => {
                let (number, unit) =
                    operations::align_units(&unit, number, &evaluation.unit, ctx.strict_units)?;
                let keep_current = match kind {
                    ExtremumKind::Max => current >= number,
                    ExtremumKind::Min => current <= number,
                };
                (if keep_current { current } else { number }, unit)
            }
        });
    }
    if let Some((number, unit)) = best {
        result.value = Value::Number(number);
        result.unit = unit;
    }
    Ok(result)
}

/// `contexte`: evaluate `value` as if the overridden rules had other values.
/// Replacement values are evaluated in the enclosing frame.
fn evaluate_context(
    overrides: &[(Reference, Expression)],
    value: &Expression,
    ctx: &mut EvaluationContext,
) -> Result<Evaluation, PublicodesError> {
    let mut bookkeeping = Evaluation::default();
    let mut frame = HashMap::with_capacity(overrides.len());
    for (reference, replacement) in overrides {
        let mut evaluation = evaluate_expression(replacement, ctx)?;
        bookkeeping.absorb(&evaluation);
        let name = reference.target().clone();
        if let (Some(rule), Value::Number(_)) = (ctx.rules.get(&name), &evaluation.value) {
            if let Some(unit) = &rule.unit {
                evaluation = convert_evaluation(evaluation, unit, ctx.strict_units)?;
            }
        }
        frame.insert(name, evaluation);
    }

    ctx.push_frame(frame);
    let result = evaluate_expression(value, ctx);
    ctx.pop_frame();

    let mut result = result?;
    result.absorb(&bookkeeping);
    Ok(result)
}

/// `une de ces conditions`
fn evaluate_any(items: &[Expression], ctx: &mut EvaluationContext) -> Result<Evaluation, PublicodesError> {
    let mut result = Evaluation::unitless(Value::Boolean(false));
    for item in items {
        let evaluation = evaluate_expression(item, ctx)?;
        result.absorb(&evaluation);
        match truthiness(&evaluation.value)? {
            Value::Boolean(true) => {
                result.value = Value::Boolean(true);
                return Ok(result);
            }
            Value::Missing => result.value = Value::Missing,
            _ => {}
        }
    }
    Ok(result)
}

/// `toutes ces conditions`
fn evaluate_all(items: &[Expression], ctx: &mut EvaluationContext) -> Result<Evaluation, PublicodesError> {
    let mut result = Evaluation::unitless(Value::Boolean(true));
    for item in items {
        let evaluation = evaluate_expression(item, ctx)?;
        result.absorb(&evaluation);
        match truthiness(&evaluation.value)? {
            Value::Boolean(false) => {
                result.value = Value::Boolean(false);
                return Ok(result);
            }
            Value::Missing => result.value = Value::Missing,
            _ => {}
        }
    }
    Ok(result)
}

/// `est défini`, `est non défini`, `est applicable`, `est non applicable`
fn evaluate_predicate(kind: PredicateKind, operand: Evaluation) -> Evaluation {
    let missing = operand.value.is_missing();
    match kind {
        PredicateKind::IsDefined | PredicateKind::IsMissing => {
            let defined = !missing;
            let mut result = operand.with_value(
                Value::Boolean(if kind == PredicateKind::IsDefined { defined } else { !defined }),
                Unit::default(),
            );
            // the answer is known even though the operand is not
            result.missing.clear();
            result
        }
        PredicateKind::IsApplicable | PredicateKind::IsNotApplicable => {
            if missing {
                return operand.with_value(Value::Missing, Unit::default());
            }
            let applicable = !operand.value.is_not_applicable();
            operand.with_value(
                Value::Boolean(if kind == PredicateKind::IsApplicable {
                    applicable
                } else {
                    !applicable
                }),
                Unit::default(),
            )
        }
    }
}
