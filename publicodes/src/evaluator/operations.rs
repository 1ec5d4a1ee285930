//! Unit-aware arithmetic, comparison and rounding on defined values
//!
//! Missing and not-applicable operands never reach these functions: the
//! three-valued laws are applied by the expression evaluator first.

use super::units;
use crate::error::PublicodesError;
use crate::semantic::{BinaryOperator, RoundingMode, Unit, Value};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use tracing::warn;

/// Significant digits kept after rounding, to absorb binary noise from `**`
const SIGNIFICANT_DIGITS: u32 = 15;

pub(crate) fn overflow() -> PublicodesError {
    PublicodesError::type_error("arithmetic overflow")
}

/// Express `right` in `left_unit` so both operands can be combined.
///
/// A unitless operand adopts the unit of the other one. Returns the converted
/// right value and the unit of the result.
pub fn align_units(
    left_unit: &Unit,
    right: Decimal,
    right_unit: &Unit,
    strict: bool,
) -> Result<(Decimal, Unit), PublicodesError> {
    if right_unit.is_empty() {
        return Ok((right, left_unit.clone()));
    }
    if left_unit.is_empty() || left_unit.is_equivalent(right_unit) {
        return Ok((right, right_unit.clone()));
    }
    match units::convert_unit(right_unit, left_unit, right) {
        Ok(converted) => Ok((converted, left_unit.clone())),
        Err(error) if strict => Err(error),
        Err(error) => {
            warn!(%error, "combining values with incompatible units");
            Ok((right, left_unit.clone()))
        }
    }
}

/// Numeric binary operator with unit inference
pub fn arithmetic(
    op: BinaryOperator,
    left: Decimal,
    left_unit: &Unit,
    right: Decimal,
    right_unit: &Unit,
    strict: bool,
) -> Result<(Decimal, Unit), PublicodesError> {
    match op {
        BinaryOperator::Add | BinaryOperator::Subtract => {
            let (right, unit) = align_units(left_unit, right, right_unit, strict)?;
            let result = if op == BinaryOperator::Add {
                left.checked_add(right)
            } else {
                left.checked_sub(right)
            };
            Ok((result.ok_or_else(overflow)?, unit))
        }
        BinaryOperator::Multiply => {
            let value = left.checked_mul(right).ok_or_else(overflow)?;
            let unit = units::infer_unit(op, left_unit, right_unit);
            units::simplify_percent(unit, value).map(swap)
        }
        BinaryOperator::Divide | BinaryOperator::FloorDivide => {
            if right.is_zero() {
                return Err(PublicodesError::DivisionByZero { rule: None });
            }
            let mut value = left.checked_div(right).ok_or_else(overflow)?;
            if op == BinaryOperator::FloorDivide {
                value = value.floor();
            }
            let unit = units::infer_unit(op, left_unit, right_unit);
            units::simplify_percent(unit, value).map(swap)
        }
        BinaryOperator::Power => {
            let value = power(left, right)?;
            let unit = match integer_exponent(right) {
                Some(exponent) if exponent > 0 && !left_unit.is_empty() => {
                    let repeat = |symbols: &[String]| -> Vec<String> {
                        (0..exponent).flat_map(|_| symbols.iter().cloned()).collect()
                    };
                    Unit::new(repeat(&left_unit.numerators), repeat(&left_unit.denominators))
                }
                _ => left_unit.clone(),
            };
            Ok((value, unit))
        }
        other => Err(PublicodesError::type_error(format!(
            "'{}' is not an arithmetic operator",
            other
        ))),
    }
}

fn swap((unit, value): (Unit, Decimal)) -> (Decimal, Unit) {
    (value, unit)
}

fn integer_exponent(exponent: Decimal) -> Option<i64> {
    if exponent.fract().is_zero() {
        exponent.to_i64().filter(|e| e.abs() <= 64)
    } else {
        None
    }
}

/// Exact for small integer exponents, through `f64` otherwise
pub fn power(base: Decimal, exponent: Decimal) -> Result<Decimal, PublicodesError> {
    if let Some(exponent) = integer_exponent(exponent) {
        let mut result = Decimal::ONE;
        for _ in 0..exponent.unsigned_abs() {
            result = result.checked_mul(base).ok_or_else(overflow)?;
        }
        if exponent < 0 {
            if result.is_zero() {
                return Err(PublicodesError::DivisionByZero { rule: None });
            }
            result = Decimal::ONE.checked_div(result).ok_or_else(overflow)?;
        }
        return Ok(result.normalize());
    }

    let base = base.to_f64().ok_or_else(overflow)?;
    let exponent = exponent.to_f64().ok_or_else(overflow)?;
    let result = base.powf(exponent);
    if !result.is_finite() {
        return Err(PublicodesError::type_error(format!(
            "{} ** {} is not a real number",
            base, exponent
        )));
    }
    Decimal::from_f64(result)
        .and_then(|d| d.round_sf(SIGNIFICANT_DIGITS))
        .map(|d| d.normalize())
        .ok_or_else(overflow)
}

/// `=`, `!=`, `<`, `<=`, `>`, `>=` between two defined values
///
/// Equality between values of different kinds is false; ordering requires two
/// numbers or two dates.
pub fn compare(
    op: BinaryOperator,
    left: &Value,
    left_unit: &Unit,
    right: &Value,
    right_unit: &Unit,
    strict: bool,
) -> Result<bool, PublicodesError> {
    use std::cmp::Ordering;

    let ordering: Option<Ordering> = match (left, right) {
        (Value::Number(l), Value::Number(r)) => {
            let (r, _) = align_units(left_unit, *r, right_unit, strict)?;
            Some(l.cmp(&r))
        }
        (Value::Date(l), Value::Date(r)) => Some(l.cmp(r)),
        _ => None,
    };

    match (op, ordering) {
        (BinaryOperator::Equal, Some(ordering)) => Ok(ordering == Ordering::Equal),
        (BinaryOperator::NotEqual, Some(ordering)) => Ok(ordering != Ordering::Equal),
        (BinaryOperator::Equal, None) => Ok(structurally_equal(left, right)),
        (BinaryOperator::NotEqual, None) => Ok(!structurally_equal(left, right)),
        (BinaryOperator::LessThan, Some(ordering)) => Ok(ordering == Ordering::Less),
        (BinaryOperator::LessThanOrEqual, Some(ordering)) => Ok(ordering != Ordering::Greater),
        (BinaryOperator::GreaterThan, Some(ordering)) => Ok(ordering == Ordering::Greater),
        (BinaryOperator::GreaterThanOrEqual, Some(ordering)) => Ok(ordering != Ordering::Less),
        (op, _) => Err(PublicodesError::type_error(format!(
            "cannot compare {} and {} with '{}'",
            left.type_name(),
            right.type_name(),
            op
        ))),
    }
}

/// A possibility equals the text naming it
fn structurally_equal(left: &Value, right: &Value) -> bool {
    match (left.as_text(), right.as_text()) {
        (Some(l), Some(r)) => l == r,
        _ => left == right,
    }
}

/// Whether two successive values of a fixed-point iteration agree once
/// rounded to the significant digits kept by arithmetic
pub fn converged(previous: Decimal, next: Decimal) -> bool {
    let rounded = |value: Decimal| value.round_sf(SIGNIFICANT_DIGITS).unwrap_or(value);
    rounded(previous) == rounded(next)
}

/// Round `value` to a multiple of `precision`
pub fn round(
    mode: RoundingMode,
    value: Decimal,
    precision: Decimal,
) -> Result<Decimal, PublicodesError> {
    if precision <= Decimal::ZERO {
        return Err(PublicodesError::Rounding {
            rule: None,
            precision: precision.normalize().to_string(),
        });
    }
    let quotient = value.checked_div(precision).ok_or_else(overflow)?;
    let rounded = match mode {
        RoundingMode::Nearest => {
            quotient.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        }
        RoundingMode::Up => quotient.ceil(),
        RoundingMode::Down => quotient.floor(),
    };
    let result = rounded.checked_mul(precision).ok_or_else(overflow)?;
    Ok(result
        .round_sf(SIGNIFICANT_DIGITS)
        .unwrap_or(result)
        .normalize())
}

/// Rounding with the three-valued laws: a missing value or precision gives a
/// missing result, a not-applicable value stays not applicable and a
/// not-applicable precision leaves the value unchanged.
pub fn round_value(
    mode: RoundingMode,
    value: &Value,
    precision: &Value,
) -> Result<Value, PublicodesError> {
    match (value, precision) {
        (Value::Missing, _) | (_, Value::Missing) => Ok(Value::Missing),
        (Value::NotApplicable, _) => Ok(Value::NotApplicable),
        (value, Value::NotApplicable) => Ok(value.clone()),
        (Value::Number(v), Value::Number(p)) => Ok(Value::Number(round(mode, *v, *p)?)),
        (value, precision) => Err(PublicodesError::type_error(format!(
            "cannot round {} with a {} precision",
            value.type_name(),
            precision.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn d(text: &str) -> Decimal {
        Decimal::from_str(text).unwrap()
    }

    #[test]
    fn rounds_to_a_multiple_of_the_precision() {
        assert_eq!(round(RoundingMode::Up, d("38.4167"), d("10")).unwrap(), d("40"));
        assert_eq!(round(RoundingMode::Down, d("38.4167"), d("10")).unwrap(), d("30"));
        assert_eq!(round(RoundingMode::Nearest, d("2.345"), d("0.01")).unwrap(), d("2.35"));
    }

    #[test]
    fn rejects_non_positive_precision() {
        assert!(matches!(
            round(RoundingMode::Nearest, d("1"), Decimal::ZERO),
            Err(PublicodesError::Rounding { .. })
        ));
    }

    #[test]
    fn rounding_laws() {
        let one = Value::Number(Decimal::ONE);
        assert_eq!(
            round_value(RoundingMode::Nearest, &Value::Missing, &one).unwrap(),
            Value::Missing
        );
        assert_eq!(
            round_value(RoundingMode::Nearest, &Value::NotApplicable, &one).unwrap(),
            Value::NotApplicable
        );
        assert_eq!(
            round_value(RoundingMode::Nearest, &one, &Value::NotApplicable).unwrap(),
            one
        );
    }

    #[test]
    fn power_is_exact_for_integers() {
        assert_eq!(power(d("1.1"), d("2")).unwrap(), d("1.21"));
        assert_eq!(power(d("2"), d("-1")).unwrap(), d("0.5"));
        assert_eq!(power(d("4"), d("0.5")).unwrap(), d("2"));
    }

    #[test]
    fn addition_converts_to_the_left_unit() {
        let (value, unit) = arithmetic(
            BinaryOperator::Add,
            d("1"),
            &Unit::symbol("k€"),
            d("500"),
            &Unit::symbol("€"),
            true,
        )
        .unwrap();
        assert_eq!(value, d("1.5"));
        assert_eq!(unit, Unit::symbol("k€"));
    }

    #[test]
    fn possibilities_equal_their_text() {
        assert!(compare(
            BinaryOperator::Equal,
            &Value::Enum("CDI".into()),
            &Unit::default(),
            &Value::Text("CDI".into()),
            &Unit::default(),
            true
        )
        .unwrap());
    }
}
