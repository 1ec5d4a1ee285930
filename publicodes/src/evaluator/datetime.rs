//! Date arithmetic for the `durée` mechanism

use super::{units, Evaluation};
use crate::error::PublicodesError;
use crate::parser::literals::parse_date;
use crate::semantic::{Unit, Value};
use chrono::NaiveDate;
use rust_decimal::Decimal;

/// Number of days between two dates, expressed in `unit`
///
/// A bound that is not applicable makes the duration not applicable; a
/// missing bound makes it missing.
pub fn evaluate_duration(
    from: &Evaluation,
    to: &Evaluation,
    unit: &Unit,
) -> Result<Evaluation, PublicodesError> {
    let operands = [from, to];
    if operands.iter().any(|e| e.value.is_not_applicable()) {
        return Ok(Evaluation::combine(Value::NotApplicable, Unit::default(), &operands));
    }
    if operands.iter().any(|e| e.value.is_missing()) {
        return Ok(Evaluation::combine(Value::Missing, Unit::default(), &operands));
    }

    let days = days_between(as_date(&from.value)?, as_date(&to.value)?);
    let value = units::convert_unit(&Unit::symbol("jour"), unit, Decimal::from(days))?;
    Ok(Evaluation::combine(
        Value::Number(value.normalize()),
        unit.clone(),
        &operands,
    ))
}

pub fn days_between(from: NaiveDate, to: NaiveDate) -> i64 {
    to.signed_duration_since(from).num_days()
}

fn as_date(value: &Value) -> Result<NaiveDate, PublicodesError> {
    match value {
        Value::Date(date) => Ok(*date),
        Value::Text(text) => parse_date(text).ok_or_else(|| {
            PublicodesError::type_error(format!("'durée' expects a date, got '{}'", text))
        }),
        other => Err(PublicodesError::type_error(format!(
            "'durée' expects a date, got {}",
            other.type_name()
        ))),
    }
}
