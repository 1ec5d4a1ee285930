use crate::ast::Span;
use crate::error::PublicodesError;
use crate::parser::Rule;
use crate::semantic::{DottedName, Value};
use chrono::NaiveDate;
use pest::iterators::Pair;
use rust_decimal::Decimal;
use std::str::FromStr;

fn literal_error(pair: &Pair<Rule>, message: String) -> PublicodesError {
    PublicodesError::syntax(
        &DottedName::root(),
        "",
        message,
        Span::from_pest_span(pair.as_span()),
    )
}

pub(crate) fn parse_number_literal(pair: &Pair<Rule>) -> Result<Decimal, PublicodesError> {
    parse_number(pair.as_str())
        .ok_or_else(|| literal_error(pair, format!("Invalid number: '{}'", pair.as_str())))
}

/// Decimal from its textual form, accepting scientific notation
pub fn parse_number(text: &str) -> Option<Decimal> {
    let text = text.trim();
    Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .ok()
        .map(|d| d.normalize())
}

/// `jj/mm/aaaa`, or `mm/aaaa` for the first day of the month
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let parts: Vec<&str> = text.trim().split('/').collect();
    let (day, month, year) = match parts.as_slice() {
        [day, month, year] => (day.parse().ok()?, month.parse().ok()?, year.parse().ok()?),
        [month, year] => (1, month.parse().ok()?, year.parse().ok()?),
        _ => return None,
    };
    NaiveDate::from_ymd_opt(year, month, day)
}

pub(crate) fn parse_date_literal(pair: &Pair<Rule>) -> Result<Value, PublicodesError> {
    parse_date(pair.as_str())
        .map(Value::Date)
        .ok_or_else(|| literal_error(pair, format!("Invalid date: '{}'", pair.as_str())))
}

pub(crate) fn parse_boolean_literal(pair: &Pair<Rule>) -> Result<Value, PublicodesError> {
    match pair.as_str() {
        "oui" => Ok(Value::Boolean(true)),
        "non" => Ok(Value::Boolean(false)),
        other => Err(literal_error(pair, format!("Invalid boolean: '{}'", other))),
    }
}

pub(crate) fn parse_string_literal(pair: Pair<Rule>) -> Value {
    let content = pair
        .into_inner()
        .find(|inner| matches!(inner.as_rule(), Rule::single_quoted | Rule::double_quoted))
        .map(|inner| inner.as_str().to_string())
        .unwrap_or_default();
    Value::Text(content)
}

/// Number carried by a YAML/JSON scalar
pub fn number_from_json(number: &serde_json::Number) -> Option<Decimal> {
    parse_number(&number.to_string())
}

/// Strip the quotes of `'CDI'` or `"CDI"`
pub fn unquote(text: &str) -> &str {
    let text = text.trim();
    for quote in ['\'', '"'] {
        if text.len() >= 2 && text.starts_with(quote) && text.ends_with(quote) {
            return &text[1..text.len() - 1];
        }
    }
    text
}
