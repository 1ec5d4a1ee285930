//! User-supplied inputs
//!
//! A situation maps rule names to answers. Answers are compiled and resolved
//! when the situation is set, so a bad answer is reported immediately and
//! leaves the previous situation in place.

use crate::error::PublicodesError;
use crate::parser::literals::{number_from_json, unquote};
use crate::parser::mechanisms::MechanismCompiler;
use crate::parser::parse_formula;
use crate::resolver::{ReferenceResolver, ReplacementTable};
use crate::resource_limits::ResourceLimits;
use crate::semantic::{DottedName, Expression, ExpressionKind, Rule, Unit, Value};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use tracing::warn;

/// An answer for one rule
#[derive(Debug, Clone, PartialEq)]
pub enum SituationValue {
    Literal(Value),
    /// A formula, parsed in the namespace of the answered rule
    Formula(String),
    /// A mechanism object, e.g. `{valeur: 3, unité: mois}`
    Mechanism(JsonValue),
    /// Remove a previous answer when merging
    Unset,
}

impl From<JsonValue> for SituationValue {
    fn from(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => SituationValue::Unset,
            JsonValue::Bool(b) => SituationValue::Literal(Value::Boolean(b)),
            JsonValue::Number(n) => match number_from_json(&n) {
                Some(number) => SituationValue::Literal(Value::Number(number)),
                None => SituationValue::Formula(n.to_string()),
            },
            JsonValue::String(formula) => SituationValue::Formula(formula),
            other => SituationValue::Mechanism(other),
        }
    }
}

impl From<&str> for SituationValue {
    fn from(formula: &str) -> Self {
        SituationValue::Formula(formula.to_string())
    }
}

impl From<String> for SituationValue {
    fn from(formula: String) -> Self {
        SituationValue::Formula(formula)
    }
}

impl From<Decimal> for SituationValue {
    fn from(number: Decimal) -> Self {
        SituationValue::Literal(Value::Number(number))
    }
}

impl From<i64> for SituationValue {
    fn from(number: i64) -> Self {
        SituationValue::Literal(Value::Number(Decimal::from(number)))
    }
}

impl From<bool> for SituationValue {
    fn from(b: bool) -> Self {
        SituationValue::Literal(Value::Boolean(b))
    }
}

impl From<Value> for SituationValue {
    fn from(value: Value) -> Self {
        SituationValue::Literal(value)
    }
}

/// Compile the answers of a situation against a resolved model
///
/// `situation [i]` names the i-th answer in syntax errors. Every invalid
/// answer is reported. References in answers follow `remplace` directives
/// like references in rules.
pub fn compile_situation<I, K, V>(
    entries: I,
    rules: &BTreeMap<DottedName, Rule>,
    replacements: &ReplacementTable,
    limits: &ResourceLimits,
) -> Result<BTreeMap<DottedName, Option<Expression>>, PublicodesError>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: Into<SituationValue>,
{
    let mut resolver = ReferenceResolver::new(rules);
    let mut compiled = BTreeMap::new();
    let mut errors = Vec::new();

    for (index, (key, value)) in entries.into_iter().enumerate() {
        let name = DottedName::parse(key.as_ref());
        let Some(rule) = rules.get(&name) else {
            errors.push(PublicodesError::Situation {
                rule: name.to_string(),
                message: "no rule has this name".to_string(),
            });
            continue;
        };
        let pseudo_rule = DottedName::new(vec![format!("situation [{}]", index)]);
        match compile_answer(rule, value.into(), &pseudo_rule, &mut resolver, limits) {
            Ok(mut answer) => {
                if let Some(expression) = answer.as_mut() {
                    replacements.rewrite(&name, expression);
                }
                if answer.is_some() && !rule.is_input() {
                    warn!(rule = %name, "situation overrides a computed rule");
                }
                compiled.insert(name, answer);
            }
            Err(error) => errors.push(error),
        }
    }

    if errors.is_empty() {
        Ok(compiled)
    } else {
        Err(PublicodesError::from_errors(errors))
    }
}

fn compile_answer(
    rule: &Rule,
    value: SituationValue,
    pseudo_rule: &DottedName,
    resolver: &mut ReferenceResolver,
    limits: &ResourceLimits,
) -> Result<Option<Expression>, PublicodesError> {
    let mut expression = match value {
        SituationValue::Unset | SituationValue::Literal(Value::Missing) => return Ok(None),
        SituationValue::Literal(value) => Expression::constant(value, Unit::default()),
        SituationValue::Formula(formula) => {
            if let Some(possibility) = matching_possibility(rule, &formula) {
                return Ok(Some(Expression::constant(
                    Value::Enum(possibility),
                    Unit::default(),
                )));
            }
            parse_formula(&formula, pseudo_rule, limits)?
        }
        SituationValue::Mechanism(raw) => {
            MechanismCompiler::new(pseudo_rule, limits).compile_value("situation", &raw)?
        }
    };

    let mut errors = Vec::new();
    resolver.resolve_expression(&rule.name, &mut expression, &mut errors);
    if !errors.is_empty() {
        return Err(PublicodesError::from_errors(errors));
    }

    check_possibilities(rule, &mut expression)?;
    Ok(Some(expression))
}

fn matching_possibility(rule: &Rule, formula: &str) -> Option<String> {
    let possibilities = rule.possibilities.as_ref()?;
    let text = unquote(formula);
    possibilities.iter().find(|p| p.as_str() == text).cloned()
}

/// A text answer to a rule with `possibilités` must be one of them
fn check_possibilities(rule: &Rule, expression: &mut Expression) -> Result<(), PublicodesError> {
    let Some(possibilities) = &rule.possibilities else {
        return Ok(());
    };
    if let ExpressionKind::Constant(value, _) = &mut expression.kind {
        if let Value::Text(text) | Value::Enum(text) = value {
            let text = text.clone();
            if !possibilities.contains(&text) {
                return Err(PublicodesError::Situation {
                    rule: rule.name.to_string(),
                    message: format!(
                        "'{}' is not one of the possibilities ({})",
                        text,
                        possibilities.join(", ")
                    ),
                });
            }
            *value = Value::Enum(text);
        }
    }
    Ok(())
}
