use super::formula::{format_expression, format_constant};
use crate::parser::format_unit;
use crate::parser::mechanisms::{CHAINABLE_KEYS, MAIN_KEYS};
use crate::semantic::{
    BoundKind, DottedName, Expression, ExpressionKind, ExtremumKind, GateKind, PredicateKind,
    RoundingMode, Rule, Scale, Value,
};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;
use tracing::debug;

/// Raw form of an expression: formula text, or a mechanism mapping.
/// Rule inputs (no formula) give `null`.
pub fn expression_to_raw(expression: &Expression) -> JsonValue {
    if let Some(formula) = format_expression(expression) {
        return JsonValue::String(formula);
    }

    let list = |key: &str, items: &[Expression]| -> JsonValue {
        single(key, JsonValue::Array(items.iter().map(expression_to_raw).collect()))
    };

    match &expression.kind {
        ExpressionKind::Sum(items) => list("somme", items),
        ExpressionKind::Product(items) => list("produit", items),
        ExpressionKind::OneOf(items) => list("une de ces conditions", items),
        ExpressionKind::AllOf(items) => list("toutes ces conditions", items),
        ExpressionKind::Extremum { kind, items } => match kind {
            ExtremumKind::Max => list("le maximum de", items),
            ExtremumKind::Min => list("le minimum de", items),
        },
        ExpressionKind::Condition { .. } => variations_to_raw(expression),
        ExpressionKind::Bareme(scale) => single("barème", scale_to_raw(scale, "taux")),
        ExpressionKind::Grille(scale) => single("grille", scale_to_raw(scale, "montant")),
        ExpressionKind::Duration { from, to, unit } => {
            let mut map = Map::new();
            map.insert("depuis".to_string(), expression_to_raw(from));
            map.insert("jusqu'à".to_string(), expression_to_raw(to));
            map.insert("unité".to_string(), JsonValue::String(format_unit(unit)));
            single("durée", JsonValue::Object(map))
        }
        ExpressionKind::Predicate { kind, operand } => {
            let key = match kind {
                PredicateKind::IsDefined => "est défini",
                PredicateKind::IsMissing => "est non défini",
                PredicateKind::IsApplicable => "est applicable",
                PredicateKind::IsNotApplicable => "est non applicable",
            };
            single(key, expression_to_raw(operand))
        }
        ExpressionKind::Gate {
            kind,
            condition,
            value,
        } => {
            let key = match kind {
                GateKind::ApplicableIf => "applicable si",
                GateKind::NotApplicableIf => "non applicable si",
            };
            chain(key, expression_to_raw(condition), value)
        }
        ExpressionKind::Round {
            mode,
            value,
            precision,
        } => {
            let key = match mode {
                RoundingMode::Nearest => "arrondi",
                RoundingMode::Up => "arrondi supérieur",
                RoundingMode::Down => "arrondi inférieur",
            };
            chain(key, expression_to_raw(precision), value)
        }
        ExpressionKind::UnitConversion { value, unit } => {
            chain("unité", JsonValue::String(format_unit(unit)), value)
        }
        ExpressionKind::Clamp {
            bound,
            value,
            limit,
        } => {
            let key = match bound {
                BoundKind::Lower => "plancher",
                BoundKind::Upper => "plafond",
            };
            chain(key, expression_to_raw(limit), value)
        }
        ExpressionKind::DefaultValue { value, default } => {
            chain("par défaut", expression_to_raw(default), value)
        }
        ExpressionKind::Abatement { value, abatement } => {
            chain("abattement", expression_to_raw(abatement), value)
        }
        ExpressionKind::Context { overrides, value } => {
            let overrides = overrides
                .iter()
                .map(|(reference, replacement)| {
                    (reference.target().to_string(), expression_to_raw(replacement))
                })
                .collect();
            chain("contexte", JsonValue::Object(overrides), value)
        }
        ExpressionKind::Replace { original, .. } => expression_to_raw(original),
        ExpressionKind::CircularResolution { value, .. } => expression_to_raw(value),
        ExpressionKind::Input(_) | ExpressionKind::Constant(Value::Missing, _) => JsonValue::Null,
        ExpressionKind::Constant(..)
        | ExpressionKind::Reference(_)
        | ExpressionKind::Binary { .. }
        | ExpressionKind::Unary { .. } => {
            debug!(?expression, "expression has no formula form");
            JsonValue::Null
        }
    }
}

fn single(key: &str, value: JsonValue) -> JsonValue {
    let mut map = Map::new();
    map.insert(key.to_string(), value);
    JsonValue::Object(map)
}

/// `{key: argument, ...inner}`, flattening the inner mapping when its chainable
/// keys apply inside `key` anyway
fn chain(key: &str, argument: JsonValue, inner: &Expression) -> JsonValue {
    let mut map = Map::new();
    map.insert(key.to_string(), argument);
    match expression_to_raw(inner) {
        JsonValue::Null => {}
        JsonValue::Object(inner) if can_flatten(key, &inner) => {
            map.extend(inner);
        }
        other => {
            map.insert("valeur".to_string(), other);
        }
    }
    JsonValue::Object(map)
}

fn can_flatten(key: &str, inner: &Map<String, JsonValue>) -> bool {
    let rank = |k: &str| CHAINABLE_KEYS.iter().position(|c| *c == k);
    let Some(outer) = rank(key) else {
        return false;
    };
    inner.keys().all(|k| match rank(k) {
        Some(inner_rank) => inner_rank > outer,
        None => MAIN_KEYS.contains(&k.as_str()),
    })
}

fn variations_to_raw(expression: &Expression) -> JsonValue {
    let mut branches = Vec::new();
    let mut current = expression;
    while let ExpressionKind::Condition {
        condition,
        consequence,
        alternative,
    } = &current.kind
    {
        let mut branch = Map::new();
        branch.insert("si".to_string(), expression_to_raw(condition));
        branch.insert("alors".to_string(), expression_to_raw(consequence));
        branches.push(JsonValue::Object(branch));
        current = alternative;
    }
    if !matches!(current.kind, ExpressionKind::Constant(Value::Missing, _)) {
        branches.push(single("sinon", expression_to_raw(current)));
    }
    single("variations", JsonValue::Array(branches))
}

fn scale_to_raw(scale: &Scale, amount_key: &str) -> JsonValue {
    let mut map = Map::new();
    map.insert("assiette".to_string(), expression_to_raw(&scale.base));
    let default_multiplier = format_constant(&Value::Number(1.into()), &Default::default());
    let multiplier = format_expression(&scale.multiplier);
    if multiplier != default_multiplier {
        map.insert(
            "multiplicateur".to_string(),
            expression_to_raw(&scale.multiplier),
        );
    }
    let tranches = scale
        .tranches
        .iter()
        .map(|tranche| {
            let mut raw = Map::new();
            raw.insert(amount_key.to_string(), expression_to_raw(&tranche.amount));
            if let Some(ceiling) = &tranche.ceiling {
                raw.insert("plafond".to_string(), expression_to_raw(ceiling));
            }
            JsonValue::Object(raw)
        })
        .collect();
    map.insert("tranches".to_string(), JsonValue::Array(tranches));
    JsonValue::Object(map)
}

/// Declaration of a compiled rule: its metadata as declared, its value as
/// currently compiled. `avec` children are emitted as separate rules.
pub fn rule_to_raw(rule: &Rule) -> JsonValue {
    let mut raw = match &rule.raw {
        JsonValue::Object(map) => map.clone(),
        _ => Map::new(),
    };
    raw.retain(|key, _| {
        key != "avec" && !CHAINABLE_KEYS.contains(&key.as_str()) && !MAIN_KEYS.contains(&key.as_str())
    });

    match expression_to_raw(&rule.body) {
        JsonValue::Null => {}
        JsonValue::Object(value) => raw.extend(value),
        formula => {
            if raw.is_empty() && rule.unit.is_none() {
                return formula;
            }
            raw.insert("valeur".to_string(), formula);
        }
    }
    // a folded rule keeps its declared unit
    if let Some(unit) = &rule.unit {
        if !raw.contains_key("unité") {
            raw.insert("unité".to_string(), JsonValue::String(format_unit(unit)));
        }
    }

    if raw.is_empty() {
        JsonValue::Null
    } else {
        JsonValue::Object(raw)
    }
}

/// Raw declarations of every explicit rule, in declaration order
pub fn rules_to_raw(rules: &BTreeMap<DottedName, Rule>) -> JsonValue {
    let mut ordered: Vec<&Rule> = rules.values().filter(|rule| !rule.implicit).collect();
    ordered.sort_by_key(|rule| rule.order);
    JsonValue::Object(
        ordered
            .into_iter()
            .map(|rule| (rule.name.to_string(), rule_to_raw(rule)))
            .collect(),
    )
}
