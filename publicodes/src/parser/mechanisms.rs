//! Lowering of mechanism objects (`somme`, `barème`, `variations`, …)
//!
//! A mechanism object has at most one main key giving its value and any number
//! of chainable keys wrapping that value. Chainable keys apply in a fixed
//! order, outermost first, whatever their order in the declaration.

use crate::error::PublicodesError;
use crate::parser::{literals, parse_formula, units};
use crate::resource_limits::ResourceLimits;
use crate::semantic::{
    BoundKind, DottedName, Expression, ExpressionKind, ExtremumKind, GateKind, PredicateKind,
    Reference, RoundingMode, Scale, Tranche, Unit, Value,
};
use rust_decimal::Decimal;
use serde_json::{Map, Value as JsonValue};

/// Chainable keys, outermost first
pub const CHAINABLE_KEYS: &[&str] = &[
    "applicable si",
    "non applicable si",
    "arrondi",
    "arrondi supérieur",
    "arrondi inférieur",
    "unité",
    "plancher",
    "plafond",
    "par défaut",
    "abattement",
    "contexte",
];

/// Keys giving the value of a mechanism object; at most one per object
pub const MAIN_KEYS: &[&str] = &[
    "valeur",
    "somme",
    "produit",
    "variations",
    "barème",
    "grille",
    "une de ces conditions",
    "toutes ces conditions",
    "le maximum de",
    "le minimum de",
    "durée",
    "est défini",
    "est non défini",
    "est applicable",
    "est non applicable",
];

/// Compiles the values found in the declaration of one rule
pub struct MechanismCompiler<'a> {
    pub rule: &'a DottedName,
    pub limits: &'a ResourceLimits,
}

impl<'a> MechanismCompiler<'a> {
    pub fn new(rule: &'a DottedName, limits: &'a ResourceLimits) -> Self {
        Self { rule, limits }
    }

    fn error(&self, key: &str, message: impl Into<String>) -> PublicodesError {
        PublicodesError::rule_definition(self.rule, key, message)
    }

    /// Compile any value position: a scalar, a formula or a mechanism object
    pub fn compile_value(&self, key: &str, value: &JsonValue) -> Result<Expression, PublicodesError> {
        match value {
            JsonValue::Null => Err(self.error(key, "expected a value")),
            JsonValue::Bool(b) => Ok(Expression::boolean(*b)),
            JsonValue::Number(n) => literals::number_from_json(n)
                .map(Expression::number)
                .ok_or_else(|| self.error(key, format!("invalid number {}", n))),
            JsonValue::String(formula) => parse_formula(formula, self.rule, self.limits),
            JsonValue::Object(map) => self.compile_object(map, None),
            JsonValue::Array(_) => Err(self.error(key, "expected a value, found a list")),
        }
    }

    /// Compile a mechanism object. `fallback` is the value used when no main
    /// key is present (a rule without formula is an input).
    pub fn compile_object(
        &self,
        map: &Map<String, JsonValue>,
        fallback: Option<Expression>,
    ) -> Result<Expression, PublicodesError> {
        for key in map.keys() {
            if !CHAINABLE_KEYS.contains(&key.as_str()) && !MAIN_KEYS.contains(&key.as_str()) {
                return Err(self.error(key, "unknown mechanism"));
            }
        }

        let main_keys: Vec<&str> = MAIN_KEYS
            .iter()
            .copied()
            .filter(|key| map.contains_key(*key))
            .collect();
        if main_keys.len() > 1 {
            return Err(self.error(
                main_keys[1],
                format!("cannot be combined with '{}'", main_keys[0]),
            ));
        }

        let mut expression = match main_keys.first() {
            Some(key) => self.compile_main(key, &map[*key])?,
            None => fallback.ok_or_else(|| self.error("valeur", "missing value"))?,
        };

        for key in CHAINABLE_KEYS.iter().rev() {
            if let Some(argument) = map.get(*key) {
                expression = self.wrap_chainable(key, argument, expression)?;
            }
        }
        Ok(expression)
    }

    fn compile_main(&self, key: &str, value: &JsonValue) -> Result<Expression, PublicodesError> {
        let kind = match key {
            "valeur" => return self.compile_value(key, value),
            "somme" => ExpressionKind::Sum(self.compile_list(key, value)?),
            "produit" => ExpressionKind::Product(self.compile_list(key, value)?),
            "une de ces conditions" => ExpressionKind::OneOf(self.compile_list(key, value)?),
            "toutes ces conditions" => ExpressionKind::AllOf(self.compile_list(key, value)?),
            "le maximum de" => ExpressionKind::Extremum {
                kind: ExtremumKind::Max,
                items: self.compile_list(key, value)?,
            },
            "le minimum de" => ExpressionKind::Extremum {
                kind: ExtremumKind::Min,
                items: self.compile_list(key, value)?,
            },
            "variations" => return self.compile_variations(value),
            "barème" => ExpressionKind::Bareme(self.compile_scale(key, value, "taux")?),
            "grille" => ExpressionKind::Grille(self.compile_scale(key, value, "montant")?),
            "durée" => self.compile_duration(value)?,
            "est défini" => self.predicate(PredicateKind::IsDefined, key, value)?,
            "est non défini" => self.predicate(PredicateKind::IsMissing, key, value)?,
            "est applicable" => self.predicate(PredicateKind::IsApplicable, key, value)?,
            "est non applicable" => self.predicate(PredicateKind::IsNotApplicable, key, value)?,
            other => return Err(self.error(other, "unknown mechanism")),
        };
        Ok(Expression::new(kind, None))
    }

    fn compile_list(&self, key: &str, value: &JsonValue) -> Result<Vec<Expression>, PublicodesError> {
        let items = value
            .as_array()
            .ok_or_else(|| self.error(key, "expected a list"))?;
        items
            .iter()
            .map(|item| self.compile_value(key, item))
            .collect()
    }

    fn predicate(
        &self,
        kind: PredicateKind,
        key: &str,
        value: &JsonValue,
    ) -> Result<ExpressionKind, PublicodesError> {
        Ok(ExpressionKind::Predicate {
            kind,
            operand: Box::new(self.compile_value(key, value)?),
        })
    }

    /// `variations` lowers to nested conditions; without `sinon` the value is
    /// missing when no branch matches
    fn compile_variations(&self, value: &JsonValue) -> Result<Expression, PublicodesError> {
        let branches = value
            .as_array()
            .ok_or_else(|| self.error("variations", "expected a list of branches"))?;
        if branches.is_empty() {
            return Err(self.error("variations", "expected at least one branch"));
        }

        let mut guarded = Vec::new();
        let mut otherwise = None;
        for (index, branch) in branches.iter().enumerate() {
            let branch = branch
                .as_object()
                .ok_or_else(|| self.error("variations", "each branch must be a mapping"))?;
            if let Some(default) = branch.get("sinon") {
                if branch.len() != 1 || index != branches.len() - 1 {
                    return Err(self.error(
                        "variations",
                        "'sinon' must be alone in the last branch",
                    ));
                }
                otherwise = Some(self.compile_value("sinon", default)?);
                continue;
            }
            let condition = branch
                .get("si")
                .ok_or_else(|| self.error("variations", "branch without 'si'"))?;
            let consequence = branch
                .get("alors")
                .ok_or_else(|| self.error("variations", "branch without 'alors'"))?;
            if branch.len() != 2 {
                return Err(self.error(
                    "variations",
                    "a branch only accepts 'si' and 'alors'",
                ));
            }
            guarded.push((
                self.compile_value("si", condition)?,
                self.compile_value("alors", consequence)?,
            ));
        }

        let mut expression =
            otherwise.unwrap_or_else(|| Expression::constant(Value::Missing, Unit::default()));
        for (condition, consequence) in guarded.into_iter().rev() {
            expression = Expression::new(
                ExpressionKind::Condition {
                    condition: Box::new(condition),
                    consequence: Box::new(consequence),
                    alternative: Box::new(expression),
                },
                None,
            );
        }
        Ok(expression)
    }

    fn compile_scale(
        &self,
        key: &str,
        value: &JsonValue,
        amount_key: &str,
    ) -> Result<Scale, PublicodesError> {
        let map = value
            .as_object()
            .ok_or_else(|| self.error(key, "expected a mapping"))?;
        for field in map.keys() {
            if !matches!(field.as_str(), "assiette" | "multiplicateur" | "tranches") {
                return Err(self.error(key, format!("unknown key '{}'", field)));
            }
        }

        let base = map
            .get("assiette")
            .ok_or_else(|| self.error(key, "missing 'assiette'"))?;
        let multiplier = match map.get("multiplicateur") {
            Some(multiplier) => self.compile_value("multiplicateur", multiplier)?,
            None => Expression::number(Decimal::ONE),
        };
        let tranches = map
            .get("tranches")
            .and_then(JsonValue::as_array)
            .ok_or_else(|| self.error(key, "missing list of 'tranches'"))?;
        if tranches.is_empty() {
            return Err(self.error(key, "expected at least one tranche"));
        }

        let mut compiled = Vec::with_capacity(tranches.len());
        for (index, tranche) in tranches.iter().enumerate() {
            let tranche = tranche
                .as_object()
                .ok_or_else(|| self.error(key, "each tranche must be a mapping"))?;
            for field in tranche.keys() {
                if field != amount_key && field != "plafond" {
                    return Err(self.error(key, format!("unknown tranche key '{}'", field)));
                }
            }
            let amount = tranche
                .get(amount_key)
                .ok_or_else(|| self.error(key, format!("tranche without '{}'", amount_key)))?;
            let ceiling = match tranche.get("plafond") {
                Some(ceiling) => Some(self.compile_value("plafond", ceiling)?),
                None if index + 1 < tranches.len() => {
                    return Err(self.error(key, "only the last tranche may omit 'plafond'"))
                }
                None => None,
            };
            compiled.push(Tranche {
                ceiling,
                amount: self.compile_value(amount_key, amount)?,
            });
        }

        Ok(Scale {
            base: Box::new(self.compile_value("assiette", base)?),
            multiplier: Box::new(multiplier),
            tranches: compiled,
        })
    }

    fn compile_duration(&self, value: &JsonValue) -> Result<ExpressionKind, PublicodesError> {
        let map = value
            .as_object()
            .ok_or_else(|| self.error("durée", "expected a mapping"))?;
        let from = map
            .get("depuis")
            .ok_or_else(|| self.error("durée", "missing 'depuis'"))?;
        let to = map
            .get("jusqu'à")
            .ok_or_else(|| self.error("durée", "missing 'jusqu'à'"))?;
        let unit = match map.get("unité") {
            Some(JsonValue::String(unit)) => units::parse_unit(unit)?,
            Some(_) => return Err(self.error("durée", "'unité' must be a string")),
            None => Unit::symbol("jour"),
        };
        Ok(ExpressionKind::Duration {
            from: Box::new(self.compile_value("depuis", from)?),
            to: Box::new(self.compile_value("jusqu'à", to)?),
            unit,
        })
    }

    fn wrap_chainable(
        &self,
        key: &str,
        argument: &JsonValue,
        inner: Expression,
    ) -> Result<Expression, PublicodesError> {
        let value = Box::new(inner);
        let kind = match key {
            "applicable si" => ExpressionKind::Gate {
                kind: GateKind::ApplicableIf,
                condition: Box::new(self.compile_value(key, argument)?),
                value,
            },
            "non applicable si" => ExpressionKind::Gate {
                kind: GateKind::NotApplicableIf,
                condition: Box::new(self.compile_value(key, argument)?),
                value,
            },
            "arrondi" | "arrondi supérieur" | "arrondi inférieur" => {
                let mode = match key {
                    "arrondi supérieur" => RoundingMode::Up,
                    "arrondi inférieur" => RoundingMode::Down,
                    _ => RoundingMode::Nearest,
                };
                match self.rounding_precision(key, argument)? {
                    Some(precision) => ExpressionKind::Round {
                        mode,
                        value,
                        precision: Box::new(precision),
                    },
                    None => return Ok(*value),
                }
            }
            "unité" => {
                let text = argument
                    .as_str()
                    .ok_or_else(|| self.error(key, "expected a unit"))?;
                ExpressionKind::UnitConversion {
                    value,
                    unit: units::parse_unit(text)?,
                }
            }
            "plancher" => ExpressionKind::Clamp {
                bound: BoundKind::Lower,
                value,
                limit: Box::new(self.compile_value(key, argument)?),
            },
            "plafond" => ExpressionKind::Clamp {
                bound: BoundKind::Upper,
                value,
                limit: Box::new(self.compile_value(key, argument)?),
            },
            "par défaut" => ExpressionKind::DefaultValue {
                value,
                default: Box::new(self.compile_value(key, argument)?),
            },
            "abattement" => ExpressionKind::Abatement {
                value,
                abatement: Box::new(self.compile_value(key, argument)?),
            },
            "contexte" => {
                let map = argument
                    .as_object()
                    .ok_or_else(|| self.error(key, "expected a mapping of rules to values"))?;
                let mut overrides = Vec::with_capacity(map.len());
                for (name, replacement) in map {
                    overrides.push((
                        Reference::new(DottedName::parse(name)),
                        self.compile_value(key, replacement)?,
                    ));
                }
                ExpressionKind::Context { overrides, value }
            }
            other => return Err(self.error(other, "unknown mechanism")),
        };
        Ok(Expression::new(kind, None))
    }

    /// Precision of `arrondi`: `oui` rounds to the unit, `n décimales` to
    /// `10^-n`, any other value to a multiple of it. `non` disables rounding.
    fn rounding_precision(
        &self,
        key: &str,
        argument: &JsonValue,
    ) -> Result<Option<Expression>, PublicodesError> {
        let expression = self.compile_value(key, argument)?;
        match &expression.kind {
            ExpressionKind::Constant(Value::Boolean(true), _) => {
                Ok(Some(Expression::number(Decimal::ONE)))
            }
            ExpressionKind::Constant(Value::Boolean(false), _) => Ok(None),
            ExpressionKind::Constant(Value::Number(n), unit)
                if unit.numerators.len() == 1
                    && unit.denominators.is_empty()
                    && matches!(unit.numerators[0].as_str(), "décimales" | "décimale") =>
            {
                let places = u32::try_from(n.trunc().mantissa())
                    .ok()
                    .filter(|places| *places <= 20 && n.fract().is_zero())
                    .ok_or_else(|| self.error(key, format!("invalid number of decimals {}", n)))?;
                Ok(Some(Expression::number(Decimal::new(1, places))))
            }
            _ => Ok(Some(expression)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn compile(value: JsonValue) -> Result<Expression, PublicodesError> {
        let name = DottedName::parse("test");
        let limits = ResourceLimits::default();
        MechanismCompiler::new(&name, &limits).compile_value("valeur", &value)
    }

    #[test]
    fn chainable_keys_wrap_in_fixed_order() {
        let expression = compile(json!({
            "plafond": 100,
            "valeur": "5 * 30",
            "applicable si": "oui",
        }))
        .unwrap();
        match expression.kind {
            ExpressionKind::Gate { value, .. } => {
                assert!(matches!(value.kind, ExpressionKind::Clamp { bound: BoundKind::Upper, .. }))
            }
            other => panic!("expected gate, got {:?}", other),
        }
    }

    #[test]
    fn variations_without_default_end_with_missing() {
        let expression = compile(json!({
            "variations": [{"si": "oui", "alors": 1}]
        }))
        .unwrap();
        match expression.kind {
            ExpressionKind::Condition { alternative, .. } => assert_eq!(
                alternative.kind,
                ExpressionKind::Constant(Value::Missing, Unit::default())
            ),
            other => panic!("expected condition, got {:?}", other),
        }
    }

    #[test]
    fn decimals_become_a_power_of_ten() {
        let expression = compile(json!({"valeur": 1.2345, "arrondi": "2 décimales"})).unwrap();
        match expression.kind {
            ExpressionKind::Round { precision, .. } => {
                assert_eq!(*precision, Expression::number(Decimal::new(1, 2)))
            }
            other => panic!("expected rounding, got {:?}", other),
        }
    }

    #[test]
    fn rejects_two_main_mechanisms() {
        let error = compile(json!({"somme": [1], "produit": [2]})).unwrap_err();
        assert!(matches!(error, PublicodesError::RuleDefinition { key, .. } if key == "produit"));
    }

    #[test]
    fn rejects_unknown_keys() {
        let error = compile(json!({"valeur": 1, "multiplier": 2})).unwrap_err();
        assert!(matches!(error, PublicodesError::RuleDefinition { key, .. } if key == "multiplier"));
    }

    #[test]
    fn only_last_tranche_may_be_unbounded() {
        let error = compile(json!({
            "barème": {
                "assiette": 1000,
                "tranches": [{"taux": "10 %"}, {"taux": "20 %", "plafond": 500}]
            }
        }))
        .unwrap_err();
        assert!(matches!(error, PublicodesError::RuleDefinition { .. }));
    }
}
