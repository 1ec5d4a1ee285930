//! Unit algebra: inference through operators and conversion between units
//!
//! Known symbols belong to a dimension (time, mass, distance, currency) with a
//! factor to the base symbol of that dimension. Any other symbol is its own
//! dimension with factor 1, so `personne` only converts to `personne`.

use super::operations::overflow;
use crate::error::PublicodesError;
use crate::semantic::{BinaryOperator, Unit};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// Dimension and factor to the dimension's base symbol. `%` has no dimension.
fn symbol_definition(symbol: &str) -> (&str, Decimal) {
    let (dimension, factor) = match symbol {
        "ms" => ("time", Decimal::new(1, 3)),
        "s" => ("time", Decimal::ONE),
        "min" => ("time", Decimal::from(60)),
        "h" | "heure" | "heures" => ("time", Decimal::from(3_600)),
        "jour" | "jours" => ("time", Decimal::from(86_400)),
        "semaine" | "semaines" => ("time", Decimal::from(604_800)),
        "mois" => ("time", Decimal::from(2_628_000)),
        "trimestre" | "trimestres" => ("time", Decimal::from(7_884_000)),
        "an" | "ans" | "année" | "années" => ("time", Decimal::from(31_536_000)),

        "mg" => ("mass", Decimal::new(1, 3)),
        "g" => ("mass", Decimal::ONE),
        "kg" => ("mass", Decimal::from(1_000)),
        "t" => ("mass", Decimal::from(1_000_000)),

        "mm" => ("distance", Decimal::new(1, 3)),
        "cm" => ("distance", Decimal::new(1, 2)),
        "m" => ("distance", Decimal::ONE),
        "km" => ("distance", Decimal::from(1_000)),

        "€" => ("currency", Decimal::ONE),
        "k€" => ("currency", Decimal::from(1_000)),
        "M€" => ("currency", Decimal::from(1_000_000)),

        "%" => ("", Decimal::new(1, 2)),
        other => (other, Decimal::ONE),
    };
    (dimension, factor)
}

/// Remove symbols present on both sides (multiset difference)
pub fn simplify(unit: &Unit) -> Unit {
    let mut numerators = unit.numerators.clone();
    let mut denominators = Vec::new();
    for symbol in &unit.denominators {
        match numerators.iter().position(|s| s == symbol) {
            Some(index) => {
                numerators.remove(index);
            }
            None => denominators.push(symbol.clone()),
        }
    }
    Unit::new(numerators, denominators)
}

/// Unit of `left op right`
///
/// Products concatenate, quotients swap the right operand before cancelling.
/// Additive operators keep the left unit, or the right one when the left is
/// unitless.
pub fn infer_unit(op: BinaryOperator, left: &Unit, right: &Unit) -> Unit {
    match op {
        BinaryOperator::Multiply => {
            let mut numerators = left.numerators.clone();
            numerators.extend(right.numerators.iter().cloned());
            let mut denominators = left.denominators.clone();
            denominators.extend(right.denominators.iter().cloned());
            simplify(&Unit::new(numerators, denominators))
        }
        BinaryOperator::Divide | BinaryOperator::FloorDivide => {
            let mut numerators = left.numerators.clone();
            numerators.extend(right.denominators.iter().cloned());
            let mut denominators = left.denominators.clone();
            denominators.extend(right.numerators.iter().cloned());
            simplify(&Unit::new(numerators, denominators))
        }
        _ if left.is_empty() => right.clone(),
        _ => left.clone(),
    }
}

/// Signed count of each dimension, e.g. `€/mois` is `{currency: 1, time: -1}`
fn dimensions(unit: &Unit) -> BTreeMap<String, i32> {
    let mut counts: BTreeMap<String, i32> = BTreeMap::new();
    for symbol in &unit.numerators {
        let (dimension, _) = symbol_definition(symbol);
        if !dimension.is_empty() {
            *counts.entry(dimension.to_string()).or_default() += 1;
        }
    }
    for symbol in &unit.denominators {
        let (dimension, _) = symbol_definition(symbol);
        if !dimension.is_empty() {
            *counts.entry(dimension.to_string()).or_default() -= 1;
        }
    }
    counts.retain(|_, count| *count != 0);
    counts
}

pub fn are_convertible(from: &Unit, to: &Unit) -> bool {
    dimensions(from) == dimensions(to)
}

fn product(symbols: &[String]) -> Result<Decimal, PublicodesError> {
    symbols.iter().try_fold(Decimal::ONE, |acc, symbol| {
        acc.checked_mul(symbol_definition(symbol).1)
            .ok_or_else(|| PublicodesError::unit("conversion factor overflow"))
    })
}

/// Factor `f` such that `value from` equals `value × f to`
pub fn conversion_factor(from: &Unit, to: &Unit) -> Result<Decimal, PublicodesError> {
    if !are_convertible(from, to) {
        return Err(PublicodesError::unit(format!(
            "cannot convert '{}' to '{}'",
            from, to
        )));
    }
    let overflow = || PublicodesError::unit("conversion factor overflow");
    let numerator = product(&from.numerators)?
        .checked_mul(product(&to.denominators)?)
        .ok_or_else(overflow)?;
    let denominator = product(&from.denominators)?
        .checked_mul(product(&to.numerators)?)
        .ok_or_else(overflow)?;
    numerator.checked_div(denominator).ok_or_else(overflow)
}

/// Convert `value` expressed in `from` into `to`
pub fn convert_unit(from: &Unit, to: &Unit, value: Decimal) -> Result<Decimal, PublicodesError> {
    if from.is_equivalent(to) {
        return Ok(value);
    }
    let factor = conversion_factor(from, to)?;
    value
        .checked_mul(factor)
        .map(|converted| converted.normalize())
        .ok_or_else(|| PublicodesError::unit("conversion overflow"))
}

/// Fold `%` symbols into the value when they are mixed with other symbols:
/// `1000 €.%` is `10 €`
pub fn simplify_percent(unit: Unit, value: Decimal) -> Result<(Unit, Decimal), PublicodesError> {
    if unit.is_percent() || unit.is_empty() {
        return Ok((unit, value));
    }
    let hundred = Decimal::ONE_HUNDRED;
    let mut value = value;
    let mut numerators = Vec::with_capacity(unit.numerators.len());
    for symbol in unit.numerators {
        if symbol == "%" {
            value = value.checked_div(hundred).ok_or_else(overflow)?;
        } else {
            numerators.push(symbol);
        }
    }
    let mut denominators = Vec::with_capacity(unit.denominators.len());
    for symbol in unit.denominators {
        if symbol == "%" {
            value = value.checked_mul(hundred).ok_or_else(overflow)?;
        } else {
            denominators.push(symbol);
        }
    }
    Ok((Unit::new(numerators, denominators), value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_unit;
    use std::str::FromStr;

    fn unit(text: &str) -> Unit {
        parse_unit(text).unwrap()
    }

    #[test]
    fn multiplication_cancels_symbols() {
        let inferred = infer_unit(BinaryOperator::Multiply, &unit("€/kg"), &unit("kg"));
        assert_eq!(inferred, unit("€"));
    }

    #[test]
    fn division_swaps_the_right_operand() {
        let inferred = infer_unit(BinaryOperator::Divide, &unit("€"), &unit("€/mois"));
        assert_eq!(inferred, unit("mois"));
    }

    #[test]
    fn converts_compound_units() {
        let converted = convert_unit(
            &unit("€/personne/jour"),
            &unit("k€/an/personne"),
            Decimal::from(100),
        )
        .unwrap();
        assert_eq!(converted, Decimal::from_str("36.5").unwrap());
    }

    #[test]
    fn converts_months_to_years() {
        let converted = convert_unit(&unit("€/mois"), &unit("€/an"), Decimal::from(100)).unwrap();
        assert_eq!(converted, Decimal::from(1200));
    }

    #[test]
    fn unknown_symbols_only_convert_to_themselves() {
        assert!(are_convertible(&unit("personne"), &unit("personne")));
        assert!(!are_convertible(&unit("personne"), &unit("kg")));
        assert!(convert_unit(&unit("€"), &unit("kg"), Decimal::ONE).is_err());
    }

    #[test]
    fn percent_is_folded_into_the_value() {
        let (unit, value) = simplify_percent(unit("€.%"), Decimal::from(1000)).unwrap();
        assert_eq!(unit, super::Unit::symbol("€"));
        assert_eq!(value, Decimal::from(10));
    }
}
