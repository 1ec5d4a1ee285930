//! Unit notation: `€/mois`, `kg.m/s2`, `€/personne/jour`
//!
//! Factors are separated by `.` in the numerator and each `/` opens a new
//! denominator factor. A trailing integer (or `²`, `³`) repeats the symbol.

use crate::error::PublicodesError;
use crate::semantic::Unit;

/// Highest power a single unit factor may carry
const MAX_POWER: usize = 12;

/// Parse a unit string into its numerator and denominator multisets
pub fn parse_unit(text: &str) -> Result<Unit, PublicodesError> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(Unit::default());
    }

    let mut parts = text.split('/');
    let numerators = match parts.next() {
        Some(part) => expand_factors(part, text)?,
        None => Vec::new(),
    };
    let mut denominators = Vec::new();
    for part in parts {
        let factors = expand_factors(part, text)?;
        if factors.is_empty() {
            return Err(PublicodesError::unit(format!(
                "Malformed unit '{}': empty denominator",
                text
            )));
        }
        denominators.extend(factors);
    }

    Ok(Unit::new(numerators, denominators))
}

fn expand_factors(part: &str, unit: &str) -> Result<Vec<String>, PublicodesError> {
    let mut symbols = Vec::new();
    for factor in part.split('.') {
        let factor = factor.trim();
        // `1/jour` has no numerator
        if factor.is_empty() || factor == "1" {
            continue;
        }
        let (symbol, power) = split_power(factor, unit)?;
        if symbol.is_empty() {
            return Err(PublicodesError::unit(format!(
                "Malformed unit '{}': factor '{}' has no symbol",
                unit, factor
            )));
        }
        for _ in 0..power {
            symbols.push(symbol.to_string());
        }
    }
    Ok(symbols)
}

fn split_power<'a>(factor: &'a str, unit: &str) -> Result<(&'a str, usize), PublicodesError> {
    if let Some(symbol) = factor.strip_suffix('²') {
        return Ok((symbol, 2));
    }
    if let Some(symbol) = factor.strip_suffix('³') {
        return Ok((symbol, 3));
    }
    let digits_start = factor
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map(|(i, _)| i);
    let (symbol, digits) = match digits_start {
        Some(start) if start > 0 => (&factor[..start], &factor[start..]),
        _ => return Ok((factor, 1)),
    };
    match digits.parse::<usize>() {
        Ok(power) if power <= MAX_POWER => Ok((symbol, power)),
        _ => Err(PublicodesError::unit(format!(
            "Malformed unit '{}': power {} of '{}' exceeds {}",
            unit, digits, symbol, MAX_POWER
        ))),
    }
}

/// Canonical text of a unit: `m2.kg/s/h`
///
/// Repeated symbols are grouped with their power, in order of first appearance.
pub fn format_unit(unit: &Unit) -> String {
    let numerators = group_powers(&unit.numerators).join(".");
    let mut out = numerators;
    for denominator in group_powers(&unit.denominators) {
        out.push('/');
        out.push_str(&denominator);
    }
    out
}

fn group_powers(symbols: &[String]) -> Vec<String> {
    let mut grouped: Vec<(&str, usize)> = Vec::new();
    for symbol in symbols {
        match grouped.iter_mut().find(|(s, _)| *s == symbol.as_str()) {
            Some((_, count)) => *count += 1,
            None => grouped.push((symbol, 1)),
        }
    }
    grouped
        .into_iter()
        .map(|(symbol, count)| {
            if count == 1 {
                symbol.to_string()
            } else {
                format!("{}{}", symbol, count)
            }
        })
        .collect()
}
