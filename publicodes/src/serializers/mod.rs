//! Compiled expressions and rules back to their raw form
//!
//! Formula-shaped expressions print as formula text with minimal
//! parentheses; mechanisms print as their keyword mapping. Reparsing the
//! output of a resolved model gives back an equivalent model.

mod formula;
mod json;

pub use formula::{format_constant, format_expression};
pub use json::{expression_to_raw, rule_to_raw, rules_to_raw};
