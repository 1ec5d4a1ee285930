use crate::parser::format_unit;
use crate::semantic::{BinaryOperator, Expression, ExpressionKind, Unit, Value};

/// Literal text of a constant
///
/// A unit without numerator cannot follow a number, so `5 /jour` prints as
/// `(5 / 1 jour)`.
pub fn format_constant(value: &Value, unit: &Unit) -> Option<String> {
    if value.is_missing() {
        return None;
    }
    let text = value.to_string();
    if unit.is_empty() || !matches!(value, Value::Number(_)) {
        return Some(text);
    }
    if unit.numerators.is_empty() {
        let per = Unit::new(unit.denominators.clone(), Vec::new());
        return Some(format!("({} / 1 {})", text, format_unit(&per)));
    }
    Some(format!("{} {}", text, format_unit(unit)))
}

/// Formula text of `expression`, or `None` when it is a mechanism
pub fn format_expression(expression: &Expression) -> Option<String> {
    match &expression.kind {
        ExpressionKind::Constant(value, unit) => format_constant(value, unit),
        ExpressionKind::Reference(reference) => Some(reference.target().to_string()),
        ExpressionKind::Replace { original, .. } => format_expression(original),
        ExpressionKind::Unary { operand, .. } => {
            let inner = format_expression(operand)?;
            if matches!(operand.kind, ExpressionKind::Binary { .. }) {
                Some(format!("-({})", inner))
            } else {
                Some(format!("-{}", inner))
            }
        }
        ExpressionKind::Binary { op, left, right } => {
            let left_text = format_operand(left, *op, Side::Left)?;
            let right_text = format_operand(right, *op, Side::Right)?;
            Some(format!("{} {} {}", left_text, op.symbol(), right_text))
        }
        _ => None,
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Side {
    Left,
    Right,
}

fn format_operand(operand: &Expression, parent: BinaryOperator, side: Side) -> Option<String> {
    let text = format_expression(operand)?;
    let child = match &operand.kind {
        ExpressionKind::Binary { op, .. } => *op,
        ExpressionKind::Replace { original, .. } => match &original.kind {
            ExpressionKind::Binary { op, .. } => *op,
            _ => return Some(text),
        },
        // negative constants print with a leading `-`, which binds like unary minus
        _ => return Some(text),
    };

    let needs_parentheses = if child.precedence() != parent.precedence() {
        child.precedence() < parent.precedence()
    } else if parent.is_comparison() {
        true
    } else if parent == BinaryOperator::Power {
        side == Side::Left
    } else {
        side == Side::Right
    };
    if needs_parentheses {
        Some(format!("({})", text))
    } else {
        Some(text)
    }
}
