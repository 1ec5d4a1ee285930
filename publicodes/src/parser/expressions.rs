use crate::ast::Span;
use crate::error::PublicodesError;
use crate::parser::{literals, units, DepthTracker, Rule};
use crate::semantic::{
    BinaryOperator, DottedName, Expression, ExpressionKind, Reference, UnaryOperator, Unit,
    Value,
};
use pest::iterators::Pair;

/// Parentheses, negations and exponents are the only ways to nest; each counts
/// towards `max_expression_depth`
fn parse_nested(pair: Pair<Rule>, depth: &mut DepthTracker) -> Result<Expression, PublicodesError> {
    depth.push()?;
    let result = parse_expression(pair, depth);
    depth.pop();
    result
}

// Helper to create an Expression carrying the span of its source pair
fn traceable_expr(kind: ExpressionKind, pair: &Pair<Rule>) -> Expression {
    Expression::new(kind, Some(Span::from_pest_span(pair.as_span())))
}

fn malformed(pair: &Pair<Rule>, message: impl Into<String>) -> PublicodesError {
    PublicodesError::syntax(
        &DottedName::root(),
        "",
        message,
        Span::from_pest_span(pair.as_span()),
    )
}

pub(crate) fn parse_expression(
    pair: Pair<Rule>,
    depth: &mut DepthTracker,
) -> Result<Expression, PublicodesError> {
    match pair.as_rule() {
        Rule::expression => {
            let inner = pair
                .clone()
                .into_inner()
                .next()
                .ok_or_else(|| malformed(&pair, "Empty expression"))?;
            parse_expression(inner, depth)
        }
        Rule::or_expression | Rule::and_expression | Rule::additive | Rule::multiplicative => {
            parse_left_associative(pair, depth)
        }
        Rule::comparison => parse_comparison(pair, depth),
        Rule::power => parse_power(pair, depth),
        Rule::unary => parse_unary(pair, depth),
        Rule::primary => parse_primary(pair, depth),
        other => Err(malformed(
            &pair,
            format!("Unexpected {:?} in expression", other),
        )),
    }
}

fn binary_operator(pair: &Pair<Rule>) -> Result<BinaryOperator, PublicodesError> {
    let op = match pair.as_rule() {
        Rule::op_or => BinaryOperator::Or,
        Rule::op_and => BinaryOperator::And,
        Rule::op_add => BinaryOperator::Add,
        Rule::op_sub => BinaryOperator::Subtract,
        Rule::op_mul => BinaryOperator::Multiply,
        Rule::op_div => BinaryOperator::Divide,
        Rule::op_floor_div => BinaryOperator::FloorDivide,
        Rule::op_pow => BinaryOperator::Power,
        Rule::op_eq => BinaryOperator::Equal,
        Rule::op_ne => BinaryOperator::NotEqual,
        Rule::op_lt => BinaryOperator::LessThan,
        Rule::op_lte => BinaryOperator::LessThanOrEqual,
        Rule::op_gt => BinaryOperator::GreaterThan,
        Rule::op_gte => BinaryOperator::GreaterThanOrEqual,
        _ => {
            return Err(malformed(
                pair,
                format!("Unknown operator '{}'", pair.as_str()),
            ))
        }
    };
    Ok(op)
}

fn binary(op: BinaryOperator, left: Expression, right: Expression, span: Option<Span>) -> Expression {
    Expression::new(
        ExpressionKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
        span,
    )
}

/// `operand (operator operand)*`, folded to the left
fn parse_left_associative(
    pair: Pair<Rule>,
    depth: &mut DepthTracker,
) -> Result<Expression, PublicodesError> {
    let span = Span::from_pest_span(pair.as_span());
    let mut inner = pair.clone().into_inner();
    let first = inner
        .next()
        .ok_or_else(|| malformed(&pair, "Missing operand"))?;
    let mut result = parse_expression(first, depth)?;

    while let Some(op_pair) = inner.next() {
        let op = binary_operator(&op_pair)?;
        let operand = inner
            .next()
            .ok_or_else(|| malformed(&op_pair, format!("Missing operand after '{}'", op)))?;
        let right = parse_expression(operand, depth)?;
        result = binary(op, result, right, Some(span.clone()));
    }
    Ok(result)
}

fn parse_comparison(
    pair: Pair<Rule>,
    depth: &mut DepthTracker,
) -> Result<Expression, PublicodesError> {
    let span = Span::from_pest_span(pair.as_span());
    let mut inner = pair.clone().into_inner();
    let left_pair = inner
        .next()
        .ok_or_else(|| malformed(&pair, "Missing comparison operand"))?;
    let left = parse_expression(left_pair, depth)?;

    match inner.next() {
        None => Ok(left),
        Some(op_pair) => {
            let op = binary_operator(&op_pair)?;
            let right_pair = inner
                .next()
                .ok_or_else(|| malformed(&op_pair, "Missing right side of comparison"))?;
            let right = parse_expression(right_pair, depth)?;
            Ok(binary(op, left, right, Some(span)))
        }
    }
}

/// `unary (** power)?`, right-associative
fn parse_power(pair: Pair<Rule>, depth: &mut DepthTracker) -> Result<Expression, PublicodesError> {
    let span = Span::from_pest_span(pair.as_span());
    let mut inner = pair.clone().into_inner();
    let base_pair = inner
        .next()
        .ok_or_else(|| malformed(&pair, "Missing operand"))?;
    let base = parse_expression(base_pair, depth)?;

    match inner.next() {
        None => Ok(base),
        Some(_op) => {
            let exponent_pair = inner
                .next()
                .ok_or_else(|| malformed(&pair, "Missing exponent"))?;
            let exponent = parse_nested(exponent_pair, depth)?;
            Ok(binary(BinaryOperator::Power, base, exponent, Some(span)))
        }
    }
}

fn parse_unary(pair: Pair<Rule>, depth: &mut DepthTracker) -> Result<Expression, PublicodesError> {
    let mut inner = pair.clone().into_inner();
    let first = inner
        .next()
        .ok_or_else(|| malformed(&pair, "Empty unary expression"))?;

    if first.as_rule() == Rule::op_neg {
        let operand_pair = inner
            .next()
            .ok_or_else(|| malformed(&pair, "Missing operand after '-'"))?;
        let operand = parse_nested(operand_pair, depth)?;
        return Ok(traceable_expr(
            ExpressionKind::Unary {
                op: UnaryOperator::Negate,
                operand: Box::new(operand),
            },
            &pair,
        ));
    }
    parse_expression(first, depth)
}

fn parse_primary(pair: Pair<Rule>, depth: &mut DepthTracker) -> Result<Expression, PublicodesError> {
    let inner = pair
        .clone()
        .into_inner()
        .next()
        .ok_or_else(|| malformed(&pair, "Empty primary expression"))?;

    match inner.as_rule() {
        Rule::expression => parse_nested(inner, depth),
        Rule::not_applicable_literal => Ok(traceable_expr(
            ExpressionKind::Constant(Value::NotApplicable, Unit::default()),
            &inner,
        )),
        Rule::boolean_literal => {
            let value = literals::parse_boolean_literal(&inner)?;
            Ok(traceable_expr(
                ExpressionKind::Constant(value, Unit::default()),
                &inner,
            ))
        }
        Rule::date_literal => {
            let value = literals::parse_date_literal(&inner)?;
            Ok(traceable_expr(
                ExpressionKind::Constant(value, Unit::default()),
                &inner,
            ))
        }
        Rule::constant => parse_constant(inner),
        Rule::string_literal => {
            let span = Span::from_pest_span(inner.as_span());
            let value = literals::parse_string_literal(inner);
            Ok(Expression::new(
                ExpressionKind::Constant(value, Unit::default()),
                Some(span),
            ))
        }
        Rule::reference => Ok(traceable_expr(
            ExpressionKind::Reference(Reference::new(DottedName::parse(inner.as_str()))),
            &inner,
        )),
        other => Err(malformed(&inner, format!("Unexpected {:?}", other))),
    }
}

/// A number with an optional unit: `12`, `1.5 kg`, `2 €/kg`
fn parse_constant(pair: Pair<Rule>) -> Result<Expression, PublicodesError> {
    let mut value = None;
    let mut unit = Unit::default();

    for inner in pair.clone().into_inner() {
        match inner.as_rule() {
            Rule::number => value = Some(literals::parse_number_literal(&inner)?),
            Rule::unit => {
                unit = units::parse_unit(inner.as_str())
                    .map_err(|e| malformed(&inner, e.to_string()))?;
            }
            _ => {}
        }
    }

    let value = value.ok_or_else(|| malformed(&pair, "Missing number"))?;
    Ok(traceable_expr(
        ExpressionKind::Constant(Value::Number(value), unit),
        &pair,
    ))
}
