use crate::error::PublicodesError;
use crate::parser::parse_formula;
use crate::resource_limits::ResourceLimits;
use crate::semantic::{BinaryOperator, DottedName, Expression, ExpressionKind, Unit, Value};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::str::FromStr;

fn parse(formula: &str) -> Expression {
    parse_formula(formula, &DottedName::parse("test"), &ResourceLimits::default())
        .unwrap_or_else(|e| panic!("failed to parse '{}': {}", formula, e))
}

fn parse_err(formula: &str) -> PublicodesError {
    parse_formula(formula, &DottedName::parse("test"), &ResourceLimits::default())
        .expect_err(formula)
}

fn top_operator(expression: &Expression) -> BinaryOperator {
    match &expression.kind {
        ExpressionKind::Binary { op, .. } => *op,
        other => panic!("expected a binary expression, got {:?}", other),
    }
}

#[test]
fn test_precedence_and_associativity() {
    assert_eq!(top_operator(&parse("a ou b et c")), BinaryOperator::Or);
    assert_eq!(top_operator(&parse("a et b = c")), BinaryOperator::And);
    assert_eq!(top_operator(&parse("a + b > c * d")), BinaryOperator::GreaterThan);
    assert_eq!(top_operator(&parse("a * b + c")), BinaryOperator::Add);
    assert_eq!(top_operator(&parse("a * b ** c")), BinaryOperator::Multiply);

    match parse("2 ** 3 ** 2").kind {
        ExpressionKind::Binary { left, right, .. } => {
            assert!(left.is_constant());
            assert_eq!(top_operator(&right), BinaryOperator::Power);
        }
        other => panic!("expected a power, got {:?}", other),
    }

    match parse("a - b - c").kind {
        ExpressionKind::Binary { left, right, .. } => {
            assert_eq!(top_operator(&left), BinaryOperator::Subtract);
            assert!(matches!(right.kind, ExpressionKind::Reference(_)));
        }
        other => panic!("expected a subtraction, got {:?}", other),
    }
}

#[test]
fn test_comparisons_do_not_chain() {
    assert!(matches!(parse_err("a < b < c"), PublicodesError::Syntax(_)));
}

#[test]
fn test_constants_with_units() {
    assert_eq!(
        parse("2 €/kg").kind,
        ExpressionKind::Constant(
            Value::Number(Decimal::from(2)),
            Unit::new(vec!["€".to_string()], vec!["kg".to_string()])
        )
    );
    assert_eq!(
        parse("1.5kg").kind,
        ExpressionKind::Constant(Value::Number(Decimal::from_str("1.5").unwrap()), Unit::symbol("kg"))
    );
    assert_eq!(
        parse("20%").kind,
        ExpressionKind::Constant(Value::Number(Decimal::from(20)), Unit::symbol("%"))
    );
}

#[test]
fn test_literals() {
    assert_eq!(
        parse("oui").kind,
        ExpressionKind::Constant(Value::Boolean(true), Unit::default())
    );
    assert_eq!(
        parse("non applicable").kind,
        ExpressionKind::Constant(Value::NotApplicable, Unit::default())
    );
    assert_eq!(
        parse("'CDD'").kind,
        ExpressionKind::Constant(Value::Text("CDD".to_string()), Unit::default())
    );
    assert_eq!(
        parse("01/03/2024").kind,
        ExpressionKind::Constant(
            Value::Date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()),
            Unit::default()
        )
    );
    assert_eq!(
        parse("03/2024").kind,
        ExpressionKind::Constant(
            Value::Date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()),
            Unit::default()
        )
    );
}

#[test]
fn test_multi_word_references() {
    match parse("contrat salarié . temps partiel").kind {
        ExpressionKind::Reference(reference) => {
            assert_eq!(reference.name.to_string(), "contrat salarié . temps partiel");
            assert!(reference.resolved.is_none());
        }
        other => panic!("expected a reference, got {:?}", other),
    }

    // `non` followed by a word is part of a name
    assert!(matches!(
        parse("non salarié").kind,
        ExpressionKind::Reference(_)
    ));
    assert_eq!(top_operator(&parse("cadre et non")), BinaryOperator::And);
}

#[test]
fn test_negation() {
    match parse("-(a + b)").kind {
        ExpressionKind::Unary { operand, .. } => {
            assert_eq!(top_operator(&operand), BinaryOperator::Add)
        }
        other => panic!("expected a negation, got {:?}", other),
    }
}

#[test]
fn test_syntax_error_names_the_rule() {
    match parse_err("1 +") {
        PublicodesError::Syntax(details) => {
            assert_eq!(details.rule, "test");
            assert_eq!(details.formula, "1 +");
        }
        other => panic!("expected a syntax error, got {:?}", other),
    }
}

#[test]
fn test_depth_limit() {
    let limits = ResourceLimits {
        max_expression_depth: 5,
        ..ResourceLimits::default()
    };
    let formula = format!("{}1{}", "(".repeat(10), ")".repeat(10));
    let error = parse_formula(&formula, &DottedName::parse("test"), &limits).unwrap_err();
    assert!(matches!(error, PublicodesError::ResourceLimitExceeded { .. }));
}

#[test]
fn test_formula_size_limit() {
    let limits = ResourceLimits {
        max_formula_bytes: 8,
        ..ResourceLimits::default()
    };
    let error = parse_formula("a + b + c + d", &DottedName::parse("test"), &limits).unwrap_err();
    assert!(matches!(error, PublicodesError::ResourceLimitExceeded { .. }));
}
