use proptest::prelude::*;
use publicodes::*;
use rust_decimal::Decimal;
use serde_json::json;

fn engine() -> Engine {
    Engine::new(json!({
        "a": null,
        "b": null,
        "c": null,
        "na": {"applicable si": "non", "valeur": 1},
    }))
    .unwrap()
}

fn evaluate(engine: &Engine, expression: &str) -> EvaluatedNode {
    engine
        .evaluate(expression)
        .unwrap_or_else(|e| panic!("failed to evaluate '{}': {}", expression, e))
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 100,
        ..ProptestConfig::default()
    })]

    #[test]
    fn prop_not_applicable_is_neutral_in_sums(n in -1_000_000i64..1_000_000) {
        let engine = engine();
        let result = evaluate(&engine, &format!("({}) + na", n));
        prop_assert_eq!(result.node_value, Value::Number(Decimal::from(n)));
        let result = evaluate(&engine, &format!("na - ({})", n));
        prop_assert_eq!(result.node_value, Value::Number(Decimal::from(-n)));
    }

    #[test]
    fn prop_not_applicable_absorbs_products(n in 1i64..1_000_000) {
        let engine = engine();
        let product = evaluate(&engine, &format!("{} * na", n));
        prop_assert!(product.is_not_applicable());
        let quotient = evaluate(&engine, &format!("na / {}", n));
        prop_assert!(quotient.is_not_applicable());
    }

    #[test]
    fn prop_zero_absorbs_missing_factors(n in -1_000i64..1_000) {
        let mut engine = engine();
        engine.set_situation([("b", n)], SituationOptions::default()).unwrap();
        let result = evaluate(&engine, "a * b * 0");
        prop_assert_eq!(result.node_value, Value::Number(Decimal::ZERO));
    }

    #[test]
    fn prop_missing_is_traversed(
        answer_a in proptest::option::of(-100i64..100),
        answer_b in proptest::option::of(-100i64..100),
        answer_c in proptest::option::of(-100i64..100),
    ) {
        let mut engine = engine();
        let answers: Vec<(&str, i64)> = [("a", answer_a), ("b", answer_b), ("c", answer_c)]
            .into_iter()
            .filter_map(|(name, answer)| answer.map(|value| (name, value)))
            .collect();
        engine.set_situation(answers, SituationOptions::default()).unwrap();

        let result = evaluate(&engine, "a + b * c");
        for name in result.missing_variables.keys() {
            prop_assert!(result.traversed_variables.contains(name));
        }
        if result.is_missing() {
            prop_assert!(!result.missing_variables.is_empty());
        }
    }

    #[test]
    fn prop_ceiling_is_never_exceeded(value in -10_000i64..10_000, ceiling in -10_000i64..10_000) {
        let engine = Engine::new(json!({
            "plafonné": {"valeur": format!("{} €", value), "plafond": format!("{} €", ceiling)},
        }))
        .unwrap();
        let result = evaluate(&engine, "plafonné");
        prop_assert_eq!(result.node_value, Value::Number(Decimal::from(value.min(ceiling))));
    }

    #[test]
    fn prop_monthly_answers_are_converted_to_yearly(n in 0i64..100_000) {
        let mut engine = Engine::new(json!({
            "salaire": {"question": "Salaire ?", "unité": "€/an"},
        }))
        .unwrap();
        engine
            .set_situation([("salaire", format!("{} €/mois", n))], SituationOptions::default())
            .unwrap();
        let result = evaluate(&engine, "salaire");
        prop_assert_eq!(result.node_value, Value::Number(Decimal::from(n * 12)));
    }

    #[test]
    fn prop_formatted_constants_parse_back(
        mantissa in -1_000_000i64..1_000_000,
        scale in 0u32..4,
        numerators in prop::collection::vec(prop::sample::select(vec!["€", "kg", "personne"]), 0..4),
        denominator in prop::option::of(prop::sample::select(vec!["mois", "jour"])),
    ) {
        let value = Decimal::new(mantissa, scale);
        let unit = Unit::new(
            numerators.iter().map(|s| s.to_string()).collect(),
            denominator.iter().map(|s| s.to_string()).collect(),
        );
        let text = serializers::format_constant(&Value::Number(value), &unit).unwrap();

        let result = evaluate(&Engine::new(json!({})).unwrap(), &text);
        prop_assert_eq!(result.node_value, Value::Number(value), "{}", text);
        let parsed = result.unit.unwrap_or_default();
        prop_assert!(parsed.is_equivalent(&unit), "{} parsed as {:?}", text, parsed);
    }
}
