use crate::engine::Engine;
use crate::error::PublicodesError;
use crate::response::EvaluatedNode;
use crate::semantic::{DottedName, Unit, Value};
use rust_decimal::Decimal;
use serde_json::{json, Value as JsonValue};
use std::str::FromStr;

fn engine(model: JsonValue) -> Engine {
    Engine::new(model).unwrap()
}

fn eval(engine: &Engine, expression: &str) -> EvaluatedNode {
    engine
        .evaluate(expression)
        .unwrap_or_else(|e| panic!("failed to evaluate '{}': {}", expression, e))
}

fn number(text: &str) -> Value {
    Value::Number(Decimal::from_str(text).unwrap())
}

fn name(text: &str) -> DottedName {
    DottedName::parse(text)
}

#[test]
fn test_not_applicable_is_neutral_in_sums() {
    let engine = engine(json!({"a": {"applicable si": "non", "valeur": 5}}));
    assert!(eval(&engine, "a").is_not_applicable());
    assert_eq!(eval(&engine, "a + 3").node_value, number("3"));
    assert_eq!(eval(&engine, "3 - a").node_value, number("3"));
}

#[test]
fn test_missing_propagates_through_sums() {
    let engine = engine(json!({"a": null, "b": "a + 1"}));
    let result = eval(&engine, "b");
    assert!(result.is_missing());
    assert_eq!(result.missing_variables.get(&name("a")), Some(&1));
}

#[test]
fn test_zero_absorbs_missing_in_products() {
    let engine = engine(json!({"a": null}));
    let result = eval(&engine, "0 * a");
    assert_eq!(result.node_value, number("0"));
    assert!(result.missing_variables.is_empty());
    assert_eq!(eval(&engine, "a * 0").node_value, number("0"));
    assert!(eval(&engine, "a * 2").is_missing());
}

#[test]
fn test_not_applicable_absorbs_products() {
    let engine = engine(json!({"a": {"non applicable si": "oui", "valeur": 2}}));
    assert!(eval(&engine, "a * 3").is_not_applicable());
    assert_eq!(eval(&engine, "a * 0").node_value, number("0"));
}

#[test]
fn test_division_by_zero() {
    let engine = engine(json!({
        "a": null,
        "b": {"applicable si": "non", "valeur": 1},
    }));
    assert!(matches!(
        engine.evaluate("5 / 0"),
        Err(PublicodesError::DivisionByZero { .. })
    ));
    assert!(matches!(
        engine.evaluate("a / 0"),
        Err(PublicodesError::DivisionByZero { .. })
    ));
    assert!(eval(&engine, "b / 0").is_not_applicable());
    assert_eq!(eval(&engine, "7 // 2").node_value, number("3"));
}

#[test]
fn test_comparisons() {
    let engine = engine(json!({
        "a": null,
        "na": {"applicable si": "non", "valeur": 1},
    }));
    assert_eq!(eval(&engine, "2 > 1").node_value, Value::Boolean(true));
    assert_eq!(eval(&engine, "1 k€ = 1000 €").node_value, Value::Boolean(true));
    assert!(eval(&engine, "na > 1").is_not_applicable());
    assert!(eval(&engine, "a = 2").is_missing());
    assert_eq!(eval(&engine, "na = non applicable").node_value, Value::Boolean(true));
    assert_eq!(eval(&engine, "na != 1").node_value, Value::Boolean(true));
    assert_eq!(
        eval(&engine, "01/02/2024 < 01/03/2024").node_value,
        Value::Boolean(true)
    );
}

#[test]
fn test_boolean_connectives() {
    let engine = engine(json!({"a": null}));

    let result = eval(&engine, "non et a");
    assert_eq!(result.node_value, Value::Boolean(false));
    assert!(result.missing_variables.is_empty());

    assert_eq!(eval(&engine, "oui ou a").node_value, Value::Boolean(true));
    assert_eq!(eval(&engine, "a et non").node_value, Value::Boolean(false));
    assert_eq!(eval(&engine, "a ou oui").node_value, Value::Boolean(true));
    assert!(eval(&engine, "a et oui").is_missing());
    assert!(matches!(
        engine.evaluate("1 et oui"),
        Err(PublicodesError::Type { .. })
    ));
}

#[test]
fn test_percentages() {
    let engine = engine(json!({}));
    let result = eval(&engine, "100 € * 20 %");
    assert_eq!(result.node_value, number("20"));
    assert_eq!(result.unit, Some(Unit::symbol("€")));

    let result = eval(&engine, "100 * 20 %");
    assert_eq!(result.node_value, number("2000"));
    assert_eq!(result.unit, Some(Unit::symbol("%")));
}

#[test]
fn test_units_in_arithmetic() {
    let engine = engine(json!({
        "prix": {"avec": {"carottes": "2€/kg"}},
        "dépenses": "prix . carottes * 1.5kg",
    }));
    let result = eval(&engine, "dépenses");
    assert_eq!(result.node_value, number("3"));
    assert_eq!(result.unit, Some(Unit::symbol("€")));

    let result = eval(&engine, "1 k€ + 500 €");
    assert_eq!(result.node_value, number("1.5"));
    assert_eq!(result.unit, Some(Unit::symbol("k€")));

    assert!(matches!(
        engine.evaluate("1 € + 1 kg"),
        Err(PublicodesError::Unit { .. })
    ));
}

#[test]
fn test_type_errors() {
    let engine = engine(json!({}));
    assert!(matches!(
        engine.evaluate("'texte' + 1"),
        Err(PublicodesError::Type { .. })
    ));
}

#[test]
fn test_power() {
    let engine = engine(json!({}));
    assert_eq!(eval(&engine, "2 ** 10").node_value, number("1024"));
    assert_eq!(eval(&engine, "-2 ** 2").node_value, number("4"));
}

#[test]
fn test_sum_and_product() {
    let engine = engine(json!({
        "na": {"applicable si": "non", "valeur": 10},
        "total": {"somme": ["1 €", "na", "2 €"]},
        "surface": {"produit": ["2 m", "3 m"]},
    }));
    let total = eval(&engine, "total");
    assert_eq!(total.node_value, number("3"));
    assert_eq!(total.unit, Some(Unit::symbol("€")));

    let surface = eval(&engine, "surface");
    assert_eq!(surface.node_value, number("6"));
    assert_eq!(
        surface.unit,
        Some(Unit::new(vec!["m".to_string(), "m".to_string()], Vec::new()))
    );
}

#[test]
fn test_variations() {
    let engine = engine(json!({
        "x": null,
        "taux": {"variations": [
            {"si": "x > 10", "alors": "20 %"},
            {"si": "x > 5", "alors": "10 %"},
            {"sinon": "0 %"},
        ]},
        "bonus": {"variations": [{"si": "x > 10", "alors": 100}]},
    }));
    assert!(eval(&engine, "taux").is_missing());

    let mut engine = engine;
    engine
        .set_situation([("x", 7i64)], Default::default())
        .unwrap();
    assert_eq!(eval(&engine, "taux").node_value, number("10"));

    // without `sinon`, nothing matching is missing rather than an error
    let bonus = eval(&engine, "bonus");
    assert!(bonus.is_missing());
    assert!(bonus.missing_variables.is_empty());
}

#[test]
fn test_bareme() {
    let engine = engine(json!({
        "impôt": {"barème": {
            "assiette": 3000,
            "tranches": [
                {"taux": "0 %", "plafond": 1000},
                {"taux": "10 %", "plafond": 2000},
                {"taux": "20 %"},
            ],
        }},
        "impôt en euros": {"barème": {
            "assiette": "1500 €",
            "multiplicateur": 1000,
            "tranches": [
                {"taux": "5 %", "plafond": 1},
                {"taux": "50 %"},
            ],
        }},
    }));
    let result = eval(&engine, "impôt");
    assert_eq!(result.node_value, number("300"));
    assert_eq!(result.unit, None);

    let result = eval(&engine, "impôt en euros");
    assert_eq!(result.node_value, number("300"));
    assert_eq!(result.unit, Some(Unit::symbol("€")));
}

#[test]
fn test_grille() {
    let engine = engine(json!({
        "revenu": null,
        "forfait": {"grille": {
            "assiette": "revenu",
            "tranches": [
                {"montant": 10, "plafond": 1000},
                {"montant": 20, "plafond": 2000},
                {"montant": 30},
            ],
        }},
    }));
    assert!(eval(&engine, "forfait").is_missing());

    let mut engine = engine;
    engine
        .set_situation([("revenu", 1500i64)], Default::default())
        .unwrap();
    assert_eq!(eval(&engine, "forfait").node_value, number("20"));
    engine
        .set_situation([("revenu", 5000i64)], Default::default())
        .unwrap();
    assert_eq!(eval(&engine, "forfait").node_value, number("30"));
}

#[test]
fn test_rounding() {
    let engine = engine(json!({
        "haut": {"valeur": "38.4167", "arrondi supérieur": 10},
        "bas": {"valeur": "38.4167", "arrondi inférieur": 10},
        "centimes": {"valeur": "2.345 €", "arrondi": "2 décimales"},
        "entier": {"valeur": "2.5", "arrondi": "oui"},
        "invalide": {"valeur": "2.5", "arrondi": 0},
    }));
    assert_eq!(eval(&engine, "haut").node_value, number("40"));
    assert_eq!(eval(&engine, "bas").node_value, number("30"));
    let centimes = eval(&engine, "centimes");
    assert_eq!(centimes.node_value, number("2.35"));
    assert_eq!(centimes.unit, Some(Unit::symbol("€")));
    assert_eq!(eval(&engine, "entier").node_value, number("3"));
    assert!(matches!(
        engine.evaluate("invalide"),
        Err(PublicodesError::Rounding { .. })
    ));
}

#[test]
fn test_clamps_and_abatement() {
    let engine = engine(json!({
        "plafonné": {"valeur": "5000 €", "plafond": "3000 €"},
        "planché": {"valeur": "-5 €", "plancher": "0 €"},
        "abattu": {"valeur": "1000 €", "abattement": "200 €"},
        "abattu en pourcentage": {"valeur": "1000 €", "abattement": "10 %"},
        "abattu à zéro": {"valeur": "100 €", "abattement": "200 €"},
    }));
    assert_eq!(eval(&engine, "plafonné").node_value, number("3000"));
    assert_eq!(eval(&engine, "planché").node_value, number("0"));
    assert_eq!(eval(&engine, "abattu").node_value, number("800"));
    assert_eq!(eval(&engine, "abattu en pourcentage").node_value, number("900"));
    assert_eq!(eval(&engine, "abattu à zéro").node_value, number("0"));
}

#[test]
fn test_extremums() {
    let engine = engine(json!({
        "na": {"applicable si": "non", "valeur": 100},
        "max": {"le maximum de": ["3", "na", "7"]},
        "min": {"le minimum de": ["3 €", "2 kg"]},
    }));
    assert_eq!(eval(&engine, "max").node_value, number("7"));
    assert!(matches!(
        engine.evaluate("min"),
        Err(PublicodesError::Unit { .. })
    ));
}

#[test]
fn test_condition_lists() {
    let engine = engine(json!({
        "a": null,
        "une": {"une de ces conditions": ["non", "a"]},
        "une vraie": {"une de ces conditions": ["a", "oui"]},
        "toutes": {"toutes ces conditions": ["oui", "non", "a"]},
        "toutes inconnues": {"toutes ces conditions": ["oui", "a"]},
    }));
    assert!(eval(&engine, "une").is_missing());
    assert_eq!(eval(&engine, "une vraie").node_value, Value::Boolean(true));
    assert_eq!(eval(&engine, "toutes").node_value, Value::Boolean(false));
    assert!(eval(&engine, "toutes inconnues").is_missing());
}

#[test]
fn test_default_value_keeps_missing() {
    let engine = engine(json!({
        "âge": {"question": "Quel âge avez-vous ?", "par défaut": 30},
    }));
    let result = eval(&engine, "âge");
    assert_eq!(result.node_value, number("30"));
    assert_eq!(result.missing_variables.get(&name("âge")), Some(&1));
}

#[test]
fn test_predicates() {
    let engine = engine(json!({
        "âge": null,
        "na": {"applicable si": "non", "valeur": 1},
        "défini": {"est défini": "âge"},
        "applicable": {"est applicable": "na"},
        "inapplicable": {"est non applicable": "na"},
    }));
    let result = eval(&engine, "défini");
    assert_eq!(result.node_value, Value::Boolean(false));
    assert!(result.missing_variables.is_empty());
    assert_eq!(eval(&engine, "applicable").node_value, Value::Boolean(false));
    assert_eq!(eval(&engine, "inapplicable").node_value, Value::Boolean(true));
}

#[test]
fn test_context_overrides() {
    let engine = engine(json!({
        "brut": "1000 €",
        "net": "brut * 0.8",
        "net pour 2000": {"valeur": "net", "contexte": {"brut": "2000 €"}},
    }));
    assert_eq!(eval(&engine, "net pour 2000").node_value, number("1600"));
    // the override does not leak outside the `contexte`
    assert_eq!(eval(&engine, "net").node_value, number("800"));
}

#[test]
fn test_duration() {
    let engine = engine(json!({
        "jours": {"durée": {"depuis": "01/01/2024", "jusqu'à": "01/03/2024"}},
        "années": {"durée": {"depuis": "01/01/2023", "jusqu'à": "01/01/2024", "unité": "an"}},
    }));
    let result = eval(&engine, "jours");
    assert_eq!(result.node_value, number("60"));
    assert_eq!(result.unit, Some(Unit::symbol("jour")));
    assert_eq!(eval(&engine, "années").node_value, number("1"));
}

#[test]
fn test_unit_attachment() {
    let engine = engine(json!({
        "loyer": {"valeur": 1000, "unité": "€/mois"},
        "loyer annuel": {"valeur": "loyer", "unité": "€/an"},
    }));
    let result = eval(&engine, "loyer annuel");
    assert_eq!(result.node_value, number("12000"));
    assert_eq!(
        result.unit,
        Some(Unit::new(vec!["€".to_string()], vec!["an".to_string()]))
    );
}

#[test]
fn test_missing_is_subset_of_traversed() {
    let engine = engine(json!({
        "a": null,
        "b": null,
        "c": "a + b * 2",
        "d": {"somme": ["c", "a"]},
    }));
    let result = eval(&engine, "d");
    assert!(result.is_missing());
    for missing in result.missing_variables.keys() {
        assert!(result.traversed_variables.contains(missing));
    }
    assert!(result.traversed_variables.contains(&name("c")));
    assert_eq!(result.missing_variables.get(&name("a")), Some(&2));
}

#[test]
fn test_missing_weights_saturate_on_deep_diamonds() {
    let mut model = serde_json::Map::new();
    model.insert("r0".to_string(), JsonValue::Null);
    for i in 1..=33 {
        model.insert(
            format!("r{}", i),
            JsonValue::String(format!("r{} + r{}", i - 1, i - 1)),
        );
    }
    let engine = engine(JsonValue::Object(model));
    let result = eval(&engine, "r33");
    assert!(result.is_missing());
    assert_eq!(result.missing_variables.get(&name("r0")), Some(&u32::MAX));
}

#[test]
fn test_overflow_is_an_error() {
    let engine = engine(json!({
        "x": {
            "valeur": "70000000000000000000000000000",
            "abattement": "-70000000000000000000000000000",
        },
    }));
    assert!(matches!(
        engine.evaluate("x"),
        Err(PublicodesError::Type { .. })
    ));
}
