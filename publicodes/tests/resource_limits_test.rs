use publicodes::*;
use serde_json::{json, Map, Value as JsonValue};

fn chain(length: usize) -> JsonValue {
    let mut model = Map::new();
    model.insert("r0".to_string(), json!(1));
    for i in 1..length {
        model.insert(format!("r{}", i), json!(format!("r{} + 1", i - 1)));
    }
    JsonValue::Object(model)
}

fn with_limits(limits: ResourceLimits) -> EngineOptions {
    EngineOptions {
        limits,
        ..EngineOptions::default()
    }
}

#[test]
fn test_rule_count_limit() {
    let options = with_limits(ResourceLimits {
        max_rules: 5,
        ..ResourceLimits::default()
    });
    let error = Engine::with_options(chain(10), options).err().unwrap();
    assert!(matches!(
        error,
        PublicodesError::ResourceLimitExceeded { ref limit_name, .. } if limit_name == "max_rules"
    ));
}

#[test]
fn test_evaluation_depth_limit() {
    let options = with_limits(ResourceLimits {
        max_evaluation_depth: 5,
        ..ResourceLimits::default()
    });
    let engine = Engine::with_options(chain(10), options).unwrap();

    assert!(engine.evaluate("r3").is_ok());
    let error = engine.evaluate("r9").unwrap_err();
    assert!(matches!(
        error,
        PublicodesError::ResourceLimitExceeded { ref limit_name, .. }
            if limit_name == "max_evaluation_depth"
    ));
}

#[test]
fn test_deep_models_within_the_default_limits() {
    let engine = Engine::new(chain(50)).unwrap();
    let result = engine.evaluate("r49").unwrap();
    assert_eq!(result.node_value, Value::Number(50.into()));
}

#[test]
fn test_oversized_formula_in_a_model() {
    let options = with_limits(ResourceLimits {
        max_formula_bytes: 16,
        ..ResourceLimits::default()
    });
    let error = Engine::with_options(
        json!({"a": 1, "b": "a + a + a + a + a + a + a"}),
        options,
    )
    .err()
    .unwrap();
    assert!(matches!(
        error,
        PublicodesError::ResourceLimitExceeded { ref limit_name, .. }
            if limit_name == "max_formula_bytes"
    ));
}
