use crate::utils::data_path;
use configcat_core::{evaluate, Config, User, Value};
use serde::Deserialize;
use std::collections::BTreeMap;

mod utils;

#[derive(Deserialize)]
struct EvalCase {
    key: String,
    user: Option<BTreeMap<String, String>>,
    expected: serde_yaml::Value,
}

fn to_user(attributes: &BTreeMap<String, String>) -> User {
    let mut user = User::new(attributes.get("Identifier").map_or("", String::as_str));
    for (key, val) in attributes {
        user = match key.as_str() {
            "Identifier" => user,
            "Email" => user.email(val),
            "Country" => user.country(val),
            _ => user.custom(key, val.as_str()),
        };
    }
    user
}

fn to_value(expected: &serde_yaml::Value) -> Value {
    match expected {
        serde_yaml::Value::Bool(val) => Value::Bool(*val),
        serde_yaml::Value::String(val) => Value::String(val.clone()),
        serde_yaml::Value::Number(num) if num.is_i64() => Value::Int(num.as_i64().unwrap()),
        serde_yaml::Value::Number(num) => Value::Float(num.as_f64().unwrap()),
        other => panic!("unsupported expected value: {other:?}"),
    }
}

fn load_config() -> Config {
    let content = std::fs::read_to_string(data_path("eval_config_v6.json")).unwrap();
    serde_json::from_str(content.as_str()).unwrap()
}

#[test]
fn evaluation_cases() {
    let config = load_config();
    let content = std::fs::read_to_string(data_path("eval_cases.yaml")).unwrap();
    let cases: Vec<EvalCase> = serde_yaml::from_str(content.as_str()).unwrap();
    assert!(!cases.is_empty());

    for case in cases {
        let user = case.user.as_ref().map(to_user);
        let details = evaluate(&config, case.key.as_str(), user.as_ref(), None);
        assert!(
            details.error.is_none(),
            "'{}' failed: {:?}",
            case.key,
            details.error
        );
        assert_eq!(
            details.value,
            Some(to_value(&case.expected)),
            "'{}' for user {:?}",
            case.key,
            case.user
        );
    }
}

#[test]
fn matched_rule_and_option_are_reported() {
    let config = load_config();

    let user = User::new("u1").email("joe@configcat.com");
    let details = evaluate(&config, "animal", Some(&user), None);
    assert_eq!(details.variation_id.as_deref(), Some("dog"));
    assert!(details.matched_targeting_rule.is_some());
    assert!(details.matched_percentage_option.is_none());

    let details = evaluate(&config, "pct", Some(&User::new("u1")), None);
    assert_eq!(details.variation_id.as_deref(), Some("a"));
    assert!(details.matched_targeting_rule.is_none());
    assert_eq!(details.matched_percentage_option.unwrap().percentage, 30);

    let details = evaluate(&config, "animal", None, None);
    assert_eq!(details.variation_id.as_deref(), Some("cat"));
    assert!(!details.is_default_value);
}

#[test]
fn percentage_options_are_sticky() {
    let config = load_config();
    let user = User::new("12345");
    let first = evaluate(&config, "pct", Some(&user), None).value;
    for _ in 0..10 {
        assert_eq!(evaluate(&config, "pct", Some(&user), None).value, first);
    }
    assert_eq!(first, Some(Value::String("B".to_owned())));
}

#[test]
fn missing_key_returns_default() {
    let config = load_config();
    let details = evaluate(
        &config,
        "nonExisting",
        None,
        Some(Value::String("fallback".to_owned())),
    );
    assert!(details.is_default_value);
    assert_eq!(details.value, Some(Value::String("fallback".to_owned())));
    let err = details.error.unwrap();
    assert!(err.message.contains("Available keys: ['isEnabled', 'animal', 'pct'"));
}
