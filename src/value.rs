use crate::model::enums::SettingType;
use std::fmt::{Display, Formatter};

/// A feature flag or setting value.
///
/// Values convert from the supported primitives, and back through the `as_*` accessors:
///
/// ```rust
/// use configcat_core::Value;
///
/// let value = Value::from(42);
/// assert_eq!(value.as_int(), Some(42));
/// assert_eq!(value.as_bool(), None);
/// assert_eq!(Value::from("on").as_str().unwrap(), "on");
/// ```
#[derive(PartialEq, Debug, Clone)]
pub enum Value {
    /// Feature flag state.
    Bool(bool),
    /// Whole number setting.
    Int(i64),
    /// Decimal number setting.
    Float(f64),
    /// Text setting.
    String(String),
}

impl Value {
    /// The wrapped `bool`, if this is a [`Value::Bool`].
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The wrapped `i64`, if this is a [`Value::Int`].
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// The wrapped `f64`, if this is a [`Value::Float`].
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// A copy of the wrapped text, if this is a [`Value::String`].
    pub fn as_str(&self) -> Option<String> {
        match self {
            Value::String(s) => Some(s.clone()),
            _ => None,
        }
    }

    pub(crate) fn setting_type(&self) -> SettingType {
        match self {
            Value::Bool(_) => SettingType::Bool,
            Value::Int(_) => SettingType::Int,
            Value::Float(_) => SettingType::Float,
            Value::String(_) => SettingType::String,
        }
    }
}

/// Fails for `null`, arrays and objects.
impl TryFrom<&serde_json::Value> for Value {
    type Error = ();

    fn try_from(json: &serde_json::Value) -> Result<Self, Self::Error> {
        match json {
            serde_json::Value::Bool(b) => Ok(Value::Bool(*b)),
            serde_json::Value::String(s) => Ok(Value::String(s.clone())),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Value::Int)
                .or_else(|| n.as_f64().map(Value::Float))
                .ok_or(()),
            _ => Err(()),
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::String(s) => f.write_str(s),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(n) => write!(f, "{n}"),
        }
    }
}

/// Renders an optional default value for log messages.
pub(crate) trait OptionalValueDisplay {
    fn to_str(&self) -> String;
}

impl OptionalValueDisplay for Option<&Value> {
    fn to_str(&self) -> String {
        self.map_or_else(|| "none".to_owned(), Value::to_string)
    }
}

/// A Rust primitive that a [`Value`] can be read as, used by the typed getters of [`crate::Client`].
pub trait ValuePrimitive: Into<Value> {
    /// Extracts `Self` from `value`, or [`None`] when the variant doesn't match.
    fn from_value(value: &Value) -> Option<Self>;
}

impl ValuePrimitive for bool {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_bool()
    }
}

impl ValuePrimitive for i64 {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_int()
    }
}

impl ValuePrimitive for f64 {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_float()
    }
}

impl ValuePrimitive for String {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_str()
    }
}

impl_from_variant!(Value::Bool: bool);
impl_from_variant!(Value::Int: i64);
impl_from_variant!(Value::Float: f64);
impl_from_variant!(Value::String: String);
impl_from_variant!(Value::String: into &str);

#[cfg(test)]
mod value_tests {
    use crate::value::{OptionalValueDisplay, Value};
    use serde_json::json;

    #[test]
    fn from_json() {
        assert_eq!(Value::try_from(&json!(true)), Ok(Value::Bool(true)));
        assert_eq!(Value::try_from(&json!(7)), Ok(Value::Int(7)));
        assert_eq!(Value::try_from(&json!(7.5)), Ok(Value::Float(7.5)));
        assert_eq!(Value::try_from(&json!("x")), Ok(Value::String("x".to_owned())));
        assert!(Value::try_from(&json!(null)).is_err());
        assert!(Value::try_from(&json!([1])).is_err());
    }

    #[test]
    fn display() {
        assert_eq!(Value::Float(2.25).to_string(), "2.25");
        assert_eq!(Value::String("a b".to_owned()).to_string(), "a b");
        assert_eq!(None::<&Value>.to_str(), "none");
        assert_eq!(Some(&Value::Bool(false)).to_str(), "false");
    }
}
