use chrono::{DateTime, Utc};
use semver::{BuildMetadata, Version};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};
use std::fmt::{Display, Formatter};

pub const IDENTIFIER: &str = "Identifier";
pub const EMAIL: &str = "Email";
pub const COUNTRY: &str = "Country";

/// Value of a [`User`] attribute.
///
/// Comparators read the value in the form they need: text comparators stringify anything,
/// number and date comparators accept numbers or numeric text, semver comparators accept
/// versions or version text, and array comparators accept string lists or a JSON array text.
/// A value that can't be read as required skips the targeting rule with a warning.
#[derive(Debug, Clone, PartialEq)]
pub enum UserValue {
    /// Text.
    String(String),
    /// Signed whole number.
    Int(i64),
    /// Unsigned whole number.
    UInt(u64),
    /// Decimal number.
    Float(f64),
    /// Point in time, compared as Unix seconds.
    DateTime(DateTime<Utc>),
    /// List of strings.
    StringVec(Vec<String>),
    /// Semantic version.
    SemVer(Version),
}

impl Display for UserValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            UserValue::StringVec(_) => f.write_str("<vec of strings>"),
            UserValue::String(s) => f.write_str(s),
            UserValue::Int(i) => write!(f, "{i}"),
            UserValue::UInt(u) => write!(f, "{u}"),
            UserValue::Float(n) => write!(f, "{n}"),
            UserValue::DateTime(d) => write!(f, "{d}"),
            UserValue::SemVer(v) => write!(f, "{v}"),
        }
    }
}

impl Serialize for UserValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            UserValue::Int(i) => serializer.serialize_i64(*i),
            UserValue::UInt(u) => serializer.serialize_u64(*u),
            UserValue::Float(n) => serializer.serialize_f64(*n),
            UserValue::StringVec(items) => items.serialize(serializer),
            other => serializer.collect_str(other),
        }
    }
}

/// The subject of an evaluation: an identifier plus optional well-known and custom attributes.
///
/// ```rust
/// use configcat_core::User;
/// use chrono::{TimeZone, Utc};
///
/// let user = User::new("user-id")
///     .email("john@example.com")
///     .country("Hungary")
///     .custom("Rating", 4.5)
///     .custom("RegisteredAt", Utc.with_ymd_and_hms(2023, 6, 14, 15, 27, 15).unwrap())
///     .custom("Roles", vec!["Role1", "Role2"]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct User {
    attributes: HashMap<String, UserValue>,
}

impl User {
    /// Creates a user with the given `Identifier` attribute.
    pub fn new(identifier: &str) -> Self {
        let mut attributes = HashMap::new();
        attributes.insert(IDENTIFIER.to_owned(), UserValue::from(identifier));
        Self { attributes }
    }

    /// Sets the `Email` attribute.
    pub fn email(self, email: &str) -> Self {
        self.with(EMAIL, email.into())
    }

    /// Sets the `Country` attribute.
    pub fn country(self, country: &str) -> Self {
        self.with(COUNTRY, country.into())
    }

    /// Sets a custom attribute. Keys of the well-known attributes are ignored here,
    /// use [`User::new`], [`User::email`] and [`User::country`] for them.
    pub fn custom<T: Into<UserValue>>(self, key: &str, value: T) -> Self {
        if matches!(key, IDENTIFIER | EMAIL | COUNTRY) {
            return self;
        }
        self.with(key, value.into())
    }

    fn with(mut self, key: &str, value: UserValue) -> Self {
        self.attributes.insert(key.to_owned(), value);
        self
    }

    pub(crate) fn get(&self, key: &str) -> Option<&UserValue> {
        self.attributes.get(key)
    }
}

impl UserValue {
    /// Returns the text form of the value and whether it had to be converted from a non-text type.
    pub(crate) fn as_str(&self) -> (String, bool) {
        match self {
            UserValue::String(val) => (val.clone(), false),
            UserValue::Float(val) => (float_to_str(*val), true),
            UserValue::SemVer(val) => (val.to_string(), true),
            UserValue::Int(val) => (val.to_string(), true),
            UserValue::UInt(val) => (val.to_string(), true),
            UserValue::DateTime(val) => (float_to_str(unix_seconds(val)), true),
            UserValue::StringVec(val) => match serde_json::to_string(val) {
                Ok(val) => (val, true),
                Err(_) => (String::default(), true),
            },
        }
    }

    pub(crate) fn as_float(&self) -> Option<f64> {
        match self {
            UserValue::String(val) => {
                let trimmed = val.trim();
                match trimmed {
                    "Infinity" | "+Infinity" => Some(f64::INFINITY),
                    "-Infinity" => Some(f64::NEG_INFINITY),
                    "NaN" => Some(f64::NAN),
                    _ => trimmed.replace(',', ".").parse().ok(),
                }
            }
            UserValue::Int(val) => Some(*val as f64),
            UserValue::UInt(val) => Some(*val as f64),
            UserValue::Float(val) => Some(*val),
            _ => None,
        }
    }

    /// Reads the value as seconds elapsed since the Unix epoch.
    pub(crate) fn as_timestamp(&self) -> Option<f64> {
        match self {
            UserValue::DateTime(val) => Some(unix_seconds(val)),
            _ => self.as_float(),
        }
    }

    /// Reads the value as a semantic version. Build metadata is dropped, it takes no part in comparisons.
    pub(crate) fn as_semver(&self) -> Option<Version> {
        match self {
            UserValue::SemVer(val) => Some(strip_build(val.clone())),
            UserValue::String(val) => parse_semver(val),
            _ => None,
        }
    }

    pub(crate) fn as_str_vec(&self) -> Option<Vec<String>> {
        match self {
            UserValue::StringVec(val) => Some(val.clone()),
            UserValue::String(val) => serde_json::from_str::<Vec<String>>(val).ok(),
            _ => None,
        }
    }
}

pub(crate) fn parse_semver(val: &str) -> Option<Version> {
    Version::parse(val.trim()).ok().map(strip_build)
}

fn strip_build(mut ver: Version) -> Version {
    ver.build = BuildMetadata::EMPTY;
    ver
}

fn unix_seconds(val: &DateTime<Utc>) -> f64 {
    val.timestamp_millis() as f64 / 1000.0
}

fn float_to_str(val: f64) -> String {
    if val.is_nan() {
        "NaN".to_owned()
    } else if val.is_infinite() && val.is_sign_positive() {
        "Infinity".to_owned()
    } else if val.is_infinite() {
        "-Infinity".to_owned()
    } else {
        val.to_string()
    }
}

/// Serializes the well-known attributes first, then the custom ones ordered by key.
impl Serialize for User {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let custom: BTreeMap<&String, &UserValue> = self
            .attributes
            .iter()
            .filter(|(key, _)| !matches!(key.as_str(), IDENTIFIER | EMAIL | COUNTRY))
            .collect();

        let mut map = serializer.serialize_map(Some(self.attributes.len()))?;
        for key in [IDENTIFIER, EMAIL, COUNTRY] {
            if let Some(val) = self.attributes.get(key) {
                map.serialize_entry(key, val)?;
            }
        }
        for (key, val) in custom {
            map.serialize_entry(key, val)?;
        }
        map.end()
    }
}

impl Display for User {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let json = serde_json::to_string(self).unwrap_or_else(|_| "<invalid user>".to_owned());
        f.write_str(&json)
    }
}

impl From<Vec<&str>> for UserValue {
    fn from(items: Vec<&str>) -> Self {
        UserValue::StringVec(items.into_iter().map(str::to_owned).collect())
    }
}

impl_from_variant!(UserValue::String: String);
impl_from_variant!(UserValue::String: into &str);
impl_from_variant!(UserValue::DateTime: DateTime<Utc>);
impl_from_variant!(UserValue::StringVec: Vec<String>);
impl_from_variant!(UserValue::SemVer: Version);
impl_from_variant!(UserValue::Float: into f64, f32);
impl_from_variant!(UserValue::UInt: into u8, u16, u32, u64);
impl_from_variant!(UserValue::Int: into i8, i16, i32, i64);
