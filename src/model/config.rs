use crate::model::enums::{
    PrerequisiteFlagComparator, RedirectMode, SegmentComparator, SettingType, UserComparator,
};
use crate::value::Value;
use chrono::{DateTime, Utc};
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use thiserror::Error;

const INVALID_VALUE: &str = "<invalid value>";
const MAX_LISTED_ITEMS: usize = 10;

/// Error of parsing a config JSON or a cached config entry.
#[derive(Error, Debug)]
pub enum Error {
    /// The content is not a valid config JSON or cache entry.
    #[error("JSON parsing failed. ({0})")]
    Parse(String),
}

/// A downloaded or cached config JSON together with its HTTP metadata.
///
/// The default value is the empty sentinel: it has no ETag and no JSON, and its fetch
/// time is the earliest representable time, so it never counts as fresh.
#[derive(Debug, Clone)]
pub struct ConfigEntry {
    /// The parsed config.
    pub config: Arc<Config>,
    /// The config JSON the config was parsed from.
    pub config_json: String,
    /// The ETag the config JSON was served with.
    pub etag: String,
    /// The time the config JSON was downloaded or last confirmed as up to date.
    pub fetch_time: DateTime<Utc>,
}

impl Default for ConfigEntry {
    fn default() -> Self {
        ConfigEntry {
            config: Arc::default(),
            config_json: String::new(),
            etag: String::new(),
            fetch_time: DateTime::<Utc>::MIN_UTC,
        }
    }
}

/// Entries are equal when they hold the same download, regardless of when it happened.
impl PartialEq for ConfigEntry {
    fn eq(&self, other: &Self) -> bool {
        (&self.etag, &self.config_json) == (&other.etag, &other.config_json)
    }
}

impl ConfigEntry {
    /// Formats the entry for the [`crate::ConfigCache`] as `<fetch time ms>\n<etag>\n<config JSON>`.
    pub fn serialize(&self) -> String {
        format!(
            "{}\n{}\n{}",
            self.fetch_time.timestamp_millis(),
            self.etag,
            self.config_json
        )
    }

    /// Tells whether this is the empty entry that stands for "no config JSON yet".
    pub fn is_empty(&self) -> bool {
        self.etag.is_empty() && self.config_json.is_empty()
    }

    /// Returns a copy of the entry with its fetch time set to `time`.
    pub fn with_time(&self, time: DateTime<Utc>) -> Self {
        ConfigEntry {
            fetch_time: time,
            ..self.clone()
        }
    }
}

/// Parses `json` into a [`ConfigEntry`] served with `etag` at `fetch_time`.
///
/// # Errors
///
/// Fails with [`Error::Parse`] when `json` is not a valid config JSON.
pub fn entry_from_json(
    json: &str,
    etag: &str,
    fetch_time: DateTime<Utc>,
) -> Result<ConfigEntry, Error> {
    let config: Config =
        serde_json::from_str(json).map_err(|err| Error::Parse(err.to_string()))?;
    Ok(ConfigEntry {
        config: Arc::new(config),
        config_json: json.to_owned(),
        etag: etag.to_owned(),
        fetch_time,
    })
}

/// Parses a [`ConfigEntry`] written by [`ConfigEntry::serialize`].
pub fn entry_from_cached_json(cached_json: &str) -> Result<ConfigEntry, Error> {
    let mut parts = cached_json.splitn(3, '\n');
    let (Some(time), Some(etag), Some(config_json)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(Error::Parse("Number of values is fewer than expected".to_owned()));
    };
    let millis = time
        .parse::<i64>()
        .map_err(|_| Error::Parse(format!("Invalid fetch time: '{time}'")))?;
    let fetch_time = DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| Error::Parse(format!("Invalid unix milliseconds value: '{millis}'")))?;
    if etag.is_empty() {
        return Err(Error::Parse("Empty eTag value".to_owned()));
    }
    entry_from_json(config_json, etag, fetch_time)
}

/// Describes a ConfigCat config JSON.
#[derive(Deserialize, Debug, Default, Clone)]
#[serde(from = "RawConfig")]
pub struct Config {
    /// Settings by key.
    pub settings: HashMap<String, Setting>,
    /// Segments, referenced by index from segment conditions.
    pub segments: Vec<Arc<Segment>>,
    /// Salt of the hashed comparison values.
    pub salt: Option<String>,

    pub(crate) preferences: Option<Preferences>,
    pub(crate) keys: Vec<String>,
}

impl Config {
    /// Returns the setting keys in the order they appear in the config JSON.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(String::as_str)
    }

    /// Creates a new [`Config`] extended with the settings of `overlay`.
    ///
    /// On key collision the overlay's setting wins when `overwrite` is set, otherwise the current one is kept.
    pub(crate) fn merged_with(&self, overlay: &HashMap<String, Setting>, overwrite: bool) -> Config {
        let mut merged = self.clone();
        let mut overlay_keys = overlay.keys().collect::<Vec<&String>>();
        overlay_keys.sort();
        for key in overlay_keys {
            if !merged.settings.contains_key(key) {
                merged.keys.push(key.clone());
            } else if !overwrite {
                continue;
            }
            merged.settings.insert(key.clone(), overlay[key].clone());
        }
        merged
    }

    pub(crate) fn from_settings(settings: HashMap<String, Setting>) -> Config {
        let mut keys = settings.keys().cloned().collect::<Vec<String>>();
        keys.sort();
        Config {
            settings,
            keys,
            ..Config::default()
        }
    }
}

#[derive(Deserialize)]
struct RawConfig {
    #[serde(rename = "f", deserialize_with = "ordered_settings")]
    settings: Vec<(String, Setting)>,
    #[serde(rename = "s")]
    segments: Option<Vec<Arc<Segment>>>,
    #[serde(rename = "p")]
    preferences: Option<Preferences>,
}

impl From<RawConfig> for Config {
    fn from(raw: RawConfig) -> Self {
        let salt = raw.preferences.as_ref().and_then(|pref| pref.salt.clone());
        let segments = raw.segments.unwrap_or_default();
        let mut keys = Vec::with_capacity(raw.settings.len());
        let mut settings = HashMap::with_capacity(raw.settings.len());
        for (key, mut setting) in raw.settings {
            setting.salt.clone_from(&salt);
            resolve_segments(&mut setting, &segments);
            if settings.insert(key.clone(), setting).is_none() {
                keys.push(key);
            }
        }
        Config {
            settings,
            segments,
            salt,
            preferences: raw.preferences,
            keys,
        }
    }
}

fn resolve_segments(setting: &mut Setting, segments: &[Arc<Segment>]) {
    let Some(rules) = setting.targeting_rules.as_mut() else {
        return;
    };
    for rule in rules {
        // Freshly deserialized rules are not shared yet.
        let Some(rule_mut) = Arc::get_mut(rule) else {
            continue;
        };
        let Some(conditions) = rule_mut.conditions.as_mut() else {
            continue;
        };
        for cond in conditions {
            if let Some(segment_condition) = cond.segment_condition.as_mut() {
                segment_condition.segment = segments.get(segment_condition.index).cloned();
            }
        }
    }
}

fn ordered_settings<'de, D>(deserializer: D) -> Result<Vec<(String, Setting)>, D::Error>
where
    D: Deserializer<'de>,
{
    struct OrderedVisitor;

    impl<'de> Visitor<'de> for OrderedVisitor {
        type Value = Vec<(String, Setting)>;

        fn expecting(&self, f: &mut Formatter) -> std::fmt::Result {
            f.write_str("a map of settings")
        }

        fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut result = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some(entry) = map.next_entry::<String, Setting>()? {
                result.push(entry);
            }
            Ok(result)
        }
    }

    deserializer.deserialize_map(OrderedVisitor)
}

#[derive(Deserialize, Debug, Clone)]
pub struct Preferences {
    #[serde(rename = "u")]
    pub url: Option<String>,
    #[serde(rename = "r")]
    pub redirect: Option<RedirectMode>,
    #[serde(rename = "s")]
    pub salt: Option<String>,
}

/// A feature flag or setting.
#[derive(Deserialize, Debug, Clone)]
pub struct Setting {
    /// Served when neither a targeting rule nor a percentage option applies.
    #[serde(rename = "v")]
    pub value: SettingValue,
    /// Percentage options of the setting, evaluated after the targeting rules.
    #[serde(rename = "p")]
    pub percentage_options: Option<Vec<Arc<PercentageOption>>>,
    /// Targeting rules in evaluation order. The first matching one wins.
    #[serde(rename = "r")]
    pub targeting_rules: Option<Vec<Arc<TargetingRule>>>,
    /// Variation ID of [`Setting::value`].
    #[serde(rename = "i")]
    pub variation_id: Option<String>,
    /// The user attribute the percentage options are bucketed by (`Identifier` when not set).
    #[serde(rename = "a")]
    pub percentage_attribute: Option<String>,
    /// Type of the values served by the setting.
    #[serde(rename = "t")]
    pub setting_type: SettingType,

    #[serde(skip)]
    pub(crate) salt: Option<String>,
}

impl From<&Value> for Setting {
    fn from(value: &Value) -> Self {
        Self {
            value: SettingValue::from(value),
            setting_type: value.setting_type(),
            percentage_options: None,
            targeting_rules: None,
            variation_id: None,
            percentage_attribute: None,
            salt: None,
        }
    }
}

/// A named, reusable group of user conditions.
#[derive(Deserialize, Debug)]
pub struct Segment {
    /// Name of the segment, also used as the context salt of its hashed conditions.
    #[serde(rename = "n")]
    pub name: String,
    /// Conditions that all have to hold for a user to be in the segment.
    #[serde(rename = "r")]
    pub conditions: Vec<UserCondition>,
}

/// A targeting rule: conditions plus either a served value or percentage options.
#[derive(Deserialize, Debug)]
pub struct TargetingRule {
    /// Served when all conditions hold. `None` when the rule has percentage options.
    #[serde(rename = "s")]
    pub served_value: Option<ServedValue>,
    /// Conditions that all have to hold for the rule to match.
    #[serde(rename = "c")]
    pub conditions: Option<Vec<Condition>>,
    /// Percentage options applied when all conditions hold. `None` when the rule has a served value.
    #[serde(rename = "p")]
    pub percentage_options: Option<Vec<Arc<PercentageOption>>>,
}

/// A condition of a [`TargetingRule`]. Exactly one of the fields is set.
#[derive(Deserialize, Debug)]
pub struct Condition {
    /// Condition on a user attribute.
    #[serde(rename = "u")]
    pub user_condition: Option<UserCondition>,
    /// Condition on segment membership.
    #[serde(rename = "s")]
    pub segment_condition: Option<SegmentCondition>,
    /// Condition on the value of another flag.
    #[serde(rename = "p")]
    pub prerequisite_flag_condition: Option<PrerequisiteFlagCondition>,
}

/// A condition on a [`crate::User`] attribute. The comparator decides which comparison value field is used.
#[derive(Deserialize, Debug)]
pub struct UserCondition {
    /// Single text comparison value.
    #[serde(rename = "s")]
    pub string_val: Option<String>,
    /// Numeric (or Unix timestamp) comparison value.
    #[serde(rename = "d")]
    pub float_val: Option<f64>,
    /// List of text comparison values.
    #[serde(rename = "l")]
    pub string_vec_val: Option<Vec<String>>,
    /// The comparison operator.
    #[serde(rename = "c")]
    pub comparator: UserComparator,
    /// Name of the compared user attribute.
    #[serde(rename = "a")]
    pub comp_attr: String,
}

fn plural(count: usize) -> &'static str {
    if count > 1 {
        "values"
    } else {
        "value"
    }
}

impl Display for UserCondition {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "User.{} {} ", self.comp_attr, self.comparator)?;
        let hashed = self.comparator.is_sensitive();
        match (self.float_val, &self.string_val, &self.string_vec_val) {
            (Some(num), _, _) => {
                let date = self
                    .comparator
                    .is_date()
                    .then(|| DateTime::from_timestamp_millis((num * 1000.0) as i64))
                    .flatten();
                match date {
                    Some(date) => {
                        write!(f, "'{num}' ({})", date.format("%Y-%m-%dT%H:%M:%S%.3f UTC"))
                    }
                    None => write!(f, "'{num}'"),
                }
            }
            (None, Some(_), _) if hashed => f.write_str("'<hashed value>'"),
            (None, Some(text), _) => write!(f, "'{text}'"),
            (None, None, Some(items)) if hashed => {
                write!(f, "[<{} hashed {}>]", items.len(), plural(items.len()))
            }
            (None, None, Some(items)) => {
                let shown: Vec<String> = items
                    .iter()
                    .take(MAX_LISTED_ITEMS)
                    .map(|item| format!("'{item}'"))
                    .collect();
                let shown = shown.join(", ");
                match items.len().saturating_sub(MAX_LISTED_ITEMS) {
                    0 => write!(f, "[{shown}]"),
                    rest => write!(f, "[{shown}, ... <{rest} more {}>]", plural(rest)),
                }
            }
            (None, None, None) => f.write_str(INVALID_VALUE),
        }
    }
}

/// A condition on whether the user is in a [`Segment`].
#[derive(Deserialize, Debug)]
pub struct SegmentCondition {
    /// Index of the segment in [`Config::segments`].
    #[serde(rename = "s")]
    pub index: usize,
    /// Whether the user is expected to be in or out of the segment.
    #[serde(rename = "c")]
    pub segment_comparator: SegmentComparator,

    #[serde(skip)]
    pub(crate) segment: Option<Arc<Segment>>,
}

impl Display for SegmentCondition {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = self
            .segment
            .as_ref()
            .map_or("<invalid name>", |segment| segment.name.as_str());
        write!(f, "User {} '{name}'", self.segment_comparator)
    }
}

/// A condition on the evaluated value of another flag.
#[derive(Deserialize, Debug)]
pub struct PrerequisiteFlagCondition {
    /// Key of the prerequisite flag.
    #[serde(rename = "f")]
    pub flag_key: String,
    /// Whether the prerequisite has to equal the comparison value or differ from it.
    #[serde(rename = "c")]
    pub prerequisite_comparator: PrerequisiteFlagComparator,
    /// The comparison value, of the same type as the prerequisite flag.
    #[serde(rename = "v")]
    pub flag_value: SettingValue,
}

impl Display for PrerequisiteFlagCondition {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Flag '{}' {} '{}'",
            self.flag_key, self.prerequisite_comparator, self.flag_value
        )
    }
}

/// A value served to a fraction of the users.
#[derive(Deserialize, Debug)]
pub struct PercentageOption {
    /// The served value.
    #[serde(rename = "v")]
    pub served_value: SettingValue,
    /// Size of the fraction, between 0 and 100.
    #[serde(rename = "p")]
    pub percentage: i64,
    /// Variation ID of the served value.
    #[serde(rename = "i")]
    pub variation_id: Option<String>,
}

/// The value served by a [`TargetingRule`].
#[derive(Deserialize, Debug)]
pub struct ServedValue {
    /// The served value.
    #[serde(rename = "v")]
    pub value: SettingValue,
    /// Variation ID of the served value.
    #[serde(rename = "i")]
    pub variation_id: Option<String>,
}

/// A setting value as it appears in the config JSON. The field matching the setting type is set.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct SettingValue {
    /// Value of a `bool` setting.
    #[serde(rename = "b")]
    pub bool_val: Option<bool>,
    /// Value of a text setting.
    #[serde(rename = "s")]
    pub string_val: Option<String>,
    /// Value of a decimal number setting.
    #[serde(rename = "d")]
    pub float_val: Option<f64>,
    /// Value of a whole number setting.
    #[serde(rename = "i")]
    pub int_val: Option<i64>,
}

impl From<&Value> for SettingValue {
    fn from(value: &Value) -> Self {
        SettingValue {
            bool_val: value.as_bool(),
            string_val: value.as_str(),
            float_val: value.as_float(),
            int_val: value.as_int(),
        }
    }
}

impl SettingValue {
    pub(crate) fn as_val(&self, setting_type: &SettingType) -> Option<Value> {
        match setting_type {
            SettingType::Bool => self.bool_val.map(Value::Bool),
            SettingType::String => self.string_val.clone().map(Value::String),
            SettingType::Int => self.int_val.map(Value::Int),
            SettingType::Float => self.float_val.map(Value::Float),
        }
    }

    pub(crate) fn is_valid(&self, setting_type: &SettingType) -> bool {
        match setting_type {
            SettingType::Bool => self.bool_val.is_some(),
            SettingType::String => self.string_val.is_some(),
            SettingType::Int => self.int_val.is_some(),
            SettingType::Float => self.float_val.is_some(),
        }
    }
}

impl Display for SettingValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SettingValue { bool_val: Some(b), .. } => write!(f, "{b}"),
            SettingValue { string_val: Some(text), .. } => f.write_str(text),
            SettingValue { float_val: Some(num), .. } => write!(f, "{num}"),
            SettingValue { int_val: Some(num), .. } => write!(f, "{num}"),
            _ => f.write_str(INVALID_VALUE),
        }
    }
}
