use crate::errors::{ClientError, ErrorKind};
use crate::model::config::Config;
use crate::r#override::source::OverrideDataSource;
use crate::{Setting, Value};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;

/// Represents feature flag and setting overrides in a simple JSON map format.
///
/// # Examples
///
/// ```no_run
/// use configcat_core::FileDataSource;
///
/// // The following JSON format is also supported to describe overrides:
/// // {
/// //   "flags": {
/// //     "bool_flag": true,
/// //     "string_setting": "example",
/// //     "number_setting": 3.14
/// //   }
/// // }
///
/// let source = FileDataSource::new("path/to/file.json").unwrap();
/// ```
#[derive(Deserialize)]
pub struct SimplifiedConfig {
    /// The feature flag override JSON map.
    pub flags: HashMap<String, serde_json::Value>,
}

/// Data source that gets the overridden feature flag or setting values from a JSON file.
pub struct FileDataSource {
    settings: HashMap<String, Setting>,
}

impl FileDataSource {
    /// Creates a new [`FileDataSource`].
    ///
    /// # Errors
    ///
    /// This method fails in the following cases:
    /// - The given file doesn't exist ([`ErrorKind::LocalFileDataSourceDoesNotExist`]).
    /// - The given file's content is not deserializable to [`SimplifiedConfig`] or [`Config`]
    ///   ([`ErrorKind::LocalFileDataSourceFailedToRead`]).
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use configcat_core::FileDataSource;
    ///
    /// let source = FileDataSource::new("path/to/file.json").unwrap();
    /// ```
    pub fn new(file_path: &str) -> Result<Self, ClientError> {
        let content = fs::read_to_string(file_path).map_err(|err| {
            ClientError::new(
                ErrorKind::LocalFileDataSourceDoesNotExist,
                format!("Cannot find the local config file '{file_path}'. ({err})"),
            )
        })?;
        let settings = parse_content(content.as_str()).map_err(|reason| {
            ClientError::new(
                ErrorKind::LocalFileDataSourceFailedToRead,
                format!("Failed to decode JSON from the local config file '{file_path}'. ({reason})"),
            )
        })?;
        Ok(FileDataSource { settings })
    }
}

fn parse_content(content: &str) -> Result<HashMap<String, Setting>, String> {
    if let Ok(simple_config) = serde_json::from_str::<SimplifiedConfig>(content) {
        let mut settings = HashMap::with_capacity(simple_config.flags.len());
        for (key, json_val) in &simple_config.flags {
            let Ok(val) = Value::try_from(json_val) else {
                return Err(format!("Value of override '{key}' is invalid"));
            };
            settings.insert(key.clone(), Setting::from(&val));
        }
        return Ok(settings);
    }
    serde_json::from_str::<Config>(content)
        .map(|config| config.settings)
        .map_err(|err| err.to_string())
}

impl OverrideDataSource for FileDataSource {
    fn settings(&self) -> &HashMap<String, Setting> {
        &self.settings
    }
}
