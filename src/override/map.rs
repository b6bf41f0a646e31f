use crate::r#override::source::OverrideDataSource;
use crate::{Setting, Value};
use std::collections::HashMap;

/// Overrides given as plain key/value pairs. Every value becomes a setting without targeting.
///
/// ```rust
/// use std::collections::HashMap;
/// use configcat_core::{MapDataSource, Value};
///
/// let from_array = MapDataSource::from([("flag", Value::Bool(true)), ("limit", Value::Int(10))]);
/// let from_map = MapDataSource::from(HashMap::from([("flag".to_owned(), Value::Bool(true))]));
/// let collected: MapDataSource = vec![("name", Value::from("x"))].into_iter().collect();
/// ```
pub struct MapDataSource {
    overrides: HashMap<String, Setting>,
}

impl OverrideDataSource for MapDataSource {
    fn settings(&self) -> &HashMap<String, Setting> {
        &self.overrides
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for MapDataSource {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(pairs: I) -> Self {
        let overrides = pairs
            .into_iter()
            .map(|(key, value)| (key.into(), Setting::from(&value)))
            .collect();
        MapDataSource { overrides }
    }
}

impl<K: Into<String>> From<HashMap<K, Value>> for MapDataSource {
    fn from(map: HashMap<K, Value>) -> Self {
        map.into_iter().collect()
    }
}

impl<K: Into<String>, const N: usize> From<[(K, Value); N]> for MapDataSource {
    fn from(pairs: [(K, Value); N]) -> Self {
        pairs.into_iter().collect()
    }
}
