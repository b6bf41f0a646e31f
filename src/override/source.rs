use crate::Setting;
use std::collections::HashMap;

/// Supplies locally defined settings that are combined with, or replace, the downloaded ones
/// depending on the [`crate::OverrideBehavior`].
pub trait OverrideDataSource: Sync + Send {
    /// The overriding settings by key.
    fn settings(&self) -> &HashMap<String, Setting>;
}
