use crate::model::config::Config;
use crate::{OverrideBehavior, OverrideDataSource};
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

pub mod behavior;
pub mod file;
pub mod map;
pub mod source;

pub trait OptionalOverrides {
    fn is_local(&self) -> bool;
}

pub struct FlagOverrides {
    behavior: OverrideBehavior,
    source: Box<dyn OverrideDataSource>,
    local: Arc<Config>,
}

impl FlagOverrides {
    pub fn new(source: Box<dyn OverrideDataSource>, behavior: OverrideBehavior) -> Self {
        let local = Arc::new(Config::from_settings(source.settings().clone()));
        Self {
            behavior,
            source,
            local,
        }
    }

    /// Combines the remote config with the local overrides according to the override behavior.
    pub fn apply(&self, remote: &Arc<Config>) -> Arc<Config> {
        match self.behavior {
            OverrideBehavior::LocalOnly => Arc::clone(&self.local),
            OverrideBehavior::LocalOverRemote => {
                Arc::new(remote.merged_with(self.source.settings(), true))
            }
            OverrideBehavior::RemoteOverLocal => {
                Arc::new(remote.merged_with(self.source.settings(), false))
            }
        }
    }
}

impl OptionalOverrides for Option<&FlagOverrides> {
    fn is_local(&self) -> bool {
        if let Some(ov) = self {
            return matches!(ov.behavior, OverrideBehavior::LocalOnly);
        }
        false
    }
}

impl OptionalOverrides for Option<FlagOverrides> {
    fn is_local(&self) -> bool {
        self.as_ref().is_local()
    }
}

impl Debug for FlagOverrides {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlagOverrides")
            .field("behavior", &self.behavior)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod override_tests {
    use crate::model::config::Config;
    use crate::r#override::{FlagOverrides, OptionalOverrides};
    use crate::{MapDataSource, OverrideBehavior, Value};
    use std::sync::Arc;

    fn remote() -> Arc<Config> {
        Arc::new(
            serde_json::from_str(
                r#"{"f": {"remoteOnly": {"t": 0, "v": {"b": true}}, "shared": {"t": 1, "v": {"s": "remote"}}}}"#,
            )
            .unwrap(),
        )
    }

    fn overrides(behavior: OverrideBehavior) -> FlagOverrides {
        FlagOverrides::new(
            Box::new(MapDataSource::from([
                ("shared", Value::String("local".to_owned())),
                ("localOnly", Value::Int(5)),
            ])),
            behavior,
        )
    }

    fn string_val(config: &Config, key: &str) -> Option<String> {
        config.settings[key].value.string_val.clone()
    }

    #[test]
    fn local_only() {
        let ov = overrides(OverrideBehavior::LocalOnly);
        assert!(Some(&ov).is_local());
        let config = ov.apply(&remote());
        assert_eq!(config.keys().collect::<Vec<&str>>(), vec!["localOnly", "shared"]);
        assert_eq!(string_val(&config, "shared").as_deref(), Some("local"));
    }

    #[test]
    fn local_over_remote() {
        let ov = overrides(OverrideBehavior::LocalOverRemote);
        assert!(!Some(&ov).is_local());
        let config = ov.apply(&remote());
        assert_eq!(config.settings.len(), 3);
        assert_eq!(string_val(&config, "shared").as_deref(), Some("local"));
        assert_eq!(config.keys().next(), Some("remoteOnly"));
    }

    #[test]
    fn remote_over_local() {
        let config = overrides(OverrideBehavior::RemoteOverLocal).apply(&remote());
        assert_eq!(config.settings.len(), 3);
        assert_eq!(string_val(&config, "shared").as_deref(), Some("remote"));
        assert_eq!(config.settings["localOnly"].value.int_val, Some(5));
    }
}
