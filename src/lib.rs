//! Feature flag evaluation and config JSON synchronization core.
//!
//! The crate keeps a local copy of a ConfigCat config JSON up to date (see [`PollingMode`])
//! and evaluates feature flags and settings against a [`User`] by walking the targeting rules,
//! segments, percentage options and prerequisite flags of the config.
//!
//! # Examples
//!
//! ```no_run
//! use std::time::Duration;
//! use configcat_core::{Client, PollingMode, User};
//!
//! #[tokio::main]
//! async fn main() {
//!     let client = Client::builder("SDK_KEY")
//!         .polling_mode(PollingMode::AutoPoll(Duration::from_secs(60)))
//!         .build()
//!         .unwrap();
//!
//!     let user = User::new("user-id").email("john@example.com");
//!     let enabled = client.get_value("isFeatureEnabled", Some(user), false).await;
//!
//!     client.close().await;
//! }
//! ```
//!
//! The evaluator is also usable on its own:
//!
//! ```rust
//! use configcat_core::{evaluate, Config, User, Value};
//!
//! let config: Config = serde_json::from_str(r#"{"f": {"flag": {"t": 0, "v": {"b": true}}}}"#).unwrap();
//! let details = evaluate(&config, "flag", Some(&User::new("id")), Some(Value::Bool(false)));
//! assert_eq!(details.value, Some(Value::Bool(true)));
//! ```

#![warn(missing_docs)]

#[macro_use]
mod macros;
mod builder;
mod cache;
mod client;
mod constants;
mod errors;
mod eval;
mod fetch;
mod hooks;
mod model;
mod modes;
mod r#override;
mod registry;
mod user;
mod utils;
mod value;

pub use cache::{ConfigCache, EmptyConfigCache};
pub use client::Client;
pub use constants::PKG_VERSION;
pub use errors::{ClientError, ErrorKind};
pub use eval::details::EvaluationDetails;
pub use eval::evaluator::evaluate;
pub use fetch::fetcher::{ConfigFetcher, FetchResponse, Fetcher};
pub use hooks::Hooks;
pub use registry::ClientRegistry;

pub use model::config::{
    entry_from_json, Condition, Config, ConfigEntry, Error as ConfigParseError, PercentageOption,
    PrerequisiteFlagCondition, Segment, SegmentCondition, ServedValue, Setting, SettingValue,
    TargetingRule, UserCondition,
};

pub use model::enums::{
    ClientCacheState, DataGovernance, PrerequisiteFlagComparator, SegmentComparator, SettingType,
    UserComparator,
};

pub use r#override::{
    behavior::OverrideBehavior, file::FileDataSource, file::SimplifiedConfig, map::MapDataSource,
    source::OverrideDataSource,
};

pub use builder::ClientBuilder;
pub use modes::PollingMode;

pub use user::{User, UserValue};
pub use value::{Value, ValuePrimitive};
