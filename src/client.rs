use crate::builder::{ClientBuilder, ClientOptions};
use crate::errors::ErrorKind;
use crate::eval::details::EvaluationDetails;
use crate::eval::evaluator::eval_flag;
use crate::fetch::fetcher::ConfigFetcher;
use crate::fetch::service::ConfigService;
use crate::value::{Value, ValuePrimitive};
use crate::{ClientCacheState, ClientError, Config, User};
use chrono::{DateTime, Utc};
use log::{error, warn};
use std::any::type_name;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

/// Evaluates feature flags and settings against the config JSON kept up to date by its
/// polling mode.
///
/// All evaluation methods are infallible: when something goes wrong they log the problem,
/// notify [`crate::Hooks::on_error`] where relevant and return the default value.
///
/// ```no_run
/// use configcat_core::{Client, User};
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() {
///     let client = Client::new("SDK_KEY").unwrap();
///     let _ = client.wait_for_ready(Duration::from_secs(5)).await;
///
///     let user = User::new("user-id").country("Hungary");
///     let price: f64 = client.get_value("price", Some(user.clone()), 9.99).await;
///     let details = client.get_value_details("banner", Some(user), String::new()).await;
///     if let Some(rule) = details.matched_targeting_rule {
///         println!("served by a rule with {} conditions", rule.conditions.as_ref().map_or(0, Vec::len));
///     }
///
///     client.close().await;
/// }
/// ```
pub struct Client {
    options: Arc<ClientOptions>,
    service: ConfigService,
}

impl Client {
    pub(crate) fn with_options(
        options: ClientOptions,
        fetcher: Option<Box<dyn ConfigFetcher>>,
    ) -> Result<Self, ClientError> {
        let options = Arc::new(options);
        let service = match fetcher {
            Some(fetcher) => ConfigService::with_fetcher(Arc::clone(&options), fetcher),
            None => ConfigService::new(Arc::clone(&options))?,
        };
        Ok(Self { options, service })
    }

    /// Starts configuring a client for `sdk_key`.
    pub fn builder(sdk_key: &str) -> ClientBuilder {
        ClientBuilder::new(sdk_key)
    }

    /// Creates a client with the default options of [`ClientBuilder`].
    ///
    /// # Errors
    ///
    /// See [`ClientBuilder::build`].
    pub fn new(sdk_key: &str) -> Result<Self, ClientError> {
        ClientBuilder::new(sdk_key).build()
    }

    /// Downloads the config JSON right away, regardless of the polling mode.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorKind::OfflineClient`] in offline mode, with [`ErrorKind::LocalOnlyClient`]
    /// when using [`crate::OverrideBehavior::LocalOnly`], and with the fetch error when the
    /// download doesn't succeed.
    pub async fn refresh(&self) -> Result<(), ClientError> {
        self.service.refresh().await
    }

    /// Evaluates `key` for `user` (or the default user) and returns the value as `T`.
    ///
    /// `default` is returned when the key is missing, the evaluation fails, or the setting's
    /// type doesn't match `T`.
    pub async fn get_value<T: ValuePrimitive + Clone + Default>(
        &self,
        key: &str,
        user: Option<User>,
        default: T,
    ) -> T {
        self.get_value_details(key, user, default).await.value
    }

    /// Like [`Client::get_value`], with the matched rule or percentage option, the variation ID
    /// and the failure, if any.
    pub async fn get_value_details<T: ValuePrimitive + Clone + Default>(
        &self,
        key: &str,
        user: Option<User>,
        default: T,
    ) -> EvaluationDetails<T> {
        let (config, fetch_time) = self.config().await;
        let mut details =
            self.eval_details(&config, fetch_time, key, user, Some(default.clone().into()));
        let mismatch = details
            .value
            .as_ref()
            .filter(|val| details.error.is_none() && T::from_value(val).is_none())
            .map(Value::setting_type);
        if let Some(setting_type) = mismatch {
            let err = ClientError::new(ErrorKind::SettingValueTypeMismatch, format!("The type of a setting must match the requested type. Setting's type was '{setting_type}' but the requested type was '{}'. Learn more: https://configcat.com/docs/sdk-reference/rust/#setting-type-mapping", type_name::<T>()));
            error!(event_id = err.kind.code(); "{}", err);
            details = EvaluationDetails {
                fetch_time,
                ..EvaluationDetails::from_err(Some(default.clone().into()), key, details.user, err)
            };
        }
        self.options.hooks.flag_evaluated(&details);
        let value = details
            .value
            .as_ref()
            .and_then(T::from_value)
            .unwrap_or(default);
        details.with_value(value)
    }

    /// Evaluates `key` without a default value. The result carries the [`Value`] as served,
    /// or [`None`] on failure.
    pub async fn get_flag_details(
        &self,
        key: &str,
        user: Option<User>,
    ) -> EvaluationDetails<Option<Value>> {
        let (config, fetch_time) = self.config().await;
        let details = self.eval_details(&config, fetch_time, key, user, None);
        self.options.hooks.flag_evaluated(&details);
        details
    }

    /// Evaluates every setting. Settings that fail to evaluate are left out.
    pub async fn get_all_values(&self, user: Option<User>) -> HashMap<String, Value> {
        self.get_all_details(user)
            .await
            .into_iter()
            .filter_map(|details| details.value.map(|value| (details.key, value)))
            .collect()
    }

    /// Evaluates every setting, in the order they appear in the config JSON.
    pub async fn get_all_details(
        &self,
        user: Option<User>,
    ) -> Vec<EvaluationDetails<Option<Value>>> {
        let (config, fetch_time) = self.config().await;
        let user = user.or_else(|| self.options.default_user.clone());
        config
            .keys()
            .map(|key| {
                let details = self.eval_details(&config, fetch_time, key, user.clone(), None);
                self.options.hooks.flag_evaluated(&details);
                details
            })
            .collect()
    }

    /// Keys of all settings in config JSON order. Empty when there's no config JSON.
    pub async fn get_all_keys(&self) -> Vec<String> {
        let (config, _) = self.config().await;
        if config.settings.is_empty() {
            error!(event_id = ErrorKind::ConfigJsonNotAvailable.code(); "Config JSON is not present. Returning empty vector.");
            return vec![];
        }
        config.keys().map(str::to_owned).collect()
    }

    /// Stops network access. Evaluations keep working from the last known config JSON.
    pub async fn offline(&self) {
        self.service.set_offline(true).await;
    }

    /// Resumes network access and polling.
    pub async fn online(&self) {
        self.service.set_offline(false).await;
    }

    /// Whether the client is in offline mode.
    pub fn is_offline(&self) -> bool {
        self.service.is_offline()
    }

    /// Waits until the client finished initializing, at most `wait_timeout`.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorKind::ClientInitTimedOut`] when the time runs out first.
    pub async fn wait_for_ready(
        &self,
        wait_timeout: Duration,
    ) -> Result<ClientCacheState, ClientError> {
        timeout(wait_timeout, self.service.wait_for_init())
            .await
            .map_err(|_| {
                let err = ClientError::new(
                    ErrorKind::ClientInitTimedOut,
                    format!(
                        "Client initialization timed out after {}ms.",
                        wait_timeout.as_millis()
                    ),
                );
                warn!(event_id = err.kind.code(); "{}", err);
                err
            })
    }

    /// Stops background polling. Further calls do nothing.
    pub async fn close(&self) {
        self.service.close().await;
    }

    async fn config(&self) -> (Arc<Config>, Option<DateTime<Utc>>) {
        let result = self.service.config().await;
        let config = match &self.options.overrides {
            Some(overrides) => overrides.apply(result.config()),
            None => Arc::clone(result.config()),
        };
        let fetch_time = Some(*result.fetch_time()).filter(|time| *time != DateTime::<Utc>::MIN_UTC);
        (config, fetch_time)
    }

    fn eval_details(
        &self,
        config: &Config,
        fetch_time: Option<DateTime<Utc>>,
        key: &str,
        user: Option<User>,
        default: Option<Value>,
    ) -> EvaluationDetails<Option<Value>> {
        let user = user.or_else(|| self.options.default_user.clone());
        match eval_flag(config, key, user.as_ref(), default.as_ref()) {
            Ok(result) => EvaluationDetails::from_result(key, user, result, fetch_time),
            Err(err) => {
                error!(event_id = err.kind.code(); "{}", err);
                EvaluationDetails {
                    fetch_time,
                    ..EvaluationDetails::from_err(default, key, user, err)
                }
            }
        }
    }
}

#[cfg(test)]
mod client_tests {
    use crate::constants::test_constants::MOCK_KEY;
    use crate::{Client, ErrorKind, MapDataSource, OverrideBehavior, PollingMode, User, Value};

    fn local_client() -> Client {
        Client::builder(MOCK_KEY)
            .polling_mode(PollingMode::Manual)
            .overrides(
                Box::new(MapDataSource::from([
                    ("enabled", Value::Bool(true)),
                    ("name", Value::String("local".to_owned())),
                ])),
                OverrideBehavior::LocalOnly,
            )
            .default_user(User::new("default-id"))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn type_mismatch_returns_default() {
        let client = local_client();
        let details = client.get_value_details("enabled", None, 10i64).await;
        assert_eq!(details.value, 10);
        assert!(details.is_default_value);
        assert_eq!(
            details.error.unwrap().kind,
            ErrorKind::SettingValueTypeMismatch
        );
    }

    #[tokio::test]
    async fn default_user_is_applied() {
        let client = local_client();
        let details = client.get_value_details("name", None, String::new()).await;
        assert_eq!(details.value, "local");
        assert_eq!(details.user.unwrap().to_string(), r#"{"Identifier":"default-id"}"#);
        assert!(details.fetch_time.is_none());

        let details = client
            .get_value_details("name", Some(User::new("explicit")), String::new())
            .await;
        assert_eq!(details.user.unwrap().to_string(), r#"{"Identifier":"explicit"}"#);
    }

    #[tokio::test]
    async fn local_only_refresh_fails() {
        let client = local_client();
        let err = client.refresh().await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::LocalOnlyClient);
    }
}
