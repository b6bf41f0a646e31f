use crate::cache::EmptyConfigCache;
use crate::constants::{EU_CDN_URL, GLOBAL_CDN_URL, SDK_KEY_PROXY_PREFIX};
use crate::errors::{ClientError, ErrorKind};
use crate::fetch::fetcher::ConfigFetcher;
use crate::hooks::Hooks;
use crate::model::enums::DataGovernance;
use crate::modes::PollingMode;
use crate::r#override::{FlagOverrides, OptionalOverrides};
use crate::{Client, ConfigCache, OverrideBehavior, OverrideDataSource, User};
use std::time::Duration;

const SDK_KEY_PREFIX: &str = "configcat-sdk-1";
const SDK_KEY_SECTION_LENGTH: usize = 22;

/// Resolved settings shared by the [`Client`] and its config service.
pub struct ClientOptions {
    pub(crate) sdk_key: String,
    pub(crate) offline: bool,
    /// CDN or custom URL the first download goes to.
    pub(crate) base_url: String,
    /// Whether `base_url` was set explicitly rather than derived from the data governance.
    pub(crate) custom_url: bool,
    pub(crate) http_timeout: Duration,
    pub(crate) cache: Box<dyn ConfigCache>,
    pub(crate) overrides: Option<FlagOverrides>,
    pub(crate) polling_mode: PollingMode,
    pub(crate) max_init_wait_time: Duration,
    pub(crate) default_user: Option<User>,
    pub(crate) hooks: Hooks,
}

/// Configures and creates a [`Client`]. Obtained from [`Client::builder`].
///
/// Every option has a default: auto polling every 60 seconds, global CDN, 30 seconds HTTP
/// timeout, 5 seconds initial wait, no cache, no overrides, online.
///
/// ```no_run
/// use std::time::Duration;
/// use configcat_core::{Client, DataGovernance, PollingMode, User};
///
/// let client = Client::builder("SDK_KEY")
///     .polling_mode(PollingMode::LazyLoad(Duration::from_secs(120)))
///     .data_governance(DataGovernance::EU)
///     .default_user(User::new("user-id"))
///     .build()
///     .unwrap();
/// ```
pub struct ClientBuilder {
    sdk_key: String,
    base_url: Option<String>,
    data_governance: DataGovernance,
    http_timeout: Duration,
    cache: Option<Box<dyn ConfigCache>>,
    overrides: Option<FlagOverrides>,
    offline: bool,
    polling_mode: PollingMode,
    max_init_wait_time: Duration,
    default_user: Option<User>,
    hooks: Hooks,
    fetcher: Option<Box<dyn ConfigFetcher>>,
}

impl ClientBuilder {
    pub(crate) fn new(sdk_key: &str) -> Self {
        Self {
            sdk_key: sdk_key.to_owned(),
            base_url: None,
            data_governance: DataGovernance::Global,
            http_timeout: Duration::from_secs(30),
            cache: None,
            overrides: None,
            offline: false,
            polling_mode: PollingMode::AutoPoll(Duration::from_secs(60)),
            max_init_wait_time: Duration::from_secs(5),
            default_user: None,
            hooks: Hooks::default(),
            fetcher: None,
        }
    }

    /// Starts the client without network access. See [`Client::online`].
    pub fn offline(mut self, offline: bool) -> Self {
        self.offline = offline;
        self
    }

    /// Limits how long a single config JSON download may take.
    pub fn http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    /// Downloads the config JSON from `base_url` instead of the ConfigCat CDN,
    /// e.g. from a proxy. Takes precedence over [`ClientBuilder::data_governance`].
    pub fn base_url(mut self, base_url: &str) -> Self {
        self.base_url = Some(base_url.to_owned());
        self
    }

    /// Picks the CDN region. Should match the data governance setting of the ConfigCat dashboard.
    pub fn data_governance(mut self, data_governance: DataGovernance) -> Self {
        self.data_governance = data_governance;
        self
    }

    /// Persists the downloaded config JSON in an external cache.
    ///
    /// ```rust
    /// use configcat_core::{Client, ConfigCache};
    /// use std::collections::HashMap;
    /// use std::sync::Mutex;
    ///
    /// #[derive(Default)]
    /// struct MemoryCache(Mutex<HashMap<String, String>>);
    ///
    /// impl ConfigCache for MemoryCache {
    ///     fn read(&self, key: &str) -> Option<String> {
    ///         self.0.lock().ok()?.get(key).cloned()
    ///     }
    ///
    ///     fn write(&self, key: &str, value: &str) {
    ///         if let Ok(mut map) = self.0.lock() {
    ///             map.insert(key.to_owned(), value.to_owned());
    ///         }
    ///     }
    /// }
    ///
    /// let builder = Client::builder("SDK_KEY").cache(Box::new(MemoryCache::default()));
    /// ```
    pub fn cache(mut self, cache: Box<dyn ConfigCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Selects when the config JSON is downloaded.
    pub fn polling_mode(mut self, polling_mode: PollingMode) -> Self {
        self.polling_mode = polling_mode;
        self
    }

    /// Adds locally defined settings, combined with the downloaded ones as `behavior` says.
    ///
    /// ```rust
    /// use configcat_core::{Client, MapDataSource, OverrideBehavior, Value};
    ///
    /// let builder = Client::builder("SDK_KEY").overrides(
    ///     Box::new(MapDataSource::from([("flag", Value::Bool(true))])),
    ///     OverrideBehavior::LocalOverRemote,
    /// );
    /// ```
    pub fn overrides(
        mut self,
        source: Box<dyn OverrideDataSource>,
        behavior: OverrideBehavior,
    ) -> Self {
        self.overrides = Some(FlagOverrides::new(source, behavior));
        self
    }

    /// How long an evaluation in [`PollingMode::AutoPoll`] mode waits for the first download.
    pub fn max_init_wait_time(mut self, max_init_wait_time: Duration) -> Self {
        self.max_init_wait_time = max_init_wait_time;
        self
    }

    /// The [`User`] evaluations fall back to when called without one.
    pub fn default_user(mut self, user: User) -> Self {
        self.default_user = Some(user);
        self
    }

    /// Callbacks notified about readiness, config changes, evaluations and errors.
    ///
    /// ```rust
    /// use configcat_core::{Client, Hooks};
    ///
    /// let builder = Client::builder("SDK_KEY")
    ///     .hooks(Hooks::new().on_error(|err| eprintln!("{err}")));
    /// ```
    pub fn hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Replaces the HTTP download with a custom [`ConfigFetcher`]. The URL, data governance
    /// and timeout options are ignored then.
    pub fn fetcher(mut self, fetcher: Box<dyn ConfigFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Creates the [`Client`].
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorKind::InvalidSdkKey`] when the SDK key is empty or malformed
    /// (the format isn't checked in [`OverrideBehavior::LocalOnly`] mode), and with
    /// [`ErrorKind::HttpClientInitFailure`] when the HTTP client can't be set up.
    pub fn build(self) -> Result<Client, ClientError> {
        if self.sdk_key.is_empty() {
            return Err(ClientError::new(
                ErrorKind::InvalidSdkKey,
                "SDK Key cannot be empty".to_owned(),
            ));
        }
        if !self.overrides.is_local() && !is_valid_sdk_key(&self.sdk_key, self.base_url.is_some()) {
            return Err(ClientError::new(
                ErrorKind::InvalidSdkKey,
                format!("SDK Key '{}' is invalid.", self.sdk_key),
            ));
        }
        let (options, fetcher) = self.into_parts();
        Client::with_options(options, fetcher)
    }

    pub(crate) fn build_options(self) -> ClientOptions {
        self.into_parts().0
    }

    fn into_parts(self) -> (ClientOptions, Option<Box<dyn ConfigFetcher>>) {
        let custom_url = self.base_url.is_some();
        let cdn_url = match self.data_governance {
            DataGovernance::Global => GLOBAL_CDN_URL,
            DataGovernance::EU => EU_CDN_URL,
        };
        let base_url = self.base_url.unwrap_or_else(|| cdn_url.to_owned());
        let options = ClientOptions {
            sdk_key: self.sdk_key,
            offline: self.offline,
            base_url,
            custom_url,
            http_timeout: self.http_timeout,
            cache: self.cache.unwrap_or_else(|| Box::new(EmptyConfigCache::new())),
            overrides: self.overrides,
            polling_mode: self.polling_mode,
            max_init_wait_time: self.max_init_wait_time,
            default_user: self.default_user,
            hooks: self.hooks,
        };
        (options, self.fetcher)
    }
}

/// Accepts `<22 chars>/<22 chars>`, `configcat-sdk-1/<22 chars>/<22 chars>`, and any
/// `configcat-proxy/...` key when a custom URL is set.
fn is_valid_sdk_key(sdk_key: &str, custom_url: bool) -> bool {
    if custom_url
        && sdk_key
            .strip_prefix(SDK_KEY_PROXY_PREFIX)
            .is_some_and(|rest| !rest.is_empty())
    {
        return true;
    }
    let section = |s: &str| s.len() == SDK_KEY_SECTION_LENGTH;
    match sdk_key.split('/').collect::<Vec<_>>().as_slice() {
        [env, key] => section(env) && section(key),
        [prefix, env, key] => *prefix == SDK_KEY_PREFIX && section(env) && section(key),
        _ => false,
    }
}
