use std::pin::pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use log::{error, info, warn};
use tokio::sync::{watch, Notify, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::builder::ClientOptions;
use crate::constants::{CONFIG_FILE_NAME, SERIALIZATION_FORMAT_VERSION};
use crate::errors::{ClientError, ErrorKind};
use crate::fetch::fetcher::{ConfigFetcher, FetchResponse, Fetcher};
use crate::model::config::{entry_from_cached_json, Config, ConfigEntry};
use crate::model::enums::ClientCacheState;
use crate::modes::PollingMode;
use crate::r#override::OptionalOverrides;
use crate::utils::sha1;

/// The config served by [`ConfigService`] together with the time it was downloaded.
pub struct ConfigResult {
    config: Arc<Config>,
    fetch_time: DateTime<Utc>,
}

impl ConfigResult {
    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    pub fn fetch_time(&self) -> &DateTime<Utc> {
        &self.fetch_time
    }
}

/// The installed entry and the string it was stored in the [`crate::ConfigCache`] as.
#[derive(Default)]
struct CachedEntry {
    entry: ConfigEntry,
    serialized: String,
}

/// Single-flight bookkeeping. `generation` grows by one with every completed fetch.
#[derive(Default)]
struct FetchFlight {
    running: bool,
    generation: u64,
    last_error: Option<ClientError>,
}

struct ServiceState {
    fetcher: Box<dyn ConfigFetcher>,
    options: Arc<ClientOptions>,
    cached_entry: RwLock<CachedEntry>,
    cache_key: String,
    local_only: bool,
    offline: AtomicBool,
    init: watch::Sender<bool>,
    flight: Mutex<FetchFlight>,
    fetch_done: Notify,
}

impl ServiceState {
    fn cache_state(&self, entry: &ConfigEntry) -> ClientCacheState {
        if self.local_only {
            return ClientCacheState::HasLocalOverrideFlagDataOnly;
        }
        if entry.is_empty() {
            return ClientCacheState::NoFlagData;
        }
        match &self.options.polling_mode {
            PollingMode::Manual => ClientCacheState::HasCachedFlagDataOnly,
            PollingMode::LazyLoad(age) | PollingMode::AutoPoll(age) => {
                if entry.fetch_time > older_than(Utc::now(), *age) {
                    ClientCacheState::HasUpToDateFlagData
                } else {
                    ClientCacheState::HasCachedFlagDataOnly
                }
            }
        }
    }

    fn is_initialized(&self) -> bool {
        *self.init.borrow()
    }

    async fn initialized(&self) {
        if self.is_initialized() {
            return;
        }
        let cache_state = self.cache_state(&self.cached_entry.read().await.entry);
        self.signal_ready(cache_state);
    }

    fn signal_ready(&self, cache_state: ClientCacheState) {
        let changed = self.init.send_if_modified(|ready| {
            if *ready {
                return false;
            }
            *ready = true;
            true
        });
        if changed {
            self.options.hooks.client_ready(cache_state);
        }
    }

    fn install(&self, cached: &mut CachedEntry, entry: ConfigEntry) {
        let serialized = entry.serialize();
        self.options.cache.write(&self.cache_key, serialized.as_str());
        *cached = CachedEntry { entry, serialized };
    }

    fn flight(&self) -> MutexGuard<'_, FetchFlight> {
        self.flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_cache(&self) -> Option<String> {
        self.options
            .cache
            .read(&self.cache_key)
            .filter(|cached| !cached.is_empty())
    }
}

/// Ends the running fetch when dropped. Without an outcome (the leading future was
/// dropped mid-fetch) the generation stays put, so waiting callers retry.
struct FetchGuard<'a> {
    state: &'a ServiceState,
    outcome: Option<Option<ClientError>>,
}

impl Drop for FetchGuard<'_> {
    fn drop(&mut self) {
        {
            let mut flight = self.state.flight();
            flight.running = false;
            if let Some(error) = self.outcome.take() {
                flight.generation += 1;
                flight.last_error = error;
            }
        }
        self.state.fetch_done.notify_waiters();
    }
}

/// Keeps the locally cached config JSON up to date according to the configured [`PollingMode`].
pub struct ConfigService {
    state: Arc<ServiceState>,
    poller: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
    mode_switch: tokio::sync::Mutex<()>,
    closed: AtomicBool,
}

impl ConfigService {
    pub fn new(options: Arc<ClientOptions>) -> Result<Self, ClientError> {
        let fetcher = Fetcher::new(
            options.base_url.clone(),
            options.custom_url,
            &options.sdk_key,
            options.polling_mode.mode_identifier(),
            options.http_timeout,
        )?;
        Ok(Self::with_fetcher(options, Box::new(fetcher)))
    }

    pub fn with_fetcher(options: Arc<ClientOptions>, fetcher: Box<dyn ConfigFetcher>) -> Self {
        let cache_key = sha1(
            format!(
                "{sdk_key}_{CONFIG_FILE_NAME}_{SERIALIZATION_FORMAT_VERSION}",
                sdk_key = options.sdk_key
            )
            .as_str(),
        );
        let local_only = options.overrides.is_local();
        let initial_entry = if local_only {
            CachedEntry::default()
        } else {
            initial_entry(options.as_ref(), cache_key.as_str())
        };
        let (init, _) = watch::channel(false);
        let mut state = ServiceState {
            fetcher,
            offline: AtomicBool::new(options.offline),
            options,
            cached_entry: RwLock::new(CachedEntry::default()),
            cache_key,
            local_only,
            init,
            flight: Mutex::new(FetchFlight::default()),
            fetch_done: Notify::new(),
        };
        let initial_state = state.cache_state(&initial_entry.entry);
        *state.cached_entry.get_mut() = initial_entry;

        let service = Self {
            state: Arc::new(state),
            poller: Mutex::new(None),
            mode_switch: tokio::sync::Mutex::new(()),
            closed: AtomicBool::new(false),
        };
        if service.polls() {
            service.start_poll();
        } else {
            service.state.signal_ready(initial_state);
        }
        service
    }

    /// Returns the current config, fetching a new one first when the polling mode requires it.
    pub async fn config(&self) -> ConfigResult {
        if !self.state.local_only {
            // fetch failures are logged and reported through the error hook
            let _ = match &self.state.options.polling_mode {
                PollingMode::LazyLoad(ttl) => {
                    fetch_if_older(&self.state, older_than(Utc::now(), *ttl), false).await
                }
                PollingMode::Manual => {
                    fetch_if_older(&self.state, DateTime::<Utc>::MIN_UTC, true).await
                }
                PollingMode::AutoPoll(_) => {
                    if !self.state.is_initialized() {
                        self.wait_for_poller_init().await;
                    }
                    fetch_if_older(&self.state, DateTime::<Utc>::MIN_UTC, true).await
                }
            };
        }
        let cached = self.state.cached_entry.read().await;
        ConfigResult {
            config: Arc::clone(&cached.entry.config),
            fetch_time: cached.entry.fetch_time,
        }
    }

    /// Initiates a forced fetch of the config JSON.
    pub async fn refresh(&self) -> Result<(), ClientError> {
        if self.state.local_only {
            let msg = "Client is configured to use the LocalOnly override behavior, thus refresh() has no effect.";
            warn!(event_id = ErrorKind::LocalOnlyClient.code(); "{}", msg);
            return Err(ClientError::new(ErrorKind::LocalOnlyClient, msg.to_owned()));
        }
        if self.is_offline() {
            let msg = "Client is in offline mode, it cannot initiate HTTP calls.";
            warn!(event_id = ErrorKind::OfflineClient.code(); "{}", msg);
            return Err(ClientError::new(ErrorKind::OfflineClient, msg.to_owned()));
        }
        fetch_if_older(&self.state, DateTime::<Utc>::MAX_UTC, false).await
    }

    /// Switches between offline and online mode. Offline mode stops the background polling.
    pub async fn set_offline(&self, offline: bool) {
        let _switching = self.mode_switch.lock().await;
        if self.state.offline.swap(offline, Ordering::SeqCst) == offline {
            return;
        }
        if offline {
            info!(event_id = 5200; "Switched to OFFLINE mode.");
            self.stop_poll().await;
        } else {
            info!(event_id = 5200; "Switched to ONLINE mode.");
            if self.polls() {
                self.start_poll();
            }
        }
    }

    pub fn is_offline(&self) -> bool {
        self.state.offline.load(Ordering::SeqCst)
    }

    /// Waits until the first fetch attempt finishes (or the cache turns out to be usable)
    /// and returns the state of the locally available config.
    pub async fn wait_for_init(&self) -> ClientCacheState {
        let mut init = self.state.init.subscribe();
        // the sender is owned by the state, the channel can't close while `self` lives
        let _ = init.wait_for(|ready| *ready).await;
        self.state
            .cache_state(&self.state.cached_entry.read().await.entry)
    }

    /// Stops the background polling and waits for it to finish. Calling it more than once has no effect.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.stop_poll().await;
    }

    fn polls(&self) -> bool {
        matches!(
            self.state.options.polling_mode,
            PollingMode::AutoPoll(_)
        ) && !self.state.local_only
            && !self.is_offline()
            && !self.closed.load(Ordering::SeqCst)
    }

    async fn wait_for_poller_init(&self) {
        let mut init = self.state.init.subscribe();
        let max_wait = self.state.options.max_init_wait_time;
        if tokio::time::timeout(max_wait, init.wait_for(|ready| *ready))
            .await
            .is_err()
        {
            warn!(event_id = ErrorKind::ClientInitTimedOut.code(); "`max_init_wait_time` for the very first fetch reached ({}ms). Returning cached config.", max_wait.as_millis());
            self.state.initialized().await;
        }
    }

    fn start_poll(&self) {
        let PollingMode::AutoPoll(interval) = self.state.options.polling_mode else {
            return;
        };
        let mut poller = self.poller.lock().unwrap_or_else(PoisonError::into_inner);
        if poller.is_some() {
            return;
        }
        let state = Arc::clone(&self.state);
        let token = CancellationToken::new();
        let child = token.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let _ = fetch_if_older(&state, older_than(Utc::now(), interval / 2), false).await;
                    },
                    _ = child.cancelled() => break
                }
            }
        });
        *poller = Some((token, handle));
    }

    async fn stop_poll(&self) {
        let poller = self
            .poller
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some((token, handle)) = poller {
            token.cancel();
            if let Err(err) = handle.await {
                error!(event_id = 0; "The config poller task failed. {err}");
            }
        }
    }
}

impl Drop for ConfigService {
    fn drop(&mut self) {
        let poller = self
            .poller
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some((token, _)) = poller.as_ref() {
            token.cancel();
        }
    }
}

fn initial_entry(options: &ClientOptions, cache_key: &str) -> CachedEntry {
    let Some(serialized) = options.cache.read(cache_key).filter(|c| !c.is_empty()) else {
        return CachedEntry::default();
    };
    match entry_from_cached_json(serialized.as_str()) {
        Ok(entry) => CachedEntry { entry, serialized },
        Err(err) => {
            error!(event_id = ErrorKind::ConfigJsonCacheReadFailure.code(); "Error occurred while reading the cache. {err}");
            CachedEntry::default()
        }
    }
}

fn older_than(now: DateTime<Utc>, age: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(age)
        .ok()
        .and_then(|delta| now.checked_sub_signed(delta))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

async fn fetch_if_older(
    state: &ServiceState,
    threshold: DateTime<Utc>,
    prefer_cached: bool,
) -> Result<(), ClientError> {
    loop {
        sync_from_cache(state).await;

        let fresh = state.cached_entry.read().await.entry.fetch_time > threshold;
        if fresh || prefer_cached || state.offline.load(Ordering::SeqCst) {
            state.initialized().await;
            return Ok(());
        }

        let mut done = pin!(state.fetch_done.notified());
        done.as_mut().enable();
        let joined = {
            let mut flight = state.flight();
            if flight.running {
                Some(flight.generation)
            } else {
                flight.running = true;
                None
            }
        };
        let Some(joined) = joined else {
            break;
        };

        done.await;
        let outcome = {
            let flight = state.flight();
            (flight.generation != joined).then(|| flight.last_error.clone())
        };
        match outcome {
            Some(Some(err)) => return Err(err),
            Some(None) => return Ok(()),
            // the running fetch was abandoned before it finished
            None => {}
        }
    }

    let mut guard = FetchGuard {
        state,
        outcome: None,
    };
    let result = fetch_and_install(state).await;
    guard.outcome = Some(result.as_ref().err().cloned());
    drop(guard);
    state.initialized().await;
    result
}

async fn sync_from_cache(state: &ServiceState) {
    let Some(serialized) = state.read_cache() else {
        return;
    };
    if serialized == state.cached_entry.read().await.serialized {
        return;
    }
    let from_cache = match entry_from_cached_json(serialized.as_str()) {
        Ok(entry) => entry,
        Err(err) => {
            error!(event_id = ErrorKind::ConfigJsonCacheReadFailure.code(); "Error occurred while reading the cache. {err}");
            return;
        }
    };

    let changed = {
        let mut cached = state.cached_entry.write().await;
        if from_cache.fetch_time < cached.entry.fetch_time {
            return;
        }
        let changed = from_cache.config_json != cached.entry.config_json;
        *cached = CachedEntry {
            entry: from_cache,
            serialized,
        };
        changed.then(|| Arc::clone(&cached.entry.config))
    };
    if let Some(config) = changed {
        state.options.hooks.config_changed(&config);
    }
}

async fn fetch_and_install(state: &ServiceState) -> Result<(), ClientError> {
    let etag = state.cached_entry.read().await.entry.etag.clone();
    let response = state.fetcher.fetch(etag.as_str()).await;

    let mut changed = None;
    let result = {
        let mut cached = state.cached_entry.write().await;
        match response {
            FetchResponse::Fetched(new_entry) => {
                if new_entry.config_json != cached.entry.config_json {
                    changed = Some(Arc::clone(&new_entry.config));
                }
                state.install(&mut cached, new_entry);
                Ok(())
            }
            FetchResponse::NotModified if cached.entry.is_empty() => {
                let msg = "Unexpected HTTP response was received when no config JSON is cached locally: 304 Not Modified";
                error!(event_id = ErrorKind::InvalidHttpResponseWhenLocalCacheIsEmpty.code(); "{}", msg);
                Err(ClientError::new(
                    ErrorKind::InvalidHttpResponseWhenLocalCacheIsEmpty,
                    msg.to_owned(),
                ))
            }
            FetchResponse::NotModified => {
                let touched = cached.entry.with_time(Utc::now());
                state.install(&mut cached, touched);
                Ok(())
            }
            FetchResponse::Failed(err, transient) => {
                if !transient && !cached.entry.is_empty() {
                    let touched = cached.entry.with_time(Utc::now());
                    state.install(&mut cached, touched);
                }
                Err(err)
            }
        }
    };

    if let Some(config) = changed {
        state.options.hooks.config_changed(&config);
    }
    if let Err(err) = &result {
        state.options.hooks.error(err);
    }
    result
}
