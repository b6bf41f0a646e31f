use crate::utils::{construct_bool_json_payload, data_path, produce_mock_path, rand_sdk_key};
use async_trait::async_trait;
use chrono::Utc;
use configcat_core::OverrideBehavior::LocalOnly;
use configcat_core::{
    entry_from_json, Client, ClientBuilder, ClientCacheState, ConfigCache, ConfigFetcher,
    ErrorKind, FetchResponse, FileDataSource, Hooks, PollingMode, User,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

mod utils;

const ORDERED_JSON: &str = r#"{"f": {
    "zeta": {"t": 0, "v": {"b": true}},
    "alpha": {"t": 1, "v": {"s": "a"}},
    "mid": {"t": 2, "v": {"i": 3}}
}}"#;

fn client_builder() -> ClientBuilder {
    Client::builder("local").overrides(
        Box::new(FileDataSource::new(data_path("test_json_complex.json").as_str()).unwrap()),
        LocalOnly,
    )
}

struct StaticFetcher {
    json: &'static str,
    calls: Arc<AtomicUsize>,
    delay: Duration,
}

impl StaticFetcher {
    fn new(json: &'static str, calls: &Arc<AtomicUsize>) -> Box<Self> {
        Box::new(Self {
            json,
            calls: Arc::clone(calls),
            delay: Duration::ZERO,
        })
    }
}

#[async_trait]
impl ConfigFetcher for StaticFetcher {
    async fn fetch(&self, _: &str) -> FetchResponse {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        match entry_from_json(self.json, "etag", Utc::now()) {
            Ok(entry) => FetchResponse::Fetched(entry),
            Err(err) => panic!("invalid test JSON: {err}"),
        }
    }
}

#[derive(Default, Clone)]
struct MapCache {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl ConfigCache for MapCache {
    fn read(&self, key: &str) -> Option<String> {
        self.entries.lock().unwrap().get(key).cloned()
    }

    fn write(&self, key: &str, value: &str) {
        self.entries.lock().unwrap().insert(key.to_owned(), value.to_owned());
    }
}

#[tokio::test]
async fn default_user_flag() {
    let client = client_builder().default_user(User::new("id1")).build().unwrap();

    let details = client.get_flag_details("disabledFeature", None).await;
    assert_eq!(details.user.unwrap().to_string(), r#"{"Identifier":"id1"}"#);

    let details = client.get_flag_details("disabledFeature", Some(User::new("id2"))).await;
    assert_eq!(details.user.unwrap().to_string(), r#"{"Identifier":"id2"}"#);
}

#[tokio::test]
async fn default_user_typed() {
    let client = client_builder()
        .default_user(User::new("a@matching.com"))
        .build()
        .unwrap();

    assert!(client.get_value("disabledFeature", None, false).await);
    assert!(!client.get_value("disabledFeature", Some(User::new("other")), true).await);

    let details = client.get_value_details("intSetting", None, 0).await;
    assert_eq!(details.value, 5);
    assert_eq!(details.variation_id.as_deref(), Some("five"));
    assert_eq!(details.user.unwrap().to_string(), r#"{"Identifier":"a@matching.com"}"#);
}

#[tokio::test]
async fn get_all_keys_in_document_order() {
    let mut server = mockito::Server::new_async().await;
    let (sdk_key, path) = produce_mock_path();
    let m = server
        .mock("GET", path.as_str())
        .with_status(200)
        .with_body(ORDERED_JSON)
        .create_async()
        .await;

    let client = Client::builder(sdk_key.as_str())
        .base_url(server.url().as_str())
        .polling_mode(PollingMode::LazyLoad(Duration::from_secs(60)))
        .build()
        .unwrap();

    assert_eq!(client.get_all_keys().await, vec!["zeta", "alpha", "mid"]);

    let details = client.get_all_details(None).await;
    let keys = details.iter().map(|d| d.key.as_str()).collect::<Vec<&str>>();
    assert_eq!(keys, vec!["zeta", "alpha", "mid"]);
    assert!(details.iter().all(|d| d.fetch_time.is_some()));

    m.assert_async().await;
}

#[tokio::test]
async fn get_all_keys_empty() {
    let client = Client::builder(rand_sdk_key().as_str())
        .polling_mode(PollingMode::Manual)
        .build()
        .unwrap();

    assert!(client.get_all_keys().await.is_empty());
    assert!(client.get_all_values(None).await.is_empty());
}

#[tokio::test]
async fn get_all_values() {
    let client = client_builder().build().unwrap();
    let values = client.get_all_values(None).await;

    assert_eq!(values.len(), 5);
    assert!(!values["disabledFeature"].as_bool().unwrap());
    assert!(values["enabledFeature"].as_bool().unwrap());
    assert_eq!(values["stringSetting"].as_str().unwrap(), "test");
    assert_eq!(values["intSetting"].as_int().unwrap(), 5);
    assert_eq!(values["doubleSetting"].as_float().unwrap(), 1.2);
}

#[tokio::test]
async fn get_all_values_with_user() {
    let client = client_builder().build().unwrap();
    let values = client.get_all_values(Some(User::new("a@matching.com"))).await;

    assert!(values["disabledFeature"].as_bool().unwrap());
}

#[tokio::test]
async fn missing_key_and_type_mismatch() {
    let client = client_builder().build().unwrap();

    let details = client.get_value_details("nonExisting", None, 42).await;
    assert_eq!(details.value, 42);
    assert!(details.is_default_value);
    assert_eq!(details.error.unwrap().kind, ErrorKind::SettingKeyMissing);

    let details = client.get_value_details("stringSetting", None, false).await;
    assert!(!details.value);
    assert!(details.is_default_value);
    assert_eq!(details.error.unwrap().kind, ErrorKind::SettingValueTypeMismatch);
}

#[tokio::test]
async fn hooks_are_notified() {
    let ready = Arc::new(Mutex::new(Vec::<ClientCacheState>::new()));
    let changes = Arc::new(AtomicUsize::new(0));
    let evaluated = Arc::new(Mutex::new(Vec::<String>::new()));
    let calls = Arc::new(AtomicUsize::new(0));

    let hooks = {
        let ready = Arc::clone(&ready);
        let changes = Arc::clone(&changes);
        let evaluated = Arc::clone(&evaluated);
        Hooks::new()
            .on_client_ready(move |state| ready.lock().unwrap().push(state))
            .on_config_changed(move |_| {
                changes.fetch_add(1, Ordering::SeqCst);
            })
            .on_flag_evaluated(move |details| evaluated.lock().unwrap().push(details.key.clone()))
    };

    let client = Client::builder(rand_sdk_key().as_str())
        .polling_mode(PollingMode::AutoPoll(Duration::from_secs(60)))
        .fetcher(StaticFetcher::new(ORDERED_JSON, &calls))
        .hooks(hooks)
        .build()
        .unwrap();

    let state = client.wait_for_ready(Duration::from_secs(5)).await.unwrap();
    assert_eq!(state, ClientCacheState::HasUpToDateFlagData);
    assert_eq!(*ready.lock().unwrap(), vec![ClientCacheState::HasUpToDateFlagData]);
    assert_eq!(changes.load(Ordering::SeqCst), 1);

    assert!(client.get_value("zeta", None, false).await);
    let _ = client.get_all_details(None).await;
    assert_eq!(*evaluated.lock().unwrap(), vec!["zeta", "zeta", "alpha", "mid"]);

    // same content, no change notification
    client.refresh().await.unwrap();
    assert_eq!(changes.load(Ordering::SeqCst), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    client.close().await;
}

#[tokio::test]
async fn error_hook_on_failed_refresh() {
    let errors = Arc::new(Mutex::new(Vec::<ErrorKind>::new()));
    let hooks = {
        let errors = Arc::clone(&errors);
        Hooks::new().on_error(move |err| errors.lock().unwrap().push(err.kind))
    };

    let mut server = mockito::Server::new_async().await;
    let (sdk_key, path) = produce_mock_path();
    let m = server
        .mock("GET", path.as_str())
        .with_status(500)
        .create_async()
        .await;

    let client = Client::builder(sdk_key.as_str())
        .base_url(server.url().as_str())
        .polling_mode(PollingMode::Manual)
        .hooks(hooks)
        .build()
        .unwrap();

    let err = client.refresh().await.err().unwrap();
    assert_eq!(err.kind, ErrorKind::UnexpectedHttpResponse);
    assert_eq!(*errors.lock().unwrap(), vec![ErrorKind::UnexpectedHttpResponse]);

    m.assert_async().await;
}

#[tokio::test]
async fn wait_for_ready_times_out() {
    let calls = Arc::new(AtomicUsize::new(0));
    let client = Client::builder(rand_sdk_key().as_str())
        .polling_mode(PollingMode::AutoPoll(Duration::from_secs(60)))
        .fetcher(Box::new(StaticFetcher {
            json: ORDERED_JSON,
            calls: Arc::clone(&calls),
            delay: Duration::from_millis(500),
        }))
        .build()
        .unwrap();

    let err = client.wait_for_ready(Duration::from_millis(100)).await.err().unwrap();
    assert_eq!(err.kind, ErrorKind::ClientInitTimedOut);

    let state = client.wait_for_ready(Duration::from_secs(5)).await.unwrap();
    assert_eq!(state, ClientCacheState::HasUpToDateFlagData);
    assert!(client.get_value("zeta", None, false).await);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    client.close().await;
}

#[tokio::test]
async fn local_only_is_ready_immediately() {
    let client = client_builder().build().unwrap();
    let state = client.wait_for_ready(Duration::from_secs(1)).await.unwrap();
    assert_eq!(state, ClientCacheState::HasLocalOverrideFlagDataOnly);
}

#[tokio::test]
async fn offline_and_online() {
    let mut server = mockito::Server::new_async().await;
    let (sdk_key, path) = produce_mock_path();
    let m = server
        .mock("GET", path.as_str())
        .with_status(200)
        .with_body(construct_bool_json_payload("flag", true))
        .create_async()
        .await;

    let client = Client::builder(sdk_key.as_str())
        .base_url(server.url().as_str())
        .polling_mode(PollingMode::Manual)
        .offline(true)
        .build()
        .unwrap();

    assert!(client.is_offline());
    let err = client.refresh().await.err().unwrap();
    assert_eq!(err.kind, ErrorKind::OfflineClient);
    assert!(!client.get_value("flag", None, false).await);

    client.online().await;
    assert!(!client.is_offline());
    client.refresh().await.unwrap();
    assert!(client.get_value("flag", None, false).await);

    client.offline().await;
    assert!(client.is_offline());
    assert!(client.get_value("flag", None, false).await);

    m.assert_async().await;
}

#[tokio::test]
async fn starts_from_shared_cache() {
    let cache = MapCache::default();
    let sdk_key = rand_sdk_key();
    let calls = Arc::new(AtomicUsize::new(0));

    let writer = Client::builder(sdk_key.as_str())
        .polling_mode(PollingMode::Manual)
        .cache(Box::new(cache.clone()))
        .fetcher(StaticFetcher::new(ORDERED_JSON, &calls))
        .build()
        .unwrap();
    writer.refresh().await.unwrap();
    assert_eq!(cache.entries.lock().unwrap().len(), 1);

    let reader = Client::builder(sdk_key.as_str())
        .polling_mode(PollingMode::Manual)
        .offline(true)
        .cache(Box::new(cache.clone()))
        .build()
        .unwrap();

    let state = reader.wait_for_ready(Duration::from_secs(1)).await.unwrap();
    assert_eq!(state, ClientCacheState::HasCachedFlagDataOnly);
    assert_eq!(reader.get_value("alpha", None, String::default()).await, "a");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn close_is_idempotent() {
    let calls = Arc::new(AtomicUsize::new(0));
    let client = Client::builder(rand_sdk_key().as_str())
        .polling_mode(PollingMode::AutoPoll(Duration::from_secs(60)))
        .fetcher(StaticFetcher::new(ORDERED_JSON, &calls))
        .build()
        .unwrap();

    client.wait_for_ready(Duration::from_secs(5)).await.unwrap();
    client.close().await;
    client.close().await;

    assert!(client.get_value("zeta", None, false).await);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
