use configcat_core::*;
use log::kv::Key;
use log::{LevelFilter, Log, Metadata, Record};
use std::time::Duration;

#[tokio::main]
async fn main() {
    // Info level logging prints the evaluation trace of every flag.
    log::set_max_level(LevelFilter::Info);
    log::set_logger(&PrintLog).unwrap();

    let hooks = Hooks::new()
        .on_client_ready(|state| println!("client ready: {state:?}"))
        .on_config_changed(|config| println!("config changed, {} settings", config.settings.len()));

    let client = Client::builder("PKDVCLf-Hq-h-kCzMp-L7Q/HhOWfwVtZ0mb30i9wi17GQ")
        .polling_mode(PollingMode::AutoPoll(Duration::from_secs(5)))
        .hooks(hooks)
        .build()
        .unwrap();

    let state = client.wait_for_ready(Duration::from_secs(5)).await;
    println!("init: {state:?}");

    let enabled = client.get_value("isAwesomeFeatureEnabled", None, false).await;
    println!("isAwesomeFeatureEnabled: {enabled}");

    let user = User::new("demo-user").email("demo@example.com");
    let details = client
        .get_value_details("isPOCFeatureEnabled", Some(user), false)
        .await;
    println!(
        "isPOCFeatureEnabled: {} (variation {:?}, default: {})",
        details.value, details.variation_id, details.is_default_value
    );

    for (key, value) in client.get_all_values(None).await {
        println!("{key}: {value}");
    }

    client.close().await;
}

struct PrintLog;

impl Log for PrintLog {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.target().starts_with("configcat_core") && metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let event_id = record
                .key_values()
                .get(Key::from("event_id"))
                .and_then(|id| id.to_i64())
                .unwrap_or_default();
            println!("{} [{event_id}] {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}
