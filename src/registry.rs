use crate::{Client, ClientBuilder, ClientError};
use log::warn;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Keeps one [`Client`] per SDK key.
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
/// use configcat_core::{ClientRegistry, PollingMode};
///
/// #[tokio::main]
/// async fn main() {
///     let registry = ClientRegistry::new();
///     let client = registry
///         .get_or_create("sdk-key", |builder| {
///             builder.polling_mode(PollingMode::LazyLoad(Duration::from_secs(60)))
///         })
///         .unwrap();
///
///     let value = client.get_value("flag-key", None, false).await;
///     registry.close_all().await;
/// }
/// ```
#[derive(Default)]
pub struct ClientRegistry {
    clients: Mutex<HashMap<String, Arc<Client>>>,
}

impl ClientRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the [`Client`] registered for `sdk_key`, or builds and registers a new one.
    ///
    /// `configure` is applied to the builder only when a new client is created. When a
    /// client already exists for the key, the configuration is ignored and a warning is logged.
    ///
    /// # Errors
    ///
    /// This method fails when the new client can't be built (see [`ClientBuilder::build`]).
    pub fn get_or_create(
        &self,
        sdk_key: &str,
        configure: impl FnOnce(ClientBuilder) -> ClientBuilder,
    ) -> Result<Arc<Client>, ClientError> {
        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(client) = clients.get(sdk_key) {
            warn!(event_id = 3000; "There is an existing client instance for the specified SDK Key. No new client instance will be created and the specified configuration is ignored. Returning the existing client instance. SDK Key: '{sdk_key}'.");
            return Ok(Arc::clone(client));
        }
        let client = Arc::new(configure(Client::builder(sdk_key)).build()?);
        clients.insert(sdk_key.to_owned(), Arc::clone(&client));
        Ok(client)
    }

    /// Returns the [`Client`] registered for `sdk_key`, if any.
    pub fn get(&self, sdk_key: &str) -> Option<Arc<Client>> {
        self.clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(sdk_key)
            .cloned()
    }

    /// Closes and unregisters the [`Client`] of `sdk_key`. Returns `false` when there was no such client.
    pub async fn close(&self, sdk_key: &str) -> bool {
        let client = self
            .clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(sdk_key);
        match client {
            Some(client) => {
                client.close().await;
                true
            }
            None => false,
        }
    }

    /// Closes and unregisters every [`Client`].
    pub async fn close_all(&self) {
        let clients = self
            .clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, client)| client)
            .collect::<Vec<Arc<Client>>>();
        for client in clients {
            client.close().await;
        }
    }
}

#[cfg(test)]
mod registry_tests {
    use crate::registry::ClientRegistry;
    use crate::{ErrorKind, MapDataSource, OverrideBehavior, PollingMode, Value};
    use std::sync::Arc;

    const KEY: &str = "configcat-sdk-1/1234567890123456789012/1234567890123456789012";

    #[tokio::test]
    async fn same_key_returns_same_client() {
        let registry = ClientRegistry::new();
        let c1 = registry
            .get_or_create(KEY, |b| b.polling_mode(PollingMode::Manual))
            .unwrap();
        let c2 = registry
            .get_or_create(KEY, |b| {
                b.overrides(
                    Box::new(MapDataSource::from([("flag", Value::Bool(true))])),
                    OverrideBehavior::LocalOnly,
                )
            })
            .unwrap();
        assert!(Arc::ptr_eq(&c1, &c2));
        assert!(registry.get(KEY).is_some());

        assert!(registry.close(KEY).await);
        assert!(!registry.close(KEY).await);
        assert!(registry.get(KEY).is_none());
    }

    #[tokio::test]
    async fn failed_build_is_not_registered() {
        let registry = ClientRegistry::new();
        let err = registry.get_or_create("invalid", |b| b).err().unwrap();
        assert_eq!(err.kind, ErrorKind::InvalidSdkKey);
        assert!(registry.get("invalid").is_none());
    }

    #[tokio::test]
    async fn close_all_empties_the_registry() {
        let registry = ClientRegistry::new();
        registry
            .get_or_create(KEY, |b| b.polling_mode(PollingMode::Manual))
            .unwrap();
        registry.close_all().await;
        assert!(registry.get(KEY).is_none());
    }
}
