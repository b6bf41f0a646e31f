use crate::eval::details::EvaluationDetails;
use crate::{ClientCacheState, ClientError, Config, Value};
use log::error;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

type ReadyHandler = Box<dyn Fn(ClientCacheState) + Send + Sync>;
type ConfigChangedHandler = Box<dyn Fn(Arc<Config>) + Send + Sync>;
type FlagEvaluatedHandler = Box<dyn Fn(&EvaluationDetails<Option<Value>>) + Send + Sync>;
type ErrorHandler = Box<dyn Fn(&ClientError) + Send + Sync>;

/// Subscribers notified about the events of a [`crate::Client`].
///
/// Every subscriber runs on the task that triggered the event. A panicking subscriber is
/// logged and doesn't affect the other subscribers or the triggering operation.
///
/// # Examples
///
/// ```rust
/// use configcat_core::{Client, Hooks};
///
/// let hooks = Hooks::new()
///     .on_client_ready(|state| println!("ready: {state:?}"))
///     .on_config_changed(|config| println!("keys: {}", config.settings.len()))
///     .on_error(|err| println!("error: {err}"));
///
/// let builder = Client::builder("SDK_KEY").hooks(hooks);
/// ```
#[derive(Default)]
pub struct Hooks {
    on_client_ready: Vec<ReadyHandler>,
    on_config_changed: Vec<ConfigChangedHandler>,
    on_flag_evaluated: Vec<FlagEvaluatedHandler>,
    on_error: Vec<ErrorHandler>,
}

impl Hooks {
    /// Creates an empty set of subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes to the initialization of the client. Called once, with the state of the local config data.
    pub fn on_client_ready(
        mut self,
        handler: impl Fn(ClientCacheState) + Send + Sync + 'static,
    ) -> Self {
        self.on_client_ready.push(Box::new(handler));
        self
    }

    /// Subscribes to config JSON changes.
    pub fn on_config_changed(mut self, handler: impl Fn(Arc<Config>) + Send + Sync + 'static) -> Self {
        self.on_config_changed.push(Box::new(handler));
        self
    }

    /// Subscribes to the results of feature flag and setting evaluations.
    pub fn on_flag_evaluated(
        mut self,
        handler: impl Fn(&EvaluationDetails<Option<Value>>) + Send + Sync + 'static,
    ) -> Self {
        self.on_flag_evaluated.push(Box::new(handler));
        self
    }

    /// Subscribes to errors reported by the client.
    pub fn on_error(mut self, handler: impl Fn(&ClientError) + Send + Sync + 'static) -> Self {
        self.on_error.push(Box::new(handler));
        self
    }

    pub(crate) fn client_ready(&self, state: ClientCacheState) {
        for handler in &self.on_client_ready {
            guarded("on_client_ready", || handler(state));
        }
    }

    pub(crate) fn config_changed(&self, config: &Arc<Config>) {
        for handler in &self.on_config_changed {
            guarded("on_config_changed", || handler(Arc::clone(config)));
        }
    }

    pub(crate) fn flag_evaluated(&self, details: &EvaluationDetails<Option<Value>>) {
        for handler in &self.on_flag_evaluated {
            guarded("on_flag_evaluated", || handler(details));
        }
    }

    pub(crate) fn error(&self, err: &ClientError) {
        for handler in &self.on_error {
            guarded("on_error", || handler(err));
        }
    }
}

fn guarded(hook: &str, call: impl FnOnce()) {
    if let Err(panic) = catch_unwind(AssertUnwindSafe(call)) {
        error!(event_id = 0; "A subscriber of the '{hook}' hook panicked: {}", panic_message(panic.as_ref()));
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "<unknown>"
    }
}
