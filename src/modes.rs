use std::time::Duration;

/// Describes how the config JSON is kept up to date.
#[derive(Debug, Clone, PartialEq)]
pub enum PollingMode {
    /// Downloads the config JSON periodically in the background with the given interval.
    AutoPoll(Duration),
    /// Downloads the config JSON on evaluation when the cached one is older than the given time-to-live.
    LazyLoad(Duration),
    /// Downloads the config JSON only when [`crate::Client::refresh`] is called.
    Manual,
}

impl PollingMode {
    pub(crate) fn mode_identifier(&self) -> &str {
        match self {
            PollingMode::AutoPoll(_) => "a",
            PollingMode::LazyLoad(_) => "l",
            PollingMode::Manual => "m",
        }
    }
}
