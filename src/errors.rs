use thiserror::Error;

/// Category of a failure reported by the [`crate::Client`].
///
/// The discriminant doubles as the `event_id` of the log record emitted for the failure.
/// Codes are grouped by area: 1000s for evaluation and fetching, 1300 and 2300s for
/// local files, 2000s for typed reads and the cache, 3200s for client state, 4200 for
/// initialization.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum ErrorKind {
    /// The HTTP client couldn't be constructed.
    HttpClientInitFailure = 1,
    /// No config JSON is available to evaluate against.
    ConfigJsonNotAvailable = 1000,
    /// The requested key is not in the config JSON.
    SettingKeyMissing = 1001,
    /// The config is malformed for the requested key, e.g. a circular prerequisite.
    EvaluationFailure = 1002,
    /// The CDN answered 403 or 404, the SDK key is likely wrong.
    InvalidSdkKey = 1100,
    /// The CDN answered with a status code the fetcher doesn't handle.
    UnexpectedHttpResponse = 1101,
    /// The download exceeded the configured HTTP timeout.
    HttpRequestTimeout = 1102,
    /// The request didn't reach the CDN.
    HttpRequestFailure = 1103,
    /// Following redirects didn't settle on a base URL.
    RedirectLoop = 1104,
    /// A 200 OK arrived with a body that isn't a valid config JSON.
    InvalidHttpResponseContent = 1105,
    /// A 304 Not Modified arrived while nothing was cached.
    InvalidHttpResponseWhenLocalCacheIsEmpty = 1106,
    /// The path given to [`crate::FileDataSource`] doesn't exist.
    LocalFileDataSourceDoesNotExist = 1300,
    /// The evaluated value can't be returned as the type of the default value.
    SettingValueTypeMismatch = 2002,
    /// The external cache returned an entry that can't be parsed.
    ConfigJsonCacheReadFailure = 2201,
    /// The file given to [`crate::FileDataSource`] can't be read or decoded.
    LocalFileDataSourceFailedToRead = 2302,
    /// A refresh was requested while the client is offline.
    OfflineClient = 3200,
    /// A refresh was requested on a client using [`crate::OverrideBehavior::LocalOnly`].
    LocalOnlyClient = 3202,
    /// [`crate::Client::wait_for_ready`] gave up before the first fetch completed.
    ClientInitTimedOut = 4200,
}

impl ErrorKind {
    pub(crate) fn code(&self) -> u16 {
        *self as u16
    }
}

/// A failure with its [`ErrorKind`] and a human readable message.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct ClientError {
    /// What went wrong.
    pub kind: ErrorKind,
    /// Description of the failure, also written to the log.
    pub message: String,
}

impl ClientError {
    pub(crate) fn new(kind: ErrorKind, message: String) -> Self {
        Self { kind, message }
    }
}

#[cfg(test)]
mod error_tests {
    use crate::errors::{ClientError, ErrorKind};

    #[test]
    fn codes() {
        assert_eq!(ErrorKind::SettingKeyMissing.code(), 1001);
        assert_eq!(ErrorKind::RedirectLoop.code(), 1104);
        assert_eq!(ErrorKind::ClientInitTimedOut.code(), 4200);
    }

    #[test]
    fn message_is_the_display_form() {
        let err = ClientError::new(ErrorKind::OfflineClient, "offline".to_owned());
        assert_eq!(err.to_string(), "offline");
        let boxed: Box<dyn std::error::Error> = Box::new(err);
        assert_eq!(boxed.to_string(), "offline");
    }
}
