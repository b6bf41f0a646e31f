use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use chrono::Utc;
use log::{debug, error, warn};
use reqwest::header::{HeaderMap, HeaderValue, ETAG, IF_NONE_MATCH};
use reqwest::{Response, StatusCode};

use crate::constants::{CONFIG_FILE_NAME, PKG_VERSION, SDK_KEY_PROXY_PREFIX};
use crate::errors::{ClientError, ErrorKind};
use crate::model::config::{entry_from_json, ConfigEntry, Preferences};
use crate::model::enums::RedirectMode;

const CONFIGCAT_UA_HEADER: &str = "X-ConfigCat-UserAgent";
const MAX_FETCH_ATTEMPTS: usize = 3;

/// The outcome of a config JSON download.
#[derive(Debug, PartialEq)]
pub enum FetchResponse {
    /// A new config JSON was downloaded.
    Fetched(ConfigEntry),
    /// The config JSON identified by the sent ETag is still the latest.
    NotModified,
    /// The download failed. The flag tells whether the failure is transient.
    Failed(ClientError, bool),
}

impl FetchResponse {
    fn failed(kind: ErrorKind, msg: String, transient: bool) -> Self {
        error!(event_id = kind.code(); "{}", msg);
        FetchResponse::Failed(ClientError::new(kind, msg), transient)
    }
}

/// Downloads the config JSON.
///
/// [`crate::ClientBuilder::fetcher`] accepts custom implementations, the default one is [`Fetcher`].
#[async_trait]
pub trait ConfigFetcher: Send + Sync {
    /// Fetches the config JSON conditionally on `etag` (an empty `etag` fetches unconditionally).
    async fn fetch(&self, etag: &str) -> FetchResponse;
}

/// [`ConfigFetcher`] that downloads the config JSON from the ConfigCat CDN and follows
/// the redirections announced in the downloaded preferences.
pub struct Fetcher {
    sdk_key: String,
    base_url: ArcSwap<String>,
    pinned: bool,
    http: reqwest::Client,
}

impl Fetcher {
    /// Creates a new [`Fetcher`] downloading from `url`. A custom (`is_custom`) URL is only
    /// left for a redirection when the config JSON forces it.
    ///
    /// # Errors
    ///
    /// This method fails when the underlying HTTP client can't be initialized.
    pub fn new(
        url: String,
        is_custom: bool,
        sdk_key: &str,
        mode: &str,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        let init_err = |reason: String| {
            let msg = format!("Failed to initialize the HTTP client. {reason}");
            error!(event_id = ErrorKind::HttpClientInitFailure.code(); "{}", msg);
            ClientError::new(ErrorKind::HttpClientInitFailure, msg)
        };
        let user_agent = HeaderValue::from_str(&format!("ConfigCat-Rust/{mode}-{PKG_VERSION}"))
            .map_err(|err| init_err(err.to_string()))?;
        let mut headers = HeaderMap::new();
        headers.insert(CONFIGCAT_UA_HEADER, user_agent);
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|err| init_err(err.to_string()))?;
        Ok(Self {
            sdk_key: sdk_key.to_owned(),
            base_url: ArcSwap::from_pointee(url),
            pinned: is_custom,
            http,
        })
    }

    async fn download(&self, base_url: &str, etag: &str) -> FetchResponse {
        let url = format!(
            "{base_url}/configuration-files/{}/{CONFIG_FILE_NAME}",
            self.sdk_key
        );
        let mut request = self.http.get(url);
        if !etag.is_empty() {
            request = request.header(IF_NONE_MATCH, etag);
        }
        match request.send().await {
            Ok(response) => Self::read_response(response).await,
            Err(err) if err.is_timeout() => FetchResponse::failed(
                ErrorKind::HttpRequestTimeout,
                "Request timed out while trying to fetch config JSON.".to_owned(),
                true,
            ),
            Err(err) => FetchResponse::failed(
                ErrorKind::HttpRequestFailure,
                format!("Unexpected error occurred while trying to fetch config JSON. It is most likely due to a local network issue. Please make sure your application can reach the ConfigCat CDN servers (or your proxy server) over HTTP. {err}"),
                true,
            ),
        }
    }

    async fn read_response(response: Response) -> FetchResponse {
        match response.status() {
            StatusCode::OK => {
                let etag = response
                    .headers()
                    .get(ETAG)
                    .and_then(|val| val.to_str().ok())
                    .unwrap_or_default()
                    .to_owned();
                let parsed = match response.text().await {
                    Ok(body) => entry_from_json(&body, &etag, Utc::now()).map_err(|e| e.to_string()),
                    Err(err) => Err(err.to_string()),
                };
                match parsed {
                    Ok(entry) => {
                        debug!("Fetch was successful: new config fetched");
                        FetchResponse::Fetched(entry)
                    }
                    Err(reason) => FetchResponse::failed(
                        ErrorKind::InvalidHttpResponseContent,
                        format!("Fetching config JSON was successful but the HTTP response content was invalid. {reason}"),
                        true,
                    ),
                }
            }
            StatusCode::NOT_MODIFIED => {
                debug!("Fetch was successful: not modified");
                FetchResponse::NotModified
            }
            status @ (StatusCode::FORBIDDEN | StatusCode::NOT_FOUND) => FetchResponse::failed(
                ErrorKind::InvalidSdkKey,
                format!("Your SDK Key seems to be wrong. You can find the valid SDK Key at https://app.configcat.com/sdkkey. Status code: {}", status.as_u16()),
                false,
            ),
            status => FetchResponse::failed(
                ErrorKind::UnexpectedHttpResponse,
                format!("Unexpected HTTP response was received while trying to fetch config JSON. Status code: {}", status.as_u16()),
                true,
            ),
        }
    }

    /// Applies the redirection announced in `pref`. Returns whether the download has to be repeated.
    fn follow_redirect(&self, current: &str, pref: &Preferences) -> bool {
        let Some(target) = pref.url.as_ref().filter(|url| url.as_str() != current) else {
            return false;
        };
        let mode = pref.redirect.unwrap_or(RedirectMode::No);
        if self.pinned
            && (mode != RedirectMode::Force || self.sdk_key.starts_with(SDK_KEY_PROXY_PREFIX))
        {
            debug!("Custom base URL is kept, ignoring the redirection to '{target}'");
            return false;
        }
        self.base_url.store(Arc::new(target.clone()));
        match mode {
            RedirectMode::No => false,
            RedirectMode::Should => {
                warn!(event_id = 3002; "The `.data_governance()` parameter specified at the client initialization is not in sync with the preferences on the ConfigCat Dashboard. Read more: https://configcat.com/docs/advanced/data-governance");
                true
            }
            RedirectMode::Force => true,
        }
    }
}

#[async_trait]
impl ConfigFetcher for Fetcher {
    async fn fetch(&self, etag: &str) -> FetchResponse {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let base_url = self.base_url.load_full();
            let response = self.download(&base_url, etag).await;
            let retry = match &response {
                FetchResponse::Fetched(entry) => entry
                    .config
                    .preferences
                    .as_ref()
                    .is_some_and(|pref| self.follow_redirect(&base_url, pref)),
                _ => false,
            };
            if !retry {
                return response;
            }
            if attempts >= MAX_FETCH_ATTEMPTS {
                error!(event_id = ErrorKind::RedirectLoop.code(); "Redirection loop encountered while trying to fetch config JSON. Please contact us at https://configcat.com/support");
                return response;
            }
        }
    }
}
