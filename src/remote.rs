use std::io::Write;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::Url;
use reqwest::blocking::Client;
use reqwest::header::{CONTENT_LENGTH, HeaderMap, HeaderValue, USER_AGENT};
use tracing::debug;

use crate::cancel::CancelToken;
use crate::domain::{ContentId, derive_url_id, normalize_url};
use crate::error::CollectorError;
use crate::fs_util::{CopyError, copy_cancellable};

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_TRANSFER_TIMEOUT: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteInfo {
    pub size: Option<u64>,
}

pub trait RemoteClient: Send + Sync {
    /// Existence check without a body. Any status other than 200, a timeout or a
    /// transport error yields `None`.
    fn head(&self, url: &str) -> Option<RemoteInfo>;

    fn fetch(
        &self,
        url: &str,
        destination: &mut dyn Write,
        cancel: &CancelToken,
    ) -> Result<u64, CollectorError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    Valid { id: ContentId, size: Option<u64> },
    NotValid,
}

impl Probe {
    pub fn id(&self) -> Option<&ContentId> {
        match self {
            Probe::Valid { id, .. } => Some(id),
            Probe::NotValid => None,
        }
    }
}

pub fn probe<C: RemoteClient + ?Sized>(client: &C, url: &str, expected_base: &str) -> Probe {
    let url = normalize_url(url);
    if !url.contains(expected_base.trim()) {
        debug!(%url, expected_base, "probe rejected url outside expected base");
        return Probe::NotValid;
    }
    match client.head(url) {
        Some(info) => Probe::Valid {
            id: derive_url_id(url),
            size: info.size,
        },
        None => Probe::NotValid,
    }
}

pub fn remote_file_name(url: &str) -> Result<String, CollectorError> {
    let parsed = Url::parse(normalize_url(url))
        .map_err(|err| CollectorError::InvalidUrl(format!("{url}: {err}")))?;
    parsed
        .path_segments()
        .and_then(|segments| segments.filter(|segment| !segment.is_empty()).last())
        .map(|segment| segment.to_string())
        .ok_or_else(|| CollectorError::InvalidUrl(format!("{url}: no file name in path")))
}

#[derive(Debug, Clone, Copy)]
pub struct RemoteSettings {
    pub probe_timeout: Duration,
    pub transfer_timeout: Duration,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            transfer_timeout: DEFAULT_TRANSFER_TIMEOUT,
        }
    }
}

#[derive(Clone)]
pub struct HttpRemoteClient {
    client: Client,
    probe_timeout: Duration,
}

impl HttpRemoteClient {
    pub fn new(settings: RemoteSettings) -> Result<Self, CollectorError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("crawl-collector/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| CollectorError::HttpClient(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(settings.probe_timeout)
            .timeout(settings.transfer_timeout)
            .build()
            .map_err(|err| CollectorError::HttpClient(err.to_string()))?;
        Ok(Self {
            client,
            probe_timeout: settings.probe_timeout,
        })
    }

    fn probe_request(
        &self,
        request: reqwest::blocking::RequestBuilder,
        url: &str,
    ) -> Option<reqwest::blocking::Response> {
        match request.timeout(self.probe_timeout).send() {
            Ok(response) => Some(response),
            Err(err) => {
                debug!(%url, error = %err, "probe request failed");
                None
            }
        }
    }
}

impl RemoteClient for HttpRemoteClient {
    fn head(&self, url: &str) -> Option<RemoteInfo> {
        let mut response = self.probe_request(self.client.head(url), url)?;
        if response.status() == StatusCode::METHOD_NOT_ALLOWED {
            // Streamed fallback: only the headers are read, the body is dropped unread.
            response = self.probe_request(self.client.get(url), url)?;
        }
        if response.status() != StatusCode::OK {
            debug!(%url, status = response.status().as_u16(), "probe got non-200 status");
            return None;
        }
        Some(RemoteInfo {
            size: content_length(response.headers()),
        })
    }

    fn fetch(
        &self,
        url: &str,
        destination: &mut dyn Write,
        cancel: &CancelToken,
    ) -> Result<u64, CollectorError> {
        cancel.check()?;
        let mut response =
            self.client
                .get(url)
                .send()
                .map_err(|err| CollectorError::TransferFailed {
                    url: url.to_string(),
                    reason: err.to_string(),
                })?;
        if response.status() != StatusCode::OK {
            return Err(CollectorError::TransferFailed {
                url: url.to_string(),
                reason: format!("status {}", response.status().as_u16()),
            });
        }
        copy_cancellable(&mut response, destination, cancel).map_err(|err| match err {
            CopyError::Read(err) => CollectorError::TransferFailed {
                url: url.to_string(),
                reason: err.to_string(),
            },
            CopyError::Write(err) => CollectorError::fs(err),
            CopyError::Cancelled => CollectorError::Cancelled,
        })
    }
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
}
