#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Write;
use std::sync::Mutex;

use camino::Utf8PathBuf;
use flate2::Compression;
use flate2::write::GzEncoder;

use crawl_collector::cancel::CancelToken;
use crawl_collector::error::CollectorError;
use crawl_collector::remote::{RemoteClient, RemoteInfo};
use crawl_collector::store::Store;

pub const BASE_URL: &str = "http://host/";

/// In-memory remote keyed by full URL.
#[derive(Default)]
pub struct MockRemote {
    files: HashMap<String, Vec<u8>>,
    heads: Mutex<usize>,
    fetches: Mutex<Vec<String>>,
    cancel_on_fetch: bool,
    cancel_after_body: bool,
}

impl MockRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, url: &str, body: impl Into<Vec<u8>>) -> Self {
        self.files.insert(url.to_string(), body.into());
        self
    }

    /// Writes half the body, then trips the caller's token.
    pub fn cancelling(mut self) -> Self {
        self.cancel_on_fetch = true;
        self
    }

    /// Delivers the whole body, then trips the caller's token.
    pub fn cancelling_after_body(mut self) -> Self {
        self.cancel_after_body = true;
        self
    }

    pub fn head_count(&self) -> usize {
        *self.heads.lock().unwrap()
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.lock().unwrap().len()
    }

    pub fn fetched(&self, url: &str) -> usize {
        self.fetches
            .lock()
            .unwrap()
            .iter()
            .filter(|fetched| fetched.as_str() == url)
            .count()
    }
}

impl RemoteClient for MockRemote {
    fn head(&self, url: &str) -> Option<RemoteInfo> {
        *self.heads.lock().unwrap() += 1;
        self.files.get(url).map(|body| RemoteInfo {
            size: Some(body.len() as u64),
        })
    }

    fn fetch(
        &self,
        url: &str,
        destination: &mut dyn Write,
        cancel: &CancelToken,
    ) -> Result<u64, CollectorError> {
        self.fetches.lock().unwrap().push(url.to_string());
        let body = self
            .files
            .get(url)
            .ok_or_else(|| CollectorError::TransferFailed {
                url: url.to_string(),
                reason: "status 404".to_string(),
            })?;
        if self.cancel_on_fetch {
            destination
                .write_all(&body[..body.len() / 2])
                .map_err(|err| CollectorError::Filesystem(err.to_string()))?;
            cancel.cancel();
        }
        cancel.check()?;
        destination
            .write_all(body)
            .map_err(|err| CollectorError::Filesystem(err.to_string()))?;
        if self.cancel_after_body {
            cancel.cancel();
        }
        Ok(body.len() as u64)
    }
}

pub fn gzip(bytes: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes).unwrap();
    encoder.finish().unwrap()
}

pub fn temp_store() -> (tempfile::TempDir, Store) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    let store = Store::new(root);
    store.ensure_layout().unwrap();
    (temp, store)
}

pub fn data_url(path: &str) -> String {
    format!("{BASE_URL}{path}")
}
