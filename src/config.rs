use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::collector::{DEFAULT_SUBSET_MARKER, DEFAULT_WORKERS};
use crate::domain::ContentId;
use crate::error::CollectorError;
use crate::remote::{DEFAULT_PROBE_TIMEOUT, DEFAULT_TRANSFER_TIMEOUT, RemoteSettings};
use crate::store::Store;

pub const DEFAULT_CONFIG_FILE: &str = "crawl-collector.json";
pub const DEFAULT_BASE_URL: &str = "https://data.commoncrawl.org/";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CollectorConfig {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    #[serde(default)]
    pub data_root: Option<Utf8PathBuf>,
    #[serde(default = "default_base_url")]
    pub list_base_url: String,
    #[serde(default = "default_base_url")]
    pub data_base_url: String,
    #[serde(default = "default_subset_marker")]
    pub subset_marker: String,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
    #[serde(default = "default_transfer_timeout_secs")]
    pub transfer_timeout_secs: u64,
    #[serde(default)]
    pub datasets: BTreeMap<ContentId, DatasetRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DatasetRecord {
    pub name: String,
    pub catalog_id: ContentId,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            data_root: None,
            list_base_url: default_base_url(),
            data_base_url: default_base_url(),
            subset_marker: default_subset_marker(),
            workers: default_workers(),
            probe_timeout_secs: default_probe_timeout_secs(),
            transfer_timeout_secs: default_transfer_timeout_secs(),
            datasets: BTreeMap::new(),
        }
    }
}

impl CollectorConfig {
    pub fn store(&self) -> Result<Store, CollectorError> {
        let root = match &self.data_root {
            Some(root) => root.clone(),
            None => Store::default_root()?,
        };
        Ok(Store::new(root))
    }

    pub fn remote_settings(&self) -> RemoteSettings {
        RemoteSettings {
            probe_timeout: Duration::from_secs(self.probe_timeout_secs),
            transfer_timeout: Duration::from_secs(self.transfer_timeout_secs),
        }
    }

    pub fn dataset_by_name(&self, name: &str) -> Option<(&ContentId, &DatasetRecord)> {
        self.datasets
            .iter()
            .find(|(_, record)| record.name == name.trim())
    }

    pub fn datasets_using(&self, catalog_id: &ContentId) -> Vec<String> {
        self.datasets
            .values()
            .filter(|record| &record.catalog_id == catalog_id)
            .map(|record| record.name.clone())
            .collect()
    }

    pub fn catalog_in_use(&self, catalog_id: &ContentId, except: Option<&ContentId>) -> bool {
        self.datasets
            .iter()
            .filter(|(id, _)| Some(*id) != except)
            .any(|(_, record)| &record.catalog_id == catalog_id)
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn path(path: Option<&str>) -> Utf8PathBuf {
        Utf8PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_FILE))
    }

    pub fn load(path: &Utf8Path) -> Result<CollectorConfig, CollectorError> {
        if !path.as_std_path().exists() {
            return Err(CollectorError::MissingConfig(PathBuf::from(path.as_str())));
        }
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|_| CollectorError::ConfigRead(PathBuf::from(path.as_str())))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<CollectorConfig, CollectorError> {
        serde_json::from_str(content).map_err(|err| CollectorError::ConfigParse(err.to_string()))
    }

    pub fn save(path: &Utf8Path, config: &CollectorConfig) -> Result<(), CollectorError> {
        let mut content = serde_json::to_vec_pretty(config)
            .map_err(|err| CollectorError::ConfigParse(err.to_string()))?;
        content.push(b'\n');
        Store::write_bytes_atomic(path, &content)
    }
}

fn default_schema_version() -> u32 {
    1
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_subset_marker() -> String {
    DEFAULT_SUBSET_MARKER.to_string()
}

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

fn default_probe_timeout_secs() -> u64 {
    DEFAULT_PROBE_TIMEOUT.as_secs()
}

fn default_transfer_timeout_secs() -> u64 {
    DEFAULT_TRANSFER_TIMEOUT.as_secs()
}
