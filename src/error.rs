use std::path::PathBuf;

use camino::Utf8PathBuf;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum CollectorError {
    #[error("storage root unavailable: {0}")]
    #[diagnostic(help("run `crawl-collect init` to create the lists/ and datasets/ directories"))]
    StorageUnavailable(Utf8PathBuf),

    #[error("url is not valid: {0}")]
    InvalidUrl(String),

    #[error("invalid content id: {0}")]
    InvalidContentId(String),

    #[error("dataset not found: {0}")]
    DatasetNotFound(String),

    #[error("data list not found: {0}")]
    CatalogNotFound(String),

    #[error("entry {entry} not found in dataset {dataset}")]
    EntryNotFound { dataset: String, entry: String },

    #[error("transfer of {url} failed: {reason}")]
    TransferFailed { url: String, reason: String },

    #[error("failed to decompress {path}: {reason}")]
    DecompressionFailed { path: Utf8PathBuf, reason: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("failed to build http client: {0}")]
    HttpClient(String),

    #[error("missing config file {0}")]
    #[diagnostic(help("run `crawl-collect init` to write a default config"))]
    MissingConfig(PathBuf),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("a dataset named {0} already exists")]
    DatasetNameTaken(String),

    #[error("data list {catalog} is used by datasets: {}", datasets.join(", "))]
    CatalogInUse {
        catalog: String,
        datasets: Vec<String>,
    },

    #[error("count {requested} out of range (1 - {max})")]
    InvalidCount { requested: usize, max: usize },
}

impl CollectorError {
    pub(crate) fn fs(err: impl std::fmt::Display) -> Self {
        CollectorError::Filesystem(err.to_string())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            CollectorError::DatasetNotFound(_)
                | CollectorError::CatalogNotFound(_)
                | CollectorError::EntryNotFound { .. }
        )
    }
}
