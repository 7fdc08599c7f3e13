pub mod app;
pub mod cancel;
mod catalog;
pub mod collector;
pub mod config;
mod dataset;
pub mod domain;
pub mod error;
pub mod fs_util;
pub mod output;
pub mod remote;
pub mod snapshot;
pub mod store;

pub use cancel::CancelToken;
pub use catalog::{CatalogImport, filter_entries};
pub use collector::{BatchReport, Collector, EntryFailure, ProgressEvent, ProgressSink};
pub use dataset::{DatasetDiff, EntryOutcome, EntrySource, select_missing};
pub use domain::{CatalogEntry, ContentId, derive_id, derive_random_id, derive_url_id};
pub use error::CollectorError;
