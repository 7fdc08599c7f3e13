use camino::Utf8PathBuf;
use serde::Serialize;
use tracing::warn;

use crate::cancel::CancelToken;
use crate::collector::{Collector, ProgressSink};
use crate::config::{CollectorConfig, ConfigLoader, DatasetRecord};
use crate::dataset::EntryOutcome;
use crate::domain::{CatalogEntry, ContentId};
use crate::error::CollectorError;
use crate::remote::{Probe, RemoteClient};

#[derive(Debug, Clone, Serialize)]
pub struct AddResult {
    pub name: String,
    pub dataset_id: ContentId,
    pub catalog_id: ContentId,
    pub catalog_fetched: bool,
    pub catalog_size: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovedKind {
    Dataset,
    Catalog,
}

#[derive(Debug, Clone, Serialize)]
pub struct RemoveResult {
    pub kind: RemovedKind,
    pub id: ContentId,
    pub name: Option<String>,
    pub catalog_removed: bool,
    pub catalog_unused: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct InspectResult {
    pub datasets: Vec<DatasetSummary>,
    pub catalogs: Vec<CatalogSummary>,
    pub untracked: Vec<ContentId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatasetSummary {
    pub name: String,
    pub id: ContentId,
    pub catalog_id: ContentId,
    pub entries: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CatalogSummary {
    pub id: ContentId,
    pub used_in: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusResult {
    pub name: String,
    pub dataset_id: ContentId,
    pub catalog_id: ContentId,
    pub available: usize,
    pub downloaded: usize,
    pub missing: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DownloadResult {
    pub name: String,
    pub dataset_id: ContentId,
    pub requested: usize,
    pub completed: Vec<EntryOutcome>,
    pub failures: Vec<FailureItem>,
    pub cancelled: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailureItem {
    pub id: ContentId,
    pub path: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteResult {
    pub name: String,
    pub dataset_id: ContentId,
    pub removed: Vec<ContentId>,
}

pub struct App<C: RemoteClient> {
    collector: Collector<C>,
    config: CollectorConfig,
    config_path: Utf8PathBuf,
}

impl<C: RemoteClient> App<C> {
    pub fn new(collector: Collector<C>, config: CollectorConfig, config_path: Utf8PathBuf) -> Self {
        Self {
            collector,
            config,
            config_path,
        }
    }

    pub fn open(
        config: CollectorConfig,
        config_path: Utf8PathBuf,
        remote: C,
    ) -> Result<Self, CollectorError> {
        let collector = Collector::open(config.store()?, remote)?
            .with_workers(config.workers)
            .with_subset_marker(config.subset_marker.clone());
        Ok(Self::new(collector, config, config_path))
    }

    pub fn collector(&self) -> &Collector<C> {
        &self.collector
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    pub fn add(
        &mut self,
        name: &str,
        list_url: &str,
        cancel: &CancelToken,
    ) -> Result<AddResult, CollectorError> {
        let name = name.trim();
        if self.config.dataset_by_name(name).is_some() {
            return Err(CollectorError::DatasetNameTaken(name.to_string()));
        }

        let Probe::Valid { size, .. } = self.collector.probe(list_url, &self.config.list_base_url)
        else {
            return Err(CollectorError::InvalidUrl(list_url.trim().to_string()));
        };
        let import = self.collector.import_catalog(list_url, cancel)?;
        let dataset_id = self.collector.create_dataset()?;

        self.config.datasets.insert(
            dataset_id.clone(),
            DatasetRecord {
                name: name.to_string(),
                catalog_id: import.id.clone(),
                created_at: Some(chrono::Utc::now().to_rfc3339()),
            },
        );
        self.save()?;

        Ok(AddResult {
            name: name.to_string(),
            dataset_id,
            catalog_id: import.id,
            catalog_fetched: import.fetched,
            catalog_size: import.bytes.or(size),
        })
    }

    pub fn remove(&mut self, id: &str, prune_catalog: bool) -> Result<RemoveResult, CollectorError> {
        let id: ContentId = id.parse()?;

        if let Some(record) = self.config.datasets.get(&id).cloned() {
            match self.collector.remove_dataset(&id) {
                Ok(()) => {}
                Err(err) if err.is_not_found() => {
                    warn!(%id, "dataset directory already gone, dropping config record only");
                }
                Err(err) => return Err(err),
            }
            self.config.datasets.remove(&id);
            self.save()?;

            let unused = !self.config.catalog_in_use(&record.catalog_id, None);
            let catalog_removed = if unused && prune_catalog {
                self.collector.remove_catalog(&record.catalog_id)?
            } else {
                false
            };
            return Ok(RemoveResult {
                kind: RemovedKind::Dataset,
                id,
                name: Some(record.name),
                catalog_removed,
                catalog_unused: unused && !catalog_removed,
            });
        }

        if self.collector.snapshot().contains_catalog(&id) {
            let users = self.config.datasets_using(&id);
            if !users.is_empty() {
                return Err(CollectorError::CatalogInUse {
                    catalog: id.to_string(),
                    datasets: users,
                });
            }
            self.collector.remove_catalog(&id)?;
            return Ok(RemoveResult {
                kind: RemovedKind::Catalog,
                id,
                name: None,
                catalog_removed: true,
                catalog_unused: false,
            });
        }

        Err(CollectorError::DatasetNotFound(id.to_string()))
    }

    pub fn inspect(&self) -> InspectResult {
        let snapshot = self.collector.snapshot();
        let datasets = self
            .config
            .datasets
            .iter()
            .map(|(id, record)| DatasetSummary {
                name: record.name.clone(),
                id: id.clone(),
                catalog_id: record.catalog_id.clone(),
                entries: snapshot.dataset_files(id).map(|files| files.len()).ok(),
            })
            .collect();
        let catalogs = snapshot
            .catalog_ids()
            .into_iter()
            .map(|id| CatalogSummary {
                used_in: self.config.datasets_using(&id),
                id,
            })
            .collect();
        let untracked = snapshot
            .dataset_ids()
            .into_iter()
            .filter(|id| !self.config.datasets.contains_key(id))
            .collect();
        InspectResult {
            datasets,
            catalogs,
            untracked,
        }
    }

    pub fn entries(&self, name: &str) -> Result<Vec<CatalogEntry>, CollectorError> {
        let (_, record) = self.dataset(name)?;
        self.collector.read_catalog(&record.catalog_id)
    }

    pub fn status(&self, name: &str) -> Result<StatusResult, CollectorError> {
        let (dataset_id, record) = self.dataset(name)?;
        let entries = self.collector.read_catalog(&record.catalog_id)?;
        let diff = self
            .collector
            .diff_missing(&dataset_id, &entries, &self.config.data_base_url)?;
        Ok(StatusResult {
            name: record.name,
            dataset_id,
            catalog_id: record.catalog_id,
            available: diff.available,
            downloaded: diff.downloaded,
            missing: diff.missing.len(),
        })
    }

    pub fn download(
        &mut self,
        name: &str,
        count: usize,
        sink: &dyn ProgressSink,
        cancel: &CancelToken,
    ) -> Result<DownloadResult, CollectorError> {
        let (dataset_id, record) = self.dataset(name)?;
        let entries = self.collector.read_catalog(&record.catalog_id)?;
        let report = self.collector.download_missing(
            &dataset_id,
            &entries,
            &self.config.data_base_url,
            count,
            sink,
            cancel,
        )?;
        Ok(DownloadResult {
            name: record.name,
            dataset_id,
            requested: report.requested,
            completed: report.completed,
            failures: report
                .failures
                .into_iter()
                .map(|failure| FailureItem {
                    id: failure.id,
                    path: failure.path,
                    error: failure.error.to_string(),
                })
                .collect(),
            cancelled: report.cancelled,
        })
    }

    pub fn delete(&mut self, name: &str, count: usize) -> Result<DeleteResult, CollectorError> {
        let (dataset_id, record) = self.dataset(name)?;
        let downloaded = self.collector.dataset_entry_ids(&dataset_id)?;
        if count == 0 || count > downloaded.len() {
            return Err(CollectorError::InvalidCount {
                requested: count,
                max: downloaded.len(),
            });
        }
        let mut removed = Vec::with_capacity(count);
        for entry in downloaded.into_iter().take(count) {
            self.collector.remove_entry(&dataset_id, &entry)?;
            removed.push(entry);
        }
        Ok(DeleteResult {
            name: record.name,
            dataset_id,
            removed,
        })
    }

    fn dataset(&self, name: &str) -> Result<(ContentId, DatasetRecord), CollectorError> {
        self.config
            .dataset_by_name(name)
            .map(|(id, record)| (id.clone(), record.clone()))
            .ok_or_else(|| CollectorError::DatasetNotFound(name.trim().to_string()))
    }

    fn save(&self) -> Result<(), CollectorError> {
        ConfigLoader::save(&self.config_path, &self.config)
    }
}
