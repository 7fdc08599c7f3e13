use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::cancel::CancelToken;
use crate::catalog::{CatalogImport, CatalogManager};
use crate::dataset::{
    DatasetDiff, DatasetManager, EntryOutcome, EntrySource, diff_missing, select_missing,
};
use crate::domain::{CatalogEntry, ContentId};
use crate::error::CollectorError;
use crate::remote::{Probe, RemoteClient, probe};
use crate::snapshot::Snapshot;
use crate::store::Store;

pub const DEFAULT_SUBSET_MARKER: &str = "subset=warc";
pub const DEFAULT_WORKERS: usize = 4;
pub const MAX_WORKERS: usize = 8;

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub id: ContentId,
    pub bytes: u64,
    pub source: EntrySource,
    pub completed: usize,
    pub total: usize,
    pub elapsed: Duration,
}

pub trait ProgressSink: Sync {
    fn event(&self, event: ProgressEvent);
}

#[derive(Debug)]
pub struct EntryFailure {
    pub id: ContentId,
    pub path: String,
    pub error: CollectorError,
}

#[derive(Debug)]
pub struct BatchReport {
    pub requested: usize,
    pub completed: Vec<EntryOutcome>,
    pub failures: Vec<EntryFailure>,
    pub cancelled: bool,
}

impl BatchReport {
    pub fn is_complete(&self) -> bool {
        self.completed.len() == self.requested
    }
}

pub struct Collector<C: RemoteClient> {
    store: Store,
    remote: C,
    snapshot: Snapshot,
    workers: usize,
    subset_marker: String,
}

impl<C: RemoteClient> Collector<C> {
    pub fn open(store: Store, remote: C) -> Result<Self, CollectorError> {
        store.check_layout()?;
        let swept = store.sweep_partials()?;
        if swept > 0 {
            warn!(swept, "removed orphaned partial files");
        }
        let snapshot = Snapshot::scan(&store)?;
        Ok(Self {
            store,
            remote,
            snapshot,
            workers: DEFAULT_WORKERS,
            subset_marker: DEFAULT_SUBSET_MARKER.to_string(),
        })
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.clamp(1, MAX_WORKERS);
        self
    }

    pub fn with_subset_marker(mut self, marker: impl Into<String>) -> Self {
        self.subset_marker = marker.into();
        self
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn remote(&self) -> &C {
        &self.remote
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn refresh(&mut self) -> Result<(), CollectorError> {
        self.snapshot = Snapshot::scan(&self.store)?;
        Ok(())
    }

    pub fn catalog_ids(&self) -> Vec<ContentId> {
        self.snapshot.catalog_ids()
    }

    pub fn dataset_ids(&self) -> Vec<ContentId> {
        self.snapshot.dataset_ids()
    }

    pub fn dataset_entry_ids(&self, dataset: &ContentId) -> Result<Vec<ContentId>, CollectorError> {
        self.snapshot.dataset_entry_ids(dataset)
    }

    pub fn probe(&self, url: &str, expected_base: &str) -> Probe {
        probe(&self.remote, url, expected_base)
    }

    pub fn import_catalog(
        &mut self,
        url: &str,
        cancel: &CancelToken,
    ) -> Result<CatalogImport, CollectorError> {
        let result = self.catalogs().import(url, &self.snapshot, cancel);
        match result {
            Ok(import) if !import.fetched => Ok(import),
            result => self.after_mutation(result),
        }
    }

    pub fn remove_catalog(&mut self, id: &ContentId) -> Result<bool, CollectorError> {
        let result = self.catalogs().remove(id, &self.snapshot);
        self.after_mutation(result)
    }

    pub fn read_catalog(&self, id: &ContentId) -> Result<Vec<CatalogEntry>, CollectorError> {
        self.catalogs().read(id, &self.snapshot, &self.subset_marker)
    }

    pub fn create_dataset(&mut self) -> Result<ContentId, CollectorError> {
        let result = self.datasets().create();
        self.after_mutation(result)
    }

    pub fn remove_dataset(&mut self, id: &ContentId) -> Result<(), CollectorError> {
        let result = self.datasets().remove(id);
        self.after_mutation(result)
    }

    pub fn resolve_entry_id(
        &self,
        url: &str,
        expected_base: &str,
    ) -> Result<ContentId, CollectorError> {
        self.datasets()
            .resolve_entry_id(url, expected_base)
            .map(|(id, _)| id)
    }

    pub fn find_entry_anywhere(
        &self,
        id: &ContentId,
    ) -> Result<Option<camino::Utf8PathBuf>, CollectorError> {
        self.datasets().find_entry_anywhere(id)
    }

    pub fn download_entry(
        &mut self,
        base_url: &str,
        path: &str,
        dataset: &ContentId,
        cancel: &CancelToken,
    ) -> Result<EntryOutcome, CollectorError> {
        let result = self
            .datasets()
            .download_entry(base_url, path, dataset, cancel);
        self.after_mutation(result)
    }

    pub fn diff_missing(
        &self,
        dataset: &ContentId,
        entries: &[CatalogEntry],
        base_url: &str,
    ) -> Result<DatasetDiff, CollectorError> {
        diff_missing(&self.snapshot, dataset, entries, base_url)
    }

    /// Transfers run on up to `workers` threads. The first failure stops new transfers
    /// from starting; entries already finished stay in place. The snapshot is rescanned
    /// once, after the batch.
    pub fn download_missing(
        &mut self,
        dataset: &ContentId,
        entries: &[CatalogEntry],
        base_url: &str,
        count: usize,
        sink: &dyn ProgressSink,
        cancel: &CancelToken,
    ) -> Result<BatchReport, CollectorError> {
        let diff = self.diff_missing(dataset, entries, base_url)?;
        if count == 0 || count > diff.missing.len() {
            return Err(CollectorError::InvalidCount {
                requested: count,
                max: diff.missing.len(),
            });
        }
        let plan = select_missing(entries, base_url, &diff.missing, count);
        info!(%dataset, count = plan.len(), workers = self.workers, "starting download batch");
        let report = self.run_batch(dataset, base_url, &plan, sink, cancel);
        self.refresh()?;
        Ok(report)
    }

    pub fn remove_entry(
        &mut self,
        dataset: &ContentId,
        entry: &ContentId,
    ) -> Result<(), CollectorError> {
        let result = self.datasets().remove_entry(&self.snapshot, dataset, entry);
        self.after_mutation(result)
    }

    fn catalogs(&self) -> CatalogManager<'_, C> {
        CatalogManager::new(&self.store, &self.remote)
    }

    fn datasets(&self) -> DatasetManager<'_, C> {
        DatasetManager::new(&self.store, &self.remote)
    }

    fn after_mutation<T>(
        &mut self,
        result: Result<T, CollectorError>,
    ) -> Result<T, CollectorError> {
        let refreshed = self.refresh();
        let value = result?;
        refreshed?;
        Ok(value)
    }

    fn run_batch(
        &self,
        dataset: &ContentId,
        base_url: &str,
        plan: &[(ContentId, &CatalogEntry)],
        sink: &dyn ProgressSink,
        cancel: &CancelToken,
    ) -> BatchReport {
        let manager = self.datasets();
        let workers = self.workers.min(plan.len()).max(1);
        let next = AtomicUsize::new(0);
        let stop = AtomicBool::new(false);
        let completed = Mutex::new(Vec::new());
        let failures = Mutex::new(Vec::new());
        let started = Instant::now();

        thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| {
                    loop {
                        if stop.load(Ordering::SeqCst) || cancel.is_cancelled() {
                            break;
                        }
                        let index = next.fetch_add(1, Ordering::SeqCst);
                        let Some((id, entry)) = plan.get(index) else {
                            break;
                        };
                        match manager.download_entry(base_url, entry.path(), dataset, cancel) {
                            Ok(outcome) => {
                                let event = ProgressEvent {
                                    id: outcome.id.clone(),
                                    bytes: outcome.bytes,
                                    source: outcome.source,
                                    completed: 0,
                                    total: plan.len(),
                                    elapsed: started.elapsed(),
                                };
                                let done = {
                                    let mut done =
                                        completed.lock().unwrap_or_else(PoisonError::into_inner);
                                    done.push((index, outcome));
                                    done.len()
                                };
                                sink.event(ProgressEvent {
                                    completed: done,
                                    ..event
                                });
                            }
                            Err(CollectorError::Cancelled) => break,
                            Err(error) => {
                                warn!(%id, path = entry.path(), %error, "entry failed, stopping batch");
                                stop.store(true, Ordering::SeqCst);
                                failures
                                    .lock()
                                    .unwrap_or_else(PoisonError::into_inner)
                                    .push(EntryFailure {
                                        id: id.clone(),
                                        path: entry.path().to_string(),
                                        error,
                                    });
                            }
                        }
                    }
                });
            }
        });

        let mut completed = completed
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        completed.sort_by_key(|(index, _)| *index);
        BatchReport {
            requested: plan.len(),
            completed: completed.into_iter().map(|(_, outcome)| outcome).collect(),
            failures: failures
                .into_inner()
                .unwrap_or_else(PoisonError::into_inner),
            cancelled: cancel.is_cancelled(),
        }
    }
}
