use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::catalog::stored_name;
use crate::domain::{CatalogEntry, ContentId, derive_random_id, join_url};
use crate::error::CollectorError;
use crate::fs_util::{copy_file_into, last_extension};
use crate::remote::{Probe, RemoteClient, probe, remote_file_name};
use crate::snapshot::Snapshot;
use crate::store::Store;

const MAX_ID_ATTEMPTS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntrySource {
    Downloaded,
    Copied,
    AlreadyPresent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryOutcome {
    pub id: ContentId,
    pub path: String,
    pub bytes: u64,
    pub source: EntrySource,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatasetDiff {
    pub available: usize,
    pub downloaded: usize,
    pub missing: BTreeSet<ContentId>,
}

pub(crate) struct DatasetManager<'a, C: RemoteClient> {
    store: &'a Store,
    remote: &'a C,
}

impl<'a, C: RemoteClient> DatasetManager<'a, C> {
    pub(crate) fn new(store: &'a Store, remote: &'a C) -> Self {
        Self { store, remote }
    }

    pub(crate) fn create(&self) -> Result<ContentId, CollectorError> {
        self.create_from(std::iter::repeat_with(derive_random_id))
    }

    pub(crate) fn create_from(
        &self,
        candidates: impl IntoIterator<Item = ContentId>,
    ) -> Result<ContentId, CollectorError> {
        for id in candidates.into_iter().take(MAX_ID_ATTEMPTS) {
            let dir = self.store.dataset_dir(&id);
            match fs::create_dir(dir.as_std_path()) {
                Ok(()) => {
                    info!(%id, "created dataset");
                    return Ok(id);
                }
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                    warn!(%id, "dataset id already taken, drawing another");
                }
                Err(err) => return Err(CollectorError::fs(format!("create {dir}: {err}"))),
            }
        }
        Err(CollectorError::fs("unable to allocate a unique dataset id"))
    }

    pub(crate) fn remove(&self, id: &ContentId) -> Result<(), CollectorError> {
        let dir = self.existing_dir(id)?;
        fs::remove_dir_all(dir.as_std_path())
            .map_err(|err| CollectorError::fs(format!("remove {dir}: {err}")))?;
        info!(%id, "removed dataset");
        Ok(())
    }

    pub(crate) fn resolve_entry_id(
        &self,
        url: &str,
        expected_base: &str,
    ) -> Result<(ContentId, Option<u64>), CollectorError> {
        match probe(self.remote, url, expected_base) {
            Probe::Valid { id, size } => Ok((id, size)),
            Probe::NotValid => Err(CollectorError::InvalidUrl(url.to_string())),
        }
    }

    pub(crate) fn find_entry_anywhere(
        &self,
        id: &ContentId,
    ) -> Result<Option<Utf8PathBuf>, CollectorError> {
        for dir in sorted_children(self.store.datasets_root())? {
            if !dir.as_std_path().is_dir() {
                continue;
            }
            if let Some(file) = find_in_dir(&dir, id)? {
                return Ok(Some(file));
            }
        }
        Ok(None)
    }

    pub(crate) fn download_entry(
        &self,
        base_url: &str,
        path: &str,
        dataset: &ContentId,
        cancel: &CancelToken,
    ) -> Result<EntryOutcome, CollectorError> {
        let dir = self.existing_dir(dataset)?;
        let url = join_url(base_url, path);
        let (id, size) = self.resolve_entry_id(&url, base_url)?;
        let outcome = |bytes, source| EntryOutcome {
            id: id.clone(),
            path: path.trim().to_string(),
            bytes,
            source,
        };

        if let Some(existing) = find_in_dir(&dir, &id)? {
            debug!(%id, %dataset, "entry already present");
            let bytes = fs::metadata(existing.as_std_path())
                .map(|meta| meta.len())
                .map_err(CollectorError::fs)?;
            return Ok(outcome(bytes, EntrySource::AlreadyPresent));
        }

        if let Some(existing) = self.find_entry_anywhere(&id)? {
            let name = existing
                .file_name()
                .ok_or_else(|| CollectorError::fs(format!("no file name in {existing}")))?;
            let mut partial = Store::partial_file(&dir)?;
            let bytes = copy_file_into(&existing, partial.as_file_mut(), cancel)?;
            Store::promote(partial, &dir.join(name))?;
            info!(%id, %dataset, from = %existing, "copied entry from sibling dataset");
            return Ok(outcome(bytes, EntrySource::Copied));
        }

        let file_name = remote_file_name(&url)?;
        let mut partial = Store::partial_file(&dir)?;
        let bytes = self.remote.fetch(&url, partial.as_file_mut(), cancel)?;
        let dest = dir.join(stored_name(&id, last_extension(&file_name)));
        Store::promote(partial, &dest)?;
        info!(%id, %dataset, bytes, expected = ?size, "downloaded entry");
        Ok(outcome(bytes, EntrySource::Downloaded))
    }

    pub(crate) fn remove_entry(
        &self,
        snapshot: &Snapshot,
        dataset: &ContentId,
        entry: &ContentId,
    ) -> Result<(), CollectorError> {
        snapshot.dataset_files(dataset)?;
        let path = snapshot
            .entry_path(dataset, entry)
            .ok_or_else(|| CollectorError::EntryNotFound {
                dataset: dataset.to_string(),
                entry: entry.to_string(),
            })?;
        fs::remove_file(path.as_std_path())
            .map_err(|err| CollectorError::fs(format!("remove {path}: {err}")))?;
        info!(%entry, %dataset, "removed entry");
        Ok(())
    }

    fn existing_dir(&self, id: &ContentId) -> Result<Utf8PathBuf, CollectorError> {
        let dir = self.store.dataset_dir(id);
        if !dir.as_std_path().is_dir() {
            return Err(CollectorError::DatasetNotFound(id.to_string()));
        }
        Ok(dir)
    }
}

pub(crate) fn diff_missing(
    snapshot: &Snapshot,
    dataset: &ContentId,
    entries: &[CatalogEntry],
    base_url: &str,
) -> Result<DatasetDiff, CollectorError> {
    let downloaded = snapshot.dataset_entry_ids(dataset)?;
    let have: HashSet<&ContentId> = downloaded.iter().collect();
    let missing = entries
        .iter()
        .map(|entry| entry.content_id(base_url))
        .filter(|id| !have.contains(id))
        .collect();
    Ok(DatasetDiff {
        available: entries.len(),
        downloaded: downloaded.len(),
        missing,
    })
}

pub fn select_missing<'e>(
    entries: &'e [CatalogEntry],
    base_url: &str,
    missing: &BTreeSet<ContentId>,
    count: usize,
) -> Vec<(ContentId, &'e CatalogEntry)> {
    let mut picked = HashSet::new();
    let mut plan = Vec::new();
    for entry in entries {
        if plan.len() == count {
            break;
        }
        let id = entry.content_id(base_url);
        if missing.contains(&id) && picked.insert(id.clone()) {
            plan.push((id, entry));
        }
    }
    plan
}

fn find_in_dir(dir: &Utf8Path, id: &ContentId) -> Result<Option<Utf8PathBuf>, CollectorError> {
    for file in sorted_children(dir)? {
        let is_match = file.file_stem() == Some(id.as_str())
            && !file.file_name().is_some_and(Store::is_partial)
            && file.as_std_path().is_file();
        if is_match {
            return Ok(Some(file));
        }
    }
    Ok(None)
}

fn sorted_children(dir: &Utf8Path) -> Result<Vec<Utf8PathBuf>, CollectorError> {
    let mut children = Vec::new();
    let entries = fs::read_dir(dir.as_std_path())
        .map_err(|err| CollectorError::fs(format!("read {dir}: {err}")))?;
    for entry in entries {
        let path = entry.map_err(CollectorError::fs)?.path();
        if let Ok(path) = Utf8PathBuf::from_path_buf(path) {
            children.push(path);
        }
    }
    children.sort();
    Ok(children)
}
