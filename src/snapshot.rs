use std::collections::BTreeMap;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{debug, warn};

use crate::domain::ContentId;
use crate::error::CollectorError;
use crate::store::Store;

/// A snapshot is never edited in place: every mutation of the tree is followed by a
/// fresh [`Snapshot::scan`] that replaces the previous value wholesale.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    catalogs: Vec<Utf8PathBuf>,
    datasets: BTreeMap<ContentId, Vec<Utf8PathBuf>>,
}

impl Snapshot {
    pub fn scan(store: &Store) -> Result<Self, CollectorError> {
        store.check_layout()?;

        let catalogs = list_files(store.lists_root())?;

        let mut datasets = BTreeMap::new();
        let entries =
            fs::read_dir(store.datasets_root().as_std_path()).map_err(CollectorError::fs)?;
        for entry in entries {
            let path = entry.map_err(CollectorError::fs)?.path();
            if !path.is_dir() {
                continue;
            }
            let dir = match Utf8PathBuf::from_path_buf(path) {
                Ok(dir) => dir,
                Err(path) => {
                    warn!(path = %path.display(), "skipping non-utf8 dataset directory");
                    continue;
                }
            };
            let Some(name) = dir.file_name() else {
                continue;
            };
            let id = ContentId::from_stem(name);
            let files = list_files(&dir)?;
            datasets.insert(id, files);
        }

        debug!(
            catalogs = catalogs.len(),
            datasets = datasets.len(),
            "rescanned storage"
        );
        Ok(Self { catalogs, datasets })
    }

    pub fn catalog_ids(&self) -> Vec<ContentId> {
        self.catalogs.iter().filter_map(|path| stem_id(path)).collect()
    }

    pub fn catalog_path(&self, id: &ContentId) -> Option<&Utf8Path> {
        self.catalogs
            .iter()
            .find(|path| path.file_stem() == Some(id.as_str()))
            .map(|path| path.as_path())
    }

    pub fn contains_catalog(&self, id: &ContentId) -> bool {
        self.catalog_path(id).is_some()
    }

    pub fn dataset_ids(&self) -> Vec<ContentId> {
        self.datasets.keys().cloned().collect()
    }

    pub fn dataset_files(&self, id: &ContentId) -> Result<&[Utf8PathBuf], CollectorError> {
        self.datasets
            .get(id)
            .map(|files| files.as_slice())
            .ok_or_else(|| CollectorError::DatasetNotFound(id.to_string()))
    }

    pub fn dataset_entry_ids(&self, id: &ContentId) -> Result<Vec<ContentId>, CollectorError> {
        Ok(self
            .dataset_files(id)?
            .iter()
            .filter_map(|path| stem_id(path))
            .collect())
    }

    pub fn entry_path(&self, dataset: &ContentId, entry: &ContentId) -> Option<&Utf8Path> {
        self.datasets
            .get(dataset)?
            .iter()
            .find(|path| path.file_stem() == Some(entry.as_str()))
            .map(|path| path.as_path())
    }
}

fn stem_id(path: &Utf8Path) -> Option<ContentId> {
    path.file_stem().map(ContentId::from_stem)
}

fn list_files(dir: &Utf8Path) -> Result<Vec<Utf8PathBuf>, CollectorError> {
    let mut files = Vec::new();
    let entries = fs::read_dir(dir.as_std_path())
        .map_err(|err| CollectorError::fs(format!("read {dir}: {err}")))?;
    for entry in entries {
        let entry = entry.map_err(CollectorError::fs)?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let path = match Utf8PathBuf::from_path_buf(path) {
            Ok(path) => path,
            Err(path) => {
                warn!(path = %path.display(), "skipping non-utf8 file name");
                continue;
            }
        };
        if path.file_name().is_some_and(Store::is_partial) {
            continue;
        }
        files.push(path);
    }
    files.sort();
    Ok(files)
}
