use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;
use tempfile::{Builder, NamedTempFile};
use tracing::{debug, warn};

use crate::domain::ContentId;
use crate::error::CollectorError;

/// Prefix of in-flight files; never visible under a final name.
pub const PARTIAL_PREFIX: &str = ".partial-";

#[derive(Debug, Clone)]
pub struct Store {
    root: Utf8PathBuf,
    lists_root: Utf8PathBuf,
    datasets_root: Utf8PathBuf,
}

impl Store {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        let root = root.into();
        Self {
            lists_root: root.join("lists"),
            datasets_root: root.join("datasets"),
            root,
        }
    }

    pub fn default_root() -> Result<Utf8PathBuf, CollectorError> {
        BaseDirs::new()
            .and_then(|dirs| {
                Utf8PathBuf::from_path_buf(dirs.data_dir().join("crawl-collector")).ok()
            })
            .ok_or_else(|| CollectorError::fs("unable to resolve data directory"))
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn lists_root(&self) -> &Utf8Path {
        &self.lists_root
    }

    pub fn datasets_root(&self) -> &Utf8Path {
        &self.datasets_root
    }

    pub fn dataset_dir(&self, id: &ContentId) -> Utf8PathBuf {
        self.datasets_root.join(id.as_str())
    }

    pub fn missing_dirs(&self) -> Vec<Utf8PathBuf> {
        [&self.root, &self.lists_root, &self.datasets_root]
            .into_iter()
            .filter(|path| !path.as_std_path().is_dir())
            .cloned()
            .collect()
    }

    pub fn ensure_layout(&self) -> Result<(), CollectorError> {
        for dir in [&self.lists_root, &self.datasets_root] {
            fs::create_dir_all(dir.as_std_path()).map_err(CollectorError::fs)?;
        }
        Ok(())
    }

    pub fn check_layout(&self) -> Result<(), CollectorError> {
        match self.missing_dirs().into_iter().next() {
            Some(missing) => Err(CollectorError::StorageUnavailable(missing)),
            None => Ok(()),
        }
    }

    pub fn partial_file(dir: &Utf8Path) -> Result<NamedTempFile, CollectorError> {
        Builder::new()
            .prefix(PARTIAL_PREFIX)
            .tempfile_in(dir.as_std_path())
            .map_err(|err| CollectorError::fs(format!("create partial file in {dir}: {err}")))
    }

    pub fn promote(partial: NamedTempFile, dest: &Utf8Path) -> Result<(), CollectorError> {
        partial
            .persist(dest.as_std_path())
            .map_err(|err| CollectorError::fs(format!("persist {dest}: {}", err.error)))?;
        Ok(())
    }

    pub fn is_partial(name: &str) -> bool {
        name.starts_with(PARTIAL_PREFIX)
    }

    pub fn sweep_partials(&self) -> Result<usize, CollectorError> {
        let mut removed = sweep_dir(&self.lists_root)?;
        let entries =
            fs::read_dir(self.datasets_root.as_std_path()).map_err(CollectorError::fs)?;
        for entry in entries {
            let path = entry.map_err(CollectorError::fs)?.path();
            if !path.is_dir() {
                continue;
            }
            match Utf8PathBuf::from_path_buf(path) {
                Ok(dir) => removed += sweep_dir(&dir)?,
                Err(path) => warn!(path = %path.display(), "skipping non-utf8 dataset directory"),
            }
        }
        Ok(removed)
    }

    pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), CollectorError> {
        let parent = match path.parent() {
            Some(parent) if !parent.as_str().is_empty() => parent,
            _ => Utf8Path::new("."),
        };
        fs::create_dir_all(parent.as_std_path()).map_err(CollectorError::fs)?;
        let tmp_path = path.with_extension("tmp");
        fs::write(tmp_path.as_std_path(), content).map_err(CollectorError::fs)?;
        fs::rename(tmp_path.as_std_path(), path.as_std_path()).map_err(CollectorError::fs)?;
        Ok(())
    }
}

fn sweep_dir(dir: &Utf8Path) -> Result<usize, CollectorError> {
    let mut removed = 0;
    let entries = fs::read_dir(dir.as_std_path()).map_err(CollectorError::fs)?;
    for entry in entries {
        let entry = entry.map_err(CollectorError::fs)?;
        let name = entry.file_name();
        if name.to_str().is_some_and(Store::is_partial) && entry.path().is_file() {
            debug!(path = %entry.path().display(), "removing orphaned partial file");
            fs::remove_file(entry.path()).map_err(CollectorError::fs)?;
            removed += 1;
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_paths() {
        let store = Store::new("/data/crawl");
        let id: ContentId = "900150983cd24fb0d6963f7d28e17f72".parse().unwrap();
        assert!(store.lists_root().ends_with("crawl/lists"));
        assert!(
            store
                .dataset_dir(&id)
                .ends_with("datasets/900150983cd24fb0d6963f7d28e17f72")
        );
    }

    #[test]
    fn sweep_removes_only_partials() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let store = Store::new(root);
        store.ensure_layout().unwrap();
        let dataset = store.datasets_root().join("abc");
        fs::create_dir(&dataset).unwrap();
        fs::write(store.lists_root().join(".partial-x1"), b"half").unwrap();
        fs::write(dataset.join(".partial-x2"), b"half").unwrap();
        fs::write(dataset.join("keep.gz"), b"whole").unwrap();

        assert_eq!(store.sweep_partials().unwrap(), 2);
        assert!(dataset.join("keep.gz").exists());
        assert!(!dataset.join(".partial-x2").exists());
    }
}
