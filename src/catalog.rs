use std::fs;
use std::io::{BufRead, BufReader};

use camino::Utf8PathBuf;
use tracing::{debug, info};

use crate::cancel::CancelToken;
use crate::domain::{CatalogEntry, ContentId, derive_url_id};
use crate::error::CollectorError;
use crate::fs_util::{decompress_into, last_extension, split_compression};
use crate::remote::{RemoteClient, remote_file_name};
use crate::snapshot::Snapshot;
use crate::store::Store;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogImport {
    pub id: ContentId,
    pub fetched: bool,
    pub bytes: Option<u64>,
}

pub(crate) struct CatalogManager<'a, C: RemoteClient> {
    store: &'a Store,
    remote: &'a C,
}

impl<'a, C: RemoteClient> CatalogManager<'a, C> {
    pub(crate) fn new(store: &'a Store, remote: &'a C) -> Self {
        Self { store, remote }
    }

    pub(crate) fn import(
        &self,
        url: &str,
        snapshot: &Snapshot,
        cancel: &CancelToken,
    ) -> Result<CatalogImport, CollectorError> {
        let id = derive_url_id(url);
        if snapshot.contains_catalog(&id) {
            debug!(%id, "data list already stored");
            return Ok(CatalogImport {
                id,
                fetched: false,
                bytes: None,
            });
        }

        let file_name = remote_file_name(url)?;
        let lists_root = self.store.lists_root();
        let mut download = Store::partial_file(lists_root)?;
        let downloaded = self.remote.fetch(url, download.as_file_mut(), cancel)?;

        let (plain_name, compression) = split_compression(&file_name);
        let (staged, bytes) = match compression {
            Some(compression) => {
                let mut plain = Store::partial_file(lists_root)?;
                let source = Utf8PathBuf::from_path_buf(download.path().to_path_buf())
                    .map_err(|_| CollectorError::fs("non-utf8 partial file path"))?;
                let written = decompress_into(&source, compression, plain.as_file_mut(), cancel)?;
                (plain, written)
            }
            None => (download, downloaded),
        };

        let dest = lists_root.join(stored_name(&id, last_extension(plain_name)));
        Store::promote(staged, &dest)?;
        info!(%id, %url, bytes, "stored data list");
        Ok(CatalogImport {
            id,
            fetched: true,
            bytes: Some(bytes),
        })
    }

    /// Deletes the stored file. Reference checks belong to the caller.
    pub(crate) fn remove(&self, id: &ContentId, snapshot: &Snapshot) -> Result<bool, CollectorError> {
        let Some(path) = snapshot.catalog_path(id) else {
            return Ok(false);
        };
        fs::remove_file(path.as_std_path())
            .map_err(|err| CollectorError::fs(format!("remove {path}: {err}")))?;
        info!(%id, "removed data list");
        Ok(true)
    }

    pub(crate) fn read(
        &self,
        id: &ContentId,
        snapshot: &Snapshot,
        subset_marker: &str,
    ) -> Result<Vec<CatalogEntry>, CollectorError> {
        let path = snapshot
            .catalog_path(id)
            .ok_or_else(|| CollectorError::CatalogNotFound(id.to_string()))?;
        let file = fs::File::open(path.as_std_path())
            .map_err(|err| CollectorError::fs(format!("open {path}: {err}")))?;
        filter_entries(BufReader::new(file), subset_marker)
    }
}

pub fn filter_entries<R: BufRead>(
    reader: R,
    subset_marker: &str,
) -> Result<Vec<CatalogEntry>, CollectorError> {
    let mut entries = Vec::new();
    for line in reader.lines() {
        let line = line.map_err(CollectorError::fs)?;
        let line = line.trim_end_matches('\r');
        if line.contains(subset_marker) {
            entries.push(CatalogEntry::new(line));
        }
    }
    Ok(entries)
}

pub(crate) fn stored_name(id: &ContentId, extension: Option<&str>) -> String {
    match extension {
        Some(ext) if !ext.is_empty() => format!("{id}.{ext}"),
        _ => id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn filter_keeps_marked_lines_in_order() {
        let text = "crawl-data/a/subset=warc/1.warc.gz\r\ncrawl-data/a/subset=wat/1.wat.gz\ncrawl-data/a/subset=warc/2.warc.gz";
        let entries = filter_entries(Cursor::new(text), "subset=warc").unwrap();
        let paths: Vec<&str> = entries.iter().map(|entry| entry.path()).collect();
        assert_eq!(
            paths,
            vec![
                "crawl-data/a/subset=warc/1.warc.gz",
                "crawl-data/a/subset=warc/2.warc.gz"
            ]
        );
    }

    #[test]
    fn stored_name_keeps_remaining_extension() {
        let id = ContentId::from_stem("abc");
        assert_eq!(stored_name(&id, Some("paths")), "abc.paths");
        assert_eq!(stored_name(&id, None), "abc");
    }
}
