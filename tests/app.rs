mod common;

use camino::Utf8PathBuf;

use assert_matches::assert_matches;

use crawl_collector::app::{App, RemovedKind};
use crawl_collector::cancel::CancelToken;
use crawl_collector::config::{CollectorConfig, ConfigLoader};
use crawl_collector::domain::derive_url_id;
use crawl_collector::error::CollectorError;
use crawl_collector::output::JsonOutput;

use common::{BASE_URL, MockRemote, data_url, gzip, temp_store};

const LIST_URL: &str = "http://host/cc.warc.paths.gz";
const LIST: &str = "crawl-data/subset=warc/a.warc.gz\ncrawl-data/subset=warc/b.warc.gz\n";

struct Fixture {
    _temp: tempfile::TempDir,
    config_path: Utf8PathBuf,
    app: App<MockRemote>,
}

fn fixture() -> Fixture {
    let (temp, store) = temp_store();
    let config_path = store.root().join("crawl-collector.json");
    let config = CollectorConfig {
        data_root: Some(store.root().to_path_buf()),
        list_base_url: BASE_URL.to_string(),
        data_base_url: BASE_URL.to_string(),
        workers: 2,
        ..CollectorConfig::default()
    };
    let remote = MockRemote::new()
        .with_file(LIST_URL, gzip(LIST.as_bytes()))
        .with_file(&data_url("crawl-data/subset=warc/a.warc.gz"), b"warc-a".to_vec())
        .with_file(&data_url("crawl-data/subset=warc/b.warc.gz"), b"warc-b".to_vec());
    let app = App::open(config, config_path.clone(), remote).unwrap();
    Fixture {
        _temp: temp,
        config_path,
        app,
    }
}

#[test]
fn add_persists_dataset_and_shares_list() {
    let mut fx = fixture();
    let cancel = CancelToken::new();

    let news = fx.app.add("news", LIST_URL, &cancel).unwrap();
    assert!(news.catalog_fetched);
    assert_eq!(news.catalog_id, derive_url_id(LIST_URL));

    let saved = ConfigLoader::load(&fx.config_path).unwrap();
    assert_eq!(saved.datasets[&news.dataset_id].name, "news");
    assert!(saved.datasets[&news.dataset_id].created_at.is_some());

    let other = fx.app.add("other", LIST_URL, &cancel).unwrap();
    assert!(!other.catalog_fetched);
    assert_eq!(other.catalog_id, news.catalog_id);
    assert_ne!(other.dataset_id, news.dataset_id);
    assert_eq!(fx.app.collector().remote().fetched(LIST_URL), 1);

    assert_matches!(
        fx.app.add("news", LIST_URL, &cancel),
        Err(CollectorError::DatasetNameTaken(_))
    );
}

#[test]
fn add_rejects_unreachable_or_foreign_url() {
    let mut fx = fixture();
    let cancel = CancelToken::new();
    assert_matches!(
        fx.app.add("news", "http://host/missing.paths.gz", &cancel),
        Err(CollectorError::InvalidUrl(_))
    );
    assert_matches!(
        fx.app.add("news", "http://elsewhere/cc.warc.paths.gz", &cancel),
        Err(CollectorError::InvalidUrl(_))
    );
    assert!(fx.app.config().datasets.is_empty());
    assert!(fx.app.collector().dataset_ids().is_empty());
}

#[test]
fn catalog_removal_respects_references() {
    let mut fx = fixture();
    let cancel = CancelToken::new();
    let news = fx.app.add("news", LIST_URL, &cancel).unwrap();
    let other = fx.app.add("other", LIST_URL, &cancel).unwrap();
    let catalog = news.catalog_id.to_string();

    let err = fx.app.remove(&catalog, false).unwrap_err();
    assert_matches!(err, CollectorError::CatalogInUse { ref datasets, .. } => {
        let mut datasets = datasets.clone();
        datasets.sort();
        assert_eq!(datasets, vec!["news".to_string(), "other".to_string()]);
    });

    let removed = fx.app.remove(news.dataset_id.as_str(), true).unwrap();
    assert_eq!(removed.kind, RemovedKind::Dataset);
    assert!(!removed.catalog_removed);
    assert!(!removed.catalog_unused);
    assert!(fx.app.collector().snapshot().contains_catalog(&news.catalog_id));

    let removed = fx.app.remove(other.dataset_id.as_str(), false).unwrap();
    assert!(removed.catalog_unused);
    assert!(fx.app.collector().snapshot().contains_catalog(&news.catalog_id));
    assert!(fx.app.collector().dataset_ids().is_empty());

    let removed = fx.app.remove(&catalog, false).unwrap();
    assert_eq!(removed.kind, RemovedKind::Catalog);
    assert!(fx.app.collector().catalog_ids().is_empty());
}

#[test]
fn remove_with_prune_drops_unused_list() {
    let mut fx = fixture();
    let news = fx.app.add("news", LIST_URL, &CancelToken::new()).unwrap();
    let removed = fx.app.remove(news.dataset_id.as_str(), true).unwrap();
    assert!(removed.catalog_removed);
    assert!(fx.app.collector().catalog_ids().is_empty());
    assert!(ConfigLoader::load(&fx.config_path).unwrap().datasets.is_empty());
}

#[test]
fn remove_unknown_ids() {
    let mut fx = fixture();
    assert_matches!(
        fx.app.remove("00000000000000000000000000000000", false),
        Err(CollectorError::DatasetNotFound(_))
    );
    assert_matches!(
        fx.app.remove("not-an-id", false),
        Err(CollectorError::InvalidContentId(_))
    );
}

#[test]
fn status_download_delete_cycle() {
    let mut fx = fixture();
    let cancel = CancelToken::new();
    let news = fx.app.add("news", LIST_URL, &cancel).unwrap();

    let status = fx.app.status("news").unwrap();
    assert_eq!((status.available, status.downloaded, status.missing), (2, 0, 2));
    assert_eq!(fx.app.entries("news").unwrap().len(), 2);

    let result = fx.app.download("news", 1, &JsonOutput, &cancel).unwrap();
    assert_eq!(result.dataset_id, news.dataset_id);
    assert_eq!(result.completed.len(), 1);
    assert!(result.failures.is_empty());
    assert_eq!(result.completed[0].path, "crawl-data/subset=warc/a.warc.gz");

    let status = fx.app.status("news").unwrap();
    assert_eq!((status.downloaded, status.missing), (1, 1));

    assert_matches!(
        fx.app.delete("news", 2),
        Err(CollectorError::InvalidCount { requested: 2, max: 1 })
    );
    let deleted = fx.app.delete("news", 1).unwrap();
    assert_eq!(deleted.removed, vec![result.completed[0].id.clone()]);
    assert_eq!(fx.app.status("news").unwrap().missing, 2);

    assert_matches!(
        fx.app.status("missing"),
        Err(CollectorError::DatasetNotFound(_))
    );
}

#[test]
fn inspect_lists_untracked_directories() {
    let mut fx = fixture();
    let news = fx.app.add("news", LIST_URL, &CancelToken::new()).unwrap();
    let stray = fx
        .app
        .collector()
        .store()
        .datasets_root()
        .join("ffffffffffffffffffffffffffffffff");
    std::fs::create_dir(&stray).unwrap();
    fx.app = App::open(
        ConfigLoader::load(&fx.config_path).unwrap(),
        fx.config_path.clone(),
        MockRemote::new(),
    )
    .unwrap();

    let inspect = fx.app.inspect();
    assert_eq!(inspect.datasets.len(), 1);
    assert_eq!(inspect.datasets[0].id, news.dataset_id);
    assert_eq!(inspect.datasets[0].entries, Some(0));
    assert_eq!(inspect.catalogs.len(), 1);
    assert_eq!(inspect.catalogs[0].used_in, vec!["news".to_string()]);
    assert_eq!(inspect.untracked.len(), 1);
    assert_eq!(inspect.untracked[0].as_str(), "ffffffffffffffffffffffffffffffff");
}

#[test]
fn remove_tolerates_missing_directory() {
    let mut fx = fixture();
    let news = fx.app.add("news", LIST_URL, &CancelToken::new()).unwrap();
    let dir = fx.app.collector().store().dataset_dir(&news.dataset_id);
    std::fs::remove_dir(&dir).unwrap();

    let removed = fx.app.remove(news.dataset_id.as_str(), false).unwrap();
    assert_eq!(removed.kind, RemovedKind::Dataset);
    assert!(removed.catalog_unused);
    assert!(ConfigLoader::load(&fx.config_path).unwrap().datasets.is_empty());
}

#[test]
fn removed_dataset_leaves_no_directory_or_record() {
    let mut fx = fixture();
    let news = fx.app.add("news", LIST_URL, &CancelToken::new()).unwrap();
    fx.app.download("news", 1, &JsonOutput, &CancelToken::new()).unwrap();
    let dir = fx.app.collector().store().dataset_dir(&news.dataset_id);

    fx.app.remove(news.dataset_id.as_str(), false).unwrap();
    assert!(!dir.exists());
    assert!(fx.app.inspect().untracked.is_empty());
    assert!(fx.app.config().datasets.is_empty());
}
