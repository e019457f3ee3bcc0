#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::sync::Mutex;

use camino::Utf8PathBuf;
use chrono::{TimeZone, Utc};

use dicom_cart::domain::{CartItem, Source};
use dicom_cart::error::CartError;
use dicom_cart::progress::{ProgressEvent, ProgressSink};
use dicom_cart::s3::{ListPage, StoreClient};
use dicom_cart::store::Store;

/// In-memory object store. Listings are split into pages linked by
/// `{prefix}#{page}` tokens; every object body is its key.
#[derive(Default)]
pub struct MockStore {
    listings: HashMap<(String, String), Vec<ListPage>>,
    failing_urls: HashSet<String>,
    pub list_calls: Mutex<usize>,
    pub downloads: Mutex<Vec<String>>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_series(mut self, store: &str, prefix: &str, keys: &[&str], page_size: usize) -> Self {
        let chunks = keys.chunks(page_size.max(1)).collect::<Vec<_>>();
        let pages = chunks
            .iter()
            .enumerate()
            .map(|(index, chunk)| ListPage {
                keys: chunk.iter().map(|key| key.to_string()).collect(),
                next_token: (index + 1 < chunks.len()).then(|| format!("{prefix}#{}", index + 1)),
            })
            .collect();
        self.listings
            .insert((store.to_string(), prefix.to_string()), pages);
        self
    }

    pub fn failing_object(mut self, store: &str, key: &str) -> Self {
        self.failing_urls.insert(mock_url(store, key));
        self
    }

    pub fn download_count(&self) -> usize {
        self.downloads.lock().unwrap().len()
    }
}

fn mock_url(store: &str, key: &str) -> String {
    format!("mock://{store}/{key}")
}

impl StoreClient for MockStore {
    fn list_page(
        &self,
        store: &str,
        prefix: &str,
        continuation: Option<&str>,
    ) -> Result<ListPage, CartError> {
        *self.list_calls.lock().unwrap() += 1;
        let pages = self
            .listings
            .get(&(store.to_string(), prefix.to_string()))
            .ok_or_else(|| CartError::ListingStatus {
                status: 404,
                message: "NoSuchBucket".to_string(),
            })?;
        let index = match continuation {
            None => 0,
            Some(token) => token
                .rsplit_once('#')
                .and_then(|(_, page)| page.parse::<usize>().ok())
                .ok_or_else(|| CartError::ListingStatus {
                    status: 400,
                    message: format!("bad token {token}"),
                })?,
        };
        pages.get(index).cloned().ok_or(CartError::ListingStatus {
            status: 400,
            message: "token out of range".to_string(),
        })
    }

    fn object_url(&self, store: &str, key: &str) -> String {
        mock_url(store, key)
    }

    fn download(&self, url: &str, sink: &mut dyn Write) -> Result<u64, CartError> {
        self.downloads.lock().unwrap().push(url.to_string());
        if self.failing_urls.contains(url) {
            return Err(CartError::TransferStatus {
                status: 500,
                message: "InternalError".to_string(),
            });
        }
        let key = url.splitn(4, '/').nth(3).unwrap_or_default();
        sink.write_all(key.as_bytes())
            .map_err(|err| CartError::TransferHttp(err.to_string()))?;
        Ok(key.len() as u64)
    }
}

/// Records every checkpoint snapshot.
#[derive(Default)]
pub struct RecordingSink {
    pub events: Mutex<Vec<ProgressEvent>>,
}

impl ProgressSink for RecordingSink {
    fn event(&self, event: ProgressEvent) {
        self.events.lock().unwrap().push(event);
    }
}

pub fn cart_item(uid: &str, collection: &str, location: &str) -> CartItem {
    CartItem {
        series_uid: uid.parse().unwrap(),
        collection: collection.to_string(),
        modality: "CT".to_string(),
        body_part: "CHEST".to_string(),
        image_count: 4,
        size_mb: Some(2.5),
        source: Source::Idc,
        location: location.to_string(),
        added_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
    }
}

pub fn temp_store() -> (tempfile::TempDir, Store) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    let store = Store::new_with_paths(root.join("downloads"), root.join("state"));
    (temp, store)
}

/// Relative paths of every file below `root`, sorted.
pub fn files_under(root: &std::path::Path) -> Vec<String> {
    let mut found = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries {
            let path = entry.unwrap().path();
            if path.is_dir() {
                stack.push(path);
            } else {
                let relative = path.strip_prefix(root).unwrap();
                found.push(relative.to_string_lossy().replace('\\', "/"));
            }
        }
    }
    found.sort();
    found
}
