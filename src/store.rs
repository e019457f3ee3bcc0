use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tempfile::Builder;

use crate::config::ResolvedConfig;
use crate::domain::CartItem;
use crate::error::CartError;
use crate::fs_util::{relative_object_path, sanitize_segment};

/// On-disk layout: downloaded series under the download root, session
/// state under the state directory.
#[derive(Debug, Clone)]
pub struct Store {
    download_root: Utf8PathBuf,
    state_root: Utf8PathBuf,
}

impl Store {
    pub fn new(config: &ResolvedConfig) -> Self {
        Self::new_with_paths(config.download_root.clone(), config.state_dir.clone())
    }

    pub fn new_with_paths(download_root: Utf8PathBuf, state_root: Utf8PathBuf) -> Self {
        Self {
            download_root,
            state_root,
        }
    }

    pub fn download_root(&self) -> &Utf8Path {
        &self.download_root
    }

    pub fn state_root(&self) -> &Utf8Path {
        &self.state_root
    }

    pub fn session_path(&self) -> Utf8PathBuf {
        self.state_root.join("session.json")
    }

    /// `{root}/{collection}/{series_uid}`, both segments sanitized.
    pub fn series_dir(&self, item: &CartItem) -> Utf8PathBuf {
        self.download_root
            .join(sanitize_segment(&item.collection))
            .join(sanitize_segment(item.series_uid.as_str()))
    }

    pub fn object_path(&self, series_dir: &Utf8Path, prefix: &str, key: &str) -> Option<Utf8PathBuf> {
        relative_object_path(prefix, key).map(|relative| series_dir.join(relative))
    }

    pub fn write_json_atomic<T: Serialize>(path: &Utf8Path, value: &T) -> Result<(), CartError> {
        let parent = path
            .parent()
            .ok_or_else(|| CartError::Filesystem("invalid destination path".to_string()))?;
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| CartError::Filesystem(err.to_string()))?;
        let content =
            serde_json::to_vec_pretty(value).map_err(|err| CartError::Filesystem(err.to_string()))?;
        let mut temp = Builder::new()
            .prefix(".dicom-cart-json")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| CartError::Filesystem(err.to_string()))?;
        std::io::Write::write_all(&mut temp, &content)
            .map_err(|err| CartError::Filesystem(err.to_string()))?;
        temp.persist(path.as_std_path())
            .map_err(|err| CartError::Filesystem(err.to_string()))?;
        Ok(())
    }
}
