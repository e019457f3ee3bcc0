use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use directories::{ProjectDirs, UserDirs};
use serde::{Deserialize, Serialize};

use crate::error::CartError;
use crate::location::DEFAULT_STORE_DOMAIN;

pub const DEFAULT_CONFIG_FILE: &str = "dicom-cart.json";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub download_root: Option<String>,
    #[serde(default)]
    pub state_dir: Option<String>,
    #[serde(default)]
    pub store: Option<StoreEntry>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct StoreEntry {
    #[serde(default)]
    pub scheme: Option<String>,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub path_style: Option<bool>,
    #[serde(default)]
    pub connect_timeout_secs: Option<u64>,
    #[serde(default)]
    pub listing_timeout_secs: Option<u64>,
    #[serde(default)]
    pub transfer_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSettings {
    /// `https` or `http`.
    pub scheme: String,
    pub domain: String,
    /// Address stores as `{domain}/{store}` instead of `{store}.{domain}`.
    pub path_style: bool,
    pub connect_timeout: Duration,
    pub listing_timeout: Duration,
    /// Covers the whole body stream of one object.
    pub transfer_timeout: Duration,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            scheme: "https".to_string(),
            domain: DEFAULT_STORE_DOMAIN.to_string(),
            path_style: false,
            connect_timeout: Duration::from_secs(10),
            listing_timeout: Duration::from_secs(30),
            transfer_timeout: Duration::from_secs(600),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub download_root: Utf8PathBuf,
    pub state_dir: Utf8PathBuf,
    pub store: StoreSettings,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads `path`, or `dicom-cart.json` in the current directory. Only an
    /// explicitly named file is required to exist.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, CartError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Self::resolve_config(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| CartError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| CartError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, CartError> {
        let schema_version = config.schema_version.unwrap_or(1);

        let download_root = match config.download_root {
            Some(value) => absolute(&value)?,
            None => default_download_root()?,
        };
        let state_dir = match config.state_dir {
            Some(value) => absolute(&value)?,
            None => default_state_dir()?,
        };

        let defaults = StoreSettings::default();
        let entry = config.store.unwrap_or_default();
        let scheme = match entry.scheme.as_deref().map(str::trim) {
            None | Some("") => defaults.scheme,
            Some(scheme @ ("https" | "http")) => scheme.to_string(),
            Some(other) => {
                return Err(CartError::ConfigParse(format!(
                    "unsupported store scheme {other:?}"
                )));
            }
        };
        let store = StoreSettings {
            scheme,
            path_style: entry.path_style.unwrap_or(defaults.path_style),
            domain: entry
                .domain
                .map(|domain| domain.trim().trim_matches('.').to_string())
                .filter(|domain| !domain.is_empty())
                .unwrap_or(defaults.domain),
            connect_timeout: entry
                .connect_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.connect_timeout),
            listing_timeout: entry
                .listing_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.listing_timeout),
            transfer_timeout: entry
                .transfer_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.transfer_timeout),
        };

        Ok(ResolvedConfig {
            schema_version,
            download_root,
            state_dir,
            store,
        })
    }
}

fn absolute(value: &str) -> Result<Utf8PathBuf, CartError> {
    let path = Utf8PathBuf::from(value.trim());
    if path.is_absolute() {
        return Ok(path);
    }
    let cwd = std::env::current_dir().map_err(|err| CartError::Filesystem(err.to_string()))?;
    Utf8PathBuf::from_path_buf(cwd.join(path.as_std_path()))
        .map_err(|_| CartError::Filesystem("non-utf8 working directory".to_string()))
}

fn default_download_root() -> Result<Utf8PathBuf, CartError> {
    UserDirs::new()
        .and_then(|dirs| {
            let base = dirs
                .download_dir()
                .map(|dir| dir.to_path_buf())
                .unwrap_or_else(|| dirs.home_dir().join("Downloads"));
            Utf8PathBuf::from_path_buf(base.join("dicom-cart")).ok()
        })
        .ok_or_else(|| CartError::Filesystem("unable to resolve download directory".to_string()))
}

fn default_state_dir() -> Result<Utf8PathBuf, CartError> {
    ProjectDirs::from("", "", "dicom-cart")
        .and_then(|dirs| Utf8PathBuf::from_path_buf(dirs.data_dir().to_path_buf()).ok())
        .ok_or_else(|| CartError::Filesystem("unable to resolve state directory".to_string()))
}
