use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::CartError;

pub const DEFAULT_SEARCH_LIMIT: usize = 1000;

/// One row of an IDC index export.
///
/// Exports fill missing cells with empty strings, so every field tolerates
/// absence: strings default to `""`, `image_count` to `0`, `size_mb` to
/// `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesRecord {
    #[serde(rename = "SeriesInstanceUID")]
    pub series_uid: String,
    #[serde(rename = "Collection", default)]
    pub collection: String,
    #[serde(rename = "Modality", default)]
    pub modality: String,
    #[serde(rename = "BodyPartExamined", default)]
    pub body_part: String,
    #[serde(rename = "SeriesDate", default)]
    pub series_date: String,
    #[serde(rename = "SeriesDescription", default)]
    pub description: String,
    #[serde(rename = "ImageCount", default, deserialize_with = "lenient_count")]
    pub image_count: u64,
    #[serde(rename = "series_size_MB", default, deserialize_with = "lenient_size")]
    pub size_mb: Option<f64>,
    #[serde(rename = "series_aws_url", default)]
    pub location: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum FilterKind {
    Collection,
    Modality,
    BodyPart,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeriesFilter {
    pub collection: Option<String>,
    pub modality: Option<String>,
    pub body_part: Option<String>,
}

impl SeriesFilter {
    /// Blank values clear the filter.
    pub fn set(&mut self, kind: FilterKind, value: &str) {
        let value = Some(value.trim().to_string()).filter(|value| !value.is_empty());
        match kind {
            FilterKind::Collection => self.collection = value,
            FilterKind::Modality => self.modality = value,
            FilterKind::BodyPart => self.body_part = value,
        }
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn matches(&self, record: &SeriesRecord) -> bool {
        field_matches(self.collection.as_deref(), &record.collection)
            && field_matches(self.modality.as_deref(), &record.modality)
            && field_matches(self.body_part.as_deref(), &record.body_part)
    }
}

fn field_matches(filter: Option<&str>, value: &str) -> bool {
    filter.is_none_or(|filter| filter == value)
}

pub trait Catalog: Send + Sync {
    fn search(&self, filter: &SeriesFilter, limit: usize) -> Result<Vec<SeriesRecord>, CartError>;

    /// Sorted distinct non-empty values of one column, optionally scoped to a
    /// collection.
    fn facet_values(
        &self,
        kind: FilterKind,
        collection: Option<&str>,
    ) -> Result<Vec<String>, CartError>;

    fn find(&self, series_uid: &str) -> Result<SeriesRecord, CartError> {
        self.search(&SeriesFilter::default(), usize::MAX)?
            .into_iter()
            .find(|record| record.series_uid == series_uid)
            .ok_or_else(|| CartError::SeriesNotFound(series_uid.to_string()))
    }
}

/// Catalog backed by a JSON array exported from the IDC index.
#[derive(Debug, Clone)]
pub struct CatalogFile {
    path: PathBuf,
    records: Vec<SeriesRecord>,
}

impl CatalogFile {
    pub fn open(path: &Path) -> Result<Self, CartError> {
        let content =
            fs::read_to_string(path).map_err(|_| CartError::CatalogRead(path.to_path_buf()))?;
        let records = Self::parse(&content)?;
        Ok(Self {
            path: path.to_path_buf(),
            records,
        })
    }

    pub fn from_records(records: Vec<SeriesRecord>) -> Self {
        Self {
            path: PathBuf::new(),
            records,
        }
    }

    pub fn parse(content: &str) -> Result<Vec<SeriesRecord>, CartError> {
        serde_json::from_str(content).map_err(|err| CartError::CatalogParse(err.to_string()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Catalog for CatalogFile {
    fn search(&self, filter: &SeriesFilter, limit: usize) -> Result<Vec<SeriesRecord>, CartError> {
        Ok(self
            .records
            .iter()
            .filter(|record| filter.matches(record))
            .take(limit)
            .cloned()
            .collect())
    }

    fn facet_values(
        &self,
        kind: FilterKind,
        collection: Option<&str>,
    ) -> Result<Vec<String>, CartError> {
        let values = self
            .records
            .iter()
            .filter(|record| field_matches(collection, &record.collection))
            .map(|record| match kind {
                FilterKind::Collection => record.collection.as_str(),
                FilterKind::Modality => record.modality.as_str(),
                FilterKind::BodyPart => record.body_part.as_str(),
            })
            .filter(|value| !value.is_empty())
            .collect::<BTreeSet<_>>();
        Ok(values.into_iter().map(str::to_string).collect())
    }
}

fn lenient_count<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Number(number) => number
            .as_u64()
            .or_else(|| number.as_f64().filter(|v| *v >= 0.0).map(|v| v as u64))
            .unwrap_or(0),
        Value::String(text) => text.trim().parse().unwrap_or(0),
        _ => 0,
    })
}

fn lenient_size<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    })
}
