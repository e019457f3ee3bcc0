use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::catalog::SeriesRecord;
use crate::error::CartError;

/// Archive a series was selected from. IDC is the only archive whose series
/// carry object-store locations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "UPPERCASE")]
pub enum Source {
    Idc,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Idc => write!(f, "IDC"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SeriesUid(String);

impl SeriesUid {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SeriesUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SeriesUid {
    type Err = CartError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim();
        if normalized.is_empty() || normalized.chars().any(|ch| ch.is_control()) {
            return Err(CartError::InvalidSeriesUid(value.to_string()));
        }
        Ok(Self(normalized.to_string()))
    }
}

/// A series queued for retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    pub series_uid: SeriesUid,
    pub collection: String,
    pub modality: String,
    pub body_part: String,
    pub image_count: u64,
    /// Declared payload size; `None` when the catalog left it blank.
    pub size_mb: Option<f64>,
    pub source: Source,
    /// Object-store reference, resolved only when a batch is planned.
    pub location: String,
    pub added_at: DateTime<Utc>,
}

impl CartItem {
    pub fn from_record(
        record: &SeriesRecord,
        source: Source,
        added_at: DateTime<Utc>,
    ) -> Result<Self, CartError> {
        Ok(Self {
            series_uid: record.series_uid.parse()?,
            collection: record.collection.clone(),
            modality: record.modality.clone(),
            body_part: record.body_part.clone(),
            image_count: record.image_count,
            size_mb: record.size_mb,
            source,
            location: record.location.clone(),
            added_at,
        })
    }
}

/// Snapshot of a cart item whose transfer finished without error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub item: CartItem,
    pub downloaded_at: DateTime<Utc>,
}

impl HistoryRecord {
    pub fn new(item: &CartItem, downloaded_at: DateTime<Utc>) -> Self {
        Self {
            item: item.clone(),
            downloaded_at,
        }
    }
}
