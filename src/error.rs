use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum CartError {
    #[error("invalid series instance UID: {0}")]
    InvalidSeriesUid(String),

    #[error("invalid object-store location: {0}")]
    InvalidLocation(String),

    #[error("object listing failed: {0}")]
    ListingHttp(String),

    #[error("object listing returned status {status}: {message}")]
    ListingStatus { status: u16, message: String },

    #[error("no downloadable objects under s3://{store}/{prefix}")]
    EmptyResult { store: String, prefix: String },

    #[error("object transfer failed: {0}")]
    TransferHttp(String),

    #[error("object transfer returned status {status}: {message}")]
    TransferStatus { status: u16, message: String },

    #[error("failed to write object: {0}")]
    TransferIo(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("failed to read catalog export at {0}")]
    CatalogRead(PathBuf),

    #[error("failed to parse catalog export: {0}")]
    CatalogParse(String),

    #[error("failed to parse session file: {0}")]
    SessionParse(String),

    #[error("series not found in catalog: {0}")]
    SeriesNotFound(String),

    #[error("batch cancelled")]
    Cancelled,
}

impl CartError {
    /// Errors raised while discovering a series' objects.
    pub fn is_listing(&self) -> bool {
        matches!(
            self,
            CartError::InvalidLocation(_)
                | CartError::ListingHttp(_)
                | CartError::ListingStatus { .. }
                | CartError::EmptyResult { .. }
        )
    }

    pub fn is_transfer(&self) -> bool {
        matches!(
            self,
            CartError::TransferHttp(_)
                | CartError::TransferStatus { .. }
                | CartError::TransferIo(_)
        )
    }
}
