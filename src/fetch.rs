use std::fs;
use std::io::{BufWriter, Write};

use camino::Utf8Path;
use tracing::debug;

use crate::error::CartError;
use crate::s3::StoreClient;

const WRITE_BUFFER_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Destination already present; no request was made.
    Skipped,
    Downloaded { bytes: u64 },
}

/// Streams `url` to `destination` unless the destination already exists.
///
/// The body is written to a temporary file next to the destination and
/// renamed into place once complete, so an interrupted transfer leaves no
/// file behind at `destination`.
pub fn fetch_object(
    client: &dyn StoreClient,
    url: &str,
    destination: &Utf8Path,
) -> Result<FetchOutcome, CartError> {
    if destination.as_std_path().exists() {
        debug!(path = %destination, "already present, skipping");
        return Ok(FetchOutcome::Skipped);
    }

    let parent = destination
        .parent()
        .ok_or_else(|| CartError::TransferIo(format!("invalid destination path {destination}")))?;
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| CartError::TransferIo(format!("create {parent}: {err}")))?;

    let temp = tempfile::Builder::new()
        .prefix(".dicom-cart-part")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| CartError::TransferIo(format!("temp file in {parent}: {err}")))?;
    let bytes = {
        let mut writer = BufWriter::with_capacity(WRITE_BUFFER_BYTES, temp.as_file());
        let bytes = client.download(url, &mut writer)?;
        writer
            .flush()
            .map_err(|err| CartError::TransferIo(format!("write {destination}: {err}")))?;
        bytes
    };
    temp.persist(destination.as_std_path())
        .map_err(|err| CartError::TransferIo(format!("persist {destination}: {err}")))?;

    Ok(FetchOutcome::Downloaded { bytes })
}
