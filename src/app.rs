use std::collections::HashSet;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::domain::{CartItem, HistoryRecord, SeriesUid};
use crate::error::CartError;
use crate::fetch::{FetchOutcome, fetch_object};
use crate::planner::{Planner, TransferPlan};
use crate::progress::{BatchPhase, CancelToken, ProgressEvent, ProgressHandle, ProgressSink};
use crate::s3::StoreClient;
use crate::session::Session;
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    EmptyCart,
    AlreadyRunning,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchOutcome {
    Skipped { reason: SkipReason },
    Completed(BatchReport),
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub series: Vec<SeriesReport>,
    pub total_objects: usize,
    pub completed_objects: usize,
    pub downloaded_bytes: u64,
    pub cancelled: bool,
}

impl BatchReport {
    pub fn completed_series(&self) -> usize {
        self.series
            .iter()
            .filter(|series| matches!(series.status, SeriesStatus::Completed { .. }))
            .count()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SeriesReport {
    pub series_uid: String,
    pub collection: String,
    #[serde(flatten)]
    pub status: SeriesStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SeriesStatus {
    Completed {
        path: String,
        objects: usize,
        downloaded: usize,
        skipped: usize,
        bytes: u64,
    },
    Failed {
        error: String,
    },
    NotStarted,
}

#[derive(Debug, Default)]
struct SeriesStats {
    objects: usize,
    downloaded: usize,
    skipped: usize,
    bytes: u64,
}

/// Batch executor: drains the cart of a [`Session`] into the download root.
pub struct App<C: StoreClient> {
    store: Store,
    client: C,
    domain: String,
}

impl<C: StoreClient> App<C> {
    pub fn new(store: Store, client: C, domain: impl Into<String>) -> Self {
        Self {
            store,
            client,
            domain: domain.into(),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Retrieves every series in the cart.
    ///
    /// Does nothing when the cart is empty or the session already has a batch
    /// in flight. Otherwise the batch always runs to completion: a series
    /// that fails to list or transfer is logged and reported, the rest
    /// continue. Completed series are prepended to history, the cart is
    /// cleared and progress returns to idle.
    ///
    /// If `cancel` fires, no further objects are requested. Series that
    /// completed are recorded and leave the cart; the remainder stay queued.
    pub fn start_batch(
        &self,
        session: &mut Session,
        cancel: &CancelToken,
        sink: &dyn ProgressSink,
    ) -> BatchOutcome {
        if session.cart().is_empty() {
            return BatchOutcome::Skipped {
                reason: SkipReason::EmptyCart,
            };
        }
        let progress = session.progress().clone();
        if !progress.try_begin() {
            warn!("batch already in progress, ignoring start request");
            return BatchOutcome::Skipped {
                reason: SkipReason::AlreadyRunning,
            };
        }

        let started = Instant::now();
        let checkpoint = || {
            sink.event(ProgressEvent {
                progress: progress.snapshot(),
                elapsed: started.elapsed(),
            })
        };
        let items = session.cart().to_vec();
        info!(series = items.len(), root = %self.store.download_root(), "starting batch");
        checkpoint();

        progress.set_phase(
            BatchPhase::Listing,
            format!("Listing objects for {} series...", items.len()),
        );
        checkpoint();
        let plan = Planner::new(&self.client, &self.domain).plan(&items);
        let total = if plan.total_objects == 0 {
            items.len()
        } else {
            plan.total_objects
        };
        progress.set_total(total);
        progress.set_phase(
            BatchPhase::Downloading,
            format!("Downloading {total} objects..."),
        );
        checkpoint();

        let mut report = BatchReport::default();
        let mut staged = Vec::new();
        for item in &items {
            if cancel.is_cancelled() {
                report.cancelled = true;
                report.series.push(series_report(item, SeriesStatus::NotStarted));
                continue;
            }
            progress.set_current(
                Some(item.series_uid.clone()),
                format!("Downloading {} / {}", item.collection, item.series_uid),
            );
            checkpoint();

            let result = self.retrieve_series(
                item,
                plan.get(&item.series_uid),
                &progress,
                cancel,
                &checkpoint,
            );
            let status = match result {
                Ok(stats) => {
                    info!(
                        series = %item.series_uid,
                        objects = stats.objects,
                        downloaded = stats.downloaded,
                        skipped = stats.skipped,
                        "series complete"
                    );
                    staged.push(HistoryRecord::new(item, Utc::now()));
                    report.downloaded_bytes += stats.bytes;
                    SeriesStatus::Completed {
                        path: self.store.series_dir(item).to_string(),
                        objects: stats.objects,
                        downloaded: stats.downloaded,
                        skipped: stats.skipped,
                        bytes: stats.bytes,
                    }
                }
                Err(err) => {
                    if matches!(err, CartError::Cancelled) {
                        report.cancelled = true;
                    }
                    let stage = if err.is_listing() {
                        "listing"
                    } else if err.is_transfer() {
                        "transfer"
                    } else {
                        "local"
                    };
                    warn!(
                        series = %item.series_uid,
                        location = %item.location,
                        stage,
                        error = %err,
                        "series retrieval failed"
                    );
                    SeriesStatus::Failed {
                        error: err.to_string(),
                    }
                }
            };
            report.series.push(series_report(item, status));
            checkpoint();
        }

        progress.set_current(None, "Finalizing...");
        progress.set_phase(BatchPhase::Finalizing, "Finalizing...");
        checkpoint();

        let last = progress.snapshot();
        report.total_objects = last.total;
        report.completed_objects = last.completed;

        if report.cancelled {
            let completed = staged
                .iter()
                .map(|record| record.item.series_uid.clone())
                .collect::<HashSet<SeriesUid>>();
            session.retain_cart(|item| !completed.contains(&item.series_uid));
        } else {
            session.clear();
        }
        session.commit_history(staged);

        progress.reset();
        checkpoint();
        info!(
            completed = report.completed_series(),
            queued = items.len(),
            cancelled = report.cancelled,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "batch finished"
        );
        BatchOutcome::Completed(report)
    }

    fn retrieve_series(
        &self,
        item: &CartItem,
        planned: Option<&TransferPlan>,
        progress: &ProgressHandle,
        cancel: &CancelToken,
        checkpoint: &dyn Fn(),
    ) -> Result<SeriesStats, CartError> {
        let replanned;
        let plan = match planned {
            Some(plan) => plan,
            None => {
                replanned = Planner::new(&self.client, &self.domain).plan_series(item)?;
                &replanned
            }
        };

        let series_dir = self.store.series_dir(item);
        let mut stats = SeriesStats::default();
        for key in &plan.keys {
            if cancel.is_cancelled() {
                return Err(CartError::Cancelled);
            }
            match self
                .store
                .object_path(&series_dir, &plan.location.prefix, key)
            {
                Some(destination) => {
                    let url = self.client.object_url(&plan.location.store, key);
                    match fetch_object(&self.client, &url, &destination)? {
                        FetchOutcome::Skipped => stats.skipped += 1,
                        FetchOutcome::Downloaded { bytes } => {
                            stats.downloaded += 1;
                            stats.bytes += bytes;
                        }
                    }
                }
                None => debug!(key = %key, "no local path for key, skipping"),
            }
            stats.objects += 1;
            progress.advance();
            checkpoint();
        }
        Ok(stats)
    }
}

fn series_report(item: &CartItem, status: SeriesStatus) -> SeriesReport {
    SeriesReport {
        series_uid: item.series_uid.to_string(),
        collection: item.collection.clone(),
        status,
    }
}
