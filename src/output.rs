use std::cell::RefCell;
use std::io::{self, Write};

use serde::Serialize;

use crate::app::BatchOutcome;
use crate::catalog::SeriesRecord;
use crate::domain::{CartItem, HistoryRecord};
use crate::progress::{BatchPhase, ProgressEvent, ProgressSink};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

#[derive(Debug, Serialize)]
pub struct CartSummary<'a> {
    pub count: usize,
    pub total_size_mb: f64,
    pub items: &'a [CartItem],
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_series(records: &[SeriesRecord]) -> io::Result<()> {
        Self::print_json(&records)
    }

    pub fn print_values(values: &[String]) -> io::Result<()> {
        Self::print_json(&values)
    }

    pub fn print_cart(summary: &CartSummary<'_>) -> io::Result<()> {
        Self::print_json(summary)
    }

    pub fn print_history(history: &[HistoryRecord]) -> io::Result<()> {
        Self::print_json(&history)
    }

    pub fn print_batch(outcome: &BatchOutcome) -> io::Result<()> {
        Self::print_json(outcome)
    }

    fn print_json<T: Serialize + ?Sized>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Logs phase changes and whole-percent steps instead of every checkpoint.
#[derive(Default)]
pub struct LogProgress {
    last: RefCell<Option<(BatchPhase, u8)>>,
}

impl ProgressSink for LogProgress {
    fn event(&self, event: ProgressEvent) {
        let progress = event.progress;
        let key = (progress.phase, progress.percent);
        if self.last.borrow().as_ref() == Some(&key) {
            return;
        }
        self.last.replace(Some(key));
        tracing::info!(
            phase = progress.phase.label(),
            completed = progress.completed,
            total = progress.total,
            percent = progress.percent,
            elapsed_ms = event.elapsed.as_millis() as u64,
            "{}",
            progress.message
        );
    }
}
