use std::collections::HashSet;
use std::fs;

use camino::Utf8Path;
use serde::{Deserialize, Serialize};

use crate::domain::{CartItem, HistoryRecord, SeriesUid};
use crate::error::CartError;
use crate::progress::ProgressHandle;
use crate::store::Store;

/// Cart, completion history and batch progress: the state the presentation
/// layer reads and the batch executor mutates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Session {
    #[serde(default)]
    cart: Vec<CartItem>,
    #[serde(default)]
    history: Vec<HistoryRecord>,
    #[serde(skip)]
    progress: ProgressHandle,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// A missing file is an empty session. Anything but a JSON object is
    /// rejected so a damaged file is never overwritten as empty.
    pub fn load(path: &Utf8Path) -> Result<Self, CartError> {
        if !path.as_std_path().exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| CartError::Filesystem(format!("read {path}: {err}")))?;
        let value: serde_json::Value = serde_json::from_str(&content)
            .map_err(|err| CartError::SessionParse(err.to_string()))?;
        if !value.is_object() {
            return Err(CartError::SessionParse(format!(
                "{path}: expected a JSON object"
            )));
        }
        serde_json::from_value(value).map_err(|err| CartError::SessionParse(err.to_string()))
    }

    pub fn save(&self, path: &Utf8Path) -> Result<(), CartError> {
        Store::write_json_atomic(path, self)
    }

    /// Returns `false` when the series is already queued.
    pub fn add(&mut self, item: CartItem) -> bool {
        if self.contains(&item.series_uid) {
            return false;
        }
        self.cart.push(item);
        true
    }

    pub fn remove(&mut self, series_uid: &SeriesUid) -> bool {
        let before = self.cart.len();
        self.cart.retain(|item| &item.series_uid != series_uid);
        self.cart.len() != before
    }

    pub fn clear(&mut self) {
        self.cart.clear();
    }

    pub fn contains(&self, series_uid: &SeriesUid) -> bool {
        self.cart.iter().any(|item| &item.series_uid == series_uid)
    }

    pub fn cart(&self) -> &[CartItem] {
        &self.cart
    }

    pub fn cart_count(&self) -> usize {
        self.cart.len()
    }

    /// Sum of declared sizes, rounded to two decimals. Items without a
    /// declared size count as zero.
    pub fn total_size_mb(&self) -> f64 {
        let total: f64 = self.cart.iter().filter_map(|item| item.size_mb).sum();
        (total * 100.0).round() / 100.0
    }

    /// Newest first.
    pub fn history(&self) -> &[HistoryRecord] {
        &self.history
    }

    pub fn progress(&self) -> &ProgressHandle {
        &self.progress
    }

    /// Commits the records staged during one batch so the last one staged
    /// ends up first.
    pub(crate) fn commit_history(&mut self, staged: Vec<HistoryRecord>) {
        for record in staged {
            self.history.insert(0, record);
        }
    }

    /// Folds a batch run into this session, freshly reloaded from disk.
    ///
    /// `before` is the copy the batch started from and `after` the same copy
    /// once the batch finished. Series the batch consumed leave the cart and
    /// its new history records are prepended; cart edits saved by others in
    /// the meantime are kept.
    pub fn merge_batch(&mut self, before: &Session, after: &Session) {
        let consumed = before
            .cart
            .iter()
            .map(|item| &item.series_uid)
            .filter(|series_uid| !after.contains(series_uid))
            .cloned()
            .collect::<HashSet<SeriesUid>>();
        self.cart
            .retain(|item| !consumed.contains(&item.series_uid));

        let added = after.history.len().saturating_sub(before.history.len());
        let mut history = after.history[..added].to_vec();
        history.append(&mut self.history);
        self.history = history;
    }

    pub(crate) fn retain_cart(&mut self, keep: impl Fn(&CartItem) -> bool) {
        self.cart.retain(|item| keep(item));
    }
}
