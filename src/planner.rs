use std::collections::{BTreeSet, HashMap};

use tracing::{debug, warn};

use crate::domain::{CartItem, SeriesUid};
use crate::error::CartError;
use crate::listing::list_objects;
use crate::location::{ObjectLocation, resolve_with_domain};
use crate::s3::StoreClient;

/// Keys one series will download, fixed for the lifetime of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferPlan {
    pub location: ObjectLocation,
    pub keys: BTreeSet<String>,
}

impl TransferPlan {
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct RetrievalPlan {
    pub plans: HashMap<SeriesUid, TransferPlan>,
    /// Objects across every planned series; zero when nothing could be planned.
    pub total_objects: usize,
}

impl RetrievalPlan {
    pub fn get(&self, series_uid: &SeriesUid) -> Option<&TransferPlan> {
        self.plans.get(series_uid)
    }
}

pub struct Planner<'a> {
    client: &'a dyn StoreClient,
    domain: &'a str,
}

impl<'a> Planner<'a> {
    pub fn new(client: &'a dyn StoreClient, domain: &'a str) -> Self {
        Self { client, domain }
    }

    pub fn plan_series(&self, item: &CartItem) -> Result<TransferPlan, CartError> {
        let location = resolve_with_domain(&item.location, self.domain)?;
        let keys = list_objects(self.client, &location)?;
        debug!(
            series = %item.series_uid,
            store = %location.store,
            prefix = %location.prefix,
            objects = keys.len(),
            "planned series"
        );
        Ok(TransferPlan { location, keys })
    }

    /// Plans every item it can. A series that fails to resolve or list is
    /// logged and left out; it never stops the others from being planned.
    pub fn plan(&self, items: &[CartItem]) -> RetrievalPlan {
        let mut plan = RetrievalPlan::default();
        for item in items {
            match self.plan_series(item) {
                Ok(series_plan) => {
                    plan.total_objects += series_plan.len();
                    plan.plans.insert(item.series_uid.clone(), series_plan);
                }
                Err(err) => {
                    warn!(
                        series = %item.series_uid,
                        location = %item.location,
                        error = %err,
                        "failed to plan series"
                    );
                }
            }
        }
        plan
    }
}
