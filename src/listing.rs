use std::collections::{BTreeSet, HashSet};

use tracing::debug;

use crate::error::CartError;
use crate::location::ObjectLocation;
use crate::s3::StoreClient;

/// Collects every object key under `location.prefix`, following continuation
/// tokens until the store stops returning one.
///
/// Directory markers (keys ending in `/`) and a key equal to the prefix are
/// not downloadable and are skipped. A token the store already handed out is
/// treated as a listing failure rather than looping forever.
pub fn list_objects(
    client: &dyn StoreClient,
    location: &ObjectLocation,
) -> Result<BTreeSet<String>, CartError> {
    let mut keys = BTreeSet::new();
    let mut seen_tokens = HashSet::new();
    let mut token: Option<String> = None;
    let mut pages = 0usize;

    loop {
        let page = client.list_page(&location.store, &location.prefix, token.as_deref())?;
        pages += 1;
        debug!(
            store = %location.store,
            prefix = %location.prefix,
            page = pages,
            keys = page.keys.len(),
            "listing page"
        );
        keys.extend(
            page.keys
                .into_iter()
                .filter(|key| !key.ends_with('/') && *key != location.prefix),
        );

        match page.next_token {
            Some(next) => {
                if !seen_tokens.insert(next.clone()) {
                    return Err(CartError::ListingHttp(format!(
                        "continuation token repeated after {pages} pages for s3://{}/{}",
                        location.store, location.prefix
                    )));
                }
                token = Some(next);
            }
            None => break,
        }
    }

    if keys.is_empty() {
        return Err(CartError::EmptyResult {
            store: location.store.clone(),
            prefix: location.prefix.clone(),
        });
    }
    Ok(keys)
}
