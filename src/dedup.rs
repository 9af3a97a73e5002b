use crate::fetch::{FetchedFeed, FetchedItem};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

/// SHA-256 hex of the item's GUID, falling back to its link. `None` when the
/// item has neither; such items cannot be deduplicated and are dropped.
pub fn item_fingerprint(item: &FetchedItem) -> Option<String> {
    let identifier = if !item.guid.is_empty() {
        item.guid.as_str()
    } else if !item.link.is_empty() {
        item.link.as_str()
    } else {
        return None;
    };

    let mut hasher = Sha256::new();
    hasher.update(identifier.as_bytes());
    Some(hex::encode(hasher.finalize()))
}

/// Effective timestamp for ordering: publication time, else update time.
fn effective_timestamp(item: &FetchedItem) -> Option<DateTime<Utc>> {
    item.published_at.or(item.updated_at)
}

#[derive(Debug, PartialEq)]
pub struct NewItems {
    /// Unseen items, oldest first, each paired with its fingerprint.
    pub items: Vec<(FetchedItem, String)>,
    /// Fingerprint of the newest item in the fetch, new or not.
    pub high_water: Option<String>,
}

/// Selects the items not yet processed, in publication order. `seen` is an
/// existence probe against the processed-items table; an error from it
/// aborts the selection (storage faults must not look like "new item").
pub fn select_new<E>(
    feed: &FetchedFeed,
    mut seen: impl FnMut(&str) -> Result<bool, E>,
) -> Result<NewItems, E> {
    let mut sorted: Vec<&FetchedItem> = feed.items.iter().collect();
    // Newest first; undated items sort after dated ones and keep their
    // original relative order (the sort is stable).
    sorted.sort_by(|a, b| match (effective_timestamp(a), effective_timestamp(b)) {
        (Some(ta), Some(tb)) => tb.cmp(&ta),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });

    let high_water = sorted.first().and_then(|item| item_fingerprint(item));

    let mut fresh: Vec<(FetchedItem, String)> = Vec::new();
    for item in sorted {
        let fingerprint = match item_fingerprint(item) {
            Some(fp) => fp,
            None => {
                log::warn!("Item '{}' has no GUID or link, skipping", item.title);
                continue;
            }
        };
        if !seen(&fingerprint)? {
            fresh.push((item.clone(), fingerprint));
        }
    }

    // Walked newest-first; deliver oldest-first.
    fresh.reverse();

    Ok(NewItems {
        items: fresh,
        high_water,
    })
}
