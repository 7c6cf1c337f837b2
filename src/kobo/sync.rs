use chrono::{DateTime, Utc};
use std::collections::HashSet;

use super::model::{DeviceItem, FullItem, ItemStatus};
use crate::error::BackendResult;
use crate::readeck::{BookmarkBackend, SyncEvent, SyncEventType};

/// Offset/count paging requested by the device. A zero count is unlimited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Window {
    pub offset: usize,
    pub count: usize,
}

impl Window {
    pub fn apply<T>(&self, items: Vec<T>) -> Vec<T> {
        let items = items.into_iter().skip(self.offset);
        if self.count == 0 {
            items.collect()
        } else {
            items.take(self.count).collect()
        }
    }
}

#[derive(Debug)]
pub struct SyncOutcome {
    /// Emitted items in feed order, after windowing.
    pub items: Vec<DeviceItem>,
    /// Visible full items, before windowing.
    pub total: usize,
}

/// Keeps the latest event per id, at the position of that latest event.
fn dedupe(events: Vec<SyncEvent>) -> Vec<SyncEvent> {
    let mut seen = HashSet::new();
    let mut latest: Vec<SyncEvent> = events
        .into_iter()
        .rev()
        .filter(|event| seen.insert(event.id.clone()))
        .collect();
    latest.reverse();
    latest
}

/// Turns the backend change feed into the device's item list.
///
/// Without a cursor this is a full sync: only visible bookmarks are emitted
/// and deletions are implied by absence. With a cursor, deletions and
/// archivals are emitted as status-only entries so the device can drop its
/// local copies.
pub async fn reconcile(
    backend: &dyn BookmarkBackend,
    since: Option<DateTime<Utc>>,
    window: Window,
) -> BackendResult<SyncOutcome> {
    let incremental = since.is_some();
    let events = dedupe(backend.list_changes(since).await?);

    let candidates: Vec<String> = events
        .iter()
        .filter(|event| event.event_type == SyncEventType::Update)
        .map(|event| event.id.clone())
        .collect();
    let details = if candidates.is_empty() {
        Default::default()
    } else {
        backend.fetch_details_batch(&candidates).await?
    };

    let mut emitted = Vec::with_capacity(events.len());
    for event in &events {
        if event.event_type == SyncEventType::Delete {
            if incremental {
                emitted.push(DeviceItem::status_only(&event.id, ItemStatus::Deleted));
            }
            continue;
        }

        let Some(bookmark) = details.get(&event.id) else {
            tracing::debug!(item_id = %event.id, "bookmark missing from batch response, skipping");
            continue;
        };

        if bookmark.is_hidden() {
            if incremental {
                let status = if bookmark.is_deleted {
                    ItemStatus::Deleted
                } else {
                    ItemStatus::Archived
                };
                emitted.push(DeviceItem::status_only(&event.id, status));
            }
            continue;
        }

        emitted.push(DeviceItem::Full(Box::new(FullItem::from_bookmark(bookmark))));
    }

    let total = emitted.iter().filter(|item| item.is_full()).count();
    tracing::info!(
        incremental,
        events = events.len(),
        emitted = emitted.len(),
        total,
        "reconciled change feed"
    );

    Ok(SyncOutcome {
        items: window.apply(emitted),
        total,
    })
}
