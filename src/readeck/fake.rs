use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use super::{Bookmark, BookmarkBackend, BookmarkPage, SyncEvent, SyncEventType};
use crate::error::{BackendError, BackendResult};

/// In-memory backend recording the calls made against it.
#[derive(Default)]
pub struct FakeBackend {
    pub events: Vec<SyncEvent>,
    pub bookmarks: HashMap<String, Bookmark>,
    /// Search results per site, one entry per page.
    pub pages: HashMap<String, Vec<Vec<Bookmark>>>,
    /// Reported page count per site, overriding the number of pages.
    pub total_pages: HashMap<String, u32>,
    pub failing_sites: HashSet<String>,
    pub articles: HashMap<String, String>,
    pub missing_ids: HashSet<String>,
    pub calls: Mutex<Vec<String>>,
    pub updates: Mutex<Vec<(String, Map<String, Value>)>>,
    pub created: Mutex<Vec<String>>,
}

impl FakeBackend {
    pub fn with_bookmark(mut self, bookmark: Bookmark) -> Self {
        self.bookmarks.insert(bookmark.id.clone(), bookmark);
        self
    }

    pub fn with_event(mut self, id: &str, event_type: SyncEventType) -> Self {
        self.events.push(SyncEvent {
            id: id.to_string(),
            event_type,
            time: None,
        });
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

pub fn bookmark(id: &str, url: &str) -> Bookmark {
    Bookmark {
        id: id.to_string(),
        title: format!("Title {}", id),
        url: url.to_string(),
        ..Default::default()
    }
}

#[async_trait]
impl BookmarkBackend for FakeBackend {
    async fn list_changes(&self, since: Option<DateTime<Utc>>) -> BackendResult<Vec<SyncEvent>> {
        self.record(format!("list_changes:{}", since.is_some()));
        Ok(self.events.clone())
    }

    async fn fetch_details_batch(&self, ids: &[String]) -> BackendResult<HashMap<String, Bookmark>> {
        self.record(format!("fetch_details_batch:{}", ids.len()));
        Ok(ids
            .iter()
            .filter(|id| !self.missing_ids.contains(*id))
            .filter_map(|id| self.bookmarks.get(id).map(|b| (id.clone(), b.clone())))
            .collect())
    }

    async fn search_by_site(
        &self,
        site: &str,
        page: u32,
        archived: Option<bool>,
    ) -> BackendResult<BookmarkPage> {
        self.record(format!("search:{}:{}:{:?}", site, page, archived));
        if self.failing_sites.contains(site) {
            return Err(BackendError::rejected(500, "boom"));
        }
        let pages = self.pages.get(site).cloned().unwrap_or_default();
        let bookmarks = pages
            .get(page.saturating_sub(1) as usize)
            .cloned()
            .unwrap_or_default();
        Ok(BookmarkPage {
            bookmarks,
            total_pages: self
                .total_pages
                .get(site)
                .copied()
                .unwrap_or(pages.len().max(1) as u32),
        })
    }

    async fn fetch_article_html(&self, id: &str) -> BackendResult<String> {
        self.record(format!("article:{}", id));
        self.articles
            .get(id)
            .cloned()
            .ok_or_else(|| BackendError::rejected(404, "no article"))
    }

    async fn update_bookmark(&self, id: &str, fields: Map<String, Value>) -> BackendResult<()> {
        self.record(format!("update:{}", id));
        self.updates.lock().unwrap().push((id.to_string(), fields));
        Ok(())
    }

    async fn create_bookmark(&self, url: &str) -> BackendResult<()> {
        self.record(format!("create:{}", url));
        self.created.lock().unwrap().push(url.to_string());
        Ok(())
    }
}
