//! Readeck API access.
//!
//! [`BookmarkBackend`] is the surface the Kobo handlers depend on;
//! [`ReadeckClient`] implements it over HTTP.

mod client;
mod model;

#[cfg(test)]
pub(crate) mod fake;

pub use client::ReadeckClient;
pub use model::*;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::error::BackendResult;

#[async_trait]
pub trait BookmarkBackend: Send + Sync {
    /// Change feed since the given instant, or the whole collection.
    async fn list_changes(&self, since: Option<DateTime<Utc>>) -> BackendResult<Vec<SyncEvent>>;

    /// Details for the given ids. Ids the server did not return are absent
    /// from the map.
    async fn fetch_details_batch(&self, ids: &[String]) -> BackendResult<HashMap<String, Bookmark>>;

    async fn search_by_site(
        &self,
        site: &str,
        page: u32,
        archived: Option<bool>,
    ) -> BackendResult<BookmarkPage>;

    async fn fetch_article_html(&self, id: &str) -> BackendResult<String>;

    /// Partial update. A bookmark the server no longer knows is not an error.
    async fn update_bookmark(&self, id: &str, fields: Map<String, Value>) -> BackendResult<()>;

    async fn create_bookmark(&self, url: &str) -> BackendResult<()>;
}
