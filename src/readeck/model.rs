use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Readeck sends `null` for empty strings, lists and flags; treat it as the
/// type's default instead of failing the whole bookmark.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncEventType {
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: SyncEventType,
    #[serde(default)]
    pub time: Option<DateTime<Utc>>,
}

impl SyncEvent {
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.time.unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceImage {
    #[serde(default, deserialize_with = "null_as_default")]
    pub src: String,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Resources {
    #[serde(default)]
    pub image: Option<ResourceImage>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bookmark {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub url: String,
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_archived: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_marked: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_deleted: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub labels: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub authors: Vec<String>,
    #[serde(default)]
    pub word_count: Option<u32>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub resources: Resources,
}

impl Bookmark {
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created.unwrap_or_default()
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated.unwrap_or_default()
    }

    /// The lead image URL, if the bookmark has a non-empty one.
    pub fn lead_image(&self) -> Option<&str> {
        self.resources
            .image
            .as_ref()
            .map(|image| image.src.as_str())
            .filter(|src| !src.is_empty())
    }

    /// Archived and deleted bookmarks are hidden from the device.
    pub fn is_hidden(&self) -> bool {
        self.is_archived || self.is_deleted
    }
}

/// One page of a bookmark search.
#[derive(Debug, Clone, Default)]
pub struct BookmarkPage {
    pub bookmarks: Vec<Bookmark>,
    pub total_pages: u32,
}
