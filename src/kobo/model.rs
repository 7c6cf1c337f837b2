use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::ApiError;
use crate::readeck::Bookmark;

/// The device sends `count`/`offset` as strings or numbers depending on the
/// firmware. Anything unparsable counts as zero.
fn loose_usize<'de, D>(deserializer: D) -> Result<usize, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            .unwrap_or(0) as usize,
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    })
}

#[derive(Debug, Default, Deserialize)]
pub struct GetRequest {
    #[serde(default)]
    pub access_token: String,
    #[serde(default, deserialize_with = "loose_usize")]
    pub count: usize,
    #[serde(default, deserialize_with = "loose_usize")]
    pub offset: usize,
    #[serde(default)]
    pub since: Option<Value>,
}

impl GetRequest {
    /// `None` selects a full sync; a number is epoch seconds.
    pub fn cursor(&self) -> Result<Option<DateTime<Utc>>, ApiError> {
        let Some(since) = &self.since else {
            return Ok(None);
        };

        let seconds = match since {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            _ => None,
        };

        seconds
            .and_then(|s| DateTime::from_timestamp(s, 0))
            .map(Some)
            .ok_or_else(|| ApiError::BadRequest("since must be a unix timestamp".to_string()))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct DownloadRequest {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SendRequest {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub actions: Value,
}

impl SendRequest {
    /// Some clients send the action list as a JSON-encoded string.
    pub fn actions(&self) -> Result<Vec<Value>, ApiError> {
        match &self.actions {
            Value::Null => Ok(Vec::new()),
            Value::Array(actions) => Ok(actions.clone()),
            Value::String(encoded) => match serde_json::from_str::<Value>(encoded) {
                Ok(Value::Array(actions)) => Ok(actions),
                _ => Err(ApiError::BadRequest("actions must be an array".to_string())),
            },
            _ => Err(ApiError::BadRequest("actions must be an array".to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ItemStatus {
    #[serde(rename = "0")]
    Active,
    #[serde(rename = "1")]
    Archived,
    #[serde(rename = "2")]
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Author {
    pub author_id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tag {
    pub item_id: String,
    pub tag: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Image {
    pub image_id: String,
    pub item_id: String,
    pub src: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeviceImage {
    pub src: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FullItem {
    pub item_id: String,
    pub resolved_id: String,
    pub given_url: String,
    pub resolved_url: String,
    pub given_title: String,
    pub resolved_title: String,
    pub excerpt: String,
    pub favorite: String,
    pub status: ItemStatus,
    pub is_article: String,
    pub has_image: String,
    pub has_video: String,
    pub image: DeviceImage,
    pub images: BTreeMap<String, Image>,
    pub authors: BTreeMap<String, Author>,
    pub tags: BTreeMap<String, Tag>,
    pub time_added: i64,
    pub time_updated: i64,
    pub time_read: i64,
    pub word_count: u32,
    pub videos: Vec<Value>,
    #[serde(rename = "_optional")]
    pub optional: BTreeMap<String, String>,
}

fn flag(value: bool) -> String {
    let flag = if value { "1" } else { "0" };
    flag.to_string()
}

impl FullItem {
    pub fn from_bookmark(bookmark: &Bookmark) -> Self {
        let mut image = DeviceImage::default();
        let mut images = BTreeMap::new();
        let mut optional = BTreeMap::new();

        let lead_image = bookmark.lead_image();
        if let Some(src) = lead_image {
            image.src = src.to_string();
            images.insert(
                "1".to_string(),
                Image {
                    image_id: "1".to_string(),
                    item_id: bookmark.id.clone(),
                    src: src.to_string(),
                },
            );
            optional.insert("top_image_url".to_string(), src.to_string());
        }

        let authors = bookmark
            .authors
            .iter()
            .map(|name| {
                (
                    name.clone(),
                    Author {
                        author_id: name.clone(),
                        name: name.clone(),
                    },
                )
            })
            .collect();

        let tags = bookmark
            .labels
            .iter()
            .map(|label| {
                (
                    label.clone(),
                    Tag {
                        item_id: bookmark.id.clone(),
                        tag: label.clone(),
                    },
                )
            })
            .collect();

        FullItem {
            item_id: bookmark.id.clone(),
            resolved_id: bookmark.id.clone(),
            given_url: bookmark.url.clone(),
            resolved_url: bookmark.url.clone(),
            given_title: bookmark.title.clone(),
            resolved_title: bookmark.title.clone(),
            excerpt: bookmark.description.clone(),
            favorite: flag(bookmark.is_marked),
            status: ItemStatus::Active,
            is_article: flag(true),
            has_image: flag(lead_image.is_some()),
            has_video: flag(false),
            image,
            images,
            authors,
            tags,
            time_added: bookmark.created_at().timestamp(),
            time_updated: bookmark.updated_at().timestamp(),
            time_read: 0,
            word_count: bookmark.word_count.unwrap_or(0),
            videos: Vec::new(),
            optional,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusItem {
    pub item_id: String,
    pub status: ItemStatus,
}

/// One entry of the sync list: either the full article record or a bare
/// status telling the device to drop its local copy.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DeviceItem {
    Full(Box<FullItem>),
    StatusOnly(StatusItem),
}

impl DeviceItem {
    pub fn status_only(id: &str, status: ItemStatus) -> Self {
        DeviceItem::StatusOnly(StatusItem {
            item_id: id.to_string(),
            status,
        })
    }

    pub fn item_id(&self) -> &str {
        match self {
            DeviceItem::Full(item) => &item.item_id,
            DeviceItem::StatusOnly(item) => &item.item_id,
        }
    }

    pub fn status(&self) -> ItemStatus {
        match self {
            DeviceItem::Full(item) => item.status,
            DeviceItem::StatusOnly(item) => item.status,
        }
    }

    pub fn is_full(&self) -> bool {
        matches!(self, DeviceItem::Full(_))
    }
}

#[derive(Debug, Serialize)]
pub struct SyncResponse {
    pub status: u8,
    pub list: BTreeMap<String, DeviceItem>,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct DownloadResponse {
    pub article: String,
    pub images: BTreeMap<String, Image>,
}

#[derive(Debug, Serialize)]
pub struct SendResponse {
    pub status: bool,
    pub action_results: Vec<bool>,
}
