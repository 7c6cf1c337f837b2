use serde_json::{Map, Value};

use crate::readeck::BookmarkBackend;

/// A single entry of a `send` batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceAction {
    Archive(String),
    Readd(String),
    Favorite(String),
    Unfavorite(String),
    Delete(String),
    Add(String),
    /// The entry was not an object.
    Noop,
    /// Known action without the id or url it needs.
    Incomplete(String),
    Unknown(String),
}

fn item_id(action: &Map<String, Value>) -> Option<String> {
    match action.get("item_id")? {
        Value::String(id) if !id.is_empty() => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

impl DeviceAction {
    pub fn parse(value: &Value) -> Self {
        let Some(action) = value.as_object() else {
            return DeviceAction::Noop;
        };
        let name = action.get("action").and_then(Value::as_str).unwrap_or_default();

        let by_id = |variant: fn(String) -> DeviceAction| {
            item_id(action)
                .map(variant)
                .unwrap_or_else(|| DeviceAction::Incomplete(name.to_string()))
        };

        match name {
            "archive" => by_id(DeviceAction::Archive),
            "readd" => by_id(DeviceAction::Readd),
            "favorite" => by_id(DeviceAction::Favorite),
            "unfavorite" => by_id(DeviceAction::Unfavorite),
            "delete" => by_id(DeviceAction::Delete),
            "add" => match action.get("url").and_then(Value::as_str) {
                Some(url) if !url.is_empty() => DeviceAction::Add(url.to_string()),
                _ => DeviceAction::Incomplete(name.to_string()),
            },
            other => DeviceAction::Unknown(other.to_string()),
        }
    }

    fn update(&self) -> Option<(&str, Map<String, Value>)> {
        let (id, field, value) = match self {
            DeviceAction::Archive(id) => (id, "is_archived", true),
            DeviceAction::Readd(id) => (id, "is_archived", false),
            DeviceAction::Favorite(id) => (id, "is_marked", true),
            DeviceAction::Unfavorite(id) => (id, "is_marked", false),
            DeviceAction::Delete(id) => (id, "is_deleted", true),
            _ => return None,
        };

        let mut fields = Map::new();
        fields.insert(field.to_string(), Value::Bool(value));
        Some((id.as_str(), fields))
    }

    /// Applies the action. Failures are logged and reported as `false`.
    pub async fn apply(&self, backend: &dyn BookmarkBackend) -> bool {
        if let Some((id, fields)) = self.update() {
            return match backend.update_bookmark(id, fields).await {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(item_id = %id, action = ?self, error = %e, "failed to apply action");
                    false
                }
            };
        }

        match self {
            DeviceAction::Add(url) => match backend.create_bookmark(url).await {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(url = %url, error = %e, "failed to add bookmark");
                    false
                }
            },
            DeviceAction::Noop => {
                tracing::warn!("ignoring non-object action entry");
                false
            }
            DeviceAction::Incomplete(name) => {
                tracing::warn!(action = %name, "action is missing its target");
                false
            }
            DeviceAction::Unknown(name) => {
                tracing::warn!(action = %name, "unknown action");
                false
            }
            _ => false,
        }
    }
}

/// Applies actions in order, one result per entry.
pub async fn apply_all(backend: &dyn BookmarkBackend, actions: &[Value]) -> Vec<bool> {
    let mut results = Vec::with_capacity(actions.len());
    for action in actions {
        results.push(DeviceAction::parse(action).apply(backend).await);
    }
    results
}
