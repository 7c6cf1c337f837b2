use axum::{Json, extract::State};

use super::action;
use super::download;
use super::extract::DeviceBody;
use super::model::{DownloadRequest, DownloadResponse, GetRequest, SendRequest, SendResponse, SyncResponse};
use super::sync::{self, Window};
use crate::error::ApiError;
use crate::handler::AppState;

pub async fn sync_articles(
    State(state): State<AppState>,
    DeviceBody(req): DeviceBody<GetRequest>,
) -> Result<Json<SyncResponse>, ApiError> {
    let backend = state.users.authenticate(&req.access_token)?;
    let since = req.cursor()?;
    let window = Window {
        offset: req.offset,
        count: req.count,
    };

    let outcome = sync::reconcile(backend.as_ref(), since, window).await?;
    let list = outcome
        .items
        .into_iter()
        .map(|item| (item.item_id().to_string(), item))
        .collect();

    Ok(Json(SyncResponse {
        status: 1,
        list,
        total: outcome.total,
    }))
}

pub async fn download_article(
    State(state): State<AppState>,
    DeviceBody(req): DeviceBody<DownloadRequest>,
) -> Result<Json<DownloadResponse>, ApiError> {
    let backend = state.users.authenticate(&req.access_token)?;
    let url = req
        .url
        .as_deref()
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .ok_or_else(|| ApiError::BadRequest("missing 'url' parameter".to_string()))?;

    let response = download::download(backend.as_ref(), url).await?;
    Ok(Json(response))
}

pub async fn send_actions(
    State(state): State<AppState>,
    DeviceBody(req): DeviceBody<SendRequest>,
) -> Result<Json<SendResponse>, ApiError> {
    let backend = state.users.authenticate(&req.access_token)?;
    let actions = req.actions()?;

    let action_results = action::apply_all(backend.as_ref(), &actions).await;
    let status = action_results.iter().all(|ok| *ok);
    if !status {
        tracing::info!(
            failed = action_results.iter().filter(|ok| !**ok).count(),
            total = action_results.len(),
            "some device actions failed"
        );
    }

    Ok(Json(SendResponse {
        status,
        action_results,
    }))
}
