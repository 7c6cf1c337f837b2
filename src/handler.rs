use std::sync::Arc;

use axum::{
    Json,
    extract::{Query, State},
    http::{StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::auth::UserDirectory;
use crate::convert::ImageConverter;
use crate::error::{ApiError, ErrorResponse};

#[derive(Clone)]
pub struct AppState {
    pub users: Arc<UserDirectory>,
    pub images: Arc<ImageConverter>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
}

pub async fn healthcheck() -> impl IntoResponse {
    info!("got healthcheck request");
    Json(StatusResponse { status: "ok" })
}

#[derive(Debug, Deserialize)]
pub struct ConvertParams {
    pub url: Option<String>,
}

/// Always answers with a JPEG once a url is given; failures become a
/// captioned placeholder rather than an error status.
pub async fn convert_image(
    State(state): State<AppState>,
    Query(params): Query<ConvertParams>,
) -> Result<Response, ApiError> {
    let url = params
        .url
        .filter(|url| !url.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("missing 'url' parameter".to_string()))?;

    let image = state.images.convert(url.trim()).await;
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "image/jpeg"),
            (header::CACHE_CONTROL, image.cache_control()),
        ],
        image.bytes(),
    )
        .into_response())
}

pub async fn not_found(uri: Uri) -> Response {
    tracing::warn!(path = %uri.path(), "no route for request");
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: "not found".to_string(),
        }),
    )
        .into_response()
}
