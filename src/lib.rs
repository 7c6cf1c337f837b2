use axum::{Router, routing::get};
use std::error::Error;
use tower_http::trace::TraceLayer;

use crate::handler::{AppState, convert_image, healthcheck, not_found};

pub mod auth;
pub mod config;
pub mod content;
pub mod convert;
pub mod error;
pub mod handler;
pub mod kobo;
pub mod readeck;

/// Full application router, state attached.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(healthcheck))
        .route("/api/convert-image", get(convert_image))
        .nest("/api/kobo", kobo::routes())
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub fn unpack_error(err: &(dyn Error)) -> String {
    let mut parts = Vec::new();
    parts.push(err.to_string());
    let mut current = err.source();
    while let Some(source) = current {
        parts.push(source.to_string());
        current = source.source();
    }
    parts.join(": ")
}
