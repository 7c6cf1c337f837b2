use axum::{Router, routing::post};

use super::handler;
use crate::handler::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/get", post(handler::sync_articles))
        .route("/download", post(handler::download_article))
        .route("/send", post(handler::send_actions))
}
