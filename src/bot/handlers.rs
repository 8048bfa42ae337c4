use axum::{
    extract::{DefaultBodyLimit, State},
    routing::post,
    Json, Router,
};
use time::OffsetDateTime;
use tracing::instrument;

use super::dto::{BotEvent, BotReply};
use super::services;
use crate::error::AppResult;
use crate::state::AppState;

pub fn bot_routes() -> Router<AppState> {
    Router::new()
        .route("/bot/events", post(handle_event))
        .layer(DefaultBodyLimit::max(20 * 1024 * 1024)) // 20MB
}

#[instrument(skip(state, event), fields(handle = %event.handle))]
pub async fn handle_event(
    State(state): State<AppState>,
    Json(event): Json<BotEvent>,
) -> AppResult<Json<BotReply>> {
    let reply = services::handle_event(&state, event, OffsetDateTime::now_utc()).await?;
    Ok(Json(reply))
}
