use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use time::OffsetDateTime;
use tracing::instrument;

use super::dto::RecordRatingRequest;
use super::repo_types::Order;
use super::services;
use crate::error::AppResult;
use crate::state::AppState;

pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/orders", post(record_rating))
        .route("/orders/user/:user_id", get(list_by_user))
}

#[instrument(skip(state, body), fields(user_id = body.user_id, menu_id = body.menu_id))]
pub async fn record_rating(
    State(state): State<AppState>,
    Json(body): Json<RecordRatingRequest>,
) -> AppResult<(StatusCode, Json<Order>)> {
    let at = body.created_at.unwrap_or_else(OffsetDateTime::now_utc);
    let order = services::record_rating(&state, body.user_id, body.menu_id, body.rating, at).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

#[instrument(skip(state))]
pub async fn list_by_user(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> AppResult<Json<Vec<Order>>> {
    Ok(Json(services::history(&state, user_id).await?))
}
