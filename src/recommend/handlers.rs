use axum::{extract::State, routing::post, Json, Router};
use time::OffsetDateTime;
use tracing::instrument;

use super::dto::{RecommendRequest, RecommendResponse};
use super::meal_time::MealTime;
use super::services::{self, TrainReport};
use crate::error::AppResult;
use crate::state::AppState;

pub fn recommend_routes() -> Router<AppState> {
    Router::new()
        .route("/recommendations", post(recommend))
        .route("/recommendations/train", post(train))
}

#[instrument(skip(state, body), fields(user_id = body.user_id))]
pub async fn recommend(
    State(state): State<AppState>,
    Json(body): Json<RecommendRequest>,
) -> AppResult<Json<RecommendResponse>> {
    let now = OffsetDateTime::now_utc();
    let meal_time = body
        .meal_time
        .unwrap_or_else(|| MealTime::at(now, state.config.utc_offset()));
    let menus = services::recommend(&state, body.user_id, body.previous(), meal_time, now).await?;
    Ok(Json(RecommendResponse { meal_time, menus }))
}

#[instrument(skip(state))]
pub async fn train(State(state): State<AppState>) -> AppResult<Json<TrainReport>> {
    Ok(Json(services::train(&state).await?))
}
