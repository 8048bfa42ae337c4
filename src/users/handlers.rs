use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use time::OffsetDateTime;
use tracing::instrument;

use super::dto::{RegisterRequest, StateBody, UpdateBodyRequest};
use super::repo_types::{User, UserState};
use super::services;
use crate::error::AppResult;
use crate::orders::dto::NutritionSummaryResponse;
use crate::orders::repo_types::TopMenu;
use crate::orders::services as orders;
use crate::state::AppState;

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", post(register))
        .route("/users/:handle", get(get_user).patch(update_body))
        .route("/users/:handle/state", get(get_state).put(set_state))
        .route("/users/:handle/nutrition_summary", get(nutrition_summary))
        .route("/users/:handle/top_menus", get(top_menus))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<User>)> {
    let user = services::register(&state, payload).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

#[instrument(skip(state))]
pub async fn get_user(State(state): State<AppState>, Path(handle): Path<String>) -> AppResult<Json<User>> {
    Ok(Json(services::get_user(&state, &handle).await?))
}

#[instrument(skip(state, body))]
pub async fn update_body(
    State(state): State<AppState>,
    Path(handle): Path<String>,
    Json(body): Json<UpdateBodyRequest>,
) -> AppResult<Json<User>> {
    Ok(Json(services::update_body(&state, &handle, body.weight, body.height).await?))
}

#[instrument(skip(state))]
pub async fn get_state(
    State(state): State<AppState>,
    Path(handle): Path<String>,
) -> AppResult<Json<UserState>> {
    Ok(Json(services::get_state(&state, &handle).await?))
}

#[instrument(skip(state, body))]
pub async fn set_state(
    State(state): State<AppState>,
    Path(handle): Path<String>,
    Json(body): Json<StateBody>,
) -> AppResult<Json<UserState>> {
    Ok(Json(services::set_state(&state, &handle, body.state).await?))
}

#[instrument(skip(state))]
pub async fn nutrition_summary(
    State(state): State<AppState>,
    Path(handle): Path<String>,
) -> AppResult<Json<NutritionSummaryResponse>> {
    let user = services::get_user(&state, &handle).await?;
    let summary = orders::daily_summary(&state, user.id, OffsetDateTime::now_utc()).await?;
    let remaining = state.config.recommend.daily_goal.remaining(&summary.totals);
    Ok(Json(NutritionSummaryResponse {
        menu_ids: summary.menu_ids,
        consumed: summary.totals,
        remaining,
    }))
}

#[instrument(skip(state))]
pub async fn top_menus(
    State(state): State<AppState>,
    Path(handle): Path<String>,
) -> AppResult<Json<Vec<TopMenu>>> {
    let user = services::get_user(&state, &handle).await?;
    Ok(Json(orders::top_menus(&state, user.id).await?))
}
