use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tracing::instrument;

use super::repo_types::{Menu, NewMenu};
use super::services;
use crate::error::AppResult;
use crate::state::AppState;

pub fn menu_routes() -> Router<AppState> {
    Router::new()
        .route("/menus", get(list_menus).post(create_menu))
        .route("/menus/:id", get(get_menu))
}

#[instrument(skip(state, body))]
pub async fn create_menu(
    State(state): State<AppState>,
    Json(body): Json<NewMenu>,
) -> AppResult<(StatusCode, Json<Menu>)> {
    let menu = services::create_menu(&state, body).await?;
    Ok((StatusCode::CREATED, Json(menu)))
}

#[instrument(skip(state))]
pub async fn list_menus(State(state): State<AppState>) -> AppResult<Json<Vec<Menu>>> {
    Ok(Json(services::list_menus(&state).await?))
}

#[instrument(skip(state))]
pub async fn get_menu(State(state): State<AppState>, Path(id): Path<i64>) -> AppResult<Json<Menu>> {
    Ok(Json(services::get_menu(&state, id).await?))
}
