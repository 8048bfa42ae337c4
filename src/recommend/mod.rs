pub mod dto;
pub mod features;
pub mod handlers;
pub mod meal_time;
pub mod model;
pub mod scorer;
pub mod services;

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    Router::new().merge(handlers::recommend_routes())
}
