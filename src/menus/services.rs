use tracing::{info, instrument, warn};

use super::repo_types::{Menu, NewMenu};
use crate::error::{AppError, AppResult};
use crate::state::AppState;

fn validate(m: &NewMenu) -> AppResult<()> {
    if m.name.trim().is_empty() {
        return Err(AppError::BadRequest("menu name is required".into()));
    }
    let n = &m.nutrients;
    if [n.calories, n.protein, n.fat, n.carbs].iter().any(|v| !v.is_finite() || *v < 0.0) {
        return Err(AppError::BadRequest("nutrients must be non-negative numbers".into()));
    }
    let t = &m.meal_times;
    if [t.breakfast, t.lunch, t.dinner].iter().any(|v| !(0.0..=1.0).contains(v)) {
        return Err(AppError::BadRequest("meal-time scores must lie in [0, 1]".into()));
    }
    if !m.tags.is_binary() {
        return Err(AppError::BadRequest("menu tags must be 0 or 1".into()));
    }
    Ok(())
}

#[instrument(skip(state, new), fields(name = %new.name))]
pub async fn create_menu(state: &AppState, new: NewMenu) -> AppResult<Menu> {
    validate(&new)?;
    if state.store.find_menu_by_name(&new.name).await?.is_some() {
        warn!("menu name already taken");
        return Err(AppError::Conflict(format!("menu {:?} already exists", new.name)));
    }
    let menu = state.store.create_menu(&new).await?;
    state.features.invalidate();
    info!(menu_id = menu.id, "menu created");
    Ok(menu)
}

pub async fn get_menu(state: &AppState, menu_id: i64) -> AppResult<Menu> {
    state
        .store
        .find_menu(menu_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("menu {menu_id} not found")))
}

pub async fn list_menus(state: &AppState) -> AppResult<Vec<Menu>> {
    Ok(state.store.list_menus().await?)
}
