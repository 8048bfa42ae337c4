use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{info, instrument};

use super::repo_types::{DailySummary, NewOrder, Order, TopMenu};
use crate::error::{AppError, AppResult};
use crate::menus::repo_types::Nutrients;
use crate::recommend::meal_time::start_of_local_day;
use crate::state::AppState;

pub const TOP_MENUS: i64 = 3;

/// Daily allowance before today's orders are subtracted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NutrientGoal {
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
    pub calories: f64,
}

impl Default for NutrientGoal {
    fn default() -> Self {
        Self {
            protein: 50.0,
            carbs: 300.0,
            fat: 70.0,
            calories: 2000.0,
        }
    }
}

impl NutrientGoal {
    /// What is left of the goal after `consumed`. Goes negative once exceeded.
    pub fn remaining(&self, consumed: &Nutrients) -> Nutrients {
        Nutrients {
            calories: self.calories - consumed.calories,
            protein: self.protein - consumed.protein,
            fat: self.fat - consumed.fat,
            carbs: self.carbs - consumed.carbs,
        }
    }
}

pub fn validate_rating(rating: i32) -> AppResult<()> {
    if !(1..=5).contains(&rating) {
        return Err(AppError::BadRequest(format!("rating must be between 1 and 5, got {rating}")));
    }
    Ok(())
}

#[instrument(skip(state))]
pub async fn record_rating(
    state: &AppState,
    user_id: i64,
    menu_id: i64,
    rating: i32,
    at: OffsetDateTime,
) -> AppResult<Order> {
    validate_rating(rating)?;
    if state.store.find_user(user_id).await?.is_none() {
        return Err(AppError::NotFound(format!("user {user_id} not found")));
    }
    if state.store.find_menu(menu_id).await?.is_none() {
        return Err(AppError::NotFound(format!("menu {menu_id} not found")));
    }

    let order = state
        .store
        .create_order(&NewOrder {
            user_id,
            menu_id,
            rating: Some(rating),
            created_at: at,
        })
        .await?;
    state.features.invalidate();
    info!(order_id = order.id, user_id, menu_id, rating, "order recorded");
    Ok(order)
}

pub async fn daily_summary(state: &AppState, user_id: i64, now: OffsetDateTime) -> AppResult<DailySummary> {
    let since = start_of_local_day(now, state.config.utc_offset());
    Ok(state.store.daily_summary(user_id, since).await?)
}

/// Configured daily goal minus everything the user ordered since local midnight.
pub async fn remaining_goal(state: &AppState, user_id: i64, now: OffsetDateTime) -> AppResult<Nutrients> {
    let summary = daily_summary(state, user_id, now).await?;
    Ok(state.config.recommend.daily_goal.remaining(&summary.totals))
}

pub async fn top_menus(state: &AppState, user_id: i64) -> AppResult<Vec<TopMenu>> {
    Ok(state.store.top_menus_by_user(user_id, TOP_MENUS).await?)
}

pub async fn history(state: &AppState, user_id: i64) -> AppResult<Vec<Order>> {
    if state.store.find_user(user_id).await?.is_none() {
        return Err(AppError::NotFound(format!("user {user_id} not found")));
    }
    Ok(state.store.list_orders_by_user(user_id).await?)
}
