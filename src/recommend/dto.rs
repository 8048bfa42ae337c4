use serde::{Deserialize, Serialize};

use super::meal_time::MealTime;
use super::scorer::ScoredMenu;

#[derive(Debug, Deserialize)]
pub struct RecommendRequest {
    pub user_id: i64,
    /// Absent or negative means no history.
    #[serde(default)]
    pub previous_menu_id: Option<i64>,
    /// Derived from the server clock when absent.
    #[serde(default)]
    pub meal_time: Option<MealTime>,
}

impl RecommendRequest {
    pub fn previous(&self) -> Option<i64> {
        self.previous_menu_id.filter(|id| *id >= 0)
    }
}

#[derive(Debug, Serialize)]
pub struct RecommendResponse {
    pub meal_time: MealTime,
    pub menus: Vec<ScoredMenu>,
}
