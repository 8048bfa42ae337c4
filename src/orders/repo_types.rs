use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;

use crate::menus::repo_types::Nutrients;

/// Order record; one row per consumed menu.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Order {
    pub id: i64,
    pub user_id: i64,
    pub menu_id: i64,
    pub rating: Option<i32>, // 1..=5, null until rated
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: i64,
    pub menu_id: i64,
    pub rating: Option<i32>,
    pub created_at: OffsetDateTime,
}

/// Orders and nutrient totals since the start of the local day.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DailySummary {
    pub menu_ids: Vec<i64>,
    pub totals: Nutrients,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct TopMenu {
    pub menu_id: i64,
    pub name: String,
    pub order_count: i64,
}

#[derive(Debug, FromRow)]
pub(super) struct DailySummaryRow {
    pub menu_ids: Vec<i64>,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
    pub calories: f64,
}

impl From<DailySummaryRow> for DailySummary {
    fn from(r: DailySummaryRow) -> Self {
        Self {
            menu_ids: r.menu_ids,
            totals: Nutrients {
                calories: r.calories,
                protein: r.protein,
                fat: r.fat,
                carbs: r.carbs,
            },
        }
    }
}
