use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::menus::repo_types::Nutrients;

#[derive(Debug, Deserialize)]
pub struct RecordRatingRequest {
    pub user_id: i64,
    pub menu_id: i64,
    pub rating: i32,
    /// Defaults to the time the request is handled.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
}

#[derive(Debug, Serialize)]
pub struct NutritionSummaryResponse {
    pub menu_ids: Vec<i64>,
    pub consumed: Nutrients,
    pub remaining: Nutrients,
}
