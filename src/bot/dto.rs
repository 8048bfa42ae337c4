use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;

use crate::menus::repo_types::{Menu, Nutrients};
use crate::orders::repo_types::Order;
use crate::recommend::meal_time::MealTime;
use crate::recommend::scorer::ScoredMenu;

/// One inbound chat event, already stripped of transport details.
#[derive(Debug, Deserialize)]
pub struct BotEvent {
    pub handle: String,
    pub event: EventPayload,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    Text {
        text: String,
    },
    Image {
        image: ByteBuf,
        #[serde(default)]
        content_type: Option<String>,
    },
    Postback {
        data: PostbackData,
    },
}

/// Button payloads: `{menu_id}` confirms a prediction, `{rating}` (with an
/// optional `menu_id`) rates the food.
#[derive(Debug, Default, Deserialize)]
pub struct PostbackData {
    #[serde(default)]
    pub menu_id: Option<i64>,
    #[serde(default)]
    pub rating: Option<i32>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BotReply {
    RegistrationPrompt {
        text: &'static str,
    },
    Text {
        text: String,
    },
    Recommendations {
        text: &'static str,
        meal_time: MealTime,
        menus: Vec<ScoredMenu>,
    },
    Recognition {
        text: &'static str,
        menu: Menu,
        #[serde(skip_serializing_if = "Option::is_none")]
        image_url: Option<String>,
    },
    RatingRequest {
        text: &'static str,
        menu: Menu,
    },
    Thanks {
        text: &'static str,
        order: Order,
    },
    NutritionSummary {
        text: &'static str,
        menu_ids: Vec<i64>,
        consumed: Nutrients,
        remaining: Nutrients,
    },
}

impl BotReply {
    pub fn text(text: impl Into<String>) -> Self {
        BotReply::Text { text: text.into() }
    }
}
