use serde::{Deserialize, Serialize};

use super::repo_types::{Gender, PreferenceTag};
use crate::conversation::machine::ConversationState;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub handle: String,
    pub name: String,
    pub birth_date: String, // YYYY-MM-DD
    pub gender: Gender,
    pub height: f64,
    pub weight: f64,
    #[serde(default)]
    pub picture_url: Option<String>,
    #[serde(default)]
    pub preferences: Vec<PreferenceTag>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateBodyRequest {
    pub weight: f64,
    pub height: f64,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct StateBody {
    pub state: ConversationState,
}
