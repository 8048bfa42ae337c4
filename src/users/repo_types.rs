use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::{Date, OffsetDateTime};

use crate::conversation::machine::ConversationState;

/// Gender category as captured at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
    Other,
    #[serde(rename = "Prefer not to say")]
    PreferNotToSay,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "Male",
            Gender::Female => "Female",
            Gender::Other => "Other",
            Gender::PreferNotToSay => "Prefer not to say",
        }
    }

    /// Two-column one-hot encoding; Other and Prefer not to say share the zero vector.
    pub fn one_hot(&self) -> [f64; 2] {
        match self {
            Gender::Male => [0.0, 1.0],
            Gender::Female => [1.0, 0.0],
            Gender::Other | Gender::PreferNotToSay => [0.0, 0.0],
        }
    }
}

impl FromStr for Gender {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Male" => Ok(Gender::Male),
            "Female" => Ok(Gender::Female),
            "Other" => Ok(Gender::Other),
            "Prefer not to say" => Ok(Gender::PreferNotToSay),
            other => anyhow::bail!("unknown gender {other:?}"),
        }
    }
}

/// Closed vocabulary of user preference tags, in feature-column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreferenceTag {
    Cheap,
    Chicken,
    Fried,
    Pork,
    Salty,
    Soup,
    Spicy,
    Steam,
    Sweet,
    Vegetable,
}

impl PreferenceTag {
    pub const ALL: [PreferenceTag; 10] = [
        PreferenceTag::Cheap,
        PreferenceTag::Chicken,
        PreferenceTag::Fried,
        PreferenceTag::Pork,
        PreferenceTag::Salty,
        PreferenceTag::Soup,
        PreferenceTag::Spicy,
        PreferenceTag::Steam,
        PreferenceTag::Sweet,
        PreferenceTag::Vegetable,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PreferenceTag::Cheap => "cheap",
            PreferenceTag::Chicken => "chicken",
            PreferenceTag::Fried => "fried",
            PreferenceTag::Pork => "pork",
            PreferenceTag::Salty => "salty",
            PreferenceTag::Soup => "soup",
            PreferenceTag::Spicy => "spicy",
            PreferenceTag::Steam => "steam",
            PreferenceTag::Sweet => "sweet",
            PreferenceTag::Vegetable => "vegetable",
        }
    }

    pub fn column(&self) -> usize {
        *self as usize
    }
}

impl FromStr for PreferenceTag {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PreferenceTag::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("unknown preference tag {s:?}"))
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub id: i64,
    pub handle: String,
    pub name: String,
    pub birth_date: Date,
    pub gender: String,
    pub height: f64,
    pub weight: f64,
    pub picture_url: Option<String>,
    pub created_at: OffsetDateTime,
}

/// Registered user.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub handle: String, // external chat handle
    pub name: String,
    pub birth_date: Date,
    pub gender: Gender,
    pub height: f64,
    pub weight: f64,
    pub picture_url: Option<String>,
    pub created_at: OffsetDateTime,
}

impl TryFrom<UserRow> for User {
    type Error = anyhow::Error;

    fn try_from(r: UserRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            gender: r.gender.parse()?,
            handle: r.handle,
            name: r.name,
            birth_date: r.birth_date,
            height: r.height,
            weight: r.weight,
            picture_url: r.picture_url,
            created_at: r.created_at,
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub handle: String,
    pub name: String,
    pub birth_date: Date,
    pub gender: Gender,
    pub height: f64,
    pub weight: f64,
    pub picture_url: Option<String>,
    pub preferences: Vec<PreferenceTag>,
}

#[derive(Debug, Clone, FromRow)]
pub struct UserStateRow {
    pub user_id: i64,
    pub handle: String,
    pub state: String,
    pub recognized_menu_id: Option<i64>,
    pub staged_image_key: Option<String>,
    pub updated_at: OffsetDateTime,
}

/// Conversational cursor of one user.
#[derive(Debug, Clone, Serialize)]
pub struct UserState {
    pub user_id: i64,
    pub handle: String,
    pub state: ConversationState,
    pub recognized_menu_id: Option<i64>,
    #[serde(skip_serializing)]
    pub staged_image_key: Option<String>,
    pub updated_at: OffsetDateTime,
}

impl TryFrom<UserStateRow> for UserState {
    type Error = anyhow::Error;

    fn try_from(r: UserStateRow) -> Result<Self, Self::Error> {
        Ok(Self {
            user_id: r.user_id,
            state: r.state.parse()?,
            handle: r.handle,
            recognized_menu_id: r.recognized_menu_id,
            staged_image_key: r.staged_image_key,
            updated_at: r.updated_at,
        })
    }
}

/// Conditional state write: applied only while the row is still in `from`.
/// The two payload columns are overwritten (None clears them).
#[derive(Debug, Clone)]
pub struct StateUpdate {
    pub from: ConversationState,
    pub to: ConversationState,
    pub recognized_menu_id: Option<i64>,
    pub staged_image_key: Option<String>,
}
