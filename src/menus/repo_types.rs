use std::ops::{Add, AddAssign};

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;

/// Macro-nutrient quantities of one serving.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Nutrients {
    pub calories: f64,
    pub protein: f64,
    pub fat: f64,
    pub carbs: f64,
}

impl Add for Nutrients {
    type Output = Nutrients;

    fn add(self, rhs: Nutrients) -> Nutrients {
        Nutrients {
            calories: self.calories + rhs.calories,
            protein: self.protein + rhs.protein,
            fat: self.fat + rhs.fat,
            carbs: self.carbs + rhs.carbs,
        }
    }
}

impl AddAssign for Nutrients {
    fn add_assign(&mut self, rhs: Nutrients) {
        *self = *self + rhs;
    }
}

/// Suitability of a menu per meal period, each in [0, 1].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MealTimeScores {
    pub breakfast: f64,
    pub lunch: f64,
    pub dinner: f64,
}

/// Content tags, 0 or 1 each.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuTags {
    #[serde(default)]
    pub spicy: i32,
    #[serde(default)]
    pub high_sugar: i32,
    #[serde(default)]
    pub high_fat: i32,
    #[serde(default)]
    pub high_calorie: i32,
    #[serde(default)]
    pub is_light: i32,
    #[serde(default)]
    pub is_fried: i32,
    #[serde(default)]
    pub contain_water: i32,
    #[serde(default)]
    pub has_vegetable: i32,
    #[serde(default)]
    pub high_sodium: i32,
    #[serde(default)]
    pub high_protein: i32,
    #[serde(default)]
    pub high_carbohydrate: i32,
    #[serde(default)]
    pub high_cholesterol: i32,
    #[serde(default)]
    pub has_chicken: i32,
    #[serde(default)]
    pub has_pork: i32,
    #[serde(default)]
    pub has_noodle: i32,
    #[serde(default)]
    pub high_price: i32,
}

impl MenuTags {
    pub const LEN: usize = 16;

    pub fn to_vector(&self) -> [f64; Self::LEN] {
        [
            self.spicy,
            self.high_sugar,
            self.high_fat,
            self.high_calorie,
            self.is_light,
            self.is_fried,
            self.contain_water,
            self.has_vegetable,
            self.high_sodium,
            self.high_protein,
            self.high_carbohydrate,
            self.high_cholesterol,
            self.has_chicken,
            self.has_pork,
            self.has_noodle,
            self.high_price,
        ]
        .map(|v| v as f64)
    }

    pub fn is_binary(&self) -> bool {
        self.to_vector().iter().all(|v| *v == 0.0 || *v == 1.0)
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct MenuRow {
    pub id: i64,
    pub name: String,
    pub calorie: f64,
    pub protein: f64,
    pub fat: f64,
    pub carbohydrate: f64,
    pub breakfast: f64,
    pub lunch: f64,
    pub dinner: f64,
    pub spicy: i32,
    pub high_sugar: i32,
    pub high_fat: i32,
    pub high_calorie: i32,
    pub is_light: i32,
    pub is_fried: i32,
    pub contain_water: i32,
    pub has_vegetable: i32,
    pub high_sodium: i32,
    pub high_protein: i32,
    pub high_carbohydrate: i32,
    pub high_cholesterol: i32,
    pub has_chicken: i32,
    pub has_pork: i32,
    pub has_noodle: i32,
    pub high_price: i32,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize)]
pub struct Menu {
    pub id: i64,
    pub name: String,
    pub nutrients: Nutrients,
    pub meal_times: MealTimeScores,
    pub tags: MenuTags,
    pub created_at: OffsetDateTime,
}

impl From<MenuRow> for Menu {
    fn from(r: MenuRow) -> Self {
        Self {
            id: r.id,
            name: r.name,
            nutrients: Nutrients {
                calories: r.calorie,
                protein: r.protein,
                fat: r.fat,
                carbs: r.carbohydrate,
            },
            meal_times: MealTimeScores {
                breakfast: r.breakfast,
                lunch: r.lunch,
                dinner: r.dinner,
            },
            tags: MenuTags {
                spicy: r.spicy,
                high_sugar: r.high_sugar,
                high_fat: r.high_fat,
                high_calorie: r.high_calorie,
                is_light: r.is_light,
                is_fried: r.is_fried,
                contain_water: r.contain_water,
                has_vegetable: r.has_vegetable,
                high_sodium: r.high_sodium,
                high_protein: r.high_protein,
                high_carbohydrate: r.high_carbohydrate,
                high_cholesterol: r.high_cholesterol,
                has_chicken: r.has_chicken,
                has_pork: r.has_pork,
                has_noodle: r.has_noodle,
                high_price: r.high_price,
            },
            created_at: r.created_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewMenu {
    pub name: String,
    pub nutrients: Nutrients,
    pub meal_times: MealTimeScores,
    #[serde(default)]
    pub tags: MenuTags,
}
