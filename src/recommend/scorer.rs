//! Final ranking of the catalogue for one user.
//!
//! `score = w1·norm(preference) − w2·norm(similarity) + w3·fitness + w4·meal_time`
//!
//! * preference: raw model output, min-max over the candidates
//! * similarity: cosine similarity of tag vectors to the previous menu, min-max
//!   over the candidates, zero when there is no previous menu
//! * fitness: mean over the four nutrients of the shifted asymmetric quadratic
//!   penalty, normalized with per-nutrient catalogue bounds
//! * meal_time: the menu's suitability for the current period, fixed [0, 1] bounds
//!
//! Any zero-width normalization range yields the midpoint 0.5.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::features::{DenseMatrix, InteractionMatrix};
use super::meal_time::MealTime;
use super::model::PreferenceModel;
use crate::menus::repo_types::{Menu, Nutrients};

const NEUTRAL: f64 = 0.5;

#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("user {0} is not part of the assembled population")]
    UnknownUser(i64),

    #[error("menu {0} is not part of the catalogue")]
    UnknownMenu(i64),

    #[error("no nutrient data for menu {0:?}")]
    MissingNutrients(String),

    #[error("model returned {got} scores for {expected} menus")]
    ScoreCountMismatch { expected: usize, got: usize },

    #[error("inconsistent inputs: {0}")]
    Shape(String),

    #[error("preference model failed: {0:#}")]
    Model(anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    /// w1
    pub preference: f64,
    /// w2
    pub similarity: f64,
    /// w3
    pub nutrient: f64,
    /// w4
    pub meal_time: f64,
    /// a1, applied while the remaining goal is not exceeded
    pub undershoot: f64,
    /// a2, applied once the menu exceeds the remaining goal
    pub overshoot: f64,
    /// Floor that the worst shifted nutrient score maps to.
    pub min_positive: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            preference: 0.3,
            similarity: 0.2,
            nutrient: 0.3,
            meal_time: 0.2,
            undershoot: 0.001,
            overshoot: 0.002,
            min_positive: 1.0,
        }
    }
}

/// Per-menu nutrient and meal-time record, keyed by menu name in the input.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NutrientProfile {
    #[serde(rename = "Calories")]
    pub calories: f64,
    #[serde(rename = "Fat")]
    pub fat: f64,
    #[serde(rename = "Carbs")]
    pub carbs: f64,
    #[serde(rename = "Protein")]
    pub protein: f64,
    #[serde(rename = "Breakfast")]
    pub breakfast: f64,
    #[serde(rename = "Lunch")]
    pub lunch: f64,
    #[serde(rename = "Dinner")]
    pub dinner: f64,
}

impl NutrientProfile {
    fn meal(&self, meal: MealTime) -> f64 {
        match meal {
            MealTime::Breakfast => self.breakfast,
            MealTime::Lunch => self.lunch,
            MealTime::Dinner => self.dinner,
        }
    }
}

impl From<&Menu> for NutrientProfile {
    fn from(m: &Menu) -> Self {
        Self {
            calories: m.nutrients.calories,
            fat: m.nutrients.fat,
            carbs: m.nutrients.carbs,
            protein: m.nutrients.protein,
            breakfast: m.meal_times.breakfast,
            lunch: m.meal_times.lunch,
            dinner: m.meal_times.dinner,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Nutrient {
    Calories,
    Fat,
    Carbs,
    Protein,
}

impl Nutrient {
    pub const ALL: [Nutrient; 4] = [Nutrient::Calories, Nutrient::Fat, Nutrient::Carbs, Nutrient::Protein];

    fn of_profile(&self, p: &NutrientProfile) -> f64 {
        match self {
            Nutrient::Calories => p.calories,
            Nutrient::Fat => p.fat,
            Nutrient::Carbs => p.carbs,
            Nutrient::Protein => p.protein,
        }
    }

    fn of(&self, n: &Nutrients) -> f64 {
        match self {
            Nutrient::Calories => n.calories,
            Nutrient::Fat => n.fat,
            Nutrient::Carbs => n.carbs,
            Nutrient::Protein => n.protein,
        }
    }
}

/// Components of one menu's final score, each after normalization.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub preference: f64,
    pub similarity_penalty: f64,
    pub nutrient_fitness: f64,
    pub meal_time: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredMenu {
    pub name: String,
    #[serde(flatten)]
    pub profile: NutrientProfile,
    pub score: f64,
    #[serde(skip_serializing)]
    pub breakdown: ScoreBreakdown,
}

pub struct ScoringInput<'a> {
    pub model: &'a dyn PreferenceModel,
    pub interactions: &'a InteractionMatrix,
    pub user_index: usize,
    pub user_features: &'a DenseMatrix,
    pub menu_features: &'a DenseMatrix,
    /// Column of the last eaten menu, `None` for users without history.
    pub previous_menu: Option<usize>,
    /// Candidate names in column order.
    pub menu_names: &'a [String],
    pub nutrition: &'a HashMap<String, NutrientProfile>,
    /// Remaining daily allowance; negative once a goal is exceeded.
    pub remaining: Nutrients,
    pub meal_time: MealTime,
    pub weights: ScoringWeights,
}

/// `-a1·(t−g)²` while `t ≤ g`, `-a2·(t−g)²` past the goal.
pub fn nutrient_raw_score(total: f64, goal: f64, w: &ScoringWeights) -> f64 {
    let d = total - goal;
    if goal - total >= 0.0 {
        -w.undershoot * d * d
    } else {
        -w.overshoot * d * d
    }
}

/// Shift that lifts the worst raw score over the catalogue range to `min_positive`.
pub fn nutrient_offset(min_total: f64, max_total: f64, goal: f64, w: &ScoringWeights) -> f64 {
    let most_negative = nutrient_raw_score(min_total, goal, w).min(nutrient_raw_score(max_total, goal, w));
    most_negative.abs() + w.min_positive
}

/// Normalize a shifted score into [0, 1] with bounds `[min_positive, offset]`.
pub fn normalize_nutrient(shifted: f64, offset: f64, w: &ScoringWeights) -> f64 {
    let range = offset - w.min_positive;
    if range <= 0.0 {
        return NEUTRAL;
    }
    (shifted - w.min_positive) / range
}

/// Min-max over the observed values; zero range maps everything to the midpoint.
pub fn min_max_observed(values: &[f64]) -> Vec<f64> {
    let (lo, hi) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(*v), hi.max(*v)));
    let range = hi - lo;
    if range.is_nan() || range <= 0.0 {
        return vec![NEUTRAL; values.len()];
    }
    values.iter().map(|v| (v - lo) / range).collect()
}

pub fn cosine(a: &[f64], b: &[f64]) -> f64 {
    let (mut ab, mut aa, mut bb) = (0.0, 0.0, 0.0);
    for (x, y) in a.iter().zip(b) {
        ab += x * y;
        aa += x * x;
        bb += y * y;
    }
    if aa == 0.0 || bb == 0.0 {
        return 0.0;
    }
    ab / (aa.sqrt() * bb.sqrt())
}

/// Pairwise cosine similarity of all rows.
pub fn cosine_matrix(features: &DenseMatrix) -> Vec<Vec<f64>> {
    let n = features.rows();
    let mut out = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in i..n {
            let s = cosine(features.row(i), features.row(j));
            out[i][j] = s;
            out[j][i] = s;
        }
    }
    out
}

/// Score every candidate and return them best first. Equal scores keep input order.
pub fn rank(input: &ScoringInput<'_>) -> Result<Vec<ScoredMenu>, ScoringError> {
    let n = input.menu_names.len();
    if input.menu_features.rows() != n {
        return Err(ScoringError::Shape(format!(
            "{n} menu names but {} menu feature rows",
            input.menu_features.rows()
        )));
    }
    let (users, menus) = input.interactions.shape();
    if menus != n || input.user_index >= users || input.user_index >= input.user_features.rows() {
        return Err(ScoringError::Shape(format!(
            "user row {} / interaction shape {:?} / {n} menus",
            input.user_index,
            input.interactions.shape()
        )));
    }
    if let Some(p) = input.previous_menu {
        if p >= n {
            return Err(ScoringError::Shape(format!("previous menu column {p} out of range")));
        }
    }
    if n == 0 {
        return Ok(Vec::new());
    }

    let profiles: Vec<NutrientProfile> = input
        .menu_names
        .iter()
        .map(|name| {
            input
                .nutrition
                .get(name)
                .copied()
                .ok_or_else(|| ScoringError::MissingNutrients(name.clone()))
        })
        .collect::<Result<_, _>>()?;

    // 1. preference
    let all: Vec<usize> = (0..n).collect();
    let raw = input
        .model
        .predict(input.user_index, &all, input.user_features, input.menu_features)
        .map_err(ScoringError::Model)?;
    if raw.len() != n {
        return Err(ScoringError::ScoreCountMismatch { expected: n, got: raw.len() });
    }
    let preference = min_max_observed(&raw);

    // 2. variety
    let similarity = match input.previous_menu {
        Some(prev) => {
            let sim = cosine_matrix(input.menu_features);
            let penalty: Vec<f64> = (0..n).map(|i| sim[i][prev]).collect();
            min_max_observed(&penalty)
        }
        None => vec![0.0; n],
    };

    // 3 + 4. nutrient fitness
    let w = &input.weights;
    let mut fitness = vec![0.0; n];
    for nutrient in Nutrient::ALL {
        let goal = nutrient.of(&input.remaining);
        let totals: Vec<f64> = profiles.iter().map(|p| nutrient.of_profile(p)).collect();
        let (lo, hi) = totals
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(*v), hi.max(*v)));
        let offset = nutrient_offset(lo, hi, goal, w);
        for (f, t) in fitness.iter_mut().zip(&totals) {
            let shifted = nutrient_raw_score(*t, goal, w) + offset;
            *f += normalize_nutrient(shifted, offset, w);
        }
    }
    for f in &mut fitness {
        *f /= Nutrient::ALL.len() as f64;
    }

    // 5. meal time, fixed [0, 1] bounds
    let meal: Vec<f64> = profiles.iter().map(|p| p.meal(input.meal_time)).collect();

    // 6.
    let mut scored: Vec<ScoredMenu> = (0..n)
        .map(|i| {
            let breakdown = ScoreBreakdown {
                preference: preference[i],
                similarity_penalty: similarity[i],
                nutrient_fitness: fitness[i],
                meal_time: meal[i],
            };
            ScoredMenu {
                name: input.menu_names[i].clone(),
                profile: profiles[i],
                score: w.preference * breakdown.preference - w.similarity * breakdown.similarity_penalty
                    + w.nutrient * breakdown.nutrient_fitness
                    + w.meal_time * breakdown.meal_time,
                breakdown,
            }
        })
        .collect();

    // 7. stable, so ties keep catalogue order
    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    Ok(scored)
}

/// [`rank`] truncated to the best `top_n`.
pub fn top_n(input: &ScoringInput<'_>, top_n: usize) -> Result<Vec<ScoredMenu>, ScoringError> {
    let mut ranked = rank(input)?;
    ranked.truncate(top_n);
    Ok(ranked)
}
