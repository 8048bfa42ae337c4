use serde::Deserialize;

use crate::orders::services::NutrientGoal;
use crate::recommend::scorer::ScoringWeights;

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecommendConfig {
    pub model_path: String,
    pub top_n: usize,
    pub weights: ScoringWeights,
    pub daily_goal: NutrientGoal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub storage: StorageConfig,
    pub classifier_url: String,
    pub classifier_timeout_secs: u64,
    /// Hours east of UTC used for meal-time and "today" boundaries.
    pub timezone_offset_hours: i8,
    pub recommend: RecommendConfig,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let storage = StorageConfig {
            endpoint: std::env::var("MINIO_ENDPOINT")
                .unwrap_or_else(|_| "http://localhost:9000".into()),
            bucket: std::env::var("MINIO_BUCKET").unwrap_or_else(|_| "eatwise".into()),
            access_key: std::env::var("MINIO_ACCESS_KEY").unwrap_or_else(|_| "minioadmin".into()),
            secret_key: std::env::var("MINIO_SECRET_KEY").unwrap_or_else(|_| "minioadmin".into()),
            region: std::env::var("MINIO_REGION").unwrap_or_else(|_| "us-east-1".into()),
        };

        let defaults = ScoringWeights::default();
        let weights = ScoringWeights {
            preference: env_or("SCORE_W1", defaults.preference),
            similarity: env_or("SCORE_W2", defaults.similarity),
            nutrient: env_or("SCORE_W3", defaults.nutrient),
            meal_time: env_or("SCORE_W4", defaults.meal_time),
            undershoot: env_or("SCORE_A1", defaults.undershoot),
            overshoot: env_or("SCORE_A2", defaults.overshoot),
            min_positive: env_or("SCORE_MIN_POSITIVE", defaults.min_positive),
        };

        let goal = NutrientGoal::default();
        let daily_goal = NutrientGoal {
            protein: env_or("GOAL_PROTEIN", goal.protein),
            carbs: env_or("GOAL_CARBS", goal.carbs),
            fat: env_or("GOAL_FAT", goal.fat),
            calories: env_or("GOAL_CALORIES", goal.calories),
        };

        let recommend = RecommendConfig {
            model_path: std::env::var("MODEL_PATH")
                .unwrap_or_else(|_| "assets/models/preference.json".into()),
            top_n: env_or("RECOMMEND_TOP_N", 5),
            weights,
            daily_goal,
        };

        Ok(Self {
            database_url,
            storage,
            classifier_url: std::env::var("CLASSIFIER_URL")
                .unwrap_or_else(|_| "http://localhost:8500".into()),
            classifier_timeout_secs: env_or("CLASSIFIER_TIMEOUT_SECS", 10),
            timezone_offset_hours: env_or("TIMEZONE_OFFSET_HOURS", 7),
            recommend,
        })
    }

    pub fn classifier_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.classifier_timeout_secs.max(1))
    }

    pub fn utc_offset(&self) -> time::UtcOffset {
        time::UtcOffset::from_hms(self.timezone_offset_hours, 0, 0).unwrap_or(time::UtcOffset::UTC)
    }
}
