use std::collections::HashMap;

use anyhow::Context;
use time::OffsetDateTime;
use tracing::{debug, info, instrument};

use super::features::AssembledFeatures;
use super::meal_time::MealTime;
use super::model::{HybridModel, TrainingConfig};
use super::scorer::{self, NutrientProfile, ScoredMenu, ScoringError, ScoringInput};
use crate::error::AppResult;
use crate::orders::services::remaining_goal;
use crate::state::AppState;
use crate::users::repo_types::User;

#[derive(Debug, Clone, serde::Serialize)]
pub struct TrainReport {
    pub users: usize,
    pub menus: usize,
    pub ratings: usize,
    pub mse: f64,
}

fn resolve(
    features: &AssembledFeatures,
    user_id: i64,
    previous_menu_id: Option<i64>,
) -> Result<(usize, Option<usize>), ScoringError> {
    let user = *features
        .user_index
        .get(&user_id)
        .ok_or(ScoringError::UnknownUser(user_id))?;
    let previous = previous_menu_id
        .map(|id| features.menu_index.get(&id).copied().ok_or(ScoringError::UnknownMenu(id)))
        .transpose()?;
    Ok((user, previous))
}

/// Top-N menus for `user_id` given the menu eaten last and the meal period.
#[instrument(skip(state))]
pub async fn recommend(
    state: &AppState,
    user_id: i64,
    previous_menu_id: Option<i64>,
    meal_time: MealTime,
    now: OffsetDateTime,
) -> AppResult<Vec<ScoredMenu>> {
    let year = now.to_offset(state.config.utc_offset()).year();
    let features = state
        .features
        .get_or_assemble(state.store.as_ref(), year)
        .await?;
    let (user_index, previous_menu) = resolve(&features, user_id, previous_menu_id)?;
    let remaining = remaining_goal(state, user_id, now).await?;

    let menu_names: Vec<String> = features.menus.iter().map(|m| m.name.clone()).collect();
    let nutrition: HashMap<String, NutrientProfile> = features
        .menus
        .iter()
        .map(|m| (m.name.clone(), NutrientProfile::from(m)))
        .collect();
    let model = state.model.current();
    let rec = &state.config.recommend;

    let top = scorer::top_n(
        &ScoringInput {
            model: model.as_ref(),
            interactions: &features.interactions,
            user_index,
            user_features: &features.user_features,
            menu_features: &features.menu_features,
            previous_menu,
            menu_names: &menu_names,
            nutrition: &nutrition,
            remaining,
            meal_time,
            weights: rec.weights,
        },
        rec.top_n,
    )?;
    debug!(candidates = menu_names.len(), returned = top.len(), "menus ranked");
    Ok(top)
}

/// Recommendation for the chat flow: last order as history, meal period from the clock.
pub async fn recommend_for_user(
    state: &AppState,
    user: &User,
    now: OffsetDateTime,
) -> AppResult<(MealTime, Vec<ScoredMenu>)> {
    let previous = state.store.latest_order(user.id).await?.map(|o| o.menu_id);
    let meal_time = MealTime::at(now, state.config.utc_offset());
    let menus = recommend(state, user.id, previous, meal_time, now).await?;
    Ok((meal_time, menus))
}

/// Fit a fresh model on the current population, persist it and swap it in.
#[instrument(skip(state))]
pub async fn train(state: &AppState) -> AppResult<TrainReport> {
    let year = OffsetDateTime::now_utc().to_offset(state.config.utc_offset()).year();
    let features = state
        .features
        .get_or_assemble(state.store.as_ref(), year)
        .await?;

    let fitted = {
        let features = features.clone();
        tokio::task::spawn_blocking(move || -> anyhow::Result<(HybridModel, f64)> {
            let cfg = TrainingConfig::default();
            let mut model = HybridModel::new(
                features.user_features.cols(),
                features.menu_features.cols(),
                &cfg,
            );
            let mse = model.fit(
                &features.interactions,
                &features.user_features,
                &features.menu_features,
                &cfg,
            )?;
            Ok((model, mse))
        })
        .await
        .context("training task panicked")??
    };
    let (model, mse) = fitted;

    model.save(&state.config.recommend.model_path).await?;
    state.model.replace(std::sync::Arc::new(model));

    let report = TrainReport {
        users: features.user_features.rows(),
        menus: features.menu_features.rows(),
        ratings: features.interactions.nnz(),
        mse,
    };
    info!(?report, "preference model replaced");
    Ok(report)
}
