//! Chat event handling: one event in, one reply out, at most one state step.

use bytes::Bytes;
use time::OffsetDateTime;
use tracing::{info, instrument, warn};

use super::commands::Command;
use super::dto::{BotEvent, BotReply};
use crate::conversation::machine::{ConversationState, Step};
use crate::error::{AppError, AppResult};
use crate::images::services::{self as images, UploadItem};
use crate::menus::repo_types::Menu;
use crate::orders::repo_types::NewOrder;
use crate::orders::services::{self as orders, validate_rating};
use crate::recommend::services::recommend_for_user;
use crate::state::AppState;
use crate::users::repo_types::{StateUpdate, User, UserState};

pub const REGISTRATION_PROMPT: &str = "EatWise could not find your account. Please register by pushing the \"EATWISE PROFILE\" button in the rich menu.";
const RECOMMENDATIONS_TEXT: &str = "Here are our recommended menus for you! Once you have ordered your food, please take a picture of it and send it to us.";
const RECOGNITION_TEXT: &str = "Check out the menu prediction by EatWise!";
const RATING_TEXT: &str = "Let's rate your food!";
const THANKS_TEXT: &str = "Thank you for rating the food!";
const SUMMARY_TEXT: &str = "Check out your today nutrition summary!";

#[instrument(skip(state, event), fields(handle = %event.handle))]
pub async fn handle_event(state: &AppState, event: BotEvent, now: OffsetDateTime) -> AppResult<BotReply> {
    let handle = event.handle.trim().to_string();
    if handle.is_empty() {
        return Err(AppError::BadRequest("handle is required".into()));
    }
    let _guard = state.locks.acquire(&handle).await;

    let Some(current) = state.store.get_state(&handle).await? else {
        info!("event from unregistered user");
        return Ok(BotReply::RegistrationPrompt { text: REGISTRATION_PROMPT });
    };

    let command = Command::parse(event.event);
    if command == Command::NutritionSummary {
        return nutrition_summary(state, &handle, now).await;
    }

    let is_food = match &command {
        Command::Image { body, .. } if current.state.awaits_image() => {
            state.classifier.is_food(body.clone()).await?
        }
        _ => false,
    };

    let next = match current.state.step(command.trigger(is_food)) {
        Step::Stay(rejection) => {
            info!(state = %current.state, ?rejection, "event rejected");
            return Ok(BotReply::text(rejection.message()));
        }
        Step::Advance(next) => next,
    };

    let reply = match command {
        Command::RequestRecommendation => send_recommendations(state, &current, next, now).await?,
        Command::Image { body, content_type } => {
            recognize(state, &current, next, body, &content_type).await?
        }
        Command::Confirm { menu_id } => {
            let menu = find_menu(state, menu_id).await?;
            apply_feedback(state, &current, next, menu).await?
        }
        Command::Correct { menu_name } => {
            let menu = state
                .store
                .find_menu_by_name(&menu_name)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("menu {menu_name:?} not found")))?;
            apply_feedback(state, &current, next, menu).await?
        }
        Command::Rate { rating, menu_id } => rate(state, &current, next, rating, menu_id, now).await?,
        Command::NutritionSummary | Command::Unknown => {
            return Err(AppError::Internal(anyhow::anyhow!(
                "command without a transition advanced from {}",
                current.state
            )))
        }
    };
    info!(from = %current.state, to = %next, "state advanced");
    Ok(reply)
}

async fn find_user(state: &AppState, handle: &str) -> AppResult<User> {
    state
        .store
        .find_user_by_handle(handle)
        .await?
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("state row without user {handle}")))
}

async fn find_menu(state: &AppState, menu_id: i64) -> AppResult<Menu> {
    state
        .store
        .find_menu(menu_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("menu {menu_id} not found")))
}

/// Conditional write; a concurrent change surfaces as a conflict.
async fn advance(state: &AppState, current: &UserState, update: StateUpdate) -> AppResult<UserState> {
    state
        .store
        .advance_state(&current.handle, &update)
        .await?
        .ok_or_else(|| {
            warn!(handle = %current.handle, expected = %update.from, "state changed concurrently");
            AppError::Conflict(format!("state of {} changed concurrently", current.handle))
        })
}

async fn send_recommendations(
    state: &AppState,
    current: &UserState,
    next: ConversationState,
    now: OffsetDateTime,
) -> AppResult<BotReply> {
    let user = find_user(state, &current.handle).await?;
    let (meal_time, menus) = recommend_for_user(state, &user, now).await?;
    advance(
        state,
        current,
        StateUpdate { from: current.state, to: next, recognized_menu_id: None, staged_image_key: None },
    )
    .await?;
    Ok(BotReply::Recommendations { text: RECOMMENDATIONS_TEXT, meal_time, menus })
}

async fn recognize(
    state: &AppState,
    current: &UserState,
    next: ConversationState,
    body: Bytes,
    content_type: &str,
) -> AppResult<BotReply> {
    let menu_id = state.classifier.recognize_menu(body.clone()).await?;
    let menu = find_menu(state, menu_id).await?;
    let key = images::stage_uncategorized(state, &current.handle, UploadItem { body, content_type }).await?;

    let update = StateUpdate {
        from: current.state,
        to: next,
        recognized_menu_id: Some(menu.id),
        staged_image_key: Some(key.clone()),
    };
    if let Err(e) = advance(state, current, update).await {
        if let Err(cleanup) = state.storage.delete_object(&key).await {
            warn!(error = %cleanup, %key, "staged image left behind");
        }
        return Err(e);
    }

    let image_url = match images::preview_url(state, &key).await {
        Ok(url) => Some(url),
        Err(e) => {
            warn!(error = %e, %key, "no preview url");
            None
        }
    };
    Ok(BotReply::Recognition { text: RECOGNITION_TEXT, menu, image_url })
}

async fn apply_feedback(
    state: &AppState,
    current: &UserState,
    next: ConversationState,
    menu: Menu,
) -> AppResult<BotReply> {
    advance(
        state,
        current,
        StateUpdate {
            from: current.state,
            to: next,
            recognized_menu_id: Some(menu.id),
            staged_image_key: None,
        },
    )
    .await?;

    // best effort: the row no longer references the staged key
    match current.staged_image_key.as_deref() {
        Some(key) => {
            if let Err(e) = images::categorize(state, key, menu.id).await {
                warn!(error = %e, %key, menu_id = menu.id, "staged image not categorized");
            }
        }
        None => warn!(handle = %current.handle, "no staged image to categorize"),
    }
    Ok(BotReply::RatingRequest { text: RATING_TEXT, menu })
}

async fn rate(
    state: &AppState,
    current: &UserState,
    next: ConversationState,
    rating: i32,
    postback_menu_id: Option<i64>,
    now: OffsetDateTime,
) -> AppResult<BotReply> {
    validate_rating(rating)?;
    let menu_id = current
        .recognized_menu_id
        .or(postback_menu_id)
        .ok_or_else(|| AppError::BadRequest("no menu to rate".into()))?;
    let user = find_user(state, &current.handle).await?;

    let order = state
        .store
        .advance_state_with_order(
            &current.handle,
            &StateUpdate { from: current.state, to: next, recognized_menu_id: None, staged_image_key: None },
            &NewOrder { user_id: user.id, menu_id, rating: Some(rating), created_at: now },
        )
        .await?
        .ok_or_else(|| AppError::Conflict(format!("state of {} changed concurrently", current.handle)))?;
    state.features.invalidate();
    info!(order_id = order.id, menu_id, rating, "rating recorded");
    Ok(BotReply::Thanks { text: THANKS_TEXT, order })
}

async fn nutrition_summary(state: &AppState, handle: &str, now: OffsetDateTime) -> AppResult<BotReply> {
    let user = find_user(state, handle).await?;
    let summary = orders::daily_summary(state, user.id, now).await?;
    let remaining = state.config.recommend.daily_goal.remaining(&summary.totals);
    Ok(BotReply::NutritionSummary {
        text: SUMMARY_TEXT,
        menu_ids: summary.menu_ids,
        consumed: summary.totals,
        remaining,
    })
}
