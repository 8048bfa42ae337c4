use time::{macros::format_description, Date};
use tracing::{info, instrument, warn};

use super::dto::RegisterRequest;
use super::repo_types::{NewUser, User, UserState};
use crate::conversation::machine::ConversationState;
use crate::error::{AppError, AppResult};
use crate::state::AppState;

pub fn parse_birth_date(s: &str) -> AppResult<Date> {
    Date::parse(s.trim(), format_description!("[year]-[month]-[day]"))
        .map_err(|e| AppError::BadRequest(format!("invalid birth_date {s:?}: {e}")))
}

fn validate_body(weight: f64, height: f64) -> AppResult<()> {
    if !(weight.is_finite() && weight > 0.0 && height.is_finite() && height > 0.0) {
        return Err(AppError::BadRequest("weight and height must be positive".into()));
    }
    Ok(())
}

#[instrument(skip(state, req), fields(handle = %req.handle))]
pub async fn register(state: &AppState, req: RegisterRequest) -> AppResult<User> {
    let handle = req.handle.trim().to_string();
    if handle.is_empty() {
        return Err(AppError::BadRequest("handle is required".into()));
    }
    validate_body(req.weight, req.height)?;
    let birth_date = parse_birth_date(&req.birth_date)?;

    if state.store.find_user_by_handle(&handle).await?.is_some() {
        warn!(%handle, "handle already registered");
        return Err(AppError::Conflict(format!("user {handle} already registered")));
    }

    let user = state
        .store
        .create_user(&NewUser {
            handle,
            name: req.name,
            birth_date,
            gender: req.gender,
            height: req.height,
            weight: req.weight,
            picture_url: req.picture_url,
            preferences: req.preferences,
        })
        .await?;
    state.features.invalidate();
    info!(user_id = user.id, "user registered");
    Ok(user)
}

pub async fn get_user(state: &AppState, handle: &str) -> AppResult<User> {
    state
        .store
        .find_user_by_handle(handle)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("user {handle} not found")))
}

#[instrument(skip(state))]
pub async fn update_body(state: &AppState, handle: &str, weight: f64, height: f64) -> AppResult<User> {
    validate_body(weight, height)?;
    let user = state
        .store
        .update_user_body(handle, weight, height)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("user {handle} not found")))?;
    state.features.invalidate();
    Ok(user)
}

pub async fn get_state(state: &AppState, handle: &str) -> AppResult<UserState> {
    state
        .store
        .get_state(handle)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("user {handle} not found")))
}

/// Administrative overwrite. Waits for any in-flight event of the same user.
#[instrument(skip(state))]
pub async fn set_state(state: &AppState, handle: &str, to: ConversationState) -> AppResult<UserState> {
    let _guard = state.locks.acquire(handle).await;
    let previous = get_state(state, handle).await?;
    let updated = state
        .store
        .set_state(handle, to)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("user {handle} not found")))?;
    info!(%handle, from = %previous.state, state = %to, "state overwritten");

    if let (Some(key), None) = (previous.staged_image_key.as_deref(), updated.staged_image_key.as_deref()) {
        if let Err(e) = state.storage.delete_object(key).await {
            warn!(error = %e, %key, "orphaned staged image left behind");
        }
    }
    Ok(updated)
}

#[cfg(test)]
mod user_tests {
    use super::*;
    use crate::testing::register_request;
    use time::macros::date;

    #[test]
    fn birth_dates_are_iso() {
        assert_eq!(parse_birth_date("1999-02-28").unwrap(), date!(1999 - 02 - 28));
        assert!(matches!(parse_birth_date("28/02/1999"), Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn registration_creates_state_and_rejects_duplicates() {
        let state = AppState::fake();
        let v0 = state.features.version();
        let user = register(&state, register_request("U1")).await.unwrap();
        assert!(state.features.version() > v0);

        let st = get_state(&state, "U1").await.unwrap();
        assert_eq!(st.user_id, user.id);
        assert_eq!(st.state, ConversationState::Registered);
        assert_eq!(st.recognized_menu_id, None);

        let err = register(&state, register_request("U1")).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(state.store.list_users().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn body_update_validates_and_bumps_cache() {
        let state = AppState::fake();
        register(&state, register_request("U2")).await.unwrap();

        let v0 = state.features.version();
        let user = update_body(&state, "U2", 64.5, 171.0).await.unwrap();
        assert_eq!((user.weight, user.height), (64.5, 171.0));
        assert!(state.features.version() > v0);

        assert!(matches!(update_body(&state, "U2", -1.0, 170.0).await, Err(AppError::BadRequest(_))));
        assert!(matches!(update_body(&state, "nobody", 60.0, 170.0).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn set_state_overwrites_and_reports_missing() {
        let state = AppState::fake();
        register(&state, register_request("U3")).await.unwrap();

        let st = set_state(&state, "U3", ConversationState::ImageCategorized).await.unwrap();
        assert_eq!(st.state, ConversationState::ImageCategorized);
        assert_eq!(get_state(&state, "U3").await.unwrap().state, ConversationState::ImageCategorized);

        assert!(matches!(
            set_state(&state, "ghost", ConversationState::Registered).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn forced_reset_drops_the_pending_prediction() {
        use crate::storage::StorageClient;
        use crate::users::repo_types::StateUpdate;

        let f = crate::testing::fakes();
        register(&f.state, register_request("U4")).await.unwrap();
        let key = "retrain_images/uncategorized/U4_1.jpg";
        f.storage.put_object(key, bytes::Bytes::from_static(b"img"), "image/jpeg").await.unwrap();
        for (from, to, staged) in [
            (ConversationState::Registered, ConversationState::RecommendationSent, None),
            (ConversationState::RecommendationSent, ConversationState::MenuRecognized, Some(key.to_string())),
        ] {
            let update = StateUpdate { from, to, recognized_menu_id: Some(3), staged_image_key: staged };
            f.state.store.advance_state("U4", &update).await.unwrap().unwrap();
        }

        // moving on to rating keeps the menu but not the upload
        let st = set_state(&f.state, "U4", ConversationState::ImageCategorized).await.unwrap();
        assert_eq!(st.recognized_menu_id, Some(3));
        assert_eq!(st.staged_image_key, None);
        assert!(!f.storage.contains(key));

        let st = set_state(&f.state, "U4", ConversationState::Registered).await.unwrap();
        assert_eq!(st.recognized_menu_id, None);
        assert_eq!(get_state(&f.state, "U4").await.unwrap().recognized_menu_id, None);
    }
}
