use anyhow::Context;
use sqlx::{PgPool, Postgres, Transaction};

use super::repo_types::{NewUser, PreferenceTag, StateUpdate, User, UserRow, UserState, UserStateRow};
use crate::conversation::machine::ConversationState;

const USER_COLUMNS: &str =
    "id, handle, name, birth_date, gender, height, weight, picture_url, created_at";
const STATE_COLUMNS: &str =
    "user_id, handle, state, recognized_menu_id, staged_image_key, updated_at";

/// Insert the user, its state row and its preference tags in one transaction.
pub async fn create_user(db: &PgPool, new: &NewUser) -> anyhow::Result<User> {
    let mut tx = db.begin().await.context("begin tx")?;

    let row = sqlx::query_as::<_, UserRow>(&format!(
        r#"
        INSERT INTO users (handle, name, birth_date, gender, height, weight, picture_url)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING {USER_COLUMNS}
        "#
    ))
    .bind(&new.handle)
    .bind(&new.name)
    .bind(new.birth_date)
    .bind(new.gender.as_str())
    .bind(new.height)
    .bind(new.weight)
    .bind(&new.picture_url)
    .fetch_one(&mut *tx)
    .await
    .context("insert user")?;

    sqlx::query(
        r#"
        INSERT INTO user_states (user_id, handle, state)
        VALUES ($1, $2, $3)
        "#,
    )
    .bind(row.id)
    .bind(&row.handle)
    .bind(ConversationState::Registered.as_str())
    .execute(&mut *tx)
    .await
    .context("insert user state")?;

    insert_tags_tx(&mut tx, row.id, &new.preferences).await?;

    tx.commit().await.context("commit tx")?;
    row.try_into()
}

async fn insert_tags_tx(
    tx: &mut Transaction<'_, Postgres>,
    user_id: i64,
    tags: &[PreferenceTag],
) -> anyhow::Result<()> {
    for tag in tags {
        sqlx::query("INSERT INTO user_features (user_id, tag) VALUES ($1, $2)")
            .bind(user_id)
            .bind(tag.as_str())
            .execute(&mut **tx)
            .await
            .context("insert user feature")?;
    }
    Ok(())
}

pub async fn find_by_handle(db: &PgPool, handle: &str) -> anyhow::Result<Option<User>> {
    let row = sqlx::query_as::<_, UserRow>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE handle = $1"
    ))
    .bind(handle)
    .fetch_optional(db)
    .await
    .context("find user by handle")?;
    row.map(User::try_from).transpose()
}

pub async fn find_by_id(db: &PgPool, user_id: i64) -> anyhow::Result<Option<User>> {
    let row = sqlx::query_as::<_, UserRow>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
    ))
    .bind(user_id)
    .fetch_optional(db)
    .await
    .context("find user by id")?;
    row.map(User::try_from).transpose()
}

pub async fn update_body(
    db: &PgPool,
    handle: &str,
    weight: f64,
    height: f64,
) -> anyhow::Result<Option<User>> {
    let row = sqlx::query_as::<_, UserRow>(&format!(
        r#"
        UPDATE users SET weight = $2, height = $3
        WHERE handle = $1
        RETURNING {USER_COLUMNS}
        "#
    ))
    .bind(handle)
    .bind(weight)
    .bind(height)
    .fetch_optional(db)
    .await
    .context("update user body")?;
    row.map(User::try_from).transpose()
}

/// Whole population in id order; row positions of the user-feature matrix follow it.
pub async fn list_users(db: &PgPool) -> anyhow::Result<Vec<User>> {
    let rows = sqlx::query_as::<_, UserRow>(&format!(
        "SELECT {USER_COLUMNS} FROM users ORDER BY id ASC"
    ))
    .fetch_all(db)
    .await
    .context("list users")?;
    rows.into_iter().map(User::try_from).collect()
}

pub async fn list_user_tags(db: &PgPool) -> anyhow::Result<Vec<(i64, PreferenceTag)>> {
    let rows = sqlx::query_as::<_, (i64, String)>(
        "SELECT user_id, tag FROM user_features ORDER BY user_id ASC, id ASC",
    )
    .fetch_all(db)
    .await
    .context("list user features")?;
    rows.into_iter()
        .map(|(user_id, tag)| Ok((user_id, tag.parse()?)))
        .collect()
}

// ---- state ----

pub async fn get_state(db: &PgPool, handle: &str) -> anyhow::Result<Option<UserState>> {
    let row = sqlx::query_as::<_, UserStateRow>(&format!(
        "SELECT {STATE_COLUMNS} FROM user_states WHERE handle = $1"
    ))
    .bind(handle)
    .fetch_optional(db)
    .await
    .context("get user state")?;
    row.map(UserState::try_from).transpose()
}

/// Unconditional overwrite of the state token. Payload columns the target
/// state cannot hold are cleared.
pub async fn set_state(
    db: &PgPool,
    handle: &str,
    state: ConversationState,
) -> anyhow::Result<Option<UserState>> {
    let row = sqlx::query_as::<_, UserStateRow>(&format!(
        r#"
        UPDATE user_states SET
            state = $2,
            recognized_menu_id = CASE WHEN $3 THEN recognized_menu_id ELSE NULL END,
            staged_image_key = CASE WHEN $4 THEN staged_image_key ELSE NULL END,
            updated_at = now()
        WHERE handle = $1
        RETURNING {STATE_COLUMNS}
        "#
    ))
    .bind(handle)
    .bind(state.as_str())
    .bind(state.holds_recognized_menu())
    .bind(state.holds_staged_image())
    .fetch_optional(db)
    .await
    .context("set user state")?;
    row.map(UserState::try_from).transpose()
}

/// Compare-and-set on the state token. `None` means the row was not in
/// `update.from` (or does not exist) and nothing was written.
pub async fn advance_state(
    db: &PgPool,
    handle: &str,
    update: &StateUpdate,
) -> anyhow::Result<Option<UserState>> {
    let row = sqlx::query_as::<_, UserStateRow>(&advance_sql())
        .bind(handle)
        .bind(update.from.as_str())
        .bind(update.to.as_str())
        .bind(update.recognized_menu_id)
        .bind(&update.staged_image_key)
        .fetch_optional(db)
        .await
        .context("advance user state")?;
    row.map(UserState::try_from).transpose()
}

pub async fn advance_state_tx(
    tx: &mut Transaction<'_, Postgres>,
    handle: &str,
    update: &StateUpdate,
) -> anyhow::Result<Option<UserState>> {
    let row = sqlx::query_as::<_, UserStateRow>(&advance_sql())
        .bind(handle)
        .bind(update.from.as_str())
        .bind(update.to.as_str())
        .bind(update.recognized_menu_id)
        .bind(&update.staged_image_key)
        .fetch_optional(&mut **tx)
        .await
        .context("advance user state")?;
    row.map(UserState::try_from).transpose()
}

fn advance_sql() -> String {
    format!(
        r#"
        UPDATE user_states
           SET state = $3, recognized_menu_id = $4, staged_image_key = $5, updated_at = now()
         WHERE handle = $1 AND state = $2
        RETURNING {STATE_COLUMNS}
        "#
    )
}
