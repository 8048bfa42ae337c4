//! Persistence seam. Services talk to [`Store`]; the Postgres implementation
//! delegates to the per-domain `repo` modules.

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::conversation::machine::ConversationState;
use crate::menus::repo_types::{Menu, NewMenu};
use crate::orders::repo_types::{DailySummary, NewOrder, Order, TopMenu};
use crate::users::repo_types::{NewUser, PreferenceTag, StateUpdate, User, UserState};

#[cfg(test)]
pub mod memory;
pub mod postgres;

pub use postgres::PgStore;

#[async_trait]
pub trait Store: Send + Sync {
    // users
    async fn create_user(&self, new: &NewUser) -> anyhow::Result<User>;
    async fn find_user_by_handle(&self, handle: &str) -> anyhow::Result<Option<User>>;
    async fn find_user(&self, user_id: i64) -> anyhow::Result<Option<User>>;
    async fn update_user_body(
        &self,
        handle: &str,
        weight: f64,
        height: f64,
    ) -> anyhow::Result<Option<User>>;
    async fn list_users(&self) -> anyhow::Result<Vec<User>>;
    async fn list_user_tags(&self) -> anyhow::Result<Vec<(i64, PreferenceTag)>>;

    // conversation state
    async fn get_state(&self, handle: &str) -> anyhow::Result<Option<UserState>>;
    async fn set_state(
        &self,
        handle: &str,
        state: ConversationState,
    ) -> anyhow::Result<Option<UserState>>;
    async fn advance_state(
        &self,
        handle: &str,
        update: &StateUpdate,
    ) -> anyhow::Result<Option<UserState>>;
    /// Advance the state and append the order atomically. `None` when the
    /// conditional update did not apply; no order is written then.
    async fn advance_state_with_order(
        &self,
        handle: &str,
        update: &StateUpdate,
        order: &NewOrder,
    ) -> anyhow::Result<Option<Order>>;

    // menus
    async fn create_menu(&self, new: &NewMenu) -> anyhow::Result<Menu>;
    async fn find_menu(&self, menu_id: i64) -> anyhow::Result<Option<Menu>>;
    async fn find_menu_by_name(&self, name: &str) -> anyhow::Result<Option<Menu>>;
    async fn list_menus(&self) -> anyhow::Result<Vec<Menu>>;

    // orders
    async fn create_order(&self, new: &NewOrder) -> anyhow::Result<Order>;
    async fn list_orders(&self) -> anyhow::Result<Vec<Order>>;
    async fn list_orders_by_user(&self, user_id: i64) -> anyhow::Result<Vec<Order>>;
    async fn latest_order(&self, user_id: i64) -> anyhow::Result<Option<Order>>;
    async fn daily_summary(
        &self,
        user_id: i64,
        since: OffsetDateTime,
    ) -> anyhow::Result<DailySummary>;
    async fn top_menus_by_user(&self, user_id: i64, limit: i64) -> anyhow::Result<Vec<TopMenu>>;
}
