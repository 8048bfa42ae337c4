use anyhow::Context;
use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};
use time::OffsetDateTime;

use super::Store;
use crate::conversation::machine::ConversationState;
use crate::menus::{self, repo_types::{Menu, NewMenu}};
use crate::orders::{self, repo_types::{DailySummary, NewOrder, Order, TopMenu}};
use crate::users::{self, repo_types::{NewUser, PreferenceTag, StateUpdate, User, UserState}};

/// Pool-backed store; every call checks a connection out and returns it on drop.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .context("connect to database")?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    async fn create_user(&self, new: &NewUser) -> anyhow::Result<User> {
        users::repo::create_user(&self.pool, new).await
    }

    async fn find_user_by_handle(&self, handle: &str) -> anyhow::Result<Option<User>> {
        users::repo::find_by_handle(&self.pool, handle).await
    }

    async fn find_user(&self, user_id: i64) -> anyhow::Result<Option<User>> {
        users::repo::find_by_id(&self.pool, user_id).await
    }

    async fn update_user_body(
        &self,
        handle: &str,
        weight: f64,
        height: f64,
    ) -> anyhow::Result<Option<User>> {
        users::repo::update_body(&self.pool, handle, weight, height).await
    }

    async fn list_users(&self) -> anyhow::Result<Vec<User>> {
        users::repo::list_users(&self.pool).await
    }

    async fn list_user_tags(&self) -> anyhow::Result<Vec<(i64, PreferenceTag)>> {
        users::repo::list_user_tags(&self.pool).await
    }

    async fn get_state(&self, handle: &str) -> anyhow::Result<Option<UserState>> {
        users::repo::get_state(&self.pool, handle).await
    }

    async fn set_state(
        &self,
        handle: &str,
        state: ConversationState,
    ) -> anyhow::Result<Option<UserState>> {
        users::repo::set_state(&self.pool, handle, state).await
    }

    async fn advance_state(
        &self,
        handle: &str,
        update: &StateUpdate,
    ) -> anyhow::Result<Option<UserState>> {
        users::repo::advance_state(&self.pool, handle, update).await
    }

    async fn advance_state_with_order(
        &self,
        handle: &str,
        update: &StateUpdate,
        order: &NewOrder,
    ) -> anyhow::Result<Option<Order>> {
        let mut tx = self.pool.begin().await.context("begin tx")?;
        if users::repo::advance_state_tx(&mut tx, handle, update)
            .await?
            .is_none()
        {
            tx.rollback().await.context("rollback tx")?;
            return Ok(None);
        }
        let created = orders::repo::create_order_tx(&mut tx, order).await?;
        tx.commit().await.context("commit tx")?;
        Ok(Some(created))
    }

    async fn create_menu(&self, new: &NewMenu) -> anyhow::Result<Menu> {
        menus::repo::create_menu(&self.pool, new).await
    }

    async fn find_menu(&self, menu_id: i64) -> anyhow::Result<Option<Menu>> {
        menus::repo::find_menu(&self.pool, menu_id).await
    }

    async fn find_menu_by_name(&self, name: &str) -> anyhow::Result<Option<Menu>> {
        menus::repo::find_menu_by_name(&self.pool, name).await
    }

    async fn list_menus(&self) -> anyhow::Result<Vec<Menu>> {
        menus::repo::list_menus(&self.pool).await
    }

    async fn create_order(&self, new: &NewOrder) -> anyhow::Result<Order> {
        orders::repo::create_order(&self.pool, new).await
    }

    async fn list_orders(&self) -> anyhow::Result<Vec<Order>> {
        orders::repo::list_orders(&self.pool).await
    }

    async fn list_orders_by_user(&self, user_id: i64) -> anyhow::Result<Vec<Order>> {
        orders::repo::list_by_user(&self.pool, user_id).await
    }

    async fn latest_order(&self, user_id: i64) -> anyhow::Result<Option<Order>> {
        orders::repo::latest_by_user(&self.pool, user_id).await
    }

    async fn daily_summary(
        &self,
        user_id: i64,
        since: OffsetDateTime,
    ) -> anyhow::Result<DailySummary> {
        orders::repo::daily_summary(&self.pool, user_id, since).await
    }

    async fn top_menus_by_user(&self, user_id: i64, limit: i64) -> anyhow::Result<Vec<TopMenu>> {
        orders::repo::top_menus_by_user(&self.pool, user_id, limit).await
    }
}
