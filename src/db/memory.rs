use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use time::OffsetDateTime;

use super::Store;
use crate::conversation::machine::ConversationState;
use crate::menus::repo_types::{Menu, NewMenu};
use crate::orders::repo_types::{DailySummary, NewOrder, Order, TopMenu};
use crate::users::repo_types::{NewUser, PreferenceTag, StateUpdate, User, UserState};

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    states: Vec<UserState>,
    tags: Vec<(i64, PreferenceTag)>,
    menus: Vec<Menu>,
    orders: Vec<Order>,
}

/// In-process store with the same observable behaviour as the Postgres one.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    fail_next_advance: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `advance_state` call fail as if the database dropped out.
    pub fn fail_next_advance(&self) {
        self.fail_next_advance.store(true, Ordering::SeqCst);
    }

    fn with<T>(&self, f: impl FnOnce(&mut Tables) -> T) -> T {
        let mut t = self.tables.lock().unwrap_or_else(|p| p.into_inner());
        f(&mut t)
    }
}

fn apply(state: &mut UserState, update: &StateUpdate) -> bool {
    if state.state != update.from {
        return false;
    }
    state.state = update.to;
    state.recognized_menu_id = update.recognized_menu_id;
    state.staged_image_key = update.staged_image_key.clone();
    state.updated_at = OffsetDateTime::now_utc();
    true
}

fn insert_order(t: &mut Tables, new: &NewOrder) -> anyhow::Result<Order> {
    anyhow::ensure!(
        t.users.iter().any(|u| u.id == new.user_id),
        "order references unknown user {}",
        new.user_id
    );
    anyhow::ensure!(
        t.menus.iter().any(|m| m.id == new.menu_id),
        "order references unknown menu {}",
        new.menu_id
    );
    let order = Order {
        id: t.orders.len() as i64 + 1,
        user_id: new.user_id,
        menu_id: new.menu_id,
        rating: new.rating,
        created_at: new.created_at,
    };
    t.orders.push(order.clone());
    Ok(order)
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_user(&self, new: &NewUser) -> anyhow::Result<User> {
        self.with(|t| {
            anyhow::ensure!(
                !t.users.iter().any(|u| u.handle == new.handle),
                "duplicate handle {}",
                new.handle
            );
            let now = OffsetDateTime::now_utc();
            let user = User {
                id: t.users.len() as i64 + 1,
                handle: new.handle.clone(),
                name: new.name.clone(),
                birth_date: new.birth_date,
                gender: new.gender,
                height: new.height,
                weight: new.weight,
                picture_url: new.picture_url.clone(),
                created_at: now,
            };
            t.states.push(UserState {
                user_id: user.id,
                handle: user.handle.clone(),
                state: ConversationState::Registered,
                recognized_menu_id: None,
                staged_image_key: None,
                updated_at: now,
            });
            t.tags.extend(new.preferences.iter().map(|tag| (user.id, *tag)));
            t.users.push(user.clone());
            Ok(user)
        })
    }

    async fn find_user_by_handle(&self, handle: &str) -> anyhow::Result<Option<User>> {
        Ok(self.with(|t| t.users.iter().find(|u| u.handle == handle).cloned()))
    }

    async fn find_user(&self, user_id: i64) -> anyhow::Result<Option<User>> {
        Ok(self.with(|t| t.users.iter().find(|u| u.id == user_id).cloned()))
    }

    async fn update_user_body(
        &self,
        handle: &str,
        weight: f64,
        height: f64,
    ) -> anyhow::Result<Option<User>> {
        Ok(self.with(|t| {
            t.users.iter_mut().find(|u| u.handle == handle).map(|u| {
                u.weight = weight;
                u.height = height;
                u.clone()
            })
        }))
    }

    async fn list_users(&self) -> anyhow::Result<Vec<User>> {
        Ok(self.with(|t| t.users.clone()))
    }

    async fn list_user_tags(&self) -> anyhow::Result<Vec<(i64, PreferenceTag)>> {
        Ok(self.with(|t| t.tags.clone()))
    }

    async fn get_state(&self, handle: &str) -> anyhow::Result<Option<UserState>> {
        Ok(self.with(|t| t.states.iter().find(|s| s.handle == handle).cloned()))
    }

    async fn set_state(
        &self,
        handle: &str,
        state: ConversationState,
    ) -> anyhow::Result<Option<UserState>> {
        Ok(self.with(|t| {
            t.states.iter_mut().find(|s| s.handle == handle).map(|s| {
                s.state = state;
                if !state.holds_recognized_menu() {
                    s.recognized_menu_id = None;
                }
                if !state.holds_staged_image() {
                    s.staged_image_key = None;
                }
                s.updated_at = OffsetDateTime::now_utc();
                s.clone()
            })
        }))
    }

    async fn advance_state(
        &self,
        handle: &str,
        update: &StateUpdate,
    ) -> anyhow::Result<Option<UserState>> {
        if self.fail_next_advance.swap(false, Ordering::SeqCst) {
            anyhow::bail!("advance user state: connection reset");
        }
        Ok(self.with(|t| {
            t.states
                .iter_mut()
                .find(|s| s.handle == handle)
                .and_then(|s| apply(s, update).then(|| s.clone()))
        }))
    }

    async fn advance_state_with_order(
        &self,
        handle: &str,
        update: &StateUpdate,
        order: &NewOrder,
    ) -> anyhow::Result<Option<Order>> {
        self.with(|t| {
            let Some(idx) = t.states.iter().position(|s| s.handle == handle) else {
                return Ok(None);
            };
            if t.states[idx].state != update.from {
                return Ok(None);
            }
            let created = insert_order(t, order)?;
            apply(&mut t.states[idx], update);
            Ok(Some(created))
        })
    }

    async fn create_menu(&self, new: &NewMenu) -> anyhow::Result<Menu> {
        self.with(|t| {
            anyhow::ensure!(
                !t.menus.iter().any(|m| m.name == new.name),
                "duplicate menu {}",
                new.name
            );
            let menu = Menu {
                id: t.menus.len() as i64 + 1,
                name: new.name.clone(),
                nutrients: new.nutrients,
                meal_times: new.meal_times,
                tags: new.tags,
                created_at: OffsetDateTime::now_utc(),
            };
            t.menus.push(menu.clone());
            Ok(menu)
        })
    }

    async fn find_menu(&self, menu_id: i64) -> anyhow::Result<Option<Menu>> {
        Ok(self.with(|t| t.menus.iter().find(|m| m.id == menu_id).cloned()))
    }

    async fn find_menu_by_name(&self, name: &str) -> anyhow::Result<Option<Menu>> {
        Ok(self.with(|t| t.menus.iter().find(|m| m.name == name).cloned()))
    }

    async fn list_menus(&self) -> anyhow::Result<Vec<Menu>> {
        Ok(self.with(|t| t.menus.clone()))
    }

    async fn create_order(&self, new: &NewOrder) -> anyhow::Result<Order> {
        self.with(|t| insert_order(t, new))
    }

    async fn list_orders(&self) -> anyhow::Result<Vec<Order>> {
        Ok(self.with(|t| t.orders.clone()))
    }

    async fn list_orders_by_user(&self, user_id: i64) -> anyhow::Result<Vec<Order>> {
        Ok(self.with(|t| {
            let mut rows: Vec<Order> =
                t.orders.iter().filter(|o| o.user_id == user_id).cloned().collect();
            rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
            rows
        }))
    }

    async fn latest_order(&self, user_id: i64) -> anyhow::Result<Option<Order>> {
        Ok(self.list_orders_by_user(user_id).await?.into_iter().next())
    }

    async fn daily_summary(
        &self,
        user_id: i64,
        since: OffsetDateTime,
    ) -> anyhow::Result<DailySummary> {
        Ok(self.with(|t| {
            let mut todays: Vec<&Order> = t
                .orders
                .iter()
                .filter(|o| o.user_id == user_id && o.created_at >= since)
                .collect();
            todays.sort_by_key(|o| o.created_at);

            let mut summary = DailySummary::default();
            for o in todays {
                if let Some(menu) = t.menus.iter().find(|m| m.id == o.menu_id) {
                    summary.menu_ids.push(o.menu_id);
                    summary.totals += menu.nutrients;
                }
            }
            summary
        }))
    }

    async fn top_menus_by_user(&self, user_id: i64, limit: i64) -> anyhow::Result<Vec<TopMenu>> {
        Ok(self.with(|t| {
            let mut counts: HashMap<i64, i64> = HashMap::new();
            for o in t.orders.iter().filter(|o| o.user_id == user_id) {
                *counts.entry(o.menu_id).or_default() += 1;
            }
            let mut top: Vec<TopMenu> = counts
                .into_iter()
                .filter_map(|(menu_id, order_count)| {
                    t.menus.iter().find(|m| m.id == menu_id).map(|m| TopMenu {
                        menu_id,
                        name: m.name.clone(),
                        order_count,
                    })
                })
                .collect();
            top.sort_by(|a, b| b.order_count.cmp(&a.order_count).then(a.menu_id.cmp(&b.menu_id)));
            top.truncate(limit.max(0) as usize);
            top
        }))
    }
}
