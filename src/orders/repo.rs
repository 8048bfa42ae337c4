use anyhow::Context;
use sqlx::{PgPool, Postgres, Transaction};
use time::OffsetDateTime;

use super::repo_types::{DailySummary, DailySummaryRow, NewOrder, Order, TopMenu};

const ORDER_COLUMNS: &str = "id, user_id, menu_id, rating, created_at";

pub async fn create_order(db: &PgPool, new: &NewOrder) -> anyhow::Result<Order> {
    let order = sqlx::query_as::<_, Order>(&insert_sql())
        .bind(new.user_id)
        .bind(new.menu_id)
        .bind(new.rating)
        .bind(new.created_at)
        .fetch_one(db)
        .await
        .context("insert order")?;
    Ok(order)
}

pub async fn create_order_tx(
    tx: &mut Transaction<'_, Postgres>,
    new: &NewOrder,
) -> anyhow::Result<Order> {
    let order = sqlx::query_as::<_, Order>(&insert_sql())
        .bind(new.user_id)
        .bind(new.menu_id)
        .bind(new.rating)
        .bind(new.created_at)
        .fetch_one(&mut **tx)
        .await
        .context("insert order")?;
    Ok(order)
}

fn insert_sql() -> String {
    format!(
        r#"
        INSERT INTO orders (user_id, menu_id, rating, created_at)
        VALUES ($1, $2, $3, $4)
        RETURNING {ORDER_COLUMNS}
        "#
    )
}

pub async fn list_orders(db: &PgPool) -> anyhow::Result<Vec<Order>> {
    let rows = sqlx::query_as::<_, Order>(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders ORDER BY id ASC"
    ))
    .fetch_all(db)
    .await
    .context("list orders")?;
    Ok(rows)
}

pub async fn list_by_user(db: &PgPool, user_id: i64) -> anyhow::Result<Vec<Order>> {
    let rows = sqlx::query_as::<_, Order>(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 ORDER BY created_at DESC, id DESC"
    ))
    .bind(user_id)
    .fetch_all(db)
    .await
    .context("list orders by user")?;
    Ok(rows)
}

pub async fn latest_by_user(db: &PgPool, user_id: i64) -> anyhow::Result<Option<Order>> {
    let row = sqlx::query_as::<_, Order>(&format!(
        r#"
        SELECT {ORDER_COLUMNS} FROM orders
         WHERE user_id = $1
         ORDER BY created_at DESC, id DESC
         LIMIT 1
        "#
    ))
    .bind(user_id)
    .fetch_optional(db)
    .await
    .context("latest order")?;
    Ok(row)
}

pub async fn daily_summary(
    db: &PgPool,
    user_id: i64,
    since: OffsetDateTime,
) -> anyhow::Result<DailySummary> {
    let row = sqlx::query_as::<_, DailySummaryRow>(
        r#"
        SELECT COALESCE(array_agg(o.menu_id ORDER BY o.created_at), '{}') AS menu_ids,
               COALESCE(SUM(m.protein), 0)      AS protein,
               COALESCE(SUM(m.carbohydrate), 0) AS carbs,
               COALESCE(SUM(m.fat), 0)          AS fat,
               COALESCE(SUM(m.calorie), 0)      AS calories
          FROM orders o
          JOIN menus m ON m.id = o.menu_id
         WHERE o.user_id = $1 AND o.created_at >= $2
        "#,
    )
    .bind(user_id)
    .bind(since)
    .fetch_one(db)
    .await
    .context("daily summary")?;
    Ok(row.into())
}

pub async fn top_menus_by_user(
    db: &PgPool,
    user_id: i64,
    limit: i64,
) -> anyhow::Result<Vec<TopMenu>> {
    let rows = sqlx::query_as::<_, TopMenu>(
        r#"
        SELECT m.id AS menu_id, m.name, COUNT(*) AS order_count
          FROM orders o
          JOIN menus m ON m.id = o.menu_id
         WHERE o.user_id = $1
         GROUP BY m.id, m.name
         ORDER BY order_count DESC, m.id ASC
         LIMIT $2
        "#,
    )
    .bind(user_id)
    .bind(limit)
    .fetch_all(db)
    .await
    .context("top menus by user")?;
    Ok(rows)
}
