use anyhow::Context;
use sqlx::PgPool;

use super::repo_types::{Menu, MenuRow, NewMenu};

const MENU_COLUMNS: &str = r#"
    id, name, calorie, protein, fat, carbohydrate, breakfast, lunch, dinner,
    spicy, high_sugar, high_fat, high_calorie, is_light, is_fried, contain_water,
    has_vegetable, high_sodium, high_protein, high_carbohydrate, high_cholesterol,
    has_chicken, has_pork, has_noodle, high_price, created_at
"#;

/// Full catalogue in id order; column positions of the menu-feature matrix follow it.
pub async fn list_menus(db: &PgPool) -> anyhow::Result<Vec<Menu>> {
    let rows = sqlx::query_as::<_, MenuRow>(&format!(
        "SELECT {MENU_COLUMNS} FROM menus ORDER BY id ASC"
    ))
    .fetch_all(db)
    .await
    .context("list menus")?;
    Ok(rows.into_iter().map(Menu::from).collect())
}

pub async fn find_menu(db: &PgPool, menu_id: i64) -> anyhow::Result<Option<Menu>> {
    let row = sqlx::query_as::<_, MenuRow>(&format!(
        "SELECT {MENU_COLUMNS} FROM menus WHERE id = $1"
    ))
    .bind(menu_id)
    .fetch_optional(db)
    .await
    .context("find menu")?;
    Ok(row.map(Menu::from))
}

pub async fn find_menu_by_name(db: &PgPool, name: &str) -> anyhow::Result<Option<Menu>> {
    let row = sqlx::query_as::<_, MenuRow>(&format!(
        "SELECT {MENU_COLUMNS} FROM menus WHERE name = $1"
    ))
    .bind(name)
    .fetch_optional(db)
    .await
    .context("find menu by name")?;
    Ok(row.map(Menu::from))
}

pub async fn create_menu(db: &PgPool, m: &NewMenu) -> anyhow::Result<Menu> {
    let t = &m.tags;
    let row = sqlx::query_as::<_, MenuRow>(&format!(
        r#"
        INSERT INTO menus (
            name, calorie, protein, fat, carbohydrate, breakfast, lunch, dinner,
            spicy, high_sugar, high_fat, high_calorie, is_light, is_fried, contain_water,
            has_vegetable, high_sodium, high_protein, high_carbohydrate, high_cholesterol,
            has_chicken, has_pork, has_noodle, high_price
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15,
                $16, $17, $18, $19, $20, $21, $22, $23, $24)
        RETURNING {MENU_COLUMNS}
        "#
    ))
    .bind(&m.name)
    .bind(m.nutrients.calories)
    .bind(m.nutrients.protein)
    .bind(m.nutrients.fat)
    .bind(m.nutrients.carbs)
    .bind(m.meal_times.breakfast)
    .bind(m.meal_times.lunch)
    .bind(m.meal_times.dinner)
    .bind(t.spicy)
    .bind(t.high_sugar)
    .bind(t.high_fat)
    .bind(t.high_calorie)
    .bind(t.is_light)
    .bind(t.is_fried)
    .bind(t.contain_water)
    .bind(t.has_vegetable)
    .bind(t.high_sodium)
    .bind(t.high_protein)
    .bind(t.high_carbohydrate)
    .bind(t.high_cholesterol)
    .bind(t.has_chicken)
    .bind(t.has_pork)
    .bind(t.has_noodle)
    .bind(t.high_price)
    .fetch_one(db)
    .await
    .context("insert menu")?;
    Ok(row.into())
}
