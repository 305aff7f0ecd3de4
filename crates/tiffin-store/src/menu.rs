use crate::{fmt_ts, parse_ts, Store, StoreError};
use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension, Row};
use tiffin_model::{parse_service_date, MealType, MenuItem, MenuItemId, UserId};

const MENU_COLS: &str = "id, restaurant_id, name, description, price_cents, service_date, \
                         meal_type, image_url, tags_json, active, created_at, updated_at";

struct RawMenuItem {
    id: String,
    restaurant_id: String,
    name: String,
    description: String,
    price_cents: i64,
    service_date: String,
    meal_type: String,
    image_url: Option<String>,
    tags_json: String,
    active: bool,
    created_at: String,
    updated_at: String,
}

fn raw_menu_item(row: &Row<'_>) -> rusqlite::Result<RawMenuItem> {
    Ok(RawMenuItem {
        id: row.get(0)?,
        restaurant_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        price_cents: row.get(4)?,
        service_date: row.get(5)?,
        meal_type: row.get(6)?,
        image_url: row.get(7)?,
        tags_json: row.get(8)?,
        active: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

impl RawMenuItem {
    fn into_item(self) -> Result<MenuItem, StoreError> {
        Ok(MenuItem {
            id: MenuItemId::parse(&self.id).map_err(|e| StoreError(format!("menu row: {e}")))?,
            restaurant_id: UserId::parse(&self.restaurant_id)
                .map_err(|e| StoreError(format!("menu row: {e}")))?,
            name: self.name,
            description: self.description,
            price_cents: self.price_cents,
            service_date: parse_service_date(&self.service_date)
                .map_err(|e| StoreError(format!("menu row: {e}")))?,
            meal_type: MealType::parse(&self.meal_type)
                .map_err(|e| StoreError(format!("menu row: {e}")))?,
            image_url: self.image_url,
            tags: serde_json::from_str(&self.tags_json)?,
            active: self.active,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
        })
    }
}

impl Store {
    pub async fn insert_menu_item(&self, item: &MenuItem) -> Result<(), StoreError> {
        let conn = self.lock().await;
        conn.execute(
            "INSERT INTO menu_items (id, restaurant_id, name, description, price_cents, \
             service_date, meal_type, image_url, tags_json, active, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                item.id.as_str(),
                item.restaurant_id.as_str(),
                item.name,
                item.description,
                item.price_cents,
                item.service_date.format("%Y-%m-%d").to_string(),
                item.meal_type.as_str(),
                item.image_url,
                serde_json::to_string(&item.tags)?,
                item.active,
                fmt_ts(item.created_at),
                fmt_ts(item.updated_at),
            ],
        )?;
        Ok(())
    }

    pub async fn menu_item_by_id(&self, id: &MenuItemId) -> Result<Option<MenuItem>, StoreError> {
        let conn = self.lock().await;
        let raw = conn
            .query_row(
                &format!("SELECT {MENU_COLS} FROM menu_items WHERE id = ?"),
                params![id.as_str()],
                raw_menu_item,
            )
            .optional()?;
        raw.map(RawMenuItem::into_item).transpose()
    }

    /// Full-row update; the handler merges the patch before calling.
    pub async fn update_menu_item(&self, item: &MenuItem) -> Result<bool, StoreError> {
        let conn = self.lock().await;
        let rows = conn.execute(
            "UPDATE menu_items SET name = ?, description = ?, price_cents = ?, service_date = ?, \
             meal_type = ?, image_url = ?, tags_json = ?, active = ?, updated_at = ? WHERE id = ?",
            params![
                item.name,
                item.description,
                item.price_cents,
                item.service_date.format("%Y-%m-%d").to_string(),
                item.meal_type.as_str(),
                item.image_url,
                serde_json::to_string(&item.tags)?,
                item.active,
                fmt_ts(item.updated_at),
                item.id.as_str(),
            ],
        )?;
        Ok(rows == 1)
    }

    /// Removes the row. Orders keep their own snapshots, so nothing else
    /// references the item.
    pub async fn delete_menu_item(&self, id: &MenuItemId) -> Result<bool, StoreError> {
        let conn = self.lock().await;
        let rows = conn.execute("DELETE FROM menu_items WHERE id = ?", params![id.as_str()])?;
        Ok(rows == 1)
    }

    /// Active items for one restaurant and service date, optionally narrowed
    /// to a meal type. The scope is one day of one menu, so no cursor.
    pub async fn list_menu(
        &self,
        restaurant_id: &UserId,
        date: NaiveDate,
        meal_type: Option<MealType>,
    ) -> Result<Vec<MenuItem>, StoreError> {
        let conn = self.lock().await;
        let mut sql = format!(
            "SELECT {MENU_COLS} FROM menu_items \
             WHERE restaurant_id = ? AND service_date = ? AND active = 1"
        );
        let mut bind: Vec<rusqlite::types::Value> = vec![
            rusqlite::types::Value::Text(restaurant_id.as_str().to_string()),
            rusqlite::types::Value::Text(date.format("%Y-%m-%d").to_string()),
        ];
        if let Some(meal_type) = meal_type {
            sql.push_str(" AND meal_type = ?");
            bind.push(rusqlite::types::Value::Text(meal_type.as_str().to_string()));
        }
        sql.push_str(" ORDER BY meal_type ASC, name ASC");

        let mut stmt = conn.prepare(&sql)?;
        let raws = stmt
            .query_map(rusqlite::params_from_iter(bind.iter()), raw_menu_item)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        raws.into_iter().map(RawMenuItem::into_item).collect()
    }

    /// Fetches the rows for an order's line items in one query. Missing ids
    /// are simply absent from the result; the caller compares lengths.
    pub async fn menu_items_by_ids(
        &self,
        ids: &[MenuItemId],
    ) -> Result<Vec<MenuItem>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.lock().await;
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!("SELECT {MENU_COLS} FROM menu_items WHERE id IN ({placeholders})");
        let bind: Vec<rusqlite::types::Value> = ids
            .iter()
            .map(|id| rusqlite::types::Value::Text(id.as_str().to_string()))
            .collect();

        let mut stmt = conn.prepare(&sql)?;
        let raws = stmt
            .query_map(rusqlite::params_from_iter(bind.iter()), raw_menu_item)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        raws.into_iter().map(RawMenuItem::into_item).collect()
    }
}
