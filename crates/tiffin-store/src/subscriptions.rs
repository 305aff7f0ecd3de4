use crate::{fmt_ts, parse_ts, Page, PageAfter, Store, StoreError};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use tiffin_model::{
    parse_service_date, Subscription, SubscriptionId, SubscriptionStatus, UserId,
};

const SUB_COLS: &str = "id, customer_id, restaurant_id, start_date, end_date, days_json, \
                        selections_json, status, meal_count, total_paid_cents, created_at, \
                        updated_at";

struct RawSubscription {
    id: String,
    customer_id: String,
    restaurant_id: String,
    start_date: String,
    end_date: String,
    days_json: String,
    selections_json: String,
    status: String,
    meal_count: i64,
    total_paid_cents: i64,
    created_at: String,
    updated_at: String,
}

fn raw_subscription(row: &Row<'_>) -> rusqlite::Result<RawSubscription> {
    Ok(RawSubscription {
        id: row.get(0)?,
        customer_id: row.get(1)?,
        restaurant_id: row.get(2)?,
        start_date: row.get(3)?,
        end_date: row.get(4)?,
        days_json: row.get(5)?,
        selections_json: row.get(6)?,
        status: row.get(7)?,
        meal_count: row.get(8)?,
        total_paid_cents: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

impl RawSubscription {
    fn into_subscription(self) -> Result<Subscription, StoreError> {
        Ok(Subscription {
            id: SubscriptionId::parse(&self.id)
                .map_err(|e| StoreError(format!("subscription row: {e}")))?,
            customer_id: UserId::parse(&self.customer_id)
                .map_err(|e| StoreError(format!("subscription row: {e}")))?,
            restaurant_id: UserId::parse(&self.restaurant_id)
                .map_err(|e| StoreError(format!("subscription row: {e}")))?,
            start_date: parse_service_date(&self.start_date)
                .map_err(|e| StoreError(format!("subscription row: {e}")))?,
            end_date: parse_service_date(&self.end_date)
                .map_err(|e| StoreError(format!("subscription row: {e}")))?,
            days: serde_json::from_str(&self.days_json)?,
            selections: serde_json::from_str(&self.selections_json)?,
            status: SubscriptionStatus::parse(&self.status)
                .map_err(|e| StoreError(format!("subscription row: {e}")))?,
            meal_count: self.meal_count.max(0) as u64,
            total_paid_cents: self.total_paid_cents,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
        })
    }
}

impl Store {
    pub async fn insert_subscription(&self, sub: &Subscription) -> Result<(), StoreError> {
        let conn = self.lock().await;
        conn.execute(
            "INSERT INTO subscriptions (id, customer_id, restaurant_id, start_date, end_date, \
             days_json, selections_json, status, meal_count, total_paid_cents, created_at, \
             updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                sub.id.as_str(),
                sub.customer_id.as_str(),
                sub.restaurant_id.as_str(),
                sub.start_date.format("%Y-%m-%d").to_string(),
                sub.end_date.format("%Y-%m-%d").to_string(),
                serde_json::to_string(&sub.days)?,
                serde_json::to_string(&sub.selections)?,
                sub.status.as_str(),
                sub.meal_count as i64,
                sub.total_paid_cents,
                fmt_ts(sub.created_at),
                fmt_ts(sub.updated_at),
            ],
        )?;
        Ok(())
    }

    pub async fn subscription_by_id(
        &self,
        id: &SubscriptionId,
    ) -> Result<Option<Subscription>, StoreError> {
        let conn = self.lock().await;
        let raw = conn
            .query_row(
                &format!("SELECT {SUB_COLS} FROM subscriptions WHERE id = ?"),
                params![id.as_str()],
                raw_subscription,
            )
            .optional()?;
        raw.map(RawSubscription::into_subscription).transpose()
    }

    pub async fn list_subscriptions_for_customer(
        &self,
        customer_id: &UserId,
        after: Option<&PageAfter>,
        limit: usize,
    ) -> Result<Page<Subscription>, StoreError> {
        let conn = self.lock().await;
        let mut sql = format!("SELECT {SUB_COLS} FROM subscriptions WHERE customer_id = ?");
        let mut bind: Vec<rusqlite::types::Value> = vec![rusqlite::types::Value::Text(
            customer_id.as_str().to_string(),
        )];
        if let Some(after) = after {
            sql.push_str(" AND (created_at, id) < (?, ?)");
            bind.push(rusqlite::types::Value::Text(after.created_at.clone()));
            bind.push(rusqlite::types::Value::Text(after.id.clone()));
        }
        sql.push_str(" ORDER BY created_at DESC, id DESC LIMIT ?");
        bind.push(rusqlite::types::Value::Integer((limit + 1) as i64));

        let mut stmt = conn.prepare(&sql)?;
        let raws = stmt
            .query_map(rusqlite::params_from_iter(bind.iter()), raw_subscription)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        let subs = raws
            .into_iter()
            .map(RawSubscription::into_subscription)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Page::from_overfetched(subs, limit))
    }

    /// Moves a plan `from -> to` only if it is still in `from`.
    pub async fn update_subscription_status(
        &self,
        id: &SubscriptionId,
        from: SubscriptionStatus,
        to: SubscriptionStatus,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let conn = self.lock().await;
        let rows = conn.execute(
            "UPDATE subscriptions SET status = ?, updated_at = ? WHERE id = ? AND status = ?",
            params![to.as_str(), fmt_ts(now), id.as_str(), from.as_str()],
        )?;
        Ok(rows == 1)
    }

    pub async fn count_active_subscriptions(&self) -> Result<u64, StoreError> {
        let conn = self.lock().await;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM subscriptions WHERE status = 'active'",
            [],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }
}
