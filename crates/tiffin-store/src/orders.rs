// SPDX-License-Identifier: Apache-2.0

use crate::payments::insert_ledger_row;
use crate::{fmt_ts, parse_ts, Page, PageAfter, Store, StoreError};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use tiffin_model::{Order, OrderId, OrderStatus, PaymentKind, PaymentMethod, SubscriptionId, UserId};

const ORDER_COLS: &str = "id, customer_id, restaurant_id, lines_json, subtotal_cents, \
                          delivery_fee_cents, total_cents, status, payment_method, \
                          delivery_address_json, deliver_at, subscription_id, created_at, \
                          updated_at";

struct RawOrder {
    id: String,
    customer_id: String,
    restaurant_id: String,
    lines_json: String,
    subtotal_cents: i64,
    delivery_fee_cents: i64,
    total_cents: i64,
    status: String,
    payment_method: String,
    delivery_address_json: String,
    deliver_at: String,
    subscription_id: Option<String>,
    created_at: String,
    updated_at: String,
}

fn raw_order(row: &Row<'_>) -> rusqlite::Result<RawOrder> {
    Ok(RawOrder {
        id: row.get(0)?,
        customer_id: row.get(1)?,
        restaurant_id: row.get(2)?,
        lines_json: row.get(3)?,
        subtotal_cents: row.get(4)?,
        delivery_fee_cents: row.get(5)?,
        total_cents: row.get(6)?,
        status: row.get(7)?,
        payment_method: row.get(8)?,
        delivery_address_json: row.get(9)?,
        deliver_at: row.get(10)?,
        subscription_id: row.get(11)?,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
    })
}

impl RawOrder {
    fn into_order(self) -> Result<Order, StoreError> {
        Ok(Order {
            id: OrderId::parse(&self.id).map_err(|e| StoreError(format!("order row: {e}")))?,
            customer_id: UserId::parse(&self.customer_id)
                .map_err(|e| StoreError(format!("order row: {e}")))?,
            restaurant_id: UserId::parse(&self.restaurant_id)
                .map_err(|e| StoreError(format!("order row: {e}")))?,
            lines: serde_json::from_str(&self.lines_json)?,
            subtotal_cents: self.subtotal_cents,
            delivery_fee_cents: self.delivery_fee_cents,
            total_cents: self.total_cents,
            status: OrderStatus::parse(&self.status)
                .map_err(|e| StoreError(format!("order row: {e}")))?,
            payment_method: PaymentMethod::parse(&self.payment_method)
                .map_err(|e| StoreError(format!("order row: {e}")))?,
            delivery_address: serde_json::from_str(&self.delivery_address_json)?,
            deliver_at: parse_ts(&self.deliver_at)?,
            subscription_id: match self.subscription_id {
                Some(raw) => Some(
                    SubscriptionId::parse(&raw)
                        .map_err(|e| StoreError(format!("order row: {e}")))?,
                ),
                None => None,
            },
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
        })
    }
}

/// Who a listing is scoped to. Admin listings pass `All`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderOwner {
    Customer(UserId),
    Restaurant(UserId),
    All,
}

impl Store {
    pub async fn insert_order(&self, order: &Order) -> Result<(), StoreError> {
        let conn = self.lock().await;
        insert_order_row(&conn, order)?;
        Ok(())
    }

    pub async fn order_by_id(&self, id: &OrderId) -> Result<Option<Order>, StoreError> {
        let conn = self.lock().await;
        let raw = conn
            .query_row(
                &format!("SELECT {ORDER_COLS} FROM orders WHERE id = ?"),
                params![id.as_str()],
                raw_order,
            )
            .optional()?;
        raw.map(RawOrder::into_order).transpose()
    }

    /// Moves an order `from -> to` only if it is still in `from`. A `false`
    /// return means someone else changed it first; callers re-read and
    /// report a conflict.
    pub async fn update_order_status(
        &self,
        id: &OrderId,
        from: OrderStatus,
        to: OrderStatus,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let conn = self.lock().await;
        let rows = conn.execute(
            "UPDATE orders SET status = ?, updated_at = ? WHERE id = ? AND status = ?",
            params![to.as_str(), fmt_ts(now), id.as_str(), from.as_str()],
        )?;
        Ok(rows == 1)
    }

    pub async fn list_orders(
        &self,
        owner: &OrderOwner,
        status: Option<OrderStatus>,
        after: Option<&PageAfter>,
        limit: usize,
    ) -> Result<Page<Order>, StoreError> {
        let conn = self.lock().await;
        let mut where_parts: Vec<&str> = Vec::new();
        let mut bind: Vec<rusqlite::types::Value> = Vec::new();
        match owner {
            OrderOwner::Customer(id) => {
                where_parts.push("customer_id = ?");
                bind.push(rusqlite::types::Value::Text(id.as_str().to_string()));
            }
            OrderOwner::Restaurant(id) => {
                where_parts.push("restaurant_id = ?");
                bind.push(rusqlite::types::Value::Text(id.as_str().to_string()));
            }
            OrderOwner::All => {}
        }
        if let Some(status) = status {
            where_parts.push("status = ?");
            bind.push(rusqlite::types::Value::Text(status.as_str().to_string()));
        }
        if let Some(after) = after {
            where_parts.push("(created_at, id) < (?, ?)");
            bind.push(rusqlite::types::Value::Text(after.created_at.clone()));
            bind.push(rusqlite::types::Value::Text(after.id.clone()));
        }

        let mut sql = format!("SELECT {ORDER_COLS} FROM orders");
        if !where_parts.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&where_parts.join(" AND "));
        }
        sql.push_str(" ORDER BY created_at DESC, id DESC LIMIT ?");
        bind.push(rusqlite::types::Value::Integer((limit + 1) as i64));

        let mut stmt = conn.prepare(&sql)?;
        let raws = stmt
            .query_map(rusqlite::params_from_iter(bind.iter()), raw_order)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        let orders = raws
            .into_iter()
            .map(RawOrder::into_order)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Page::from_overfetched(orders, limit))
    }

    /// Every order generated for a subscription, soonest slot first.
    pub async fn orders_for_subscription(
        &self,
        subscription_id: &SubscriptionId,
    ) -> Result<Vec<Order>, StoreError> {
        let conn = self.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {ORDER_COLS} FROM orders WHERE subscription_id = ? \
             ORDER BY deliver_at ASC, id ASC"
        ))?;
        let raws = stmt
            .query_map(params![subscription_id.as_str()], raw_order)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        raws.into_iter().map(RawOrder::into_order).collect()
    }

    /// Inserts the subscription's pre-generated orders and debits their
    /// total from the wallet in one transaction. The caller has already
    /// verified the balance covers the total; the in-transaction check
    /// guards against a concurrent spend.
    pub async fn insert_subscription_orders(
        &self,
        customer_id: &UserId,
        orders: &[Order],
        total_cents: i64,
        now: DateTime<Utc>,
    ) -> Result<crate::DebitOutcome, StoreError> {
        let mut conn = self.lock().await;
        let tx = conn.transaction()?;

        let balance: i64 = tx.query_row(
            "SELECT wallet_balance_cents FROM users WHERE id = ?",
            params![customer_id.as_str()],
            |row| row.get(0),
        )?;
        if balance < total_cents {
            return Ok(crate::DebitOutcome::Insufficient {
                balance_cents: balance,
            });
        }
        tx.execute(
            "UPDATE users SET wallet_balance_cents = wallet_balance_cents - ?, updated_at = ? \
             WHERE id = ?",
            params![total_cents, fmt_ts(now), customer_id.as_str()],
        )?;
        for order in orders {
            insert_order_row(&tx, order)?;
        }
        let note = orders
            .iter()
            .find_map(|o| o.subscription_id.as_ref())
            .map(|id| format!("subscription {}", id.as_str()));
        insert_ledger_row(
            &tx,
            customer_id,
            PaymentKind::SubscriptionDebit,
            total_cents,
            None,
            None,
            note.as_deref(),
            now,
        )?;
        tx.commit()?;
        Ok(crate::DebitOutcome::Debited(balance - total_cents))
    }

    pub async fn count_orders_by_status(&self) -> Result<Vec<(OrderStatus, u64)>, StoreError> {
        let conn = self.lock().await;
        let mut stmt =
            conn.prepare("SELECT status, COUNT(*) FROM orders GROUP BY status ORDER BY status")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter()
            .map(|(status, count)| {
                let status = OrderStatus::parse(&status)
                    .map_err(|e| StoreError(format!("order row: {e}")))?;
                Ok((status, count.max(0) as u64))
            })
            .collect()
    }

    /// Gross revenue across delivered orders.
    pub async fn delivered_revenue_cents(&self) -> Result<i64, StoreError> {
        let conn = self.lock().await;
        let total: Option<i64> = conn.query_row(
            "SELECT SUM(total_cents) FROM orders WHERE status = 'delivered'",
            [],
            |row| row.get(0),
        )?;
        Ok(total.unwrap_or(0))
    }
}

fn insert_order_row(conn: &rusqlite::Connection, order: &Order) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO orders (id, customer_id, restaurant_id, lines_json, subtotal_cents, \
         delivery_fee_cents, total_cents, status, payment_method, delivery_address_json, \
         deliver_at, subscription_id, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            order.id.as_str(),
            order.customer_id.as_str(),
            order.restaurant_id.as_str(),
            serde_json::to_string(&order.lines)?,
            order.subtotal_cents,
            order.delivery_fee_cents,
            order.total_cents,
            order.status.as_str(),
            order.payment_method.as_str(),
            serde_json::to_string(&order.delivery_address)?,
            fmt_ts(order.deliver_at),
            order.subscription_id.as_ref().map(|id| id.as_str().to_string()),
            fmt_ts(order.created_at),
            fmt_ts(order.updated_at),
        ],
    )?;
    Ok(())
}
