// SPDX-License-Identifier: Apache-2.0

use crate::{fmt_ts, parse_ts, Store, StoreError};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use tiffin_model::{Delivery, DeliveryId, DeliveryStatus, GeoPoint, OrderId, UserId};

/// Result of a claim attempt. Exactly one caller per offer sees `Claimed`.
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimOutcome {
    Claimed(Delivery),
    AlreadyClaimed,
    NotFound,
}

const DELIVERY_COLS: &str = "id, order_id, customer_id, staff_id, status, pickup_address_json, \
                             dropoff_address_json, last_lat, last_lng, claimed_at, delivered_at, \
                             created_at, updated_at";

struct RawDelivery {
    id: String,
    order_id: String,
    customer_id: String,
    staff_id: Option<String>,
    status: String,
    pickup_address_json: String,
    dropoff_address_json: String,
    last_lat: Option<f64>,
    last_lng: Option<f64>,
    claimed_at: Option<String>,
    delivered_at: Option<String>,
    created_at: String,
    updated_at: String,
}

fn raw_delivery(row: &Row<'_>) -> rusqlite::Result<RawDelivery> {
    Ok(RawDelivery {
        id: row.get(0)?,
        order_id: row.get(1)?,
        customer_id: row.get(2)?,
        staff_id: row.get(3)?,
        status: row.get(4)?,
        pickup_address_json: row.get(5)?,
        dropoff_address_json: row.get(6)?,
        last_lat: row.get(7)?,
        last_lng: row.get(8)?,
        claimed_at: row.get(9)?,
        delivered_at: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

impl RawDelivery {
    fn into_delivery(self) -> Result<Delivery, StoreError> {
        let last_position = match (self.last_lat, self.last_lng) {
            (Some(lat), Some(lng)) => Some(
                GeoPoint::new(lat, lng).map_err(|e| StoreError(format!("delivery row: {e}")))?,
            ),
            _ => None,
        };
        Ok(Delivery {
            id: DeliveryId::parse(&self.id)
                .map_err(|e| StoreError(format!("delivery row: {e}")))?,
            order_id: OrderId::parse(&self.order_id)
                .map_err(|e| StoreError(format!("delivery row: {e}")))?,
            customer_id: UserId::parse(&self.customer_id)
                .map_err(|e| StoreError(format!("delivery row: {e}")))?,
            staff_id: match self.staff_id {
                Some(raw) => Some(
                    UserId::parse(&raw).map_err(|e| StoreError(format!("delivery row: {e}")))?,
                ),
                None => None,
            },
            status: DeliveryStatus::parse(&self.status)
                .map_err(|e| StoreError(format!("delivery row: {e}")))?,
            pickup_address: serde_json::from_str(&self.pickup_address_json)?,
            dropoff_address: serde_json::from_str(&self.dropoff_address_json)?,
            last_position,
            claimed_at: self.claimed_at.as_deref().map(parse_ts).transpose()?,
            delivered_at: self.delivered_at.as_deref().map(parse_ts).transpose()?,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
        })
    }
}

impl Store {
    pub async fn insert_delivery(&self, delivery: &Delivery) -> Result<(), StoreError> {
        let conn = self.lock().await;
        conn.execute(
            "INSERT INTO deliveries (id, order_id, customer_id, staff_id, status, \
             pickup_address_json, dropoff_address_json, last_lat, last_lng, claimed_at, \
             delivered_at, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                delivery.id.as_str(),
                delivery.order_id.as_str(),
                delivery.customer_id.as_str(),
                delivery.staff_id.as_ref().map(|id| id.as_str().to_string()),
                delivery.status.as_str(),
                serde_json::to_string(&delivery.pickup_address)?,
                serde_json::to_string(&delivery.dropoff_address)?,
                delivery.last_position.as_ref().map(|p| p.lat),
                delivery.last_position.as_ref().map(|p| p.lng),
                delivery.claimed_at.map(fmt_ts),
                delivery.delivered_at.map(fmt_ts),
                fmt_ts(delivery.created_at),
                fmt_ts(delivery.updated_at),
            ],
        )?;
        Ok(())
    }

    pub async fn delivery_by_id(&self, id: &DeliveryId) -> Result<Option<Delivery>, StoreError> {
        let conn = self.lock().await;
        let raw = conn
            .query_row(
                &format!("SELECT {DELIVERY_COLS} FROM deliveries WHERE id = ?"),
                params![id.as_str()],
                raw_delivery,
            )
            .optional()?;
        raw.map(RawDelivery::into_delivery).transpose()
    }

    pub async fn delivery_by_order(
        &self,
        order_id: &OrderId,
    ) -> Result<Option<Delivery>, StoreError> {
        let conn = self.lock().await;
        let raw = conn
            .query_row(
                &format!("SELECT {DELIVERY_COLS} FROM deliveries WHERE order_id = ?"),
                params![order_id.as_str()],
                raw_delivery,
            )
            .optional()?;
        raw.map(RawDelivery::into_delivery).transpose()
    }

    /// Open offers, oldest first so the queue drains fairly.
    pub async fn list_offers(&self, limit: usize) -> Result<Vec<Delivery>, StoreError> {
        let conn = self.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {DELIVERY_COLS} FROM deliveries WHERE status = 'unassigned' \
             ORDER BY created_at ASC, id ASC LIMIT ?"
        ))?;
        let raws = stmt
            .query_map(params![limit as i64], raw_delivery)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        raws.into_iter().map(RawDelivery::into_delivery).collect()
    }

    /// Claims an offer with a single conditional update. The `status =
    /// 'unassigned'` guard is the whole race: of two concurrent claims one
    /// update matches a row and the other matches nothing.
    pub async fn claim_delivery(
        &self,
        id: &DeliveryId,
        staff_id: &UserId,
        now: DateTime<Utc>,
    ) -> Result<ClaimOutcome, StoreError> {
        let conn = self.lock().await;
        let rows = conn.execute(
            "UPDATE deliveries SET status = 'claimed', staff_id = ?, claimed_at = ?, \
             updated_at = ? WHERE id = ? AND status = 'unassigned'",
            params![staff_id.as_str(), fmt_ts(now), fmt_ts(now), id.as_str()],
        )?;
        if rows == 1 {
            let raw = conn
                .query_row(
                    &format!("SELECT {DELIVERY_COLS} FROM deliveries WHERE id = ?"),
                    params![id.as_str()],
                    raw_delivery,
                )
                .optional()?;
            let Some(raw) = raw else {
                return Err(StoreError(format!("delivery {} vanished", id.as_str())));
            };
            return Ok(ClaimOutcome::Claimed(raw.into_delivery()?));
        }
        let exists: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM deliveries WHERE id = ?",
                params![id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(if exists.is_some() {
            ClaimOutcome::AlreadyClaimed
        } else {
            ClaimOutcome::NotFound
        })
    }

    /// Moves a delivery `from -> to` only if it is still in `from` and still
    /// assigned to `staff_id`. `delivered` stamps `delivered_at`.
    pub async fn update_delivery_status(
        &self,
        id: &DeliveryId,
        staff_id: &UserId,
        from: DeliveryStatus,
        to: DeliveryStatus,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let conn = self.lock().await;
        let rows = if to == DeliveryStatus::Delivered {
            conn.execute(
                "UPDATE deliveries SET status = ?, delivered_at = ?, updated_at = ? \
                 WHERE id = ? AND status = ? AND staff_id = ?",
                params![
                    to.as_str(),
                    fmt_ts(now),
                    fmt_ts(now),
                    id.as_str(),
                    from.as_str(),
                    staff_id.as_str(),
                ],
            )?
        } else {
            conn.execute(
                "UPDATE deliveries SET status = ?, updated_at = ? \
                 WHERE id = ? AND status = ? AND staff_id = ?",
                params![
                    to.as_str(),
                    fmt_ts(now),
                    id.as_str(),
                    from.as_str(),
                    staff_id.as_str(),
                ],
            )?
        };
        Ok(rows == 1)
    }

    pub async fn update_delivery_position(
        &self,
        id: &DeliveryId,
        staff_id: &UserId,
        position: GeoPoint,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let conn = self.lock().await;
        let rows = conn.execute(
            "UPDATE deliveries SET last_lat = ?, last_lng = ?, updated_at = ? \
             WHERE id = ? AND staff_id = ?",
            params![position.lat, position.lng, fmt_ts(now), id.as_str(), staff_id.as_str()],
        )?;
        Ok(rows == 1)
    }
}
