// SPDX-License-Identifier: Apache-2.0

use crate::{fmt_ts, parse_ts, Page, PageAfter, Store, StoreError};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row, Transaction};
use tiffin_model::{OrderId, RestaurantProfile, Review, ReviewId, UserId};

#[derive(Debug, Clone, PartialEq)]
pub enum InsertReviewOutcome {
    Inserted,
    DuplicateOrder,
}

const REVIEW_COLS: &str =
    "id, order_id, customer_id, restaurant_id, rating, comment, created_at";

struct RawReview {
    id: String,
    order_id: String,
    customer_id: String,
    restaurant_id: String,
    rating: i64,
    comment: String,
    created_at: String,
}

fn raw_review(row: &Row<'_>) -> rusqlite::Result<RawReview> {
    Ok(RawReview {
        id: row.get(0)?,
        order_id: row.get(1)?,
        customer_id: row.get(2)?,
        restaurant_id: row.get(3)?,
        rating: row.get(4)?,
        comment: row.get(5)?,
        created_at: row.get(6)?,
    })
}

impl RawReview {
    fn into_review(self) -> Result<Review, StoreError> {
        let rating = u8::try_from(self.rating)
            .map_err(|_| StoreError(format!("review row: rating {} out of range", self.rating)))?;
        Ok(Review {
            id: ReviewId::parse(&self.id).map_err(|e| StoreError(format!("review row: {e}")))?,
            order_id: OrderId::parse(&self.order_id)
                .map_err(|e| StoreError(format!("review row: {e}")))?,
            customer_id: UserId::parse(&self.customer_id)
                .map_err(|e| StoreError(format!("review row: {e}")))?,
            restaurant_id: UserId::parse(&self.restaurant_id)
                .map_err(|e| StoreError(format!("review row: {e}")))?,
            rating,
            comment: self.comment,
            created_at: parse_ts(&self.created_at)?,
        })
    }
}

/// Applies a rating delta to the restaurant's denormalized profile counters
/// inside the caller's transaction.
fn adjust_rating(
    tx: &Transaction<'_>,
    restaurant_id: &UserId,
    rating: u8,
    remove: bool,
    now: DateTime<Utc>,
) -> Result<(), StoreError> {
    let profile_json: Option<String> = tx
        .query_row(
            "SELECT restaurant_profile_json FROM users WHERE id = ?",
            params![restaurant_id.as_str()],
            |row| row.get(0),
        )
        .optional()?
        .flatten();
    let Some(profile_json) = profile_json else {
        // Restaurant rows carry a profile from registration on; a missing
        // one means the review targets a non-restaurant and is a bug
        // upstream, not a reason to lose the review row.
        return Ok(());
    };
    let mut profile: RestaurantProfile = serde_json::from_str(&profile_json)?;
    if remove {
        profile.rating_sum = profile.rating_sum.saturating_sub(u64::from(rating));
        profile.rating_count = profile.rating_count.saturating_sub(1);
    } else {
        profile.rating_sum += u64::from(rating);
        profile.rating_count += 1;
    }
    tx.execute(
        "UPDATE users SET restaurant_profile_json = ?, updated_at = ? WHERE id = ?",
        params![
            serde_json::to_string(&profile)?,
            fmt_ts(now),
            restaurant_id.as_str(),
        ],
    )?;
    Ok(())
}

impl Store {
    /// Inserts the review and folds the rating into the restaurant's
    /// denormalized counters in one transaction. One review per order.
    pub async fn insert_review(&self, review: &Review) -> Result<InsertReviewOutcome, StoreError> {
        let mut conn = self.lock().await;
        let tx = conn.transaction()?;

        let taken: Option<i64> = tx
            .query_row(
                "SELECT 1 FROM reviews WHERE order_id = ?",
                params![review.order_id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        if taken.is_some() {
            return Ok(InsertReviewOutcome::DuplicateOrder);
        }

        tx.execute(
            "INSERT INTO reviews (id, order_id, customer_id, restaurant_id, rating, comment, \
             created_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                review.id.as_str(),
                review.order_id.as_str(),
                review.customer_id.as_str(),
                review.restaurant_id.as_str(),
                i64::from(review.rating),
                review.comment,
                fmt_ts(review.created_at),
            ],
        )?;
        adjust_rating(&tx, &review.restaurant_id, review.rating, false, review.created_at)?;
        tx.commit()?;
        Ok(InsertReviewOutcome::Inserted)
    }

    pub async fn reviews_for_restaurant(
        &self,
        restaurant_id: &UserId,
        after: Option<&PageAfter>,
        limit: usize,
    ) -> Result<Page<Review>, StoreError> {
        let conn = self.lock().await;
        let mut sql = format!("SELECT {REVIEW_COLS} FROM reviews WHERE restaurant_id = ?");
        let mut bind: Vec<rusqlite::types::Value> = vec![rusqlite::types::Value::Text(
            restaurant_id.as_str().to_string(),
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
            .query_map(rusqlite::params_from_iter(bind.iter()), raw_review)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        let reviews = raws
            .into_iter()
            .map(RawReview::into_review)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Page::from_overfetched(reviews, limit))
    }

    /// Removes a review and backs its rating out of the restaurant's
    /// counters. Returns the removed review.
    pub async fn delete_review(
        &self,
        id: &ReviewId,
        now: DateTime<Utc>,
    ) -> Result<Option<Review>, StoreError> {
        let mut conn = self.lock().await;
        let tx = conn.transaction()?;
        let raw = tx
            .query_row(
                &format!("SELECT {REVIEW_COLS} FROM reviews WHERE id = ?"),
                params![id.as_str()],
                raw_review,
            )
            .optional()?;
        let Some(raw) = raw else {
            return Ok(None);
        };
        let review = raw.into_review()?;
        tx.execute("DELETE FROM reviews WHERE id = ?", params![id.as_str()])?;
        adjust_rating(&tx, &review.restaurant_id, review.rating, true, now)?;
        tx.commit()?;
        Ok(Some(review))
    }
}
