// SPDX-License-Identifier: Apache-2.0

use crate::{fmt_ts, parse_ts, Page, PageAfter, Store, StoreError};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use tiffin_model::{OrderId, PaymentEntry, PaymentId, PaymentKind, UserId, ValidationError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebitOutcome {
    /// New balance after the debit.
    Debited(i64),
    Insufficient { balance_cents: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutPurpose {
    Order,
    Topup,
}

impl CheckoutPurpose {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        match raw {
            "order" => Ok(Self::Order),
            "topup" => Ok(Self::Topup),
            other => Err(ValidationError(format!("unknown checkout purpose: {other}"))),
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Order => "order",
            Self::Topup => "topup",
        }
    }
}

/// Pending card-payment session, completed exactly once by the webhook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSession {
    pub session_id: String,
    pub user_id: UserId,
    pub purpose: CheckoutPurpose,
    pub order_id: Option<OrderId>,
    pub amount_cents: i64,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
}

const PAYMENT_COLS: &str = "id, user_id, kind, amount_cents, order_id, session_id, note, created_at";

fn raw_payment(row: &Row<'_>) -> rusqlite::Result<RawPayment> {
    Ok(RawPayment {
        id: row.get(0)?,
        user_id: row.get(1)?,
        kind: row.get(2)?,
        amount_cents: row.get(3)?,
        order_id: row.get(4)?,
        session_id: row.get(5)?,
        note: row.get(6)?,
        created_at: row.get(7)?,
    })
}

struct RawPayment {
    id: String,
    user_id: String,
    kind: String,
    amount_cents: i64,
    order_id: Option<String>,
    session_id: Option<String>,
    note: Option<String>,
    created_at: String,
}

impl RawPayment {
    fn into_entry(self) -> Result<PaymentEntry, StoreError> {
        Ok(PaymentEntry {
            id: PaymentId::parse(&self.id).map_err(|e| StoreError(format!("payment row: {e}")))?,
            user_id: UserId::parse(&self.user_id)
                .map_err(|e| StoreError(format!("payment row: {e}")))?,
            kind: PaymentKind::parse(&self.kind)
                .map_err(|e| StoreError(format!("payment row: {e}")))?,
            amount_cents: self.amount_cents,
            order_id: match self.order_id {
                Some(raw) => Some(
                    OrderId::parse(&raw).map_err(|e| StoreError(format!("payment row: {e}")))?,
                ),
                None => None,
            },
            session_id: self.session_id,
            note: self.note,
            created_at: parse_ts(&self.created_at)?,
        })
    }
}

pub(crate) fn insert_ledger_row(
    tx: &rusqlite::Transaction<'_>,
    user_id: &UserId,
    kind: PaymentKind,
    amount_cents: i64,
    order_id: Option<&OrderId>,
    session_id: Option<&str>,
    note: Option<&str>,
    now: DateTime<Utc>,
) -> Result<(), StoreError> {
    tx.execute(
        "INSERT INTO payments (id, user_id, kind, amount_cents, order_id, session_id, note, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            PaymentId::fresh().as_str(),
            user_id.as_str(),
            kind.as_str(),
            amount_cents,
            order_id.map(|id| id.as_str().to_string()),
            session_id,
            note,
            fmt_ts(now),
        ],
    )?;
    Ok(())
}

impl Store {
    /// Debits the wallet and appends the ledger row in one transaction.
    /// The balance check and the write ride the same snapshot, so the
    /// balance can never go negative.
    pub async fn wallet_debit(
        &self,
        user_id: &UserId,
        amount_cents: i64,
        kind: PaymentKind,
        order_id: Option<&OrderId>,
        note: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<DebitOutcome, StoreError> {
        debug_assert!(kind.wallet_delta_sign() == -1);
        let mut conn = self.lock().await;
        let tx = conn.transaction()?;

        let balance: Option<i64> = tx
            .query_row(
                "SELECT wallet_balance_cents FROM users WHERE id = ?",
                params![user_id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        let Some(balance) = balance else {
            return Err(StoreError(format!("user {} missing", user_id.as_str())));
        };
        if balance < amount_cents {
            return Ok(DebitOutcome::Insufficient {
                balance_cents: balance,
            });
        }

        tx.execute(
            "UPDATE users SET wallet_balance_cents = wallet_balance_cents - ?, updated_at = ? \
             WHERE id = ?",
            params![amount_cents, fmt_ts(now), user_id.as_str()],
        )?;
        insert_ledger_row(&tx, user_id, kind, amount_cents, order_id, None, note, now)?;
        tx.commit()?;
        Ok(DebitOutcome::Debited(balance - amount_cents))
    }

    /// Credits the wallet and appends the ledger row in one transaction.
    /// Returns the new balance.
    pub async fn wallet_credit(
        &self,
        user_id: &UserId,
        amount_cents: i64,
        kind: PaymentKind,
        order_id: Option<&OrderId>,
        session_id: Option<&str>,
        note: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        debug_assert!(kind.wallet_delta_sign() == 1);
        let mut conn = self.lock().await;
        let tx = conn.transaction()?;

        let rows = tx.execute(
            "UPDATE users SET wallet_balance_cents = wallet_balance_cents + ?, updated_at = ? \
             WHERE id = ?",
            params![amount_cents, fmt_ts(now), user_id.as_str()],
        )?;
        if rows != 1 {
            return Err(StoreError(format!("user {} missing", user_id.as_str())));
        }
        insert_ledger_row(&tx, user_id, kind, amount_cents, order_id, session_id, note, now)?;
        let balance: i64 = tx.query_row(
            "SELECT wallet_balance_cents FROM users WHERE id = ?",
            params![user_id.as_str()],
            |row| row.get(0),
        )?;
        tx.commit()?;
        Ok(balance)
    }

    /// Records a card charge that never touched the wallet.
    pub async fn record_card_payment(
        &self,
        user_id: &UserId,
        amount_cents: i64,
        order_id: Option<&OrderId>,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut conn = self.lock().await;
        let tx = conn.transaction()?;
        insert_ledger_row(
            &tx,
            user_id,
            PaymentKind::CardPayment,
            amount_cents,
            order_id,
            Some(session_id),
            None,
            now,
        )?;
        tx.commit()?;
        Ok(())
    }

    pub async fn ledger_for_user(
        &self,
        user_id: &UserId,
        after: Option<&PageAfter>,
        limit: usize,
    ) -> Result<Page<PaymentEntry>, StoreError> {
        let conn = self.lock().await;
        let mut sql = format!("SELECT {PAYMENT_COLS} FROM payments WHERE user_id = ?");
        let mut bind: Vec<rusqlite::types::Value> = vec![rusqlite::types::Value::Text(
            user_id.as_str().to_string(),
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
            .query_map(rusqlite::params_from_iter(bind.iter()), raw_payment)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        let entries = raws
            .into_iter()
            .map(RawPayment::into_entry)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Page::from_overfetched(entries, limit))
    }

    /// Sum of rewarded referral payouts for one referrer.
    pub async fn referral_reward_total(&self, user_id: &UserId) -> Result<i64, StoreError> {
        let conn = self.lock().await;
        let total: Option<i64> = conn.query_row(
            "SELECT SUM(amount_cents) FROM payments WHERE user_id = ? AND kind = 'referral_reward'",
            params![user_id.as_str()],
            |row| row.get(0),
        )?;
        Ok(total.unwrap_or(0))
    }

    pub async fn ledger_volume_cents(&self) -> Result<i64, StoreError> {
        let conn = self.lock().await;
        let total: Option<i64> = conn.query_row(
            "SELECT SUM(amount_cents) FROM payments",
            [],
            |row| row.get(0),
        )?;
        Ok(total.unwrap_or(0))
    }

    pub async fn insert_checkout_session(
        &self,
        session: &CheckoutSession,
    ) -> Result<(), StoreError> {
        let conn = self.lock().await;
        conn.execute(
            "INSERT INTO checkout_sessions (session_id, user_id, purpose, order_id, amount_cents, \
             completed, created_at) VALUES (?, ?, ?, ?, ?, 0, ?)",
            params![
                session.session_id,
                session.user_id.as_str(),
                session.purpose.as_str(),
                session.order_id.as_ref().map(|id| id.as_str().to_string()),
                session.amount_cents,
                fmt_ts(session.created_at),
            ],
        )?;
        Ok(())
    }

    /// Flips a session to completed exactly once. `None` means the session
    /// is unknown or was already completed, which makes webhook replays
    /// harmless.
    pub async fn complete_checkout_session(
        &self,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<CheckoutSession>, StoreError> {
        let mut conn = self.lock().await;
        let tx = conn.transaction()?;
        let rows = tx.execute(
            "UPDATE checkout_sessions SET completed = 1, completed_at = ? \
             WHERE session_id = ? AND completed = 0",
            params![fmt_ts(now), session_id],
        )?;
        if rows != 1 {
            return Ok(None);
        }
        let session = tx
            .query_row(
                "SELECT session_id, user_id, purpose, order_id, amount_cents, completed, created_at \
                 FROM checkout_sessions WHERE session_id = ?",
                params![session_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, i64>(4)?,
                        row.get::<_, bool>(5)?,
                        row.get::<_, String>(6)?,
                    ))
                },
            )
            .optional()?;
        tx.commit()?;

        let Some((session_id, user_id, purpose, order_id, amount_cents, completed, created_at)) =
            session
        else {
            return Ok(None);
        };
        Ok(Some(CheckoutSession {
            session_id,
            user_id: UserId::parse(&user_id)
                .map_err(|e| StoreError(format!("session row: {e}")))?,
            purpose: CheckoutPurpose::parse(&purpose)
                .map_err(|e| StoreError(format!("session row: {e}")))?,
            order_id: match order_id {
                Some(raw) => Some(
                    OrderId::parse(&raw).map_err(|e| StoreError(format!("session row: {e}")))?,
                ),
                None => None,
            },
            amount_cents,
            completed,
            created_at: parse_ts(&created_at)?,
        }))
    }
}
