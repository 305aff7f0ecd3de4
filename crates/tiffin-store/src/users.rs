// SPDX-License-Identifier: Apache-2.0

use crate::{fmt_ts, parse_ts, Page, PageAfter, Store, StoreError};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use tiffin_model::{Address, RestaurantProfile, Role, User, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertUserOutcome {
    Inserted,
    DuplicateEmail,
    ReferralCodeTaken,
}

pub(crate) const USER_COLS: &str = "id, role, name, email, password_hash, password_salt, phone, \
     wallet_balance_cents, address_json, referral_code, referred_by, approved, available, \
     delivered_order_count, restaurant_profile_json, created_at, updated_at";

pub(crate) struct RawUser {
    id: String,
    role: String,
    name: String,
    email: String,
    password_hash: String,
    password_salt: String,
    phone: Option<String>,
    wallet_balance_cents: i64,
    address_json: Option<String>,
    referral_code: String,
    referred_by: Option<String>,
    approved: bool,
    available: bool,
    delivered_order_count: i64,
    restaurant_profile_json: Option<String>,
    created_at: String,
    updated_at: String,
}

pub(crate) fn raw_user(row: &Row<'_>) -> rusqlite::Result<RawUser> {
    Ok(RawUser {
        id: row.get(0)?,
        role: row.get(1)?,
        name: row.get(2)?,
        email: row.get(3)?,
        password_hash: row.get(4)?,
        password_salt: row.get(5)?,
        phone: row.get(6)?,
        wallet_balance_cents: row.get(7)?,
        address_json: row.get(8)?,
        referral_code: row.get(9)?,
        referred_by: row.get(10)?,
        approved: row.get(11)?,
        available: row.get(12)?,
        delivered_order_count: row.get(13)?,
        restaurant_profile_json: row.get(14)?,
        created_at: row.get(15)?,
        updated_at: row.get(16)?,
    })
}

impl RawUser {
    pub(crate) fn into_user(self) -> Result<User, StoreError> {
        let address: Option<Address> = match self.address_json {
            Some(raw) => Some(serde_json::from_str(&raw)?),
            None => None,
        };
        let restaurant_profile: Option<RestaurantProfile> = match self.restaurant_profile_json {
            Some(raw) => Some(serde_json::from_str(&raw)?),
            None => None,
        };
        Ok(User {
            id: UserId::parse(&self.id).map_err(|e| StoreError(format!("user row: {e}")))?,
            role: Role::parse(&self.role).map_err(|e| StoreError(format!("user row: {e}")))?,
            name: self.name,
            email: self.email,
            password_hash: self.password_hash,
            password_salt: self.password_salt,
            phone: self.phone,
            wallet_balance_cents: self.wallet_balance_cents,
            address,
            referral_code: self.referral_code,
            referred_by: match self.referred_by {
                Some(raw) => {
                    Some(UserId::parse(&raw).map_err(|e| StoreError(format!("user row: {e}")))?)
                }
                None => None,
            },
            approved: self.approved,
            available: self.available,
            delivered_order_count: u64::try_from(self.delivered_order_count).unwrap_or(0),
            restaurant_profile,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
        })
    }
}

pub(crate) fn to_json<T: serde::Serialize>(value: &Option<T>) -> Result<Option<String>, StoreError> {
    match value {
        Some(v) => Ok(Some(serde_json::to_string(v)?)),
        None => Ok(None),
    }
}

/// Escapes `%`, `_` and the escape char itself for LIKE patterns,
/// paired with `ESCAPE '!'` in the query.
pub(crate) fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c == '%' || c == '_' || c == '!' {
            out.push('!');
        }
        out.push(c);
    }
    out
}

impl Store {
    pub async fn insert_user(&self, user: &User) -> Result<InsertUserOutcome, StoreError> {
        let mut conn = self.lock().await;
        let tx = conn.transaction()?;

        let email_taken: Option<i64> = tx
            .query_row(
                "SELECT 1 FROM users WHERE email = ?",
                params![user.email],
                |row| row.get(0),
            )
            .optional()?;
        if email_taken.is_some() {
            return Ok(InsertUserOutcome::DuplicateEmail);
        }
        let code_taken: Option<i64> = tx
            .query_row(
                "SELECT 1 FROM users WHERE referral_code = ?",
                params![user.referral_code],
                |row| row.get(0),
            )
            .optional()?;
        if code_taken.is_some() {
            return Ok(InsertUserOutcome::ReferralCodeTaken);
        }

        tx.execute(
            "INSERT INTO users (id, role, name, email, password_hash, password_salt, phone, \
             wallet_balance_cents, address_json, referral_code, referred_by, approved, available, \
             delivered_order_count, restaurant_profile_json, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                user.id.as_str(),
                user.role.as_str(),
                user.name,
                user.email,
                user.password_hash,
                user.password_salt,
                user.phone,
                user.wallet_balance_cents,
                to_json(&user.address)?,
                user.referral_code,
                user.referred_by.as_ref().map(|id| id.as_str().to_string()),
                user.approved,
                user.available,
                user.delivered_order_count as i64,
                to_json(&user.restaurant_profile)?,
                fmt_ts(user.created_at),
                fmt_ts(user.updated_at),
            ],
        )?;
        tx.commit()?;
        Ok(InsertUserOutcome::Inserted)
    }

    pub async fn user_by_id(&self, id: &UserId) -> Result<Option<User>, StoreError> {
        let conn = self.lock().await;
        let raw = conn
            .query_row(
                &format!("SELECT {USER_COLS} FROM users WHERE id = ?"),
                params![id.as_str()],
                raw_user,
            )
            .optional()?;
        raw.map(RawUser::into_user).transpose()
    }

    pub async fn user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let conn = self.lock().await;
        let raw = conn
            .query_row(
                &format!("SELECT {USER_COLS} FROM users WHERE email = ?"),
                params![email],
                raw_user,
            )
            .optional()?;
        raw.map(RawUser::into_user).transpose()
    }

    pub async fn user_by_referral_code(&self, code: &str) -> Result<Option<User>, StoreError> {
        let conn = self.lock().await;
        let raw = conn
            .query_row(
                &format!("SELECT {USER_COLS} FROM users WHERE referral_code = ?"),
                params![code],
                raw_user,
            )
            .optional()?;
        raw.map(RawUser::into_user).transpose()
    }

    /// Rewrites the mutable profile fields. Wallet balance, approval and the
    /// delivered-order counter have dedicated operations.
    pub async fn update_user_profile(&self, user: &User) -> Result<bool, StoreError> {
        let conn = self.lock().await;
        let rows = conn.execute(
            "UPDATE users SET name = ?, phone = ?, address_json = ?, available = ?, \
             restaurant_profile_json = ?, updated_at = ? WHERE id = ?",
            params![
                user.name,
                user.phone,
                to_json(&user.address)?,
                user.available,
                to_json(&user.restaurant_profile)?,
                fmt_ts(user.updated_at),
                user.id.as_str(),
            ],
        )?;
        Ok(rows == 1)
    }

    pub async fn set_user_approval(
        &self,
        id: &UserId,
        approved: bool,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let conn = self.lock().await;
        let rows = conn.execute(
            "UPDATE users SET approved = ?, updated_at = ? WHERE id = ?",
            params![approved, fmt_ts(now), id.as_str()],
        )?;
        Ok(rows == 1)
    }

    /// Bumps the loyalty counter and returns the new value.
    pub async fn increment_delivered_count(&self, id: &UserId) -> Result<u64, StoreError> {
        let mut conn = self.lock().await;
        let tx = conn.transaction()?;
        tx.execute(
            "UPDATE users SET delivered_order_count = delivered_order_count + 1 WHERE id = ?",
            params![id.as_str()],
        )?;
        let count: i64 = tx.query_row(
            "SELECT delivered_order_count FROM users WHERE id = ?",
            params![id.as_str()],
            |row| row.get(0),
        )?;
        tx.commit()?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    pub async fn list_users(
        &self,
        role: Option<Role>,
        after: Option<&PageAfter>,
        limit: usize,
    ) -> Result<Page<User>, StoreError> {
        let conn = self.lock().await;
        let mut sql = format!("SELECT {USER_COLS} FROM users");
        let mut where_parts: Vec<String> = Vec::new();
        let mut bind: Vec<rusqlite::types::Value> = Vec::new();

        if let Some(role) = role {
            where_parts.push("role = ?".to_string());
            bind.push(rusqlite::types::Value::Text(role.as_str().to_string()));
        }
        if let Some(after) = after {
            where_parts.push("(created_at, id) < (?, ?)".to_string());
            bind.push(rusqlite::types::Value::Text(after.created_at.clone()));
            bind.push(rusqlite::types::Value::Text(after.id.clone()));
        }
        if !where_parts.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&where_parts.join(" AND "));
        }
        sql.push_str(" ORDER BY created_at DESC, id DESC LIMIT ?");
        bind.push(rusqlite::types::Value::Integer((limit + 1) as i64));

        let mut stmt = conn.prepare(&sql)?;
        let raws = stmt
            .query_map(rusqlite::params_from_iter(bind.iter()), raw_user)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        let users = raws
            .into_iter()
            .map(RawUser::into_user)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Page::from_overfetched(users, limit))
    }

    /// Approved restaurants only, optional substring match on the visible
    /// name fields.
    pub async fn list_restaurants(
        &self,
        text: Option<&str>,
        after: Option<&PageAfter>,
        limit: usize,
    ) -> Result<Page<User>, StoreError> {
        let conn = self.lock().await;
        let mut sql =
            format!("SELECT {USER_COLS} FROM users WHERE role = 'restaurant' AND approved = 1");
        let mut bind: Vec<rusqlite::types::Value> = Vec::new();

        if let Some(text) = text {
            sql.push_str(
                " AND (name LIKE ? ESCAPE '!' OR restaurant_profile_json LIKE ? ESCAPE '!')",
            );
            let pattern = format!("%{}%", escape_like(text));
            bind.push(rusqlite::types::Value::Text(pattern.clone()));
            bind.push(rusqlite::types::Value::Text(pattern));
        }
        if let Some(after) = after {
            sql.push_str(" AND (created_at, id) < (?, ?)");
            bind.push(rusqlite::types::Value::Text(after.created_at.clone()));
            bind.push(rusqlite::types::Value::Text(after.id.clone()));
        }
        sql.push_str(" ORDER BY created_at DESC, id DESC LIMIT ?");
        bind.push(rusqlite::types::Value::Integer((limit + 1) as i64));

        let mut stmt = conn.prepare(&sql)?;
        let raws = stmt
            .query_map(rusqlite::params_from_iter(bind.iter()), raw_user)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        let users = raws
            .into_iter()
            .map(RawUser::into_user)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Page::from_overfetched(users, limit))
    }

    pub async fn count_users_by_role(&self) -> Result<Vec<(String, u64)>, StoreError> {
        let conn = self.lock().await;
        let mut stmt = conn.prepare("SELECT role, COUNT(*) FROM users GROUP BY role")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows
            .into_iter()
            .map(|(role, n)| (role, u64::try_from(n).unwrap_or(0)))
            .collect())
    }
}
