use crate::{fmt_ts, parse_ts, Store, StoreError};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use tiffin_model::{Referral, ReferralId, UserId};

const REFERRAL_COLS: &str =
    "id, referrer_id, referee_id, code, reward_cents, rewarded, rewarded_at, created_at";

struct RawReferral {
    id: String,
    referrer_id: String,
    referee_id: String,
    code: String,
    reward_cents: i64,
    rewarded: bool,
    rewarded_at: Option<String>,
    created_at: String,
}

fn raw_referral(row: &Row<'_>) -> rusqlite::Result<RawReferral> {
    Ok(RawReferral {
        id: row.get(0)?,
        referrer_id: row.get(1)?,
        referee_id: row.get(2)?,
        code: row.get(3)?,
        reward_cents: row.get(4)?,
        rewarded: row.get(5)?,
        rewarded_at: row.get(6)?,
        created_at: row.get(7)?,
    })
}

impl RawReferral {
    fn into_referral(self) -> Result<Referral, StoreError> {
        Ok(Referral {
            id: ReferralId::parse(&self.id)
                .map_err(|e| StoreError(format!("referral row: {e}")))?,
            referrer_id: UserId::parse(&self.referrer_id)
                .map_err(|e| StoreError(format!("referral row: {e}")))?,
            referee_id: UserId::parse(&self.referee_id)
                .map_err(|e| StoreError(format!("referral row: {e}")))?,
            code: self.code,
            reward_cents: self.reward_cents,
            rewarded: self.rewarded,
            rewarded_at: self.rewarded_at.as_deref().map(parse_ts).transpose()?,
            created_at: parse_ts(&self.created_at)?,
        })
    }
}

impl Store {
    pub async fn insert_referral(&self, referral: &Referral) -> Result<(), StoreError> {
        let conn = self.lock().await;
        conn.execute(
            "INSERT INTO referrals (id, referrer_id, referee_id, code, reward_cents, rewarded, \
             rewarded_at, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                referral.id.as_str(),
                referral.referrer_id.as_str(),
                referral.referee_id.as_str(),
                referral.code,
                referral.reward_cents,
                referral.rewarded,
                referral.rewarded_at.map(fmt_ts),
                fmt_ts(referral.created_at),
            ],
        )?;
        Ok(())
    }

    /// A referee appears in at most one referral row.
    pub async fn referral_by_referee(
        &self,
        referee_id: &UserId,
    ) -> Result<Option<Referral>, StoreError> {
        let conn = self.lock().await;
        let raw = conn
            .query_row(
                &format!("SELECT {REFERRAL_COLS} FROM referrals WHERE referee_id = ?"),
                params![referee_id.as_str()],
                raw_referral,
            )
            .optional()?;
        raw.map(RawReferral::into_referral).transpose()
    }

    /// Marks a referral rewarded only if it has not been rewarded yet. The
    /// `rewarded = 0` guard is what makes the payout one-time under
    /// concurrent delivered-order callbacks.
    pub async fn mark_referral_rewarded(
        &self,
        id: &ReferralId,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let conn = self.lock().await;
        let rows = conn.execute(
            "UPDATE referrals SET rewarded = 1, rewarded_at = ? WHERE id = ? AND rewarded = 0",
            params![fmt_ts(now), id.as_str()],
        )?;
        Ok(rows == 1)
    }

    pub async fn list_referrals_for_referrer(
        &self,
        referrer_id: &UserId,
    ) -> Result<Vec<Referral>, StoreError> {
        let conn = self.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {REFERRAL_COLS} FROM referrals WHERE referrer_id = ? \
             ORDER BY created_at DESC, id DESC"
        ))?;
        let raws = stmt
            .query_map(params![referrer_id.as_str()], raw_referral)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        raws.into_iter().map(RawReferral::into_referral).collect()
    }
}
