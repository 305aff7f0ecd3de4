use crate::ids::{OrderId, PaymentId, UserId};
use crate::money::{validate_amount_cents, ValidationError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const NOTE_MAX_LEN: usize = 200;
pub const SESSION_ID_MAX_LEN: usize = 128;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum PaymentKind {
    Topup,
    OrderDebit,
    Refund,
    ReferralReward,
    LoyaltyBonus,
    CardPayment,
    SubscriptionDebit,
}

impl PaymentKind {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        match raw {
            "topup" => Ok(Self::Topup),
            "order_debit" => Ok(Self::OrderDebit),
            "refund" => Ok(Self::Refund),
            "referral_reward" => Ok(Self::ReferralReward),
            "loyalty_bonus" => Ok(Self::LoyaltyBonus),
            "card_payment" => Ok(Self::CardPayment),
            "subscription_debit" => Ok(Self::SubscriptionDebit),
            other => Err(ValidationError(format!("unknown payment kind: {other}"))),
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Topup => "topup",
            Self::OrderDebit => "order_debit",
            Self::Refund => "refund",
            Self::ReferralReward => "referral_reward",
            Self::LoyaltyBonus => "loyalty_bonus",
            Self::CardPayment => "card_payment",
            Self::SubscriptionDebit => "subscription_debit",
        }
    }

    /// Direction of the wallet movement: +1 credit, -1 debit, 0 when the
    /// money moved outside the wallet (a direct card charge).
    #[must_use]
    pub const fn wallet_delta_sign(self) -> i64 {
        match self {
            Self::Topup | Self::Refund | Self::ReferralReward | Self::LoyaltyBonus => 1,
            Self::OrderDebit | Self::SubscriptionDebit => -1,
            Self::CardPayment => 0,
        }
    }
}

/// Append-only ledger row. Amounts are stored positive; direction comes
/// from the kind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct PaymentEntry {
    pub id: PaymentId,
    pub user_id: UserId,
    pub kind: PaymentKind,
    pub amount_cents: i64,
    #[serde(default)]
    pub order_id: Option<OrderId>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl PaymentEntry {
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_amount_cents(self.amount_cents, "amount_cents")?;
        if let Some(session) = &self.session_id {
            if session.is_empty() || session.len() > SESSION_ID_MAX_LEN {
                return Err(ValidationError(format!(
                    "session_id must be 1..={SESSION_ID_MAX_LEN} characters"
                )));
            }
        }
        if let Some(note) = &self.note {
            if note.len() > NOTE_MAX_LEN {
                return Err(ValidationError(format!(
                    "note exceeds max length {NOTE_MAX_LEN}"
                )));
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn signed_wallet_delta(&self) -> i64 {
        self.kind.wallet_delta_sign() * self.amount_cents
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_round_trip_and_sign_correctly() {
        for kind in [
            PaymentKind::Topup,
            PaymentKind::OrderDebit,
            PaymentKind::Refund,
            PaymentKind::ReferralReward,
            PaymentKind::LoyaltyBonus,
            PaymentKind::CardPayment,
            PaymentKind::SubscriptionDebit,
        ] {
            assert_eq!(PaymentKind::parse(kind.as_str()).unwrap(), kind);
        }
        assert_eq!(PaymentKind::Topup.wallet_delta_sign(), 1);
        assert_eq!(PaymentKind::OrderDebit.wallet_delta_sign(), -1);
        assert_eq!(PaymentKind::CardPayment.wallet_delta_sign(), 0);
    }

    #[test]
    fn entry_amount_must_be_positive() {
        let entry = PaymentEntry {
            id: PaymentId::fresh(),
            user_id: UserId::fresh(),
            kind: PaymentKind::Refund,
            amount_cents: 0,
            order_id: None,
            session_id: None,
            note: None,
            created_at: Utc::now(),
        };
        assert!(entry.validate().is_err());
    }
}
