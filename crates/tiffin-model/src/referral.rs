use crate::ids::{ReferralId, UserId};
use crate::money::{validate_amount_cents, ValidationError};
use crate::user::validate_referral_code;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Recorded when a new user registers with someone else's code. The reward
/// pays out once, when the referee's first order is delivered.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Referral {
    pub id: ReferralId,
    pub referrer_id: UserId,
    pub referee_id: UserId,
    pub code: String,
    pub reward_cents: i64,
    pub rewarded: bool,
    #[serde(default)]
    pub rewarded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Referral {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.referrer_id == self.referee_id {
            return Err(ValidationError(
                "referrer and referee must differ".to_string(),
            ));
        }
        validate_referral_code(&self.code)?;
        validate_amount_cents(self.reward_cents, "reward_cents")?;
        if self.rewarded && self.rewarded_at.is_none() {
            return Err(ValidationError(
                "rewarded referral requires rewarded_at".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_referral_is_invalid() {
        let me = UserId::fresh();
        let referral = Referral {
            id: ReferralId::fresh(),
            referrer_id: me.clone(),
            referee_id: me,
            code: "ABCD2345".to_string(),
            reward_cents: 500,
            rewarded: false,
            rewarded_at: None,
            created_at: Utc::now(),
        };
        assert!(referral.validate().is_err());
    }
}
