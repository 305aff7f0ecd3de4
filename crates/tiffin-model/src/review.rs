use crate::ids::{OrderId, ReviewId, UserId};
use crate::money::ValidationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const RATING_MIN: u8 = 1;
pub const RATING_MAX: u8 = 5;
pub const COMMENT_MAX_LEN: usize = 1000;

pub fn validate_rating(rating: u8) -> Result<(), ValidationError> {
    if !(RATING_MIN..=RATING_MAX).contains(&rating) {
        return Err(ValidationError(format!(
            "rating must be {RATING_MIN}..={RATING_MAX}"
        )));
    }
    Ok(())
}

/// One review per delivered order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Review {
    pub id: ReviewId,
    pub order_id: OrderId,
    pub customer_id: UserId,
    pub restaurant_id: UserId,
    pub rating: u8,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

impl Review {
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_rating(self.rating)?;
        if self.comment.len() > COMMENT_MAX_LEN {
            return Err(ValidationError(format!(
                "comment exceeds max length {COMMENT_MAX_LEN}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rating_bounds() {
        assert!(validate_rating(0).is_err());
        assert!(validate_rating(1).is_ok());
        assert!(validate_rating(5).is_ok());
        assert!(validate_rating(6).is_err());
    }
}
