use crate::ids::{DeliveryId, OrderId, UserId};
use crate::money::ValidationError;
use crate::user::{Address, GeoPoint};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum DeliveryStatus {
    Unassigned,
    Claimed,
    PickedUp,
    Delivering,
    Delivered,
}

impl DeliveryStatus {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        match raw {
            "unassigned" => Ok(Self::Unassigned),
            "claimed" => Ok(Self::Claimed),
            "picked_up" => Ok(Self::PickedUp),
            "delivering" => Ok(Self::Delivering),
            "delivered" => Ok(Self::Delivered),
            other => Err(ValidationError(format!("unknown delivery status: {other}"))),
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unassigned => "unassigned",
            Self::Claimed => "claimed",
            Self::PickedUp => "picked_up",
            Self::Delivering => "delivering",
            Self::Delivered => "delivered",
        }
    }

    #[must_use]
    pub const fn can_transition(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Unassigned, Self::Claimed)
                | (Self::Claimed, Self::PickedUp)
                | (Self::PickedUp, Self::Delivering)
                | (Self::Delivering, Self::Delivered)
        )
    }

    /// Transitions the assigned staff member may request over the API.
    /// Claiming is separate because it is the contended step.
    #[must_use]
    pub const fn staff_may_set(self, next: Self) -> bool {
        self.can_transition(next) && !matches!(next, Self::Claimed)
    }
}

/// One delivery job for one order. While `unassigned` it is an offer any
/// available staff member can attempt to claim.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Delivery {
    pub id: DeliveryId,
    pub order_id: OrderId,
    pub customer_id: UserId,
    #[serde(default)]
    pub staff_id: Option<UserId>,
    pub status: DeliveryStatus,
    pub pickup_address: Address,
    pub dropoff_address: Address,
    #[serde(default)]
    pub last_position: Option<GeoPoint>,
    #[serde(default)]
    pub claimed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Delivery {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.pickup_address.validate()?;
        self.dropoff_address.validate()?;
        match self.status {
            DeliveryStatus::Unassigned => {
                if self.staff_id.is_some() {
                    return Err(ValidationError(
                        "unassigned delivery must not carry staff_id".to_string(),
                    ));
                }
            }
            _ => {
                if self.staff_id.is_none() {
                    return Err(ValidationError(
                        "assigned delivery requires staff_id".to_string(),
                    ));
                }
            }
        }
        if self.status == DeliveryStatus::Delivered && self.delivered_at.is_none() {
            return Err(ValidationError(
                "delivered delivery requires delivered_at".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_is_linear() {
        assert!(DeliveryStatus::Unassigned.can_transition(DeliveryStatus::Claimed));
        assert!(DeliveryStatus::Claimed.can_transition(DeliveryStatus::PickedUp));
        assert!(!DeliveryStatus::Unassigned.can_transition(DeliveryStatus::PickedUp));
        assert!(!DeliveryStatus::Delivered.can_transition(DeliveryStatus::Claimed));
    }

    #[test]
    fn staff_cannot_set_claimed_via_status_update() {
        assert!(!DeliveryStatus::Unassigned.staff_may_set(DeliveryStatus::Claimed));
        assert!(DeliveryStatus::Claimed.staff_may_set(DeliveryStatus::PickedUp));
        assert!(DeliveryStatus::Delivering.staff_may_set(DeliveryStatus::Delivered));
    }
}
