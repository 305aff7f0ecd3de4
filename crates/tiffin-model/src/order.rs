// SPDX-License-Identifier: Apache-2.0

use crate::ids::{MenuItemId, OrderId, SubscriptionId, UserId};
use crate::menu::MealType;
use crate::money::{checked_line_total, checked_sum_cents, ValidationError, MAX_ORDER_LINES};
use crate::user::Address;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum OrderStatus {
    PendingPayment,
    Placed,
    Accepted,
    Preparing,
    Ready,
    OutForDelivery,
    Delivered,
    Cancelled,
    Rejected,
}

impl OrderStatus {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        match raw {
            "pending_payment" => Ok(Self::PendingPayment),
            "placed" => Ok(Self::Placed),
            "accepted" => Ok(Self::Accepted),
            "preparing" => Ok(Self::Preparing),
            "ready" => Ok(Self::Ready),
            "out_for_delivery" => Ok(Self::OutForDelivery),
            "delivered" => Ok(Self::Delivered),
            "cancelled" => Ok(Self::Cancelled),
            "rejected" => Ok(Self::Rejected),
            other => Err(ValidationError(format!("unknown order status: {other}"))),
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PendingPayment => "pending_payment",
            Self::Placed => "placed",
            Self::Accepted => "accepted",
            Self::Preparing => "preparing",
            Self::Ready => "ready",
            Self::OutForDelivery => "out_for_delivery",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
            Self::Rejected => "rejected",
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled | Self::Rejected)
    }

    /// The forward lifecycle graph. Cancellation legality additionally
    /// depends on the delivery time, see [`Order::cancellable_at`].
    #[must_use]
    pub const fn can_transition(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::PendingPayment, Self::Placed)
                | (Self::PendingPayment, Self::Cancelled)
                | (Self::Placed, Self::Accepted)
                | (Self::Placed, Self::Rejected)
                | (Self::Placed, Self::Cancelled)
                | (Self::Accepted, Self::Preparing)
                | (Self::Accepted, Self::Cancelled)
                | (Self::Preparing, Self::Ready)
                | (Self::Preparing, Self::Cancelled)
                | (Self::Ready, Self::OutForDelivery)
                | (Self::Ready, Self::Cancelled)
                | (Self::OutForDelivery, Self::Delivered)
        )
    }

    /// Transitions a restaurant may request over the API. `ready` is the
    /// handoff point where the delivery offer is created.
    #[must_use]
    pub const fn restaurant_may_set(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Placed, Self::Accepted)
                | (Self::Placed, Self::Rejected)
                | (Self::Accepted, Self::Preparing)
                | (Self::Preparing, Self::Ready)
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Wallet,
    Card,
}

impl PaymentMethod {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        match raw {
            "wallet" => Ok(Self::Wallet),
            "card" => Ok(Self::Card),
            other => Err(ValidationError(format!("unknown payment method: {other}"))),
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Wallet => "wallet",
            Self::Card => "card",
        }
    }
}

/// One ordered dish, snapshotted from the menu at order time so later menu
/// edits never rewrite history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct OrderLine {
    pub menu_item_id: MenuItemId,
    pub name: String,
    pub unit_price_cents: i64,
    pub meal_type: MealType,
    pub quantity: u32,
}

impl OrderLine {
    pub fn line_total_cents(&self) -> Result<i64, ValidationError> {
        checked_line_total(self.unit_price_cents, self.quantity)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Order {
    pub id: OrderId,
    pub customer_id: UserId,
    pub restaurant_id: UserId,
    pub lines: Vec<OrderLine>,
    pub subtotal_cents: i64,
    pub delivery_fee_cents: i64,
    pub total_cents: i64,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    pub delivery_address: Address,
    pub deliver_at: DateTime<Utc>,
    #[serde(default)]
    pub subscription_id: Option<SubscriptionId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.lines.is_empty() {
            return Err(ValidationError("order must contain at least one line".to_string()));
        }
        if self.lines.len() > MAX_ORDER_LINES {
            return Err(ValidationError(format!(
                "order exceeds max lines {MAX_ORDER_LINES}"
            )));
        }
        let mut line_totals = Vec::with_capacity(self.lines.len());
        for line in &self.lines {
            line_totals.push(line.line_total_cents()?);
        }
        let subtotal = checked_sum_cents(&line_totals)?;
        if subtotal != self.subtotal_cents {
            return Err(ValidationError(
                "subtotal_cents does not match line totals".to_string(),
            ));
        }
        if self.delivery_fee_cents < 0 {
            return Err(ValidationError(
                "delivery_fee_cents must not be negative".to_string(),
            ));
        }
        let total = checked_sum_cents(&[self.subtotal_cents, self.delivery_fee_cents])?;
        if total != self.total_cents {
            return Err(ValidationError(
                "total_cents must equal subtotal plus delivery fee".to_string(),
            ));
        }
        self.delivery_address.validate()?;
        Ok(())
    }

    /// A customer may cancel while the order has not left the restaurant and
    /// the delivery time is further away than the cancellation window.
    #[must_use]
    pub fn cancellable_at(&self, now: DateTime<Utc>, window: Duration) -> bool {
        self.status.can_transition(OrderStatus::Cancelled) && self.deliver_at - now > window
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::user::Address;

    fn address() -> Address {
        Address {
            line1: "12 Gandhi Road".to_string(),
            city: "Bengaluru".to_string(),
            postcode: "560001".to_string(),
            geo: None,
        }
    }

    fn order(status: OrderStatus, deliver_in_hours: i64) -> Order {
        let now = Utc::now();
        let lines = vec![OrderLine {
            menu_item_id: MenuItemId::fresh(),
            name: "Thali".to_string(),
            unit_price_cents: 800,
            meal_type: MealType::Lunch,
            quantity: 2,
        }];
        Order {
            id: OrderId::fresh(),
            customer_id: UserId::fresh(),
            restaurant_id: UserId::fresh(),
            lines,
            subtotal_cents: 1600,
            delivery_fee_cents: 199,
            total_cents: 1799,
            status,
            payment_method: PaymentMethod::Wallet,
            delivery_address: address(),
            deliver_at: now + Duration::hours(deliver_in_hours),
            subscription_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn totals_must_be_consistent() {
        let ok = order(OrderStatus::Placed, 5);
        assert!(ok.validate().is_ok());

        let mut bad = order(OrderStatus::Placed, 5);
        bad.total_cents += 1;
        assert!(bad.validate().is_err());

        let mut bad = order(OrderStatus::Placed, 5);
        bad.subtotal_cents = 1;
        assert!(bad.validate().is_err());
    }

    #[test]
    fn lifecycle_rejects_skips_and_backward_moves() {
        assert!(OrderStatus::Placed.can_transition(OrderStatus::Accepted));
        assert!(OrderStatus::Ready.can_transition(OrderStatus::OutForDelivery));
        assert!(!OrderStatus::Placed.can_transition(OrderStatus::Ready));
        assert!(!OrderStatus::Delivered.can_transition(OrderStatus::Placed));
        assert!(!OrderStatus::Cancelled.can_transition(OrderStatus::Placed));
        assert!(!OrderStatus::OutForDelivery.can_transition(OrderStatus::Cancelled));
    }

    #[test]
    fn restaurant_transitions_are_a_strict_subset() {
        assert!(OrderStatus::Placed.restaurant_may_set(OrderStatus::Accepted));
        assert!(OrderStatus::Placed.restaurant_may_set(OrderStatus::Rejected));
        assert!(!OrderStatus::Placed.restaurant_may_set(OrderStatus::Cancelled));
        assert!(!OrderStatus::Ready.restaurant_may_set(OrderStatus::OutForDelivery));
        assert!(!OrderStatus::OutForDelivery.restaurant_may_set(OrderStatus::Delivered));
    }

    #[test]
    fn cancellation_respects_window() {
        let now = Utc::now();
        let window = Duration::hours(3);
        assert!(order(OrderStatus::Placed, 5).cancellable_at(now, window));
        assert!(!order(OrderStatus::Placed, 2).cancellable_at(now, window));
        assert!(!order(OrderStatus::OutForDelivery, 5).cancellable_at(now, window));
        assert!(!order(OrderStatus::Delivered, 5).cancellable_at(now, window));
    }
}
