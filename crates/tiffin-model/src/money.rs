use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError(pub String);

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ValidationError {}

/// Upper bound on any single money movement, in cents.
pub const MAX_AMOUNT_CENTS: i64 = 10_000_000;
pub const MAX_ORDER_LINES: usize = 50;
pub const MAX_LINE_QUANTITY: u32 = 20;

pub fn validate_amount_cents(amount: i64, field: &str) -> Result<(), ValidationError> {
    if amount <= 0 {
        return Err(ValidationError(format!("{field} must be positive cents")));
    }
    if amount > MAX_AMOUNT_CENTS {
        return Err(ValidationError(format!(
            "{field} exceeds max amount {MAX_AMOUNT_CENTS}"
        )));
    }
    Ok(())
}

pub fn checked_line_total(unit_price_cents: i64, quantity: u32) -> Result<i64, ValidationError> {
    validate_amount_cents(unit_price_cents, "unit_price_cents")?;
    if quantity == 0 {
        return Err(ValidationError("quantity must be >= 1".to_string()));
    }
    if quantity > MAX_LINE_QUANTITY {
        return Err(ValidationError(format!(
            "quantity exceeds max {MAX_LINE_QUANTITY}"
        )));
    }
    unit_price_cents
        .checked_mul(i64::from(quantity))
        .filter(|total| *total <= MAX_AMOUNT_CENTS)
        .ok_or_else(|| ValidationError("line total exceeds max amount".to_string()))
}

pub fn checked_sum_cents(values: &[i64]) -> Result<i64, ValidationError> {
    let mut total: i64 = 0;
    for v in values {
        total = total
            .checked_add(*v)
            .filter(|t| *t <= MAX_AMOUNT_CENTS)
            .ok_or_else(|| ValidationError("sum exceeds max amount".to_string()))?;
    }
    Ok(total)
}

/// Renders cents as a decimal string, e.g. `1234` -> `"12.34"`.
#[must_use]
pub fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct DeliveryFeePolicy {
    pub base_fee_cents: i64,
    pub free_over_cents: i64,
}

impl Default for DeliveryFeePolicy {
    fn default() -> Self {
        Self {
            base_fee_cents: 199,
            free_over_cents: 5_000,
        }
    }
}

impl DeliveryFeePolicy {
    #[must_use]
    pub fn fee_for_subtotal(&self, subtotal_cents: i64) -> i64 {
        if subtotal_cents >= self.free_over_cents {
            0
        } else {
            self.base_fee_cents
        }
    }
}
