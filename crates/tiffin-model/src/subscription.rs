// SPDX-License-Identifier: Apache-2.0

use crate::ids::{SubscriptionId, UserId};
use crate::menu::MealType;
use crate::money::{checked_line_total, checked_sum_cents, ValidationError};
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};

pub const MAX_PLAN_SPAN_DAYS: i64 = 62;
pub const MAX_PLAN_SLOTS: usize = 200;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum SubscriptionStatus {
    Active,
    Paused,
    Cancelled,
    Completed,
}

impl SubscriptionStatus {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        match raw {
            "active" => Ok(Self::Active),
            "paused" => Ok(Self::Paused),
            "cancelled" => Ok(Self::Cancelled),
            "completed" => Ok(Self::Completed),
            other => Err(ValidationError(format!(
                "unknown subscription status: {other}"
            ))),
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Cancelled => "cancelled",
            Self::Completed => "completed",
        }
    }

    #[must_use]
    pub const fn can_transition(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Active, Self::Paused)
                | (Self::Active, Self::Cancelled)
                | (Self::Active, Self::Completed)
                | (Self::Paused, Self::Active)
                | (Self::Paused, Self::Cancelled)
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum PlanDay {
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
    Sat,
    Sun,
}

impl PlanDay {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        match raw {
            "mon" => Ok(Self::Mon),
            "tue" => Ok(Self::Tue),
            "wed" => Ok(Self::Wed),
            "thu" => Ok(Self::Thu),
            "fri" => Ok(Self::Fri),
            "sat" => Ok(Self::Sat),
            "sun" => Ok(Self::Sun),
            other => Err(ValidationError(format!("unknown plan day: {other}"))),
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Mon => "mon",
            Self::Tue => "tue",
            Self::Wed => "wed",
            Self::Thu => "thu",
            Self::Fri => "fri",
            Self::Sat => "sat",
            Self::Sun => "sun",
        }
    }

    #[must_use]
    pub fn matches(self, date: NaiveDate) -> bool {
        let weekday = match self {
            Self::Mon => Weekday::Mon,
            Self::Tue => Weekday::Tue,
            Self::Wed => Weekday::Wed,
            Self::Thu => Weekday::Thu,
            Self::Fri => Weekday::Fri,
            Self::Sat => Weekday::Sat,
            Self::Sun => Weekday::Sun,
        };
        date.weekday() == weekday
    }
}

/// The dish a plan delivers for one meal slot, snapshotted from the menu at
/// subscription time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct MealSelection {
    pub meal_type: MealType,
    pub item_name: String,
    pub unit_price_cents: i64,
}

impl MealSelection {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.item_name.trim().is_empty() {
            return Err(ValidationError(
                "meal selection item_name must not be empty".to_string(),
            ));
        }
        checked_line_total(self.unit_price_cents, 1).map(|_| ())
    }
}

/// A recurring meal plan. Activation pre-generates one order per covered
/// date and meal slot; the slots are a pure function of the plan fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub customer_id: UserId,
    pub restaurant_id: UserId,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub days: Vec<PlanDay>,
    pub selections: Vec<MealSelection>,
    pub status: SubscriptionStatus,
    pub meal_count: u64,
    pub total_paid_cents: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.start_date > self.end_date {
            return Err(ValidationError(
                "start_date must not be after end_date".to_string(),
            ));
        }
        let span = (self.end_date - self.start_date).num_days();
        if span > MAX_PLAN_SPAN_DAYS {
            return Err(ValidationError(format!(
                "plan span exceeds max {MAX_PLAN_SPAN_DAYS} days"
            )));
        }
        if self.days.is_empty() {
            return Err(ValidationError("plan requires at least one day".to_string()));
        }
        let mut seen_days = self.days.clone();
        seen_days.sort_unstable();
        seen_days.dedup();
        if seen_days.len() != self.days.len() {
            return Err(ValidationError("plan days must be unique".to_string()));
        }
        if self.selections.is_empty() {
            return Err(ValidationError(
                "plan requires at least one meal selection".to_string(),
            ));
        }
        let mut seen_meals: Vec<MealType> = self.selections.iter().map(|s| s.meal_type).collect();
        seen_meals.sort_unstable();
        seen_meals.dedup();
        if seen_meals.len() != self.selections.len() {
            return Err(ValidationError(
                "at most one selection per meal type".to_string(),
            ));
        }
        for selection in &self.selections {
            selection.validate()?;
        }
        let slots = self.covered_slots();
        if slots.is_empty() {
            return Err(ValidationError(
                "plan covers no delivery slots".to_string(),
            ));
        }
        if slots.len() > MAX_PLAN_SLOTS {
            return Err(ValidationError(format!(
                "plan covers too many slots, max {MAX_PLAN_SLOTS}"
            )));
        }
        Ok(())
    }

    /// Every (date, selection) pair the plan covers, in date order.
    #[must_use]
    pub fn covered_slots(&self) -> Vec<(NaiveDate, &MealSelection)> {
        let mut slots = Vec::new();
        let mut date = self.start_date;
        while date <= self.end_date {
            if self.days.iter().any(|d| d.matches(date)) {
                for selection in &self.selections {
                    slots.push((date, selection));
                }
            }
            date += Duration::days(1);
        }
        slots
    }

    /// Slots on or after `from`, used when a paused plan resumes.
    #[must_use]
    pub fn slots_from(&self, from: NaiveDate) -> Vec<(NaiveDate, &MealSelection)> {
        self.covered_slots()
            .into_iter()
            .filter(|(date, _)| *date >= from)
            .collect()
    }

    pub fn planned_total_cents(&self) -> Result<i64, ValidationError> {
        let totals: Vec<i64> = self
            .covered_slots()
            .iter()
            .map(|(_, sel)| sel.unit_price_cents)
            .collect();
        checked_sum_cents(&totals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{SubscriptionId, UserId};

    fn plan() -> Subscription {
        Subscription {
            id: SubscriptionId::fresh(),
            customer_id: UserId::fresh(),
            restaurant_id: UserId::fresh(),
            // 2025-03-03 is a Monday.
            start_date: NaiveDate::from_ymd_opt(2025, 3, 3).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2025, 3, 16).unwrap(),
            days: vec![PlanDay::Mon, PlanDay::Wed],
            selections: vec![
                MealSelection {
                    meal_type: MealType::Lunch,
                    item_name: "Thali".to_string(),
                    unit_price_cents: 800,
                },
                MealSelection {
                    meal_type: MealType::Dinner,
                    item_name: "Khichdi".to_string(),
                    unit_price_cents: 600,
                },
            ],
            status: SubscriptionStatus::Active,
            meal_count: 8,
            total_paid_cents: 5600,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn slots_expand_days_times_selections() {
        let p = plan();
        // Two weeks, Mon+Wed, two meals each: 4 dates x 2 selections.
        let slots = p.covered_slots();
        assert_eq!(slots.len(), 8);
        assert_eq!(p.planned_total_cents().unwrap(), 4 * (800 + 600));
        assert!(p.validate().is_ok());
    }

    #[test]
    fn slots_from_filters_past_dates() {
        let p = plan();
        let from = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        let remaining = p.slots_from(from);
        assert_eq!(remaining.len(), 4);
        assert!(remaining.iter().all(|(d, _)| *d >= from));
    }

    #[test]
    fn duplicate_days_or_meals_rejected() {
        let mut p = plan();
        p.days = vec![PlanDay::Mon, PlanDay::Mon];
        assert!(p.validate().is_err());

        let mut p = plan();
        p.selections[1].meal_type = MealType::Lunch;
        assert!(p.validate().is_err());
    }

    #[test]
    fn span_and_emptiness_rules() {
        let mut p = plan();
        p.end_date = p.start_date + Duration::days(MAX_PLAN_SPAN_DAYS + 1);
        assert!(p.validate().is_err());

        let mut p = plan();
        p.end_date = p.start_date;
        p.days = vec![PlanDay::Sun];
        // Start date is a Monday, so a Sunday-only plan covers nothing.
        assert!(p.validate().is_err());
    }

    #[test]
    fn status_transitions() {
        assert!(SubscriptionStatus::Active.can_transition(SubscriptionStatus::Paused));
        assert!(SubscriptionStatus::Paused.can_transition(SubscriptionStatus::Active));
        assert!(!SubscriptionStatus::Cancelled.can_transition(SubscriptionStatus::Active));
        assert!(!SubscriptionStatus::Completed.can_transition(SubscriptionStatus::Paused));
    }
}
