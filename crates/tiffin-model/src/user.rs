// SPDX-License-Identifier: Apache-2.0

use crate::ids::UserId;
use crate::money::ValidationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const NAME_MAX_LEN: usize = 120;
pub const EMAIL_MAX_LEN: usize = 254;
pub const PHONE_MAX_LEN: usize = 32;
pub const PASSWORD_MIN_LEN: usize = 8;
pub const PASSWORD_MAX_LEN: usize = 128;
pub const ADDRESS_LINE_MAX_LEN: usize = 200;
pub const REFERRAL_CODE_LEN: usize = 8;

/// Referral codes avoid 0/O/1/I so they survive being read aloud.
pub const REFERRAL_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum Role {
    Customer,
    Restaurant,
    DeliveryStaff,
    Admin,
}

impl Role {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        match raw {
            "customer" => Ok(Self::Customer),
            "restaurant" => Ok(Self::Restaurant),
            "delivery_staff" => Ok(Self::DeliveryStaff),
            "admin" => Ok(Self::Admin),
            other => Err(ValidationError(format!("unknown role: {other}"))),
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Restaurant => "restaurant",
            Self::DeliveryStaff => "delivery_staff",
            Self::Admin => "admin",
        }
    }

    /// Roles a caller may choose at registration. Admins are provisioned
    /// out of band, never self-assigned.
    #[must_use]
    pub const fn self_assignable(self) -> bool {
        !matches!(self, Self::Admin)
    }

    /// Restaurants and delivery staff wait for admin approval before they
    /// can operate; customers and admins start approved.
    #[must_use]
    pub const fn approved_on_signup(self) -> bool {
        matches!(self, Self::Customer | Self::Admin)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Result<Self, ValidationError> {
        if !(-90.0..=90.0).contains(&lat) {
            return Err(ValidationError("lat must be within [-90, 90]".to_string()));
        }
        if !(-180.0..=180.0).contains(&lng) {
            return Err(ValidationError(
                "lng must be within [-180, 180]".to_string(),
            ));
        }
        Ok(Self { lat, lng })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Address {
    pub line1: String,
    pub city: String,
    pub postcode: String,
    #[serde(default)]
    pub geo: Option<GeoPoint>,
}

impl Address {
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (field, value) in [
            ("line1", &self.line1),
            ("city", &self.city),
            ("postcode", &self.postcode),
        ] {
            if value.trim().is_empty() {
                return Err(ValidationError(format!("address {field} must not be empty")));
            }
            if value.len() > ADDRESS_LINE_MAX_LEN {
                return Err(ValidationError(format!(
                    "address {field} exceeds max length {ADDRESS_LINE_MAX_LEN}"
                )));
            }
        }
        if let Some(geo) = self.geo {
            GeoPoint::new(geo.lat, geo.lng)?;
        }
        Ok(())
    }

    /// One-line rendering handed to the geocoder.
    #[must_use]
    pub fn geocode_query(&self) -> String {
        format!("{}, {}, {}", self.line1, self.city, self.postcode)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RestaurantProfile {
    pub display_name: String,
    pub cuisine: String,
    pub description: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub rating_sum: u64,
    #[serde(default)]
    pub rating_count: u64,
}

impl RestaurantProfile {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.display_name.trim().is_empty() {
            return Err(ValidationError(
                "restaurant display_name must not be empty".to_string(),
            ));
        }
        if self.display_name.len() > NAME_MAX_LEN {
            return Err(ValidationError(format!(
                "restaurant display_name exceeds max length {NAME_MAX_LEN}"
            )));
        }
        if self.rating_count > 0 && self.rating_sum > self.rating_count * 5 {
            return Err(ValidationError(
                "restaurant rating_sum inconsistent with rating_count".to_string(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn rating_average(&self) -> Option<f64> {
        if self.rating_count == 0 {
            return None;
        }
        Some(self.rating_sum as f64 / self.rating_count as f64)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct User {
    pub id: UserId,
    pub role: Role,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub password_salt: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub wallet_balance_cents: i64,
    #[serde(default)]
    pub address: Option<Address>,
    pub referral_code: String,
    #[serde(default)]
    pub referred_by: Option<UserId>,
    pub approved: bool,
    /// Delivery staff duty toggle; meaningless for other roles.
    #[serde(default)]
    pub available: bool,
    #[serde(default)]
    pub delivered_order_count: u64,
    #[serde(default)]
    pub restaurant_profile: Option<RestaurantProfile>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_name(&self.name)?;
        validate_email(&self.email)?;
        if let Some(phone) = &self.phone {
            validate_phone(phone)?;
        }
        if self.wallet_balance_cents < 0 {
            return Err(ValidationError(
                "wallet_balance_cents must not be negative".to_string(),
            ));
        }
        if let Some(address) = &self.address {
            address.validate()?;
        }
        validate_referral_code(&self.referral_code)?;
        if let Some(referrer) = &self.referred_by {
            if *referrer == self.id {
                return Err(ValidationError("user cannot refer themselves".to_string()));
            }
        }
        if self.role == Role::Restaurant && self.restaurant_profile.is_none() {
            return Err(ValidationError(
                "restaurant user requires restaurant_profile".to_string(),
            ));
        }
        if self.role != Role::Restaurant && self.restaurant_profile.is_some() {
            return Err(ValidationError(
                "restaurant_profile only valid for restaurant role".to_string(),
            ));
        }
        if let Some(profile) = &self.restaurant_profile {
            profile.validate()?;
        }
        Ok(())
    }
}

#[must_use]
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}

pub fn validate_email(input: &str) -> Result<(), ValidationError> {
    if input.is_empty() {
        return Err(ValidationError("email must not be empty".to_string()));
    }
    if input.len() > EMAIL_MAX_LEN {
        return Err(ValidationError(format!(
            "email exceeds max length {EMAIL_MAX_LEN}"
        )));
    }
    if input.chars().any(char::is_whitespace) {
        return Err(ValidationError(
            "email must not contain whitespace".to_string(),
        ));
    }
    let Some((local, domain)) = input.split_once('@') else {
        return Err(ValidationError("email must contain '@'".to_string()));
    };
    if local.is_empty() || domain.is_empty() || !domain.contains('.') {
        return Err(ValidationError(
            "email must be of the form local@domain.tld".to_string(),
        ));
    }
    Ok(())
}

pub fn validate_name(input: &str) -> Result<(), ValidationError> {
    if input.trim().is_empty() {
        return Err(ValidationError("name must not be empty".to_string()));
    }
    if input.len() > NAME_MAX_LEN {
        return Err(ValidationError(format!(
            "name exceeds max length {NAME_MAX_LEN}"
        )));
    }
    Ok(())
}

pub fn validate_phone(input: &str) -> Result<(), ValidationError> {
    if input.is_empty() {
        return Err(ValidationError("phone must not be empty".to_string()));
    }
    if input.len() > PHONE_MAX_LEN {
        return Err(ValidationError(format!(
            "phone exceeds max length {PHONE_MAX_LEN}"
        )));
    }
    if !input
        .chars()
        .all(|c| c.is_ascii_digit() || c == '+' || c == '-' || c == ' ')
    {
        return Err(ValidationError(
            "phone must contain only digits, '+', '-' or spaces".to_string(),
        ));
    }
    Ok(())
}

pub fn validate_password(raw: &str) -> Result<(), ValidationError> {
    if raw.len() < PASSWORD_MIN_LEN {
        return Err(ValidationError(format!(
            "password must be at least {PASSWORD_MIN_LEN} characters"
        )));
    }
    if raw.len() > PASSWORD_MAX_LEN {
        return Err(ValidationError(format!(
            "password exceeds max length {PASSWORD_MAX_LEN}"
        )));
    }
    Ok(())
}

pub fn validate_referral_code(input: &str) -> Result<(), ValidationError> {
    if input.len() != REFERRAL_CODE_LEN {
        return Err(ValidationError(format!(
            "referral code must be exactly {REFERRAL_CODE_LEN} characters"
        )));
    }
    if !input.bytes().all(|b| REFERRAL_CODE_ALPHABET.contains(&b)) {
        return Err(ValidationError(
            "referral code contains characters outside its alphabet".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_validation_requires_local_and_dotted_domain() {
        assert!(validate_email("asha@example.com").is_ok());
        assert!(validate_email("asha@example").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("a b@example.com").is_err());
        assert_eq!(normalize_email("  Asha@Example.COM "), "asha@example.com");
    }

    #[test]
    fn referral_code_charset_is_enforced() {
        assert!(validate_referral_code("ABCD2345").is_ok());
        assert!(validate_referral_code("ABCD234").is_err());
        assert!(validate_referral_code("ABCD23O5").is_err());
        assert!(validate_referral_code("abcd2345").is_err());
    }

    #[test]
    fn role_signup_rules() {
        assert!(Role::Customer.self_assignable());
        assert!(!Role::Admin.self_assignable());
        assert!(Role::Customer.approved_on_signup());
        assert!(!Role::Restaurant.approved_on_signup());
        assert!(!Role::DeliveryStaff.approved_on_signup());
    }

    #[test]
    fn rating_average_needs_reviews() {
        let mut profile = RestaurantProfile {
            display_name: "Asha's Kitchen".to_string(),
            cuisine: "south indian".to_string(),
            description: "home-style thalis".to_string(),
            image_url: None,
            rating_sum: 0,
            rating_count: 0,
        };
        assert_eq!(profile.rating_average(), None);
        profile.rating_sum = 9;
        profile.rating_count = 2;
        assert_eq!(profile.rating_average(), Some(4.5));
    }

    #[test]
    fn geo_point_bounds() {
        assert!(GeoPoint::new(12.97, 77.59).is_ok());
        assert!(GeoPoint::new(91.0, 0.0).is_err());
        assert!(GeoPoint::new(0.0, -181.0).is_err());
    }
}
