// SPDX-License-Identifier: Apache-2.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tiffin_model::{Address, GeoPoint, RestaurantProfile, User};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddressDto {
    pub line1: String,
    pub city: String,
    pub postcode: String,
}

impl AddressDto {
    /// Client-supplied addresses never carry coordinates; the geocoder
    /// fills them in server-side.
    #[must_use]
    pub fn into_address(self) -> Address {
        Address {
            line1: self.line1,
            city: self.city,
            postcode: self.postcode,
            geo: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RestaurantProfileDto {
    pub display_name: String,
    pub cuisine: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl RestaurantProfileDto {
    #[must_use]
    pub fn into_profile(self) -> RestaurantProfile {
        RestaurantProfile {
            display_name: self.display_name,
            cuisine: self.cuisine,
            description: self.description.unwrap_or_default(),
            image_url: self.image_url,
            rating_sum: 0,
            rating_count: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub referral_code: Option<String>,
    #[serde(default)]
    pub address: Option<AddressDto>,
    #[serde(default)]
    pub restaurant_profile: Option<RestaurantProfileDto>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct UpdateProfileRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<AddressDto>,
    #[serde(default)]
    pub available: Option<bool>,
    #[serde(default)]
    pub restaurant_profile: Option<RestaurantProfileDto>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateMenuItemRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price_cents: i64,
    pub date: String,
    pub meal_type: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct UpdateMenuItemRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub price_cents: Option<i64>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub meal_type: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub active: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrderLineRequest {
    pub menu_item_id: String,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateOrderRequest {
    pub restaurant_id: String,
    pub items: Vec<OrderLineRequest>,
    pub deliver_at: DateTime<Utc>,
    pub payment_method: String,
    #[serde(default)]
    pub delivery_address: Option<AddressDto>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateOrderStatusRequest {
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TopupRequest {
    pub amount_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateDeliveryStatusRequest {
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateLocationRequest {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SelectionRequest {
    pub meal_type: String,
    pub menu_item_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateSubscriptionRequest {
    pub restaurant_id: String,
    pub start_date: String,
    pub end_date: String,
    pub days: Vec<String>,
    pub selections: Vec<SelectionRequest>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateReviewRequest {
    pub order_id: String,
    pub rating: u8,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UploadRequest {
    pub filename: String,
    pub data_base64: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CheckoutRequest {
    pub purpose: String,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub amount_cents: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WebhookEvent {
    pub event_type: String,
    pub session_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApprovalRequest {
    pub approved: bool,
}

/// Profile as returned to the owning user. Never carries password material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserView {
    pub id: String,
    pub role: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub wallet_balance_cents: i64,
    #[serde(default)]
    pub address: Option<Address>,
    pub referral_code: String,
    pub approved: bool,
    pub available: bool,
    pub delivered_order_count: u64,
    #[serde(default)]
    pub restaurant_profile: Option<RestaurantProfile>,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserView {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.as_str().to_string(),
            role: user.role.as_str().to_string(),
            name: user.name.clone(),
            email: user.email.clone(),
            phone: user.phone.clone(),
            wallet_balance_cents: user.wallet_balance_cents,
            address: user.address.clone(),
            referral_code: user.referral_code.clone(),
            approved: user.approved,
            available: user.available,
            delivered_order_count: user.delivered_order_count,
            restaurant_profile: user.restaurant_profile.clone(),
            created_at: user.created_at,
        }
    }
}

/// Restaurant as shown in public listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RestaurantView {
    pub id: String,
    pub display_name: String,
    pub cuisine: String,
    pub description: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub rating: Option<f64>,
    pub rating_count: u64,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub geo: Option<GeoPoint>,
}

impl From<&User> for RestaurantView {
    fn from(user: &User) -> Self {
        let profile = user.restaurant_profile.as_ref();
        Self {
            id: user.id.as_str().to_string(),
            display_name: profile
                .map(|p| p.display_name.clone())
                .unwrap_or_else(|| user.name.clone()),
            cuisine: profile.map(|p| p.cuisine.clone()).unwrap_or_default(),
            description: profile.map(|p| p.description.clone()).unwrap_or_default(),
            image_url: profile.and_then(|p| p.image_url.clone()),
            rating: profile.and_then(RestaurantProfile::rating_average),
            rating_count: profile.map_or(0, |p| p.rating_count),
            city: user.address.as_ref().map(|a| a.city.clone()),
            geo: user.address.as_ref().and_then(|a| a.geo),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tiffin_model::{Role, UserId};

    fn user() -> User {
        User {
            id: UserId::fresh(),
            role: Role::Customer,
            name: "Priya".to_string(),
            email: "priya@example.com".to_string(),
            password_hash: "hash".to_string(),
            password_salt: "salt".to_string(),
            phone: None,
            wallet_balance_cents: 2500,
            address: None,
            referral_code: "ABCD2345".to_string(),
            referred_by: None,
            approved: true,
            available: false,
            delivered_order_count: 0,
            restaurant_profile: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn user_view_never_exposes_password_material() {
        let view = UserView::from(&user());
        let json = serde_json::to_value(&view).unwrap();
        assert!(json.get("password_hash").is_none());
        assert!(json.get("password_salt").is_none());
        assert_eq!(json["wallet_balance_cents"], 2500);
    }

    #[test]
    fn unknown_body_fields_are_rejected() {
        let raw = r#"{"email":"a@b.co","password":"pw","extra":1}"#;
        assert!(serde_json::from_str::<LoginRequest>(raw).is_err());
    }
}
