#![forbid(unsafe_code)]
//! Tiffin domain model SSOT.
//!
//! ```compile_fail
//! use tiffin_model::OrderStatus;
//!
//! fn exhaustive_match(s: OrderStatus) -> &'static str {
//!     match s {
//!         OrderStatus::PendingPayment => "pp",
//!         OrderStatus::Placed => "p",
//!         OrderStatus::Accepted => "a",
//!         OrderStatus::Preparing => "pr",
//!         OrderStatus::Ready => "r",
//!         OrderStatus::OutForDelivery => "o",
//!         OrderStatus::Delivered => "d",
//!         OrderStatus::Cancelled => "c",
//!         OrderStatus::Rejected => "x",
//!     }
//! }
//! ```

mod delivery;
mod ids;
mod menu;
mod money;
mod order;
mod payment;
mod referral;
mod review;
mod subscription;
mod user;

pub use delivery::{Delivery, DeliveryStatus};
pub use ids::{
    DeliveryId, MenuItemId, OrderId, ParseError, PaymentId, ReferralId, ReviewId, SubscriptionId,
    UserId, ID_MAX_LEN,
};
pub use menu::{
    parse_service_date, validate_image_url, MealType, MenuItem, DESCRIPTION_MAX_LEN,
    IMAGE_URL_MAX_LEN, ITEM_NAME_MAX_LEN, MAX_TAGS, TAG_MAX_LEN,
};
pub use money::{
    checked_line_total, checked_sum_cents, format_cents, validate_amount_cents, DeliveryFeePolicy,
    ValidationError, MAX_AMOUNT_CENTS, MAX_LINE_QUANTITY, MAX_ORDER_LINES,
};
pub use order::{Order, OrderLine, OrderStatus, PaymentMethod};
pub use payment::{PaymentEntry, PaymentKind, NOTE_MAX_LEN, SESSION_ID_MAX_LEN};
pub use referral::Referral;
pub use review::{validate_rating, Review, COMMENT_MAX_LEN, RATING_MAX, RATING_MIN};
pub use subscription::{
    MealSelection, PlanDay, Subscription, SubscriptionStatus, MAX_PLAN_SLOTS, MAX_PLAN_SPAN_DAYS,
};
pub use user::{
    normalize_email, validate_email, validate_name, validate_password, validate_phone,
    validate_referral_code, Address, GeoPoint, RestaurantProfile, Role, User, EMAIL_MAX_LEN,
    NAME_MAX_LEN, PASSWORD_MAX_LEN, PASSWORD_MIN_LEN, PHONE_MAX_LEN, REFERRAL_CODE_ALPHABET,
    REFERRAL_CODE_LEN,
};

pub const CRATE_NAME: &str = "tiffin-model";
