#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

mod cursor;
pub mod dto;
pub mod params;

pub use cursor::{
    decode_cursor, encode_cursor, CursorError, CursorErrorCode, CursorPayload, MAX_CURSOR_DEPTH,
};

pub const CRATE_NAME: &str = "tiffin-api";
pub const API_VERSION: &str = "v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum ApiErrorCode {
    InvalidBody,
    InvalidQueryParameter,
    ValidationFailed,
    InvalidCursor,
    Unauthorized,
    Forbidden,
    NotFound,
    DuplicateEmail,
    DuplicateReview,
    WalletInsufficient,
    OfferAlreadyClaimed,
    CancellationWindowClosed,
    InvalidTransition,
    RateLimited,
    PayloadTooLarge,
    UpstreamFailed,
    NotReady,
    Internal,
}

impl ApiErrorCode {
    #[must_use]
    pub const fn http_status(self) -> u16 {
        match self {
            Self::InvalidBody
            | Self::InvalidQueryParameter
            | Self::ValidationFailed
            | Self::InvalidCursor
            | Self::WalletInsufficient => 400,
            Self::Unauthorized => 401,
            Self::Forbidden => 403,
            Self::NotFound => 404,
            Self::DuplicateEmail
            | Self::DuplicateReview
            | Self::OfferAlreadyClaimed
            | Self::CancellationWindowClosed
            | Self::InvalidTransition => 409,
            Self::PayloadTooLarge => 413,
            Self::RateLimited => 429,
            Self::UpstreamFailed => 502,
            Self::NotReady => 503,
            Self::Internal => 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiError {
    pub code: ApiErrorCode,
    pub message: String,
    pub details: Value,
}

impl ApiError {
    #[must_use]
    pub fn new(code: ApiErrorCode, message: impl Into<String>, details: Value) -> Self {
        Self {
            code,
            message: message.into(),
            details,
        }
    }

    #[must_use]
    pub fn invalid_body(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self::new(
            ApiErrorCode::InvalidBody,
            "invalid request body",
            json!({"reason": reason}),
        )
    }

    #[must_use]
    pub fn invalid_param(name: &str, value: &str) -> Self {
        Self::new(
            ApiErrorCode::InvalidQueryParameter,
            format!("invalid query parameter: {name}"),
            json!({"parameter": name, "value": value}),
        )
    }

    #[must_use]
    pub fn missing_param(name: &str) -> Self {
        Self::new(
            ApiErrorCode::InvalidQueryParameter,
            format!("missing query parameter: {name}"),
            json!({"parameter": name}),
        )
    }

    #[must_use]
    pub fn validation_failed(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self::new(
            ApiErrorCode::ValidationFailed,
            "validation failed",
            json!({"reason": reason}),
        )
    }

    #[must_use]
    pub fn invalid_cursor(value: &str) -> Self {
        Self::new(
            ApiErrorCode::InvalidCursor,
            "invalid cursor",
            json!({"cursor": value}),
        )
    }

    #[must_use]
    pub fn unauthorized(reason: &str) -> Self {
        Self::new(
            ApiErrorCode::Unauthorized,
            "authentication required",
            json!({"reason": reason}),
        )
    }

    #[must_use]
    pub fn forbidden(reason: &str) -> Self {
        Self::new(ApiErrorCode::Forbidden, "forbidden", json!({"reason": reason}))
    }

    #[must_use]
    pub fn not_found(kind: &str, id: &str) -> Self {
        Self::new(
            ApiErrorCode::NotFound,
            format!("{kind} not found"),
            json!({"kind": kind, "id": id}),
        )
    }

    #[must_use]
    pub fn duplicate_email(email: &str) -> Self {
        Self::new(
            ApiErrorCode::DuplicateEmail,
            "email already registered",
            json!({"email": email}),
        )
    }

    #[must_use]
    pub fn duplicate_review(order_id: &str) -> Self {
        Self::new(
            ApiErrorCode::DuplicateReview,
            "order already reviewed",
            json!({"order_id": order_id}),
        )
    }

    #[must_use]
    pub fn wallet_insufficient(required_cents: i64, balance_cents: i64) -> Self {
        Self::new(
            ApiErrorCode::WalletInsufficient,
            "wallet balance insufficient",
            json!({"required_cents": required_cents, "balance_cents": balance_cents}),
        )
    }

    #[must_use]
    pub fn offer_already_claimed(delivery_id: &str) -> Self {
        Self::new(
            ApiErrorCode::OfferAlreadyClaimed,
            "delivery offer already claimed",
            json!({"delivery_id": delivery_id}),
        )
    }

    #[must_use]
    pub fn cancellation_window_closed(deliver_at: &str) -> Self {
        Self::new(
            ApiErrorCode::CancellationWindowClosed,
            "order can no longer be cancelled",
            json!({"deliver_at": deliver_at}),
        )
    }

    #[must_use]
    pub fn invalid_transition(from: &str, to: &str) -> Self {
        Self::new(
            ApiErrorCode::InvalidTransition,
            format!("cannot transition from {from} to {to}"),
            json!({"from": from, "to": to}),
        )
    }

    #[must_use]
    pub fn rate_limited() -> Self {
        Self::new(ApiErrorCode::RateLimited, "rate limited", json!({}))
    }

    #[must_use]
    pub fn payload_too_large(limit_bytes: usize) -> Self {
        Self::new(
            ApiErrorCode::PayloadTooLarge,
            "payload too large",
            json!({"limit_bytes": limit_bytes}),
        )
    }

    #[must_use]
    pub fn upstream_failed(what: &str) -> Self {
        Self::new(
            ApiErrorCode::UpstreamFailed,
            format!("upstream {what} failed"),
            json!({"upstream": what}),
        )
    }

    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(ApiErrorCode::Internal, "internal error", json!({"reason": message}))
    }

    /// The wire envelope: `{"error": {...}}`.
    #[must_use]
    pub fn to_body(&self) -> Value {
        json!({
            "error": {
                "code": self.code,
                "message": self.message,
                "details": self.details,
            }
        })
    }
}

const _: fn() = || {
    fn assert_traits<T: Serialize + for<'de> Deserialize<'de>>() {}
    assert_traits::<ApiErrorCode>();
    assert_traits::<ApiError>();
};

#[cfg(test)]
mod tests {
    use super::{ApiError, ApiErrorCode};

    #[test]
    fn statuses_follow_the_envelope_contract() {
        assert_eq!(ApiErrorCode::ValidationFailed.http_status(), 400);
        assert_eq!(ApiErrorCode::Unauthorized.http_status(), 401);
        assert_eq!(ApiErrorCode::Forbidden.http_status(), 403);
        assert_eq!(ApiErrorCode::NotFound.http_status(), 404);
        assert_eq!(ApiErrorCode::OfferAlreadyClaimed.http_status(), 409);
        assert_eq!(ApiErrorCode::Internal.http_status(), 500);
    }

    #[test]
    fn error_body_nests_under_error_key() {
        let body = ApiError::not_found("order", "o-1").to_body();
        assert!(body.get("error").is_some());
        assert_eq!(body["error"]["details"]["id"], "o-1");
    }

    #[test]
    fn wallet_error_carries_both_amounts() {
        let e = ApiError::wallet_insufficient(1500, 900);
        assert_eq!(e.details["required_cents"], 1500);
        assert_eq!(e.details["balance_cents"], 900);
    }
}
