#![forbid(unsafe_code)]

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Path, Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, patch, post};
use axum::{Json, Router};
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tiffin_api::ApiError;
use tiffin_model::{
    checked_sum_cents, normalize_email, parse_service_date, validate_password, Address, Delivery,
    DeliveryId, DeliveryStatus, GeoPoint, MealSelection, MealType, MenuItem, MenuItemId, Order,
    OrderId, OrderLine, OrderStatus, PaymentKind, PaymentMethod, PlanDay, Referral, ReferralId,
    Review, ReviewId, Role, Subscription, SubscriptionId, SubscriptionStatus, User, UserId,
};
use tiffin_store::{
    CheckoutPurpose, CheckoutSession, ClaimOutcome, DebitOutcome, InsertReviewOutcome,
    InsertUserOutcome, OrderOwner, PageAfter, Store, StoreError,
};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

mod auth;
mod config;
mod http;
mod integrations;
mod middleware;
mod telemetry;

pub const CRATE_NAME: &str = "tiffin-server";

#[derive(Default)]
struct RequestMetrics {
    counts: Mutex<HashMap<(String, u16), u64>>,
    latency_ns: Mutex<HashMap<String, Vec<u64>>>,
}

impl RequestMetrics {
    pub(crate) async fn observe_request(&self, route: &str, status: StatusCode, latency: Duration) {
        let mut counts = self.counts.lock().await;
        *counts
            .entry((route.to_string(), status.as_u16()))
            .or_insert(0) += 1;
        drop(counts);
        let mut latency_map = self.latency_ns.lock().await;
        latency_map
            .entry(route.to_string())
            .or_insert_with(Vec::new)
            .push(latency.as_nanos() as u64);
    }
}

pub use config::{
    validate_startup_config_contract, ApiConfig, RateLimitConfig, RewardsConfig, StoreConfig,
    CONFIG_SCHEMA_VERSION,
};
pub use integrations::{
    CloudinaryLikeHost, FakeGeocoder, FakeImageHost, FakeMailer, FakePayments, FakeStockPhotos,
    Geocoder, ImageHost, IntegrationError, Integrations, Mailer, NominatimGeocoder,
    PaymentProvider, PexelsLikePhotos, ProviderSession, RetryPolicy, SmtpMailer, StockPhotos,
    StripeLikeGateway, FAKE_WEBHOOK_SECRET,
};

use telemetry::rate_limiter::RateLimiter;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub api: ApiConfig,
    pub integrations: Integrations,
    pub ready: Arc<AtomicBool>,
    pub(crate) metrics: Arc<RequestMetrics>,
    pub(crate) request_id_seed: Arc<AtomicU64>,
    pub(crate) auth_limiter: Arc<RateLimiter>,
}

impl AppState {
    #[must_use]
    pub fn new(store: Arc<Store>, integrations: Integrations) -> Self {
        Self::with_config(store, integrations, ApiConfig::default())
    }

    #[must_use]
    pub fn with_config(store: Arc<Store>, integrations: Integrations, api: ApiConfig) -> Self {
        Self {
            store,
            api,
            integrations,
            ready: Arc::new(AtomicBool::new(true)),
            metrics: Arc::new(RequestMetrics::default()),
            request_id_seed: Arc::new(AtomicU64::new(1)),
            auth_limiter: Arc::new(RateLimiter::new("auth")),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(http::healthz_handler))
        .route("/readyz", get(http::readyz_handler))
        .route("/metrics", get(telemetry::metrics_endpoint::metrics_handler))
        .route("/v1/version", get(http::version_handler))
        .route(
            "/v1/auth/register",
            post(http::auth_endpoints::register_handler),
        )
        .route("/v1/auth/login", post(http::auth_endpoints::login_handler))
        .route(
            "/v1/auth/me",
            get(http::auth_endpoints::me_handler).patch(http::auth_endpoints::update_me_handler),
        )
        .route(
            "/v1/restaurants",
            get(http::restaurant_endpoints::restaurants_handler),
        )
        .route(
            "/v1/restaurants/:id",
            get(http::restaurant_endpoints::restaurant_handler),
        )
        .route(
            "/v1/menu",
            get(http::menu_endpoints::menu_handler)
                .post(http::menu_endpoints::create_menu_item_handler),
        )
        .route(
            "/v1/menu/:id",
            patch(http::menu_endpoints::update_menu_item_handler)
                .delete(http::menu_endpoints::delete_menu_item_handler),
        )
        .route(
            "/v1/orders",
            post(http::order_endpoints::create_order_handler)
                .get(http::order_endpoints::orders_handler),
        )
        .route("/v1/orders/:id", get(http::order_endpoints::order_handler))
        .route(
            "/v1/orders/:id/status",
            patch(http::order_endpoints::update_order_status_handler),
        )
        .route(
            "/v1/orders/:id/cancel",
            post(http::order_endpoints::cancel_order_handler),
        )
        .route("/v1/wallet", get(http::payment_endpoints::wallet_handler))
        .route(
            "/v1/wallet/topup",
            post(http::payment_endpoints::topup_handler),
        )
        .route(
            "/v1/payments/checkout",
            post(http::payment_endpoints::checkout_handler),
        )
        .route(
            "/v1/payments/webhook",
            post(http::payment_endpoints::webhook_handler),
        )
        .route(
            "/v1/deliveries/offers",
            get(http::delivery_endpoints::offers_handler),
        )
        .route(
            "/v1/deliveries/:id",
            get(http::delivery_endpoints::delivery_handler),
        )
        .route(
            "/v1/deliveries/:id/claim",
            post(http::delivery_endpoints::claim_delivery_handler),
        )
        .route(
            "/v1/deliveries/:id/status",
            patch(http::delivery_endpoints::update_delivery_status_handler),
        )
        .route(
            "/v1/deliveries/:id/location",
            patch(http::delivery_endpoints::update_delivery_location_handler),
        )
        .route(
            "/v1/subscriptions",
            post(http::subscription_endpoints::create_subscription_handler)
                .get(http::subscription_endpoints::subscriptions_handler),
        )
        .route(
            "/v1/subscriptions/:id",
            get(http::subscription_endpoints::subscription_handler),
        )
        .route(
            "/v1/subscriptions/:id/pause",
            post(http::subscription_endpoints::pause_subscription_handler),
        )
        .route(
            "/v1/subscriptions/:id/resume",
            post(http::subscription_endpoints::resume_subscription_handler),
        )
        .route(
            "/v1/subscriptions/:id/cancel",
            post(http::subscription_endpoints::cancel_subscription_handler),
        )
        .route(
            "/v1/reviews",
            post(http::review_endpoints::create_review_handler)
                .get(http::review_endpoints::reviews_handler),
        )
        .route(
            "/v1/referrals",
            get(http::auth_endpoints::referrals_handler),
        )
        .route("/v1/upload", post(http::menu_endpoints::upload_handler))
        .route(
            "/v1/admin/users",
            get(http::admin_endpoints::admin_users_handler),
        )
        .route(
            "/v1/admin/users/:id/approval",
            patch(http::admin_endpoints::admin_approval_handler),
        )
        .route(
            "/v1/admin/orders",
            get(http::admin_endpoints::admin_orders_handler),
        )
        .route(
            "/v1/admin/stats",
            get(http::admin_endpoints::admin_stats_handler),
        )
        .route(
            "/v1/admin/reviews/:id",
            delete(http::admin_endpoints::admin_delete_review_handler),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::request_tracing::request_tracing_middleware,
        ))
        .layer(DefaultBodyLimit::max(state.api.max_body_bytes))
        .with_state(state)
}
