use std::path::PathBuf;
use std::time::Duration;
use tiffin_model::DeliveryFeePolicy;

pub const CONFIG_SCHEMA_VERSION: &str = "1";

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub capacity: f64,
    pub refill_per_sec: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: 30.0,
            refill_per_sec: 10.0,
        }
    }
}

/// Reward amounts credited on delivered orders. The referral reward pays
/// the referrer once, on the referee's first delivered order; the loyalty
/// bonus pays the customer on every `loyalty_every_orders`th delivery.
#[derive(Debug, Clone)]
pub struct RewardsConfig {
    pub referral_reward_cents: i64,
    pub loyalty_every_orders: u64,
    pub loyalty_bonus_cents: i64,
}

impl Default for RewardsConfig {
    fn default() -> Self {
        Self {
            referral_reward_cents: 500,
            loyalty_every_orders: 5,
            loyalty_bonus_cents: 300,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub max_body_bytes: usize,
    pub token_secret: String,
    pub token_ttl: Duration,
    pub pbkdf2_rounds: u32,
    pub webhook_secret: String,
    pub min_topup_cents: i64,
    pub max_topup_cents: i64,
    pub cancellation_window: Duration,
    pub delivery_fee: DeliveryFeePolicy,
    pub max_upload_bytes: usize,
    pub offers_page_limit: usize,
    pub auth_rate_limit: RateLimitConfig,
    pub rewards: RewardsConfig,
    pub mail_from: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: 256 * 1024,
            token_secret: "tiffin-dev-secret".to_string(),
            token_ttl: Duration::from_secs(7 * 24 * 3600),
            pbkdf2_rounds: 210_000,
            webhook_secret: "tiffin-dev-webhook".to_string(),
            min_topup_cents: 100,
            max_topup_cents: 500_000,
            cancellation_window: Duration::from_secs(3 * 3600),
            delivery_fee: DeliveryFeePolicy::default(),
            max_upload_bytes: 5 * 1024 * 1024,
            offers_page_limit: 50,
            auth_rate_limit: RateLimitConfig::default(),
            rewards: RewardsConfig::default(),
            mail_from: "no-reply@tiffin.example".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub db_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("tiffin.db"),
        }
    }
}

pub fn validate_startup_config_contract(
    api: &ApiConfig,
    store: &StoreConfig,
) -> Result<(), String> {
    if api.max_body_bytes == 0 || api.max_upload_bytes == 0 {
        return Err("api size limits must be > 0".to_string());
    }
    if api.token_secret.is_empty() || api.webhook_secret.is_empty() {
        return Err("auth secrets must be non-empty".to_string());
    }
    if api.token_ttl.is_zero() {
        return Err("token ttl must be > 0".to_string());
    }
    if api.pbkdf2_rounds == 0 {
        return Err("pbkdf2 rounds must be > 0".to_string());
    }
    if api.min_topup_cents <= 0 || api.max_topup_cents < api.min_topup_cents {
        return Err("topup bounds contract requires 0 < min <= max".to_string());
    }
    if api.cancellation_window.is_zero() {
        return Err("cancellation window must be > 0".to_string());
    }
    if api.delivery_fee.base_fee_cents < 0 || api.delivery_fee.free_over_cents < 0 {
        return Err("delivery fee policy must be non-negative".to_string());
    }
    if api.offers_page_limit == 0 {
        return Err("offers page limit must be > 0".to_string());
    }
    if api.auth_rate_limit.capacity < 1.0 || api.auth_rate_limit.refill_per_sec <= 0.0 {
        return Err("auth rate limit requires capacity >= 1 and refill > 0".to_string());
    }
    if api.rewards.loyalty_every_orders == 0 {
        return Err("loyalty milestone must be > 0".to_string());
    }
    if api.rewards.referral_reward_cents < 0 || api.rewards.loyalty_bonus_cents < 0 {
        return Err("reward amounts must be non-negative".to_string());
    }
    if store.db_path.as_os_str().is_empty() {
        return Err("store db path must be non-empty".to_string());
    }
    Ok(())
}
