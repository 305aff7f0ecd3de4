#![forbid(unsafe_code)]

use std::env;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tiffin_model::DeliveryFeePolicy;
use tiffin_server::{
    build_router, validate_startup_config_contract, ApiConfig, AppState, CloudinaryLikeHost,
    Integrations, NominatimGeocoder, PexelsLikePhotos, RateLimitConfig, RetryPolicy,
    RewardsConfig, SmtpMailer, StoreConfig, StripeLikeGateway,
};
use tiffin_store::Store;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn env_bool(name: &str, default: bool) -> bool {
    env::var(name)
        .ok()
        .and_then(|v| match v.as_str() {
            "1" | "true" | "TRUE" | "yes" | "YES" => Some(true),
            "0" | "false" | "FALSE" | "no" | "NO" => Some(false),
            _ => None,
        })
        .unwrap_or(default)
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_i64(name: &str, default: i64) -> i64 {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(default)
}

fn env_usize(name: &str, default: usize) -> usize {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(default)
}

fn env_f64(name: &str, default: f64) -> f64 {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<f64>().ok())
        .unwrap_or(default)
}

fn env_duration_secs(name: &str, default_secs: u64) -> Duration {
    Duration::from_secs(env_u64(name, default_secs))
}

/// Real providers come up only when their credentials are set; everything
/// else stays on the in-memory fakes so a bare `tiffin-server` run works.
fn build_integrations(api: &ApiConfig) -> Result<Integrations, String> {
    let retry = RetryPolicy {
        max_attempts: env_usize("TIFFIN_PROVIDER_RETRY_ATTEMPTS", 3),
        base_backoff_ms: env_u64("TIFFIN_PROVIDER_RETRY_BASE_MS", 120),
    };
    let mut integrations = Integrations::fakes();

    if let Ok(base_url) = env::var("TIFFIN_PAYMENTS_BASE_URL") {
        let secret_key = env::var("TIFFIN_PAYMENTS_SECRET_KEY").map_err(|_| {
            "TIFFIN_PAYMENTS_SECRET_KEY is required when TIFFIN_PAYMENTS_BASE_URL is set"
                .to_string()
        })?;
        integrations.payments = Arc::new(StripeLikeGateway::new(
            base_url,
            secret_key,
            api.webhook_secret.clone(),
            retry.clone(),
        ));
        info!("payments provider: gateway");
    }
    if let Ok(base_url) = env::var("TIFFIN_IMAGES_BASE_URL") {
        let preset = env::var("TIFFIN_IMAGES_UPLOAD_PRESET").map_err(|_| {
            "TIFFIN_IMAGES_UPLOAD_PRESET is required when TIFFIN_IMAGES_BASE_URL is set"
                .to_string()
        })?;
        integrations.images = Arc::new(CloudinaryLikeHost::new(base_url, preset, retry.clone()));
        info!("image host: hosted");
    }
    if let Ok(base_url) = env::var("TIFFIN_GEOCODER_BASE_URL") {
        let user_agent = env::var("TIFFIN_GEOCODER_USER_AGENT")
            .unwrap_or_else(|_| "tiffin-server (ops@tiffin.example)".to_string());
        integrations.geocoder = Arc::new(NominatimGeocoder::new(
            base_url,
            user_agent,
            retry.clone(),
        ));
        info!("geocoder: live");
    }
    if let Ok(base_url) = env::var("TIFFIN_PHOTOS_BASE_URL") {
        let api_key = env::var("TIFFIN_PHOTOS_API_KEY").map_err(|_| {
            "TIFFIN_PHOTOS_API_KEY is required when TIFFIN_PHOTOS_BASE_URL is set".to_string()
        })?;
        integrations.photos = Arc::new(PexelsLikePhotos::new(base_url, api_key, retry));
        info!("stock photos: live");
    }
    if let Ok(host) = env::var("TIFFIN_SMTP_HOST") {
        let port = env_u64("TIFFIN_SMTP_PORT", 25) as u16;
        let credentials = match (
            env::var("TIFFIN_SMTP_USERNAME").ok(),
            env::var("TIFFIN_SMTP_PASSWORD").ok(),
        ) {
            (Some(username), Some(password)) => Some((username, password)),
            (None, None) => None,
            _ => {
                return Err(
                    "TIFFIN_SMTP_USERNAME and TIFFIN_SMTP_PASSWORD must be set together"
                        .to_string(),
                )
            }
        };
        integrations.mailer = Arc::new(SmtpMailer::new(
            host,
            port,
            api.mail_from.clone(),
            credentials,
        ));
        info!("mailer: smtp relay");
    }

    Ok(integrations)
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("register SIGTERM");
        let mut sigint = signal(SignalKind::interrupt()).expect("register SIGINT");
        tokio::select! {
            _ = sigterm.recv() => {}
            _ = sigint.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if env_bool("TIFFIN_LOG_JSON", true) {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), String> {
    init_tracing();

    let bind_addr = env::var("TIFFIN_BIND").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let defaults = ApiConfig::default();
    let api_cfg = ApiConfig {
        max_body_bytes: env_usize("TIFFIN_MAX_BODY_BYTES", defaults.max_body_bytes),
        token_secret: env::var("TIFFIN_TOKEN_SECRET").unwrap_or(defaults.token_secret),
        token_ttl: env_duration_secs("TIFFIN_TOKEN_TTL_SECS", defaults.token_ttl.as_secs()),
        pbkdf2_rounds: env_u64("TIFFIN_PBKDF2_ROUNDS", u64::from(defaults.pbkdf2_rounds)) as u32,
        webhook_secret: env::var("TIFFIN_WEBHOOK_SECRET").unwrap_or(defaults.webhook_secret),
        min_topup_cents: env_i64("TIFFIN_MIN_TOPUP_CENTS", defaults.min_topup_cents),
        max_topup_cents: env_i64("TIFFIN_MAX_TOPUP_CENTS", defaults.max_topup_cents),
        cancellation_window: env_duration_secs(
            "TIFFIN_CANCELLATION_WINDOW_SECS",
            defaults.cancellation_window.as_secs(),
        ),
        delivery_fee: DeliveryFeePolicy {
            base_fee_cents: env_i64(
                "TIFFIN_DELIVERY_BASE_FEE_CENTS",
                defaults.delivery_fee.base_fee_cents,
            ),
            free_over_cents: env_i64(
                "TIFFIN_DELIVERY_FREE_OVER_CENTS",
                defaults.delivery_fee.free_over_cents,
            ),
        },
        max_upload_bytes: env_usize("TIFFIN_MAX_UPLOAD_BYTES", defaults.max_upload_bytes),
        offers_page_limit: env_usize("TIFFIN_OFFERS_PAGE_LIMIT", defaults.offers_page_limit),
        auth_rate_limit: RateLimitConfig {
            capacity: env_f64(
                "TIFFIN_AUTH_RATE_LIMIT_CAPACITY",
                defaults.auth_rate_limit.capacity,
            ),
            refill_per_sec: env_f64(
                "TIFFIN_AUTH_RATE_LIMIT_REFILL_PER_SEC",
                defaults.auth_rate_limit.refill_per_sec,
            ),
        },
        rewards: RewardsConfig {
            referral_reward_cents: env_i64(
                "TIFFIN_REFERRAL_REWARD_CENTS",
                defaults.rewards.referral_reward_cents,
            ),
            loyalty_every_orders: env_u64(
                "TIFFIN_LOYALTY_EVERY_ORDERS",
                defaults.rewards.loyalty_every_orders,
            ),
            loyalty_bonus_cents: env_i64(
                "TIFFIN_LOYALTY_BONUS_CENTS",
                defaults.rewards.loyalty_bonus_cents,
            ),
        },
        mail_from: env::var("TIFFIN_MAIL_FROM").unwrap_or(defaults.mail_from),
    };
    let store_cfg = StoreConfig {
        db_path: PathBuf::from(env::var("TIFFIN_DB_PATH").unwrap_or_else(|_| "tiffin.db".to_string())),
    };
    validate_startup_config_contract(&api_cfg, &store_cfg)?;

    let store =
        Arc::new(Store::open(&store_cfg.db_path).map_err(|e| format!("store open failed: {e}"))?);
    let integrations = build_integrations(&api_cfg)?;
    let state = AppState::with_config(store, integrations, api_cfg);
    let app = build_router(state.clone());

    let addr: std::net::SocketAddr = bind_addr
        .parse()
        .map_err(|e| format!("invalid bind addr {bind_addr}: {e}"))?;
    let socket = if addr.is_ipv4() {
        tokio::net::TcpSocket::new_v4().map_err(|e| format!("socket v4 failed: {e}"))?
    } else {
        tokio::net::TcpSocket::new_v6().map_err(|e| format!("socket v6 failed: {e}"))?
    };
    socket
        .set_reuseaddr(true)
        .map_err(|e| format!("set_reuseaddr failed: {e}"))?;
    socket
        .set_keepalive(env_bool("TIFFIN_TCP_KEEPALIVE_ENABLED", true))
        .map_err(|e| format!("set_keepalive failed: {e}"))?;
    socket.bind(addr).map_err(|e| format!("bind failed: {e}"))?;
    let listener: TcpListener = socket
        .listen(1024)
        .map_err(|e| format!("listen failed: {e}"))?;
    info!("tiffin-server listening on {bind_addr}");
    let ready = state.ready.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            wait_for_shutdown_signal().await;
            // Fail readiness first so load balancers stop routing to us,
            // then give in-flight requests time to drain.
            ready.store(false, Ordering::Relaxed);
            let drain_ms = env_u64("TIFFIN_SHUTDOWN_DRAIN_MS", 5000);
            tokio::time::sleep(Duration::from_millis(drain_ms)).await;
        })
        .await
        .map_err(|e| format!("server failed: {e}"))
}
