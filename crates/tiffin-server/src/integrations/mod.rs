// SPDX-License-Identifier: Apache-2.0

//! Outbound provider seams. Each boundary is a trait with a `reqwest`
//! production implementation and an in-memory fake; handlers treat all of
//! them as best-effort except payment session creation, which the caller
//! needs synchronously.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::sync::Arc;
use tiffin_model::{Address, GeoPoint};

mod fakes;
mod http_providers;
mod smtp;

pub use fakes::{
    FakeGeocoder, FakeImageHost, FakeMailer, FakePayments, FakeStockPhotos, FAKE_WEBHOOK_SECRET,
};
pub use http_providers::{CloudinaryLikeHost, NominatimGeocoder, PexelsLikePhotos, StripeLikeGateway};
pub use smtp::SmtpMailer;

#[derive(Debug)]
pub struct IntegrationError(pub String);

impl std::fmt::Display for IntegrationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl std::error::Error for IntegrationError {}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff_ms: 120,
        }
    }
}

/// Hosted checkout session minted by the payment provider. The session id
/// is the provider's identifier and is what the webhook later echoes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSession {
    pub session_id: String,
    pub checkout_url: String,
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// `reference` is our idempotency key for the session.
    async fn create_checkout_session(
        &self,
        reference: &str,
        amount_cents: i64,
        description: &str,
    ) -> Result<ProviderSession, IntegrationError>;

    /// Checks the shared-secret signature a webhook delivery carries.
    fn verify_webhook_signature(&self, body: &[u8], signature: &str) -> bool;
}

#[async_trait]
pub trait ImageHost: Send + Sync {
    /// Uploads a base64 payload and returns the hosted url.
    async fn upload_base64(
        &self,
        filename: &str,
        data_base64: &str,
    ) -> Result<String, IntegrationError>;
}

#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Forward-geocodes a postal address. `Ok(None)` means the provider
    /// answered but found nothing; that is not an error.
    async fn forward_geocode(&self, address: &Address)
        -> Result<Option<GeoPoint>, IntegrationError>;
}

#[async_trait]
pub trait StockPhotos: Send + Sync {
    async fn photo_url(&self, keywords: &str) -> Result<Option<String>, IntegrationError>;
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), IntegrationError>;
}

#[derive(Clone)]
pub struct Integrations {
    pub payments: Arc<dyn PaymentProvider>,
    pub images: Arc<dyn ImageHost>,
    pub geocoder: Arc<dyn Geocoder>,
    pub photos: Arc<dyn StockPhotos>,
    pub mailer: Arc<dyn Mailer>,
}

impl Integrations {
    /// In-memory stand-ins for every provider; tests and local runs
    /// without credentials use this set.
    #[must_use]
    pub fn fakes() -> Self {
        Self {
            payments: Arc::new(FakePayments::new(FAKE_WEBHOOK_SECRET)),
            images: Arc::new(FakeImageHost::default()),
            geocoder: Arc::new(FakeGeocoder::default()),
            photos: Arc::new(FakeStockPhotos::default()),
            mailer: Arc::new(FakeMailer::default()),
        }
    }
}

/// Webhook signature scheme shared by the real gateway and the fake:
/// lowercase hex of HMAC-SHA256 over the raw body.
pub(crate) fn webhook_signature(secret: &[u8], body: &[u8]) -> String {
    let mut mac = match Hmac::<Sha256>::new_from_slice(secret) {
        Ok(mac) => mac,
        // Hmac accepts keys of any length; unreachable in practice.
        Err(_) => return String::new(),
    };
    mac.update(body);
    let digest = mac.finalize().into_bytes();
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}
