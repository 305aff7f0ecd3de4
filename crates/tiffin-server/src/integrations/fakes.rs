// SPDX-License-Identifier: Apache-2.0

use crate::integrations::{
    webhook_signature, Geocoder, ImageHost, IntegrationError, Mailer, PaymentProvider,
    ProviderSession, StockPhotos,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tiffin_model::{Address, GeoPoint};
use tokio::sync::Mutex;

pub const FAKE_WEBHOOK_SECRET: &str = "tiffin-fake-webhook-secret";

pub struct FakePayments {
    secret: Vec<u8>,
    counter: AtomicU64,
    pub sessions: Mutex<Vec<ProviderSession>>,
    pub fail: AtomicBool,
}

impl FakePayments {
    #[must_use]
    pub fn new(secret: &str) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
            counter: AtomicU64::new(1),
            sessions: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
        }
    }

    /// Signs a body the way the provider would; webhook tests use this to
    /// build valid deliveries.
    #[must_use]
    pub fn sign(&self, body: &[u8]) -> String {
        webhook_signature(&self.secret, body)
    }
}

impl Default for FakePayments {
    fn default() -> Self {
        Self::new(FAKE_WEBHOOK_SECRET)
    }
}

#[async_trait]
impl PaymentProvider for FakePayments {
    async fn create_checkout_session(
        &self,
        reference: &str,
        amount_cents: i64,
        _description: &str,
    ) -> Result<ProviderSession, IntegrationError> {
        if self.fail.load(Ordering::Relaxed) {
            return Err(IntegrationError("gateway unavailable".to_string()));
        }
        if amount_cents <= 0 {
            return Err(IntegrationError(format!(
                "refusing non-positive amount {amount_cents}"
            )));
        }
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        let session = ProviderSession {
            session_id: format!("cs_fake_{n:08}_{reference}"),
            checkout_url: format!("https://checkout.fake.tiffin/cs_fake_{n:08}"),
        };
        self.sessions.lock().await.push(session.clone());
        Ok(session)
    }

    fn verify_webhook_signature(&self, body: &[u8], signature: &str) -> bool {
        webhook_signature(&self.secret, body) == signature
    }
}

#[derive(Default)]
pub struct FakeImageHost {
    pub uploads: Mutex<Vec<(String, usize)>>,
    pub fail: AtomicBool,
}

#[async_trait]
impl ImageHost for FakeImageHost {
    async fn upload_base64(
        &self,
        filename: &str,
        data_base64: &str,
    ) -> Result<String, IntegrationError> {
        if self.fail.load(Ordering::Relaxed) {
            return Err(IntegrationError("image host unavailable".to_string()));
        }
        self.uploads
            .lock()
            .await
            .push((filename.to_string(), data_base64.len()));
        Ok(format!("https://images.fake.tiffin/{filename}"))
    }
}

pub struct FakeGeocoder {
    pub point: Mutex<Option<GeoPoint>>,
    pub calls: AtomicU64,
}

impl Default for FakeGeocoder {
    fn default() -> Self {
        Self {
            point: Mutex::new(GeoPoint::new(12.9716, 77.5946).ok()),
            calls: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl Geocoder for FakeGeocoder {
    async fn forward_geocode(
        &self,
        _address: &Address,
    ) -> Result<Option<GeoPoint>, IntegrationError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        Ok(*self.point.lock().await)
    }
}

#[derive(Default)]
pub struct FakeStockPhotos {
    pub queries: Mutex<Vec<String>>,
}

#[async_trait]
impl StockPhotos for FakeStockPhotos {
    async fn photo_url(&self, keywords: &str) -> Result<Option<String>, IntegrationError> {
        self.queries.lock().await.push(keywords.to_string());
        let slug: String = keywords
            .trim()
            .to_ascii_lowercase()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
            .collect();
        Ok(Some(format!("https://photos.fake.tiffin/{slug}")))
    }
}

#[derive(Default)]
pub struct FakeMailer {
    pub sent: Mutex<Vec<(String, String, String)>>,
}

#[async_trait]
impl Mailer for FakeMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), IntegrationError> {
        self.sent
            .lock()
            .await
            .push((to.to_string(), subject.to_string(), body.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fake_gateway_signs_and_verifies_its_own_bodies() {
        let gateway = FakePayments::default();
        let body = br#"{"event_type":"checkout.completed","session_id":"cs_fake_1"}"#;
        let signature = gateway.sign(body);
        assert!(gateway.verify_webhook_signature(body, &signature));
        assert!(!gateway.verify_webhook_signature(body, "deadbeef"));
        assert!(!gateway.verify_webhook_signature(b"tampered", &signature));
    }

    #[tokio::test]
    async fn fake_gateway_mints_distinct_sessions() {
        let gateway = FakePayments::default();
        let a = gateway
            .create_checkout_session("ref-a", 1000, "test")
            .await
            .expect("session");
        let b = gateway
            .create_checkout_session("ref-b", 2000, "test")
            .await
            .expect("session");
        assert_ne!(a.session_id, b.session_id);
        assert_eq!(gateway.sessions.lock().await.len(), 2);
    }
}
