// SPDX-License-Identifier: Apache-2.0

//! `reqwest` implementations of the provider seams. Every call runs a
//! bounded retry with linear backoff; callers decide whether a final
//! failure is fatal (payments) or logged and ignored (everything else).

use crate::integrations::{
    webhook_signature, Geocoder, ImageHost, IntegrationError, PaymentProvider, ProviderSession,
    RetryPolicy, StockPhotos,
};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tiffin_model::{Address, GeoPoint};
use tracing::instrument;

fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(15))
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

async fn backoff(retry: &RetryPolicy, attempt: usize) {
    tokio::time::sleep(Duration::from_millis(
        retry.base_backoff_ms.saturating_mul(attempt as u64),
    ))
    .await;
}

/// Hosted-checkout gateway speaking a Stripe-shaped sessions API.
pub struct StripeLikeGateway {
    base_url: String,
    secret_key: String,
    webhook_secret: Vec<u8>,
    retry: RetryPolicy,
}

#[derive(Deserialize)]
struct GatewaySession {
    id: String,
    url: String,
}

impl StripeLikeGateway {
    #[must_use]
    pub fn new(base_url: String, secret_key: String, webhook_secret: String, retry: RetryPolicy) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            secret_key,
            webhook_secret: webhook_secret.into_bytes(),
            retry,
        }
    }
}

#[async_trait]
impl PaymentProvider for StripeLikeGateway {
    #[instrument(name = "payments_create_session", skip(self, description))]
    async fn create_checkout_session(
        &self,
        reference: &str,
        amount_cents: i64,
        description: &str,
    ) -> Result<ProviderSession, IntegrationError> {
        let url = format!("{}/v1/checkout/sessions", self.base_url);
        let amount = amount_cents.to_string();
        let form = [
            ("client_reference_id", reference),
            ("amount", amount.as_str()),
            ("currency", "inr"),
            ("description", description),
        ];
        let client = client();
        let mut attempt = 0;
        loop {
            attempt += 1;
            let req = client
                .post(&url)
                .bearer_auth(&self.secret_key)
                .form(&form);
            match req.send().await {
                Ok(resp) if resp.status().is_success() => {
                    let session: GatewaySession = resp
                        .json()
                        .await
                        .map_err(|e| IntegrationError(format!("session parse failed: {e}")))?;
                    return Ok(ProviderSession {
                        session_id: session.id,
                        checkout_url: session.url,
                    });
                }
                Ok(resp) => {
                    if attempt >= self.retry.max_attempts {
                        return Err(IntegrationError(format!(
                            "session create failed status={}",
                            resp.status()
                        )));
                    }
                }
                Err(e) => {
                    if attempt >= self.retry.max_attempts {
                        return Err(IntegrationError(format!("session create failed: {e}")));
                    }
                }
            }
            backoff(&self.retry, attempt).await;
        }
    }

    fn verify_webhook_signature(&self, body: &[u8], signature: &str) -> bool {
        webhook_signature(&self.webhook_secret, body) == signature
    }
}

/// Image host speaking a Cloudinary-shaped unsigned-upload API.
pub struct CloudinaryLikeHost {
    base_url: String,
    upload_preset: String,
    retry: RetryPolicy,
}

#[derive(Deserialize)]
struct UploadResponse {
    secure_url: String,
}

impl CloudinaryLikeHost {
    #[must_use]
    pub fn new(base_url: String, upload_preset: String, retry: RetryPolicy) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            upload_preset,
            retry,
        }
    }
}

#[async_trait]
impl ImageHost for CloudinaryLikeHost {
    #[instrument(name = "images_upload", skip(self, data_base64))]
    async fn upload_base64(
        &self,
        filename: &str,
        data_base64: &str,
    ) -> Result<String, IntegrationError> {
        let url = format!("{}/image/upload", self.base_url);
        let file = format!("data:application/octet-stream;base64,{data_base64}");
        let client = client();
        let mut attempt = 0;
        loop {
            attempt += 1;
            let form = [
                ("file", file.as_str()),
                ("upload_preset", self.upload_preset.as_str()),
                ("public_id", filename),
            ];
            let req = client.post(&url).form(&form);
            match req.send().await {
                Ok(resp) if resp.status().is_success() => {
                    let uploaded: UploadResponse = resp
                        .json()
                        .await
                        .map_err(|e| IntegrationError(format!("upload parse failed: {e}")))?;
                    return Ok(uploaded.secure_url);
                }
                Ok(resp) => {
                    if attempt >= self.retry.max_attempts {
                        return Err(IntegrationError(format!(
                            "upload failed status={}",
                            resp.status()
                        )));
                    }
                }
                Err(e) => {
                    if attempt >= self.retry.max_attempts {
                        return Err(IntegrationError(format!("upload failed: {e}")));
                    }
                }
            }
            backoff(&self.retry, attempt).await;
        }
    }
}

/// Forward geocoder speaking the Nominatim search API. The service
/// requires an identifying `User-Agent` on every request.
pub struct NominatimGeocoder {
    base_url: String,
    user_agent: String,
    retry: RetryPolicy,
}

#[derive(Deserialize)]
struct GeocodeHit {
    lat: String,
    lon: String,
}

impl NominatimGeocoder {
    #[must_use]
    pub fn new(base_url: String, user_agent: String, retry: RetryPolicy) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            user_agent,
            retry,
        }
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    #[instrument(name = "geocoder_forward", skip(self, address))]
    async fn forward_geocode(
        &self,
        address: &Address,
    ) -> Result<Option<GeoPoint>, IntegrationError> {
        let url = format!("{}/search", self.base_url);
        let query = address.geocode_query();
        let client = client();
        let mut attempt = 0;
        loop {
            attempt += 1;
            let req = client
                .get(&url)
                .header("user-agent", &self.user_agent)
                .query(&[("format", "json"), ("limit", "1"), ("q", query.as_str())]);
            match req.send().await {
                Ok(resp) if resp.status().is_success() => {
                    let hits: Vec<GeocodeHit> = resp
                        .json()
                        .await
                        .map_err(|e| IntegrationError(format!("geocode parse failed: {e}")))?;
                    let Some(hit) = hits.first() else {
                        return Ok(None);
                    };
                    let lat = hit
                        .lat
                        .parse::<f64>()
                        .map_err(|e| IntegrationError(format!("geocode lat parse failed: {e}")))?;
                    let lng = hit
                        .lon
                        .parse::<f64>()
                        .map_err(|e| IntegrationError(format!("geocode lon parse failed: {e}")))?;
                    return GeoPoint::new(lat, lng)
                        .map(Some)
                        .map_err(|e| IntegrationError(format!("geocode out of range: {e}")));
                }
                Ok(resp) => {
                    if attempt >= self.retry.max_attempts {
                        return Err(IntegrationError(format!(
                            "geocode failed status={}",
                            resp.status()
                        )));
                    }
                }
                Err(e) => {
                    if attempt >= self.retry.max_attempts {
                        return Err(IntegrationError(format!("geocode failed: {e}")));
                    }
                }
            }
            backoff(&self.retry, attempt).await;
        }
    }
}

/// Stock photo search speaking a Pexels-shaped API with an
/// `Authorization` key header.
pub struct PexelsLikePhotos {
    base_url: String,
    api_key: String,
    retry: RetryPolicy,
}

#[derive(Deserialize)]
struct PhotoSearchResponse {
    photos: Vec<PhotoHit>,
}

#[derive(Deserialize)]
struct PhotoHit {
    src: PhotoSources,
}

#[derive(Deserialize)]
struct PhotoSources {
    medium: String,
}

impl PexelsLikePhotos {
    #[must_use]
    pub fn new(base_url: String, api_key: String, retry: RetryPolicy) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            retry,
        }
    }
}

#[async_trait]
impl StockPhotos for PexelsLikePhotos {
    #[instrument(name = "photos_search", skip(self))]
    async fn photo_url(&self, keywords: &str) -> Result<Option<String>, IntegrationError> {
        let url = format!("{}/v1/search", self.base_url);
        let client = client();
        let mut attempt = 0;
        loop {
            attempt += 1;
            let req = client
                .get(&url)
                .header("authorization", &self.api_key)
                .query(&[("query", keywords), ("per_page", "1")]);
            match req.send().await {
                Ok(resp) if resp.status().is_success() => {
                    let found: PhotoSearchResponse = resp
                        .json()
                        .await
                        .map_err(|e| IntegrationError(format!("photo parse failed: {e}")))?;
                    return Ok(found.photos.into_iter().next().map(|hit| hit.src.medium));
                }
                Ok(resp) => {
                    if attempt >= self.retry.max_attempts {
                        return Err(IntegrationError(format!(
                            "photo search failed status={}",
                            resp.status()
                        )));
                    }
                }
                Err(e) => {
                    if attempt >= self.retry.max_attempts {
                        return Err(IntegrationError(format!("photo search failed: {e}")));
                    }
                }
            }
            backoff(&self.retry, attempt).await;
        }
    }
}
