// SPDX-License-Identifier: Apache-2.0

//! Shared fixture for the end-to-end tests: boots the server on an
//! ephemeral port against a throwaway on-disk store and keeps concrete
//! handles to the fake providers so tests can sign webhook deliveries
//! and read the mail outbox.

#![allow(dead_code)] // each test binary uses its own subset

use chrono::Utc;
use hmac::Hmac;
use serde_json::json;
use sha2::Sha256;
use std::net::SocketAddr;
use std::sync::Arc;
use tiffin_model::{Role, User, UserId};
use tiffin_server::{
    build_router, ApiConfig, AppState, FakeMailer, FakePayments, Integrations,
};
use tiffin_store::{InsertUserOutcome, Store};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

pub const ADMIN_EMAIL: &str = "admin@tiffin.example";
pub const ADMIN_PASSWORD: &str = "tiffin-admin-pass";

pub struct TestApp {
    pub addr: SocketAddr,
    pub state: AppState,
    pub payments: Arc<FakePayments>,
    pub mailer: Arc<FakeMailer>,
    _db_dir: tempfile::TempDir,
}

pub async fn spawn_app() -> TestApp {
    // Full-strength key derivation would dominate the test runtime.
    spawn_app_with(ApiConfig {
        pbkdf2_rounds: 1_000,
        ..ApiConfig::default()
    })
    .await
}

pub async fn spawn_app_with(api: ApiConfig) -> TestApp {
    let db_dir = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(Store::open(&db_dir.path().join("tiffin.sqlite")).expect("open store"));

    let payments = Arc::new(FakePayments::default());
    let mailer = Arc::new(FakeMailer::default());
    let mut integrations = Integrations::fakes();
    integrations.payments = payments.clone();
    integrations.mailer = mailer.clone();

    let state = AppState::with_config(store, integrations, api);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind listener");
    let addr = listener.local_addr().expect("local addr");
    let app = build_router(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve app");
    });

    TestApp {
        addr,
        state,
        payments,
        mailer,
        _db_dir: db_dir,
    }
}

impl TestApp {
    /// JSON request with an optional bearer token; panics on transport
    /// failure, returns whatever status and body the server produced.
    pub async fn request(
        &self,
        method: &str,
        path: &str,
        token: Option<&str>,
        body: Option<&serde_json::Value>,
    ) -> (u16, serde_json::Value) {
        let auth;
        let mut headers: Vec<(&str, &str)> = Vec::new();
        if let Some(token) = token {
            auth = format!("Bearer {token}");
            headers.push(("authorization", &auth));
        }
        let payload = body.map(std::string::ToString::to_string);
        let (status, _head, reply) =
            send_raw_with_method(self.addr, method, path, &headers, payload.as_deref()).await;
        (status, parse_json(&reply))
    }

    /// Registers over HTTP and returns the bearer token plus the user view.
    pub async fn register(&self, body: &serde_json::Value) -> (String, serde_json::Value) {
        let (status, reply) = self.request("POST", "/v1/auth/register", None, Some(body)).await;
        assert_eq!(status, 200, "register failed: {reply}");
        let token = reply["token"].as_str().expect("token").to_string();
        (token, reply["user"].clone())
    }

    /// Inserts an admin row directly through the store handle, then logs in
    /// over HTTP so the returned token is a real one. Admin accounts cannot
    /// be self-registered.
    pub async fn seed_admin(&self) -> String {
        let salt = "a3f1c2d4e5b6a7f8091a2b3c4d5e6f70";
        let mut key = [0u8; 32];
        pbkdf2::pbkdf2::<Hmac<Sha256>>(
            ADMIN_PASSWORD.as_bytes(),
            salt.as_bytes(),
            self.state.api.pbkdf2_rounds,
            &mut key,
        )
        .expect("derive admin key");
        let mut password_hash = String::with_capacity(key.len() * 2);
        for b in key {
            password_hash.push_str(&format!("{b:02x}"));
        }
        let now = Utc::now();
        let admin = User {
            id: UserId::fresh(),
            role: Role::Admin,
            name: "Ops Admin".to_string(),
            email: ADMIN_EMAIL.to_string(),
            password_hash,
            password_salt: salt.to_string(),
            phone: None,
            wallet_balance_cents: 0,
            address: None,
            referral_code: "ADMN2345".to_string(),
            referred_by: None,
            approved: true,
            available: false,
            delivered_order_count: 0,
            restaurant_profile: None,
            created_at: now,
            updated_at: now,
        };
        let outcome = self.state.store.insert_user(&admin).await.expect("insert admin");
        assert_eq!(outcome, InsertUserOutcome::Inserted, "admin seed failed");

        let login = json!({"email": ADMIN_EMAIL, "password": ADMIN_PASSWORD});
        let (status, reply) = self.request("POST", "/v1/auth/login", None, Some(&login)).await;
        assert_eq!(status, 200, "admin login failed: {reply}");
        reply["token"].as_str().expect("admin token").to_string()
    }

    pub async fn approve(&self, admin_token: &str, user_id: &str) {
        let (status, reply) = self
            .request(
                "PATCH",
                &format!("/v1/admin/users/{user_id}/approval"),
                Some(admin_token),
                Some(&json!({"approved": true})),
            )
            .await;
        assert_eq!(status, 200, "approval failed: {reply}");
        assert_eq!(reply["user"]["approved"], json!(true));
    }

    /// Delivers a provider webhook signed the way the gateway would sign it.
    pub async fn deliver_webhook(
        &self,
        event_type: &str,
        session_id: &str,
    ) -> (u16, serde_json::Value) {
        let body = json!({"event_type": event_type, "session_id": session_id}).to_string();
        let signature = self.payments.sign(body.as_bytes());
        let (status, _head, reply) = send_raw_with_method(
            self.addr,
            "POST",
            "/v1/payments/webhook",
            &[("x-webhook-signature", signature.as_str())],
            Some(&body),
        )
        .await;
        (status, parse_json(&reply))
    }

    /// Runs the full topup flow: checkout session plus the settling webhook.
    pub async fn topup(&self, token: &str, amount_cents: i64) {
        let (status, reply) = self
            .request(
                "POST",
                "/v1/wallet/topup",
                Some(token),
                Some(&json!({"amount_cents": amount_cents})),
            )
            .await;
        assert_eq!(status, 200, "topup checkout failed: {reply}");
        let session_id = reply["checkout"]["session_id"]
            .as_str()
            .expect("session id");
        let (status, reply) = self.deliver_webhook("checkout.completed", session_id).await;
        assert_eq!(status, 200, "topup webhook failed: {reply}");
        assert_eq!(reply["status"], json!("processed"));
    }
}

pub fn customer_body(name: &str, email: &str) -> serde_json::Value {
    json!({
        "name": name,
        "email": email,
        "password": "correct horse battery",
        "address": {"line1": "14 Cross Street", "city": "Bengaluru", "postcode": "560001"},
    })
}

pub fn restaurant_body(display_name: &str, email: &str) -> serde_json::Value {
    json!({
        "name": display_name,
        "email": email,
        "password": "correct horse battery",
        "role": "restaurant",
        "address": {"line1": "2 Market Road", "city": "Bengaluru", "postcode": "560002"},
        "restaurant_profile": {
            "display_name": display_name,
            "cuisine": "south indian",
            "description": "home-style tiffins",
        },
    })
}

pub fn staff_body(name: &str, email: &str) -> serde_json::Value {
    json!({
        "name": name,
        "email": email,
        "password": "correct horse battery",
        "role": "delivery_staff",
        "phone": "+91-90000-00000",
    })
}

fn parse_json(raw: &str) -> serde_json::Value {
    if raw.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_str(raw)
            .unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
    }
}

pub async fn send_raw(
    addr: SocketAddr,
    path: &str,
    headers: &[(&str, &str)],
) -> (u16, String, String) {
    send_raw_with_method(addr, "GET", path, headers, None).await
}

pub async fn send_raw_with_method(
    addr: SocketAddr,
    method: &str,
    path: &str,
    headers: &[(&str, &str)],
    body: Option<&str>,
) -> (u16, String, String) {
    let mut stream = tokio::net::TcpStream::connect(addr)
        .await
        .expect("connect server");
    let mut req = format!("{method} {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n");
    if let Some(payload) = body {
        req.push_str("Content-Type: application/json\r\n");
        req.push_str(&format!("Content-Length: {}\r\n", payload.len()));
    }
    for (k, v) in headers {
        req.push_str(&format!("{k}: {v}\r\n"));
    }
    req.push_str("\r\n");
    if let Some(payload) = body {
        req.push_str(payload);
    }
    stream
        .write_all(req.as_bytes())
        .await
        .expect("write request");
    let mut response = String::new();
    stream
        .read_to_string(&mut response)
        .await
        .expect("read response");
    let (head, body) = response
        .split_once("\r\n\r\n")
        .expect("http response must have separator");
    let status = head
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|s| s.parse::<u16>().ok())
        .expect("http status");
    (status, head.to_string(), body.to_string())
}
