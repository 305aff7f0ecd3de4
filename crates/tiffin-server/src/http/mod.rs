// SPDX-License-Identifier: Apache-2.0

use crate::*;
use serde_json::json;
use tiffin_api::params::PageParams;
use tiffin_api::{decode_cursor, encode_cursor, CursorPayload};
use tiffin_store::fmt_ts;

pub(crate) mod admin_endpoints;
pub(crate) mod auth_endpoints;
pub(crate) mod delivery_endpoints;
pub(crate) mod menu_endpoints;
pub(crate) mod order_endpoints;
pub(crate) mod payment_endpoints;
pub(crate) mod restaurant_endpoints;
pub(crate) mod review_endpoints;
pub(crate) mod subscription_endpoints;

pub(crate) fn make_request_id(state: &AppState) -> String {
    let id = state.request_id_seed.fetch_add(1, Ordering::Relaxed);
    format!("req-{id:016x}")
}

pub(crate) fn propagated_request_id(headers: &HeaderMap, state: &AppState) -> String {
    if let Some(raw) = headers.get("x-request-id").and_then(|v| v.to_str().ok()) {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    if let Some(raw) = headers.get("traceparent").and_then(|v| v.to_str().ok()) {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            return format!("trace-{trimmed}");
        }
    }
    make_request_id(state)
}

pub(crate) fn with_request_id(mut response: Response, request_id: &str) -> Response {
    if let Ok(v) = HeaderValue::from_str(request_id) {
        response.headers_mut().insert("x-request-id", v);
    }
    response
}

pub(crate) fn api_error_response(err: &ApiError) -> Response {
    let status = StatusCode::from_u16(err.code.http_status())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(err.to_body())).into_response()
}

/// Finishes a handler: one metrics observation per request, the request id
/// echoed on every branch.
pub(crate) async fn respond(
    state: &AppState,
    route: &str,
    started: Instant,
    request_id: &str,
    result: Result<serde_json::Value, ApiError>,
) -> Response {
    match result {
        Ok(value) => {
            let resp = Json(value).into_response();
            state
                .metrics
                .observe_request(route, StatusCode::OK, started.elapsed())
                .await;
            with_request_id(resp, request_id)
        }
        Err(err) => {
            let status = StatusCode::from_u16(err.code.http_status())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            let resp = api_error_response(&err);
            state
                .metrics
                .observe_request(route, status, started.elapsed())
                .await;
            with_request_id(resp, request_id)
        }
    }
}

pub(crate) fn parse_body<T: serde::de::DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError::invalid_body(e.to_string()))
}

pub(crate) fn store_error(e: StoreError) -> ApiError {
    error!("store failure: {e}");
    ApiError::internal(e.to_string())
}

/// Best client identity available without trusting the socket: proxies in
/// front of us set x-forwarded-for / x-real-ip.
pub(crate) fn client_ip(headers: &HeaderMap) -> String {
    if let Some(raw) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = raw.split(',').next() {
            let trimmed = first.trim();
            if !trimmed.is_empty() {
                return trimmed.to_string();
            }
        }
    }
    if let Some(raw) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    "unknown".to_string()
}

/// Turns the optional cursor token into a keyset position for the store,
/// remembering how deep the caller already paged.
pub(crate) fn page_position(
    page: &PageParams,
    collection: &str,
    secret: &[u8],
) -> Result<(Option<PageAfter>, u32), ApiError> {
    match &page.cursor {
        Some(token) => {
            let payload = decode_cursor(token, secret, collection)
                .map_err(|_| ApiError::invalid_cursor(token))?;
            let after = PageAfter {
                created_at: payload.last_created_at.clone(),
                id: payload.last_id.clone(),
            };
            Ok((Some(after), payload.depth))
        }
        None => Ok((None, 0)),
    }
}

/// Mints the token for the page after the row at (created_at, id).
pub(crate) fn next_cursor_token(
    collection: &str,
    secret: &[u8],
    depth: u32,
    last_created_at: DateTime<Utc>,
    last_id: &str,
) -> Option<String> {
    let mut payload = CursorPayload::first_page(collection, &fmt_ts(last_created_at), last_id);
    payload.depth = depth.saturating_add(1);
    encode_cursor(&payload, secret).ok()
}

pub(crate) async fn healthz_handler(State(state): State<AppState>) -> impl IntoResponse {
    let request_id = make_request_id(&state);
    let started = Instant::now();
    let resp = (StatusCode::OK, "ok").into_response();
    state
        .metrics
        .observe_request("/healthz", StatusCode::OK, started.elapsed())
        .await;
    with_request_id(resp, &request_id)
}

pub(crate) async fn readyz_handler(State(state): State<AppState>) -> impl IntoResponse {
    let request_id = make_request_id(&state);
    let started = Instant::now();
    let store_ok = state.store.ping().await.is_ok();
    if state.ready.load(Ordering::Relaxed) && store_ok {
        let resp = (StatusCode::OK, "ready").into_response();
        state
            .metrics
            .observe_request("/readyz", StatusCode::OK, started.elapsed())
            .await;
        with_request_id(resp, &request_id)
    } else {
        let resp = (StatusCode::SERVICE_UNAVAILABLE, "not-ready").into_response();
        state
            .metrics
            .observe_request("/readyz", StatusCode::SERVICE_UNAVAILABLE, started.elapsed())
            .await;
        with_request_id(resp, &request_id)
    }
}

pub(crate) async fn version_handler(State(state): State<AppState>) -> impl IntoResponse {
    let request_id = make_request_id(&state);
    let started = Instant::now();
    let payload = json!({
        "service": {
            "crate": CRATE_NAME,
            "version": env!("CARGO_PKG_VERSION"),
            "api_version": tiffin_api::API_VERSION,
            "config_schema_version": crate::config::CONFIG_SCHEMA_VERSION,
        }
    });
    let mut response = Json(payload).into_response();
    if let Ok(value) = HeaderValue::from_str("public, max-age=30") {
        response.headers_mut().insert("cache-control", value);
    }
    state
        .metrics
        .observe_request("/v1/version", StatusCode::OK, started.elapsed())
        .await;
    with_request_id(response, &request_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tiffin_api::ApiErrorCode;

    #[test]
    fn client_ip_prefers_first_forwarded_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "10.1.2.3, 172.16.0.9".parse().unwrap());
        headers.insert("x-real-ip", "192.168.1.1".parse().unwrap());
        assert_eq!(client_ip(&headers), "10.1.2.3");
    }

    #[test]
    fn client_ip_falls_back_to_unknown() {
        assert_eq!(client_ip(&HeaderMap::new()), "unknown");
    }

    #[test]
    fn cursor_round_trips_through_page_position() {
        let secret = b"test-secret";
        let token =
            next_cursor_token("orders", secret, 2, Utc::now(), "o-1").expect("encode cursor");
        let page = PageParams {
            limit: 20,
            cursor: Some(token),
        };
        let (after, depth) = page_position(&page, "orders", secret).expect("decode cursor");
        assert_eq!(after.expect("position").id, "o-1");
        assert_eq!(depth, 3);
    }

    #[test]
    fn cursor_for_another_collection_is_rejected() {
        let secret = b"test-secret";
        let token =
            next_cursor_token("orders", secret, 0, Utc::now(), "o-1").expect("encode cursor");
        let page = PageParams {
            limit: 20,
            cursor: Some(token),
        };
        let err = page_position(&page, "reviews", secret).unwrap_err();
        assert_eq!(err.code, ApiErrorCode::InvalidCursor);
    }
}
