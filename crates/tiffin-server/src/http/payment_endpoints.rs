// SPDX-License-Identifier: Apache-2.0

//! Wallet and card-checkout surface. Card money never moves here; the
//! provider session is created and the webhook settles it later. The
//! webhook authenticates with the shared-secret signature over the raw
//! body, so the body must be verified before it is parsed.

use super::{next_cursor_token, page_position, parse_body, propagated_request_id, respond, store_error};
use crate::auth::authenticate;
use crate::*;
use serde_json::json;
use tiffin_api::dto::{CheckoutRequest, TopupRequest, WebhookEvent};

pub(crate) const WEBHOOK_SIGNATURE_HEADER: &str = "x-webhook-signature";

pub(crate) async fn wallet_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<BTreeMap<String, String>>,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let work = async {
        let user = authenticate(&state, &headers).await?;
        let q = tiffin_api::params::parse_page(&params)?;
        let secret = state.api.token_secret.as_bytes();
        let (after, depth) = page_position(&q, "wallet", secret)?;
        let page = state
            .store
            .ledger_for_user(&user.id, after.as_ref(), q.limit)
            .await
            .map_err(store_error)?;
        let next_cursor = if page.has_more {
            page.items.last().and_then(|entry| {
                next_cursor_token("wallet", secret, depth, entry.created_at, entry.id.as_str())
            })
        } else {
            None
        };
        Ok(json!({
            "balance_cents": user.wallet_balance_cents,
            "items": page.items,
            "next_cursor": next_cursor,
        }))
    };
    respond(&state, "/v1/wallet", started, &request_id, work.await).await
}

pub(crate) async fn topup_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let work = async {
        let user = authenticate(&state, &headers).await?;
        let req: TopupRequest = parse_body(&body)?;
        check_topup_bounds(&state, req.amount_cents)?;
        let checkout = begin_checkout(
            &state,
            &user,
            CheckoutPurpose::Topup,
            None,
            req.amount_cents,
            "tiffin wallet topup",
        )
        .await?;
        Ok(json!({"checkout": checkout}))
    };
    respond(&state, "/v1/wallet/topup", started, &request_id, work.await).await
}

pub(crate) async fn checkout_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let work = async {
        let user = authenticate(&state, &headers).await?;
        crate::auth::require_role(&user, Role::Customer)?;
        let req: CheckoutRequest = parse_body(&body)?;
        let purpose = CheckoutPurpose::parse(&req.purpose)
            .map_err(|e| ApiError::validation_failed(e.to_string()))?;

        let checkout = match purpose {
            CheckoutPurpose::Order => {
                let raw = req
                    .order_id
                    .as_deref()
                    .ok_or_else(|| ApiError::validation_failed("order_id required for order checkout"))?;
                let order_id =
                    OrderId::parse(raw).map_err(|_| ApiError::not_found("order", raw))?;
                let order = state
                    .store
                    .order_by_id(&order_id)
                    .await
                    .map_err(store_error)?
                    .ok_or_else(|| ApiError::not_found("order", raw))?;
                if order.customer_id != user.id {
                    return Err(ApiError::forbidden("order belongs to another customer"));
                }
                if order.status != OrderStatus::PendingPayment {
                    return Err(ApiError::validation_failed("order is not awaiting payment"));
                }
                begin_checkout(
                    &state,
                    &user,
                    CheckoutPurpose::Order,
                    Some(&order.id),
                    order.total_cents,
                    &format!("tiffin order {}", order.id.as_str()),
                )
                .await?
            }
            CheckoutPurpose::Topup => {
                let amount = req.amount_cents.ok_or_else(|| {
                    ApiError::validation_failed("amount_cents required for topup checkout")
                })?;
                check_topup_bounds(&state, amount)?;
                begin_checkout(
                    &state,
                    &user,
                    CheckoutPurpose::Topup,
                    None,
                    amount,
                    "tiffin wallet topup",
                )
                .await?
            }
        };
        Ok(json!({"checkout": checkout}))
    };
    respond(&state, "/v1/payments/checkout", started, &request_id, work.await).await
}

pub(crate) async fn webhook_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let work = async {
        let signature = headers
            .get(WEBHOOK_SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::unauthorized("missing webhook signature"))?;
        if !state
            .integrations
            .payments
            .verify_webhook_signature(&body, signature)
        {
            warn!("webhook signature verification failed");
            return Err(ApiError::unauthorized("invalid webhook signature"));
        }

        let event: WebhookEvent = parse_body(&body)?;
        if event.event_type != "checkout.completed" {
            info!(event_type = %event.event_type, "ignoring webhook event type");
            return Ok(json!({"status": "ignored"}));
        }

        let now = Utc::now();
        let Some(session) = state
            .store
            .complete_checkout_session(&event.session_id, now)
            .await
            .map_err(store_error)?
        else {
            // Unknown or already-completed session; replays land here.
            info!(session_id = %event.session_id, "webhook session already settled or unknown");
            return Ok(json!({"status": "ignored"}));
        };

        match session.purpose {
            CheckoutPurpose::Topup => {
                let balance = state
                    .store
                    .wallet_credit(
                        &session.user_id,
                        session.amount_cents,
                        PaymentKind::Topup,
                        None,
                        Some(&session.session_id),
                        None,
                        now,
                    )
                    .await
                    .map_err(store_error)?;
                info!(
                    session_id = %session.session_id,
                    amount_cents = session.amount_cents,
                    balance_cents = balance,
                    "wallet topped up"
                );
            }
            CheckoutPurpose::Order => {
                let order_id = session.order_id.as_ref().ok_or_else(|| {
                    ApiError::internal("order checkout session has no order id")
                })?;
                state
                    .store
                    .record_card_payment(
                        &session.user_id,
                        session.amount_cents,
                        Some(order_id),
                        &session.session_id,
                        now,
                    )
                    .await
                    .map_err(store_error)?;
                let placed = state
                    .store
                    .update_order_status(order_id, OrderStatus::PendingPayment, OrderStatus::Placed, now)
                    .await
                    .map_err(store_error)?;
                if placed {
                    info!(
                        order_id = order_id.as_str(),
                        session_id = %session.session_id,
                        "card payment settled, order placed"
                    );
                } else {
                    // The order left pending_payment while the charge was in
                    // flight (customer cancelled). The money lands in the
                    // wallet instead of vanishing.
                    state
                        .store
                        .wallet_credit(
                            &session.user_id,
                            session.amount_cents,
                            PaymentKind::Refund,
                            Some(order_id),
                            Some(&session.session_id),
                            Some("payment arrived for a cancelled order"),
                            now,
                        )
                        .await
                        .map_err(store_error)?;
                    warn!(
                        order_id = order_id.as_str(),
                        session_id = %session.session_id,
                        "card payment for a dead order refunded to wallet"
                    );
                }
            }
        }
        Ok(json!({"status": "processed"}))
    };
    respond(&state, "/v1/payments/webhook", started, &request_id, work.await).await
}

fn check_topup_bounds(state: &AppState, amount_cents: i64) -> Result<(), ApiError> {
    if amount_cents < state.api.min_topup_cents || amount_cents > state.api.max_topup_cents {
        return Err(ApiError::validation_failed(format!(
            "amount_cents must be between {} and {}",
            state.api.min_topup_cents, state.api.max_topup_cents
        )));
    }
    Ok(())
}

/// Creates the provider session and the pending row that the webhook will
/// later settle. The fresh reference keys retries on the provider side.
async fn begin_checkout(
    state: &AppState,
    user: &User,
    purpose: CheckoutPurpose,
    order_id: Option<&OrderId>,
    amount_cents: i64,
    description: &str,
) -> Result<serde_json::Value, ApiError> {
    let reference = match order_id {
        Some(id) => id.as_str().to_string(),
        None => uuid::Uuid::new_v4().simple().to_string(),
    };
    let session = state
        .integrations
        .payments
        .create_checkout_session(&reference, amount_cents, description)
        .await
        .map_err(|e| {
            warn!(error = %e.0, "checkout session creation failed");
            ApiError::upstream_failed("payment gateway")
        })?;
    state
        .store
        .insert_checkout_session(&CheckoutSession {
            session_id: session.session_id.clone(),
            user_id: user.id.clone(),
            purpose,
            order_id: order_id.cloned(),
            amount_cents,
            completed: false,
            created_at: Utc::now(),
        })
        .await
        .map_err(store_error)?;
    info!(
        session_id = %session.session_id,
        purpose = purpose.as_str(),
        amount_cents,
        "checkout session opened"
    );
    Ok(json!({
        "session_id": session.session_id,
        "checkout_url": session.checkout_url,
    }))
}
