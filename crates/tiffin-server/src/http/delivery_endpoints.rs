// SPDX-License-Identifier: Apache-2.0

//! Delivery offers and runs. Claiming is the one contended step: the
//! store resolves the race with a conditional update and everyone but the
//! winner gets `OfferAlreadyClaimed`. Reward payouts hang off the
//! delivered transition and never fail it.

use super::{parse_body, propagated_request_id, respond, store_error};
use crate::auth::{authenticate, require_approved, require_role};
use crate::*;
use serde_json::json;
use tiffin_api::dto::{UpdateDeliveryStatusRequest, UpdateLocationRequest};

fn require_available(user: &User) -> Result<(), ApiError> {
    if user.available {
        Ok(())
    } else {
        Err(ApiError::forbidden("staff member is not marked available"))
    }
}

pub(crate) async fn offers_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let work = async {
        let user = authenticate(&state, &headers).await?;
        require_role(&user, Role::DeliveryStaff)?;
        require_approved(&user)?;
        require_available(&user)?;
        let offers = state
            .store
            .list_offers(state.api.offers_page_limit)
            .await
            .map_err(store_error)?;
        Ok(json!({"items": offers}))
    };
    respond(&state, "/v1/deliveries/offers", started, &request_id, work.await).await
}

pub(crate) async fn delivery_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let work = async {
        let user = authenticate(&state, &headers).await?;
        let delivery_id =
            DeliveryId::parse(&id).map_err(|_| ApiError::not_found("delivery", &id))?;
        let delivery = state
            .store
            .delivery_by_id(&delivery_id)
            .await
            .map_err(store_error)?
            .ok_or_else(|| ApiError::not_found("delivery", &id))?;
        let allowed = delivery.customer_id == user.id
            || user.role == Role::Admin
            || delivery.staff_id.as_ref().is_some_and(|s| *s == user.id);
        if !allowed {
            return Err(ApiError::forbidden("not a party to this delivery"));
        }
        Ok(json!({"delivery": delivery}))
    };
    respond(&state, "/v1/deliveries/{id}", started, &request_id, work.await).await
}

pub(crate) async fn claim_delivery_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let work = async {
        let user = authenticate(&state, &headers).await?;
        require_role(&user, Role::DeliveryStaff)?;
        require_approved(&user)?;
        require_available(&user)?;
        let delivery_id =
            DeliveryId::parse(&id).map_err(|_| ApiError::not_found("delivery", &id))?;
        let now = Utc::now();
        match state
            .store
            .claim_delivery(&delivery_id, &user.id, now)
            .await
            .map_err(store_error)?
        {
            ClaimOutcome::Claimed(delivery) => {
                let moved = state
                    .store
                    .update_order_status(
                        &delivery.order_id,
                        OrderStatus::Ready,
                        OrderStatus::OutForDelivery,
                        now,
                    )
                    .await
                    .map_err(store_error)?;
                if !moved {
                    warn!(
                        order_id = delivery.order_id.as_str(),
                        "claimed delivery found its order outside ready"
                    );
                }
                info!(
                    delivery_id = delivery.id.as_str(),
                    staff_id = user.id.as_str(),
                    "delivery claimed"
                );
                Ok(json!({"delivery": delivery}))
            }
            ClaimOutcome::AlreadyClaimed => Err(ApiError::offer_already_claimed(&id)),
            ClaimOutcome::NotFound => Err(ApiError::not_found("delivery", &id)),
        }
    };
    respond(&state, "/v1/deliveries/{id}/claim", started, &request_id, work.await).await
}

pub(crate) async fn update_delivery_status_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Bytes,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let work = async {
        let user = authenticate(&state, &headers).await?;
        require_role(&user, Role::DeliveryStaff)?;
        let req: UpdateDeliveryStatusRequest = parse_body(&body)?;
        let to = DeliveryStatus::parse(&req.status)
            .map_err(|e| ApiError::validation_failed(e.to_string()))?;

        let delivery_id =
            DeliveryId::parse(&id).map_err(|_| ApiError::not_found("delivery", &id))?;
        let delivery = state
            .store
            .delivery_by_id(&delivery_id)
            .await
            .map_err(store_error)?
            .ok_or_else(|| ApiError::not_found("delivery", &id))?;
        if delivery.staff_id.as_ref() != Some(&user.id) {
            return Err(ApiError::forbidden("delivery assigned to another staff member"));
        }
        if !delivery.status.staff_may_set(to) {
            return Err(ApiError::invalid_transition(delivery.status.as_str(), to.as_str()));
        }

        let now = Utc::now();
        let moved = state
            .store
            .update_delivery_status(&delivery_id, &user.id, delivery.status, to, now)
            .await
            .map_err(store_error)?;
        if !moved {
            let live = state
                .store
                .delivery_by_id(&delivery_id)
                .await
                .map_err(store_error)?
                .ok_or_else(|| ApiError::not_found("delivery", &id))?;
            return Err(ApiError::invalid_transition(live.status.as_str(), to.as_str()));
        }

        if to == DeliveryStatus::Delivered {
            if let Err(e) = settle_delivered_order(&state, &delivery.order_id, now).await {
                warn!(
                    order_id = delivery.order_id.as_str(),
                    error = %e.0,
                    "post-delivery settlement failed"
                );
            }
        }

        let updated = state
            .store
            .delivery_by_id(&delivery_id)
            .await
            .map_err(store_error)?
            .ok_or_else(|| ApiError::not_found("delivery", &id))?;
        Ok(json!({"delivery": updated}))
    };
    respond(&state, "/v1/deliveries/{id}/status", started, &request_id, work.await).await
}

pub(crate) async fn update_delivery_location_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Bytes,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let work = async {
        let user = authenticate(&state, &headers).await?;
        require_role(&user, Role::DeliveryStaff)?;
        let req: UpdateLocationRequest = parse_body(&body)?;
        let position = GeoPoint::new(req.lat, req.lng)
            .map_err(|e| ApiError::validation_failed(e.to_string()))?;

        let delivery_id =
            DeliveryId::parse(&id).map_err(|_| ApiError::not_found("delivery", &id))?;
        let delivery = state
            .store
            .delivery_by_id(&delivery_id)
            .await
            .map_err(store_error)?
            .ok_or_else(|| ApiError::not_found("delivery", &id))?;
        if delivery.staff_id.as_ref() != Some(&user.id) {
            return Err(ApiError::forbidden("delivery assigned to another staff member"));
        }
        if delivery.status == DeliveryStatus::Delivered {
            return Err(ApiError::validation_failed("delivery is already completed"));
        }

        let stored = state
            .store
            .update_delivery_position(&delivery_id, &user.id, position, Utc::now())
            .await
            .map_err(store_error)?;
        if !stored {
            return Err(ApiError::not_found("delivery", &id));
        }
        let updated = state
            .store
            .delivery_by_id(&delivery_id)
            .await
            .map_err(store_error)?
            .ok_or_else(|| ApiError::not_found("delivery", &id))?;
        Ok(json!({"delivery": updated}))
    };
    respond(&state, "/v1/deliveries/{id}/location", started, &request_id, work.await).await
}

/// Everything that hangs off the delivered transition: the order stamp,
/// the delivered-order counter, the one-time referral payout, the loyalty
/// bonus, and marking a fully-delivered subscription completed.
async fn settle_delivered_order(
    state: &AppState,
    order_id: &OrderId,
    now: DateTime<Utc>,
) -> Result<(), StoreError> {
    let stamped = state
        .store
        .update_order_status(order_id, OrderStatus::OutForDelivery, OrderStatus::Delivered, now)
        .await?;
    if !stamped {
        warn!(order_id = order_id.as_str(), "delivered order was not out_for_delivery");
    }
    let Some(order) = state.store.order_by_id(order_id).await? else {
        return Ok(());
    };

    let delivered_count = state
        .store
        .increment_delivered_count(&order.customer_id)
        .await?;

    if delivered_count == 1 {
        if let Some(referral) = state.store.referral_by_referee(&order.customer_id).await? {
            // The rewarded flag flips conditionally, so a double callback
            // pays at most once.
            if !referral.rewarded
                && state.store.mark_referral_rewarded(&referral.id, now).await?
            {
                state
                    .store
                    .wallet_credit(
                        &referral.referrer_id,
                        referral.reward_cents,
                        PaymentKind::ReferralReward,
                        None,
                        None,
                        Some(&format!("referral {}", referral.code)),
                        now,
                    )
                    .await?;
                info!(
                    referrer_id = referral.referrer_id.as_str(),
                    reward_cents = referral.reward_cents,
                    "referral reward paid"
                );
            }
        }
    }

    let every = state.api.rewards.loyalty_every_orders;
    if every > 0 && delivered_count % every == 0 {
        state
            .store
            .wallet_credit(
                &order.customer_id,
                state.api.rewards.loyalty_bonus_cents,
                PaymentKind::LoyaltyBonus,
                Some(order_id),
                None,
                Some(&format!("loyalty bonus for {delivered_count} delivered orders")),
                now,
            )
            .await?;
        info!(
            customer_id = order.customer_id.as_str(),
            delivered_count, "loyalty bonus paid"
        );
    }

    if let Some(sub_id) = &order.subscription_id {
        let siblings = state.store.orders_for_subscription(sub_id).await?;
        if siblings.iter().all(|o| o.status.is_terminal()) {
            let completed = state
                .store
                .update_subscription_status(
                    sub_id,
                    SubscriptionStatus::Active,
                    SubscriptionStatus::Completed,
                    now,
                )
                .await?;
            if completed {
                info!(subscription_id = sub_id.as_str(), "subscription completed");
            }
        }
    }
    Ok(())
}
