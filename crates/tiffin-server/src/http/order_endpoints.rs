// SPDX-License-Identifier: Apache-2.0

//! Order placement and lifecycle. Menu prices are snapshotted into the
//! order at placement so later menu edits never change what a customer
//! agreed to pay. Wallet orders debit atomically; card orders sit in
//! `pending_payment` until the gateway webhook lands.

use super::{next_cursor_token, page_position, parse_body, propagated_request_id, respond, store_error};
use crate::auth::{authenticate, require_approved, require_role};
use crate::*;
use serde_json::json;
use tiffin_api::dto::{CreateOrderRequest, UpdateOrderStatusRequest};
use tiffin_api::params::{parse_orders_query, OrderScope};

pub(crate) async fn create_order_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let work = async {
        let user = authenticate(&state, &headers).await?;
        require_role(&user, Role::Customer)?;
        let req: CreateOrderRequest = parse_body(&body)?;

        let restaurant_id = UserId::parse(&req.restaurant_id)
            .map_err(|_| ApiError::not_found("restaurant", &req.restaurant_id))?;
        let restaurant = state
            .store
            .user_by_id(&restaurant_id)
            .await
            .map_err(store_error)?
            .filter(|u| u.role == Role::Restaurant && u.approved)
            .ok_or_else(|| ApiError::not_found("restaurant", &req.restaurant_id))?;

        let now = Utc::now();
        if req.deliver_at <= now {
            return Err(ApiError::validation_failed("deliver_at must be in the future"));
        }
        if req.items.is_empty() {
            return Err(ApiError::validation_failed("order must contain at least one item"));
        }

        let mut wanted = Vec::with_capacity(req.items.len());
        for line in &req.items {
            let id = MenuItemId::parse(&line.menu_item_id).map_err(|_| {
                ApiError::validation_failed(format!("unknown menu item {}", line.menu_item_id))
            })?;
            wanted.push(id);
        }
        let found = state
            .store
            .menu_items_by_ids(&wanted)
            .await
            .map_err(store_error)?;
        let by_id: HashMap<&str, &MenuItem> =
            found.iter().map(|item| (item.id.as_str(), item)).collect();

        let service_date = req.deliver_at.date_naive();
        let mut lines = Vec::with_capacity(req.items.len());
        let mut line_totals = Vec::with_capacity(req.items.len());
        for (line, id) in req.items.iter().zip(&wanted) {
            let item = by_id.get(id.as_str()).copied().ok_or_else(|| {
                ApiError::validation_failed(format!("unknown menu item {}", line.menu_item_id))
            })?;
            if item.restaurant_id != restaurant.id {
                return Err(ApiError::validation_failed(format!(
                    "menu item {} belongs to another restaurant",
                    item.id.as_str()
                )));
            }
            if !item.active {
                return Err(ApiError::validation_failed(format!(
                    "menu item {} is no longer available",
                    item.id.as_str()
                )));
            }
            if item.service_date != service_date {
                return Err(ApiError::validation_failed(format!(
                    "menu item {} is not served on {}",
                    item.id.as_str(),
                    service_date.format("%Y-%m-%d")
                )));
            }
            let snapped = OrderLine {
                menu_item_id: item.id.clone(),
                name: item.name.clone(),
                unit_price_cents: item.price_cents,
                meal_type: item.meal_type,
                quantity: line.quantity,
            };
            line_totals.push(
                snapped
                    .line_total_cents()
                    .map_err(|e| ApiError::validation_failed(e.to_string()))?,
            );
            lines.push(snapped);
        }

        let subtotal = checked_sum_cents(&line_totals)
            .map_err(|e| ApiError::validation_failed(e.to_string()))?;
        let fee = state.api.delivery_fee.fee_for_subtotal(subtotal);
        let total = checked_sum_cents(&[subtotal, fee])
            .map_err(|e| ApiError::validation_failed(e.to_string()))?;

        let delivery_address = match req.delivery_address {
            Some(dto) => {
                let mut addr = dto.into_address();
                match state.integrations.geocoder.forward_geocode(&addr).await {
                    Ok(point) => addr.geo = point,
                    Err(e) => warn!(error = %e.0, "geocoding failed, storing address without coordinates"),
                }
                Some(addr)
            }
            None => user.address.clone(),
        }
        .ok_or_else(|| ApiError::validation_failed("delivery address required"))?;

        let payment_method = PaymentMethod::parse(&req.payment_method)
            .map_err(|e| ApiError::validation_failed(e.to_string()))?;
        let status = match payment_method {
            PaymentMethod::Wallet => OrderStatus::Placed,
            PaymentMethod::Card => OrderStatus::PendingPayment,
        };

        let order = Order {
            id: OrderId::fresh(),
            customer_id: user.id.clone(),
            restaurant_id: restaurant.id.clone(),
            lines,
            subtotal_cents: subtotal,
            delivery_fee_cents: fee,
            total_cents: total,
            status,
            payment_method,
            delivery_address,
            deliver_at: req.deliver_at,
            subscription_id: None,
            created_at: now,
            updated_at: now,
        };
        order
            .validate()
            .map_err(|e| ApiError::validation_failed(e.to_string()))?;

        match payment_method {
            PaymentMethod::Wallet => {
                let outcome = state
                    .store
                    .wallet_debit(
                        &user.id,
                        total,
                        PaymentKind::OrderDebit,
                        Some(&order.id),
                        None,
                        now,
                    )
                    .await
                    .map_err(store_error)?;
                if let DebitOutcome::Insufficient { balance_cents } = outcome {
                    return Err(ApiError::wallet_insufficient(total, balance_cents));
                }
                state.store.insert_order(&order).await.map_err(store_error)?;
                info!(
                    order_id = order.id.as_str(),
                    total_cents = total,
                    "order placed from wallet"
                );
                if let Err(e) = state
                    .integrations
                    .mailer
                    .send(
                        &user.email,
                        "Your tiffin order is placed",
                        &format!("Order {} is confirmed for {}.", order.id.as_str(), order.deliver_at),
                    )
                    .await
                {
                    warn!(error = %e.0, "order confirmation mail failed");
                }
                Ok(json!({"order": order}))
            }
            PaymentMethod::Card => {
                state.store.insert_order(&order).await.map_err(store_error)?;
                let session = state
                    .integrations
                    .payments
                    .create_checkout_session(
                        order.id.as_str(),
                        total,
                        &format!("tiffin order {}", order.id.as_str()),
                    )
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
                        purpose: CheckoutPurpose::Order,
                        order_id: Some(order.id.clone()),
                        amount_cents: total,
                        completed: false,
                        created_at: now,
                    })
                    .await
                    .map_err(store_error)?;
                info!(
                    order_id = order.id.as_str(),
                    session_id = %session.session_id,
                    "order awaiting card payment"
                );
                Ok(json!({
                    "order": order,
                    "checkout": {
                        "session_id": session.session_id,
                        "checkout_url": session.checkout_url,
                    },
                }))
            }
        }
    };
    respond(&state, "/v1/orders", started, &request_id, work.await).await
}

pub(crate) async fn orders_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<BTreeMap<String, String>>,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let work = async {
        let user = authenticate(&state, &headers).await?;
        let q = parse_orders_query(&params)?;
        let owner = match q.scope {
            OrderScope::Mine => OrderOwner::Customer(user.id.clone()),
            OrderScope::Restaurant => {
                require_role(&user, Role::Restaurant)?;
                OrderOwner::Restaurant(user.id.clone())
            }
        };
        let secret = state.api.token_secret.as_bytes();
        let (after, depth) = page_position(&q.page, "orders", secret)?;
        let page = state
            .store
            .list_orders(&owner, q.status, after.as_ref(), q.page.limit)
            .await
            .map_err(store_error)?;
        let next_cursor = if page.has_more {
            page.items.last().and_then(|o| {
                next_cursor_token("orders", secret, depth, o.created_at, o.id.as_str())
            })
        } else {
            None
        };
        Ok(json!({"items": page.items, "next_cursor": next_cursor}))
    };
    respond(&state, "/v1/orders", started, &request_id, work.await).await
}

pub(crate) async fn order_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let work = async {
        let user = authenticate(&state, &headers).await?;
        let order_id = OrderId::parse(&id).map_err(|_| ApiError::not_found("order", &id))?;
        let order = state
            .store
            .order_by_id(&order_id)
            .await
            .map_err(store_error)?
            .ok_or_else(|| ApiError::not_found("order", &id))?;
        let delivery = state
            .store
            .delivery_by_order(&order_id)
            .await
            .map_err(store_error)?;
        let allowed = order.customer_id == user.id
            || order.restaurant_id == user.id
            || user.role == Role::Admin
            || delivery
                .as_ref()
                .and_then(|d| d.staff_id.as_ref())
                .is_some_and(|staff| *staff == user.id);
        if !allowed {
            return Err(ApiError::forbidden("not a party to this order"));
        }
        Ok(json!({"order": order, "delivery": delivery}))
    };
    respond(&state, "/v1/orders/{id}", started, &request_id, work.await).await
}

pub(crate) async fn update_order_status_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Bytes,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let work = async {
        let user = authenticate(&state, &headers).await?;
        require_role(&user, Role::Restaurant)?;
        require_approved(&user)?;
        let req: UpdateOrderStatusRequest = parse_body(&body)?;
        let to = OrderStatus::parse(&req.status)
            .map_err(|e| ApiError::validation_failed(e.to_string()))?;

        let order_id = OrderId::parse(&id).map_err(|_| ApiError::not_found("order", &id))?;
        let order = state
            .store
            .order_by_id(&order_id)
            .await
            .map_err(store_error)?
            .ok_or_else(|| ApiError::not_found("order", &id))?;
        if order.restaurant_id != user.id {
            return Err(ApiError::forbidden("order belongs to another restaurant"));
        }
        if !order.status.restaurant_may_set(to) {
            return Err(ApiError::invalid_transition(order.status.as_str(), to.as_str()));
        }

        let now = Utc::now();
        let moved = state
            .store
            .update_order_status(&order_id, order.status, to, now)
            .await
            .map_err(store_error)?;
        if !moved {
            // Lost a race with another transition; report the live state.
            let live = state
                .store
                .order_by_id(&order_id)
                .await
                .map_err(store_error)?
                .ok_or_else(|| ApiError::not_found("order", &id))?;
            return Err(ApiError::invalid_transition(live.status.as_str(), to.as_str()));
        }

        if to == OrderStatus::Ready {
            let pickup = user.address.clone().ok_or_else(|| {
                ApiError::validation_failed("restaurant profile has no pickup address")
            })?;
            let delivery = Delivery {
                id: DeliveryId::fresh(),
                order_id: order.id.clone(),
                customer_id: order.customer_id.clone(),
                staff_id: None,
                status: DeliveryStatus::Unassigned,
                pickup_address: pickup,
                dropoff_address: order.delivery_address.clone(),
                last_position: None,
                claimed_at: None,
                delivered_at: None,
                created_at: now,
                updated_at: now,
            };
            state
                .store
                .insert_delivery(&delivery)
                .await
                .map_err(store_error)?;
            info!(
                order_id = order.id.as_str(),
                delivery_id = delivery.id.as_str(),
                "delivery offer opened"
            );
        }
        if to == OrderStatus::Rejected {
            // Placed orders are paid orders; the refund lands in the wallet
            // whichever way the money came in.
            state
                .store
                .wallet_credit(
                    &order.customer_id,
                    order.total_cents,
                    PaymentKind::Refund,
                    Some(&order.id),
                    None,
                    Some("order rejected by restaurant"),
                    now,
                )
                .await
                .map_err(store_error)?;
            info!(
                order_id = order.id.as_str(),
                amount_cents = order.total_cents,
                "rejected order refunded"
            );
        }

        let updated = state
            .store
            .order_by_id(&order_id)
            .await
            .map_err(store_error)?
            .ok_or_else(|| ApiError::not_found("order", &id))?;
        Ok(json!({"order": updated}))
    };
    respond(&state, "/v1/orders/{id}/status", started, &request_id, work.await).await
}

pub(crate) async fn cancel_order_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let work = async {
        let user = authenticate(&state, &headers).await?;
        let order_id = OrderId::parse(&id).map_err(|_| ApiError::not_found("order", &id))?;
        let order = state
            .store
            .order_by_id(&order_id)
            .await
            .map_err(store_error)?
            .ok_or_else(|| ApiError::not_found("order", &id))?;
        if order.customer_id != user.id {
            return Err(ApiError::forbidden("only the ordering customer may cancel"));
        }

        let now = Utc::now();
        let window = chrono::Duration::seconds(state.api.cancellation_window.as_secs() as i64);
        if !order.cancellable_at(now, window) {
            if !order.status.can_transition(OrderStatus::Cancelled) {
                return Err(ApiError::invalid_transition(
                    order.status.as_str(),
                    OrderStatus::Cancelled.as_str(),
                ));
            }
            return Err(ApiError::cancellation_window_closed(&order.deliver_at.to_rfc3339()));
        }

        let moved = state
            .store
            .update_order_status(&order_id, order.status, OrderStatus::Cancelled, now)
            .await
            .map_err(store_error)?;
        if !moved {
            let live = state
                .store
                .order_by_id(&order_id)
                .await
                .map_err(store_error)?
                .ok_or_else(|| ApiError::not_found("order", &id))?;
            return Err(ApiError::invalid_transition(
                live.status.as_str(),
                OrderStatus::Cancelled.as_str(),
            ));
        }

        // pending_payment orders were never charged; everything else was.
        if order.status != OrderStatus::PendingPayment {
            state
                .store
                .wallet_credit(
                    &order.customer_id,
                    order.total_cents,
                    PaymentKind::Refund,
                    Some(&order.id),
                    None,
                    Some("order cancelled by customer"),
                    now,
                )
                .await
                .map_err(store_error)?;
            info!(
                order_id = order.id.as_str(),
                amount_cents = order.total_cents,
                "cancelled order refunded"
            );
        }

        let updated = state
            .store
            .order_by_id(&order_id)
            .await
            .map_err(store_error)?
            .ok_or_else(|| ApiError::not_found("order", &id))?;
        Ok(json!({"order": updated}))
    };
    respond(&state, "/v1/orders/{id}/cancel", started, &request_id, work.await).await
}
