// SPDX-License-Identifier: Apache-2.0

//! Recurring meal plans. Activation expands the plan into one wallet-paid
//! order per covered date and meal slot, debited as a single
//! `subscription_debit`. Pause refunds the untouched future orders; resume
//! regenerates and re-debits whatever slots are still ahead.

use super::{next_cursor_token, page_position, parse_body, propagated_request_id, respond, store_error};
use crate::auth::{authenticate, require_role};
use crate::*;
use chrono::NaiveTime;
use serde_json::json;
use tiffin_api::dto::CreateSubscriptionRequest;

/// Kitchen handoff times for the three meal slots, in UTC.
fn slot_deliver_at(date: NaiveDate, meal: MealType) -> DateTime<Utc> {
    let (hour, minute) = match meal {
        MealType::Breakfast => (8, 0),
        MealType::Lunch => (12, 30),
        MealType::Dinner => (19, 0),
    };
    let time = NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or_default();
    date.and_time(time).and_utc()
}

/// Expands plan slots into wallet-paid orders tagged with the plan id.
/// `chosen_items` maps each meal type to the menu item the customer picked.
fn orders_for_slots(
    sub: &Subscription,
    slots: &[(NaiveDate, &MealSelection)],
    chosen_items: &HashMap<MealType, MenuItemId>,
    delivery_address: &Address,
    now: DateTime<Utc>,
) -> Result<Vec<Order>, ApiError> {
    let mut orders = Vec::with_capacity(slots.len());
    for (date, selection) in slots {
        let menu_item_id = chosen_items
            .get(&selection.meal_type)
            .cloned()
            .ok_or_else(|| ApiError::internal("plan selection lost its menu item"))?;
        let line = OrderLine {
            menu_item_id,
            name: selection.item_name.clone(),
            unit_price_cents: selection.unit_price_cents,
            meal_type: selection.meal_type,
            quantity: 1,
        };
        let subtotal = line
            .line_total_cents()
            .map_err(|e| ApiError::validation_failed(e.to_string()))?;
        orders.push(Order {
            id: OrderId::fresh(),
            customer_id: sub.customer_id.clone(),
            restaurant_id: sub.restaurant_id.clone(),
            lines: vec![line],
            subtotal_cents: subtotal,
            // Plan orders ride the plan price; no per-order delivery fee.
            delivery_fee_cents: 0,
            total_cents: subtotal,
            status: OrderStatus::Placed,
            payment_method: PaymentMethod::Wallet,
            delivery_address: delivery_address.clone(),
            deliver_at: slot_deliver_at(*date, selection.meal_type),
            subscription_id: Some(sub.id.clone()),
            created_at: now,
            updated_at: now,
        });
    }
    Ok(orders)
}

pub(crate) async fn create_subscription_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let work = async {
        let user = authenticate(&state, &headers).await?;
        require_role(&user, Role::Customer)?;
        let req: CreateSubscriptionRequest = parse_body(&body)?;

        let restaurant_id = UserId::parse(&req.restaurant_id)
            .map_err(|_| ApiError::not_found("restaurant", &req.restaurant_id))?;
        let restaurant = state
            .store
            .user_by_id(&restaurant_id)
            .await
            .map_err(store_error)?
            .filter(|u| u.role == Role::Restaurant && u.approved)
            .ok_or_else(|| ApiError::not_found("restaurant", &req.restaurant_id))?;

        let start_date = parse_service_date(&req.start_date)
            .map_err(|e| ApiError::validation_failed(e.to_string()))?;
        let end_date = parse_service_date(&req.end_date)
            .map_err(|e| ApiError::validation_failed(e.to_string()))?;
        let now = Utc::now();
        let today = now.date_naive();
        if start_date <= today {
            // Same-day starts would generate slots already in the past.
            return Err(ApiError::validation_failed("start_date must be after today"));
        }

        let mut days = Vec::with_capacity(req.days.len());
        for raw in &req.days {
            days.push(PlanDay::parse(raw).map_err(|e| ApiError::validation_failed(e.to_string()))?);
        }

        let mut wanted = Vec::with_capacity(req.selections.len());
        for sel in &req.selections {
            let id = MenuItemId::parse(&sel.menu_item_id).map_err(|_| {
                ApiError::validation_failed(format!("unknown menu item {}", sel.menu_item_id))
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

        let mut selections = Vec::with_capacity(req.selections.len());
        let mut chosen_items: HashMap<MealType, MenuItemId> = HashMap::new();
        for (sel, id) in req.selections.iter().zip(&wanted) {
            let meal_type = MealType::parse(&sel.meal_type)
                .map_err(|e| ApiError::validation_failed(e.to_string()))?;
            let item = by_id.get(id.as_str()).copied().ok_or_else(|| {
                ApiError::validation_failed(format!("unknown menu item {}", sel.menu_item_id))
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
            if item.meal_type != meal_type {
                return Err(ApiError::validation_failed(format!(
                    "menu item {} is a {} dish, not {}",
                    item.id.as_str(),
                    item.meal_type.as_str(),
                    meal_type.as_str()
                )));
            }
            selections.push(MealSelection {
                meal_type,
                item_name: item.name.clone(),
                unit_price_cents: item.price_cents,
            });
            chosen_items.insert(meal_type, item.id.clone());
        }

        let delivery_address = user
            .address
            .clone()
            .ok_or_else(|| ApiError::validation_failed("delivery address required"))?;

        let mut sub = Subscription {
            id: SubscriptionId::fresh(),
            customer_id: user.id.clone(),
            restaurant_id: restaurant.id.clone(),
            start_date,
            end_date,
            days,
            selections,
            status: SubscriptionStatus::Active,
            meal_count: 0,
            total_paid_cents: 0,
            created_at: now,
            updated_at: now,
        };
        sub.validate()
            .map_err(|e| ApiError::validation_failed(e.to_string()))?;
        let total = sub
            .planned_total_cents()
            .map_err(|e| ApiError::validation_failed(e.to_string()))?;
        sub.meal_count = sub.covered_slots().len() as u64;
        sub.total_paid_cents = total;
        let slots = sub.covered_slots();

        let orders = orders_for_slots(&sub, &slots, &chosen_items, &delivery_address, now)?;
        state
            .store
            .insert_subscription(&sub)
            .await
            .map_err(store_error)?;
        let outcome = state
            .store
            .insert_subscription_orders(&user.id, &orders, total, now)
            .await
            .map_err(store_error)?;
        if let DebitOutcome::Insufficient { balance_cents } = outcome {
            let cancelled = state
                .store
                .update_subscription_status(
                    &sub.id,
                    SubscriptionStatus::Active,
                    SubscriptionStatus::Cancelled,
                    now,
                )
                .await
                .map_err(store_error)?;
            if !cancelled {
                warn!(
                    subscription_id = sub.id.as_str(),
                    "unfunded subscription could not be cancelled"
                );
            }
            return Err(ApiError::wallet_insufficient(total, balance_cents));
        }

        info!(
            subscription_id = sub.id.as_str(),
            slots = slots.len(),
            total_cents = total,
            "subscription activated"
        );
        Ok(json!({"subscription": sub, "orders_generated": orders.len()}))
    };
    respond(&state, "/v1/subscriptions", started, &request_id, work.await).await
}

pub(crate) async fn subscriptions_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<BTreeMap<String, String>>,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let work = async {
        let user = authenticate(&state, &headers).await?;
        require_role(&user, Role::Customer)?;
        let q = tiffin_api::params::parse_page(&params)?;
        let secret = state.api.token_secret.as_bytes();
        let (after, depth) = page_position(&q, "subscriptions", secret)?;
        let page = state
            .store
            .list_subscriptions_for_customer(&user.id, after.as_ref(), q.limit)
            .await
            .map_err(store_error)?;
        let next_cursor = if page.has_more {
            page.items.last().and_then(|s| {
                next_cursor_token("subscriptions", secret, depth, s.created_at, s.id.as_str())
            })
        } else {
            None
        };
        Ok(json!({"items": page.items, "next_cursor": next_cursor}))
    };
    respond(&state, "/v1/subscriptions", started, &request_id, work.await).await
}

pub(crate) async fn subscription_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let work = async {
        let user = authenticate(&state, &headers).await?;
        let sub = fetch_subscription(&state, &id).await?;
        if sub.customer_id != user.id && user.role != Role::Admin {
            return Err(ApiError::forbidden("not a party to this subscription"));
        }
        let orders = state
            .store
            .orders_for_subscription(&sub.id)
            .await
            .map_err(store_error)?;
        Ok(json!({"subscription": sub, "orders": orders}))
    };
    respond(&state, "/v1/subscriptions/{id}", started, &request_id, work.await).await
}

pub(crate) async fn pause_subscription_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let work = async {
        let user = authenticate(&state, &headers).await?;
        let sub = fetch_owned_subscription(&state, &id, &user).await?;
        let now = Utc::now();
        let moved = state
            .store
            .update_subscription_status(
                &sub.id,
                SubscriptionStatus::Active,
                SubscriptionStatus::Paused,
                now,
            )
            .await
            .map_err(store_error)?;
        if !moved {
            return Err(ApiError::invalid_transition(
                sub.status.as_str(),
                SubscriptionStatus::Paused.as_str(),
            ));
        }

        // Untouched future orders come back to the wallet; anything the
        // restaurant already accepted keeps cooking.
        let orders = state
            .store
            .orders_for_subscription(&sub.id)
            .await
            .map_err(store_error)?;
        let mut cancelled = 0usize;
        for order in orders
            .iter()
            .filter(|o| o.status == OrderStatus::Placed && o.deliver_at > now)
        {
            let done = state
                .store
                .update_order_status(&order.id, OrderStatus::Placed, OrderStatus::Cancelled, now)
                .await
                .map_err(store_error)?;
            if done {
                state
                    .store
                    .wallet_credit(
                        &order.customer_id,
                        order.total_cents,
                        PaymentKind::Refund,
                        Some(&order.id),
                        None,
                        Some("subscription paused"),
                        now,
                    )
                    .await
                    .map_err(store_error)?;
                cancelled += 1;
            }
        }
        info!(
            subscription_id = sub.id.as_str(),
            orders_cancelled = cancelled,
            "subscription paused"
        );
        let updated = fetch_subscription(&state, &id).await?;
        Ok(json!({"subscription": updated, "orders_cancelled": cancelled}))
    };
    respond(&state, "/v1/subscriptions/{id}/pause", started, &request_id, work.await).await
}

pub(crate) async fn resume_subscription_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let work = async {
        let user = authenticate(&state, &headers).await?;
        let sub = fetch_owned_subscription(&state, &id, &user).await?;
        let now = Utc::now();
        let moved = state
            .store
            .update_subscription_status(
                &sub.id,
                SubscriptionStatus::Paused,
                SubscriptionStatus::Active,
                now,
            )
            .await
            .map_err(store_error)?;
        if !moved {
            return Err(ApiError::invalid_transition(
                sub.status.as_str(),
                SubscriptionStatus::Active.as_str(),
            ));
        }

        // Slots from tomorrow on that no live order covers get regenerated
        // and re-debited.
        let tomorrow = now.date_naive() + chrono::Duration::days(1);
        let existing = state
            .store
            .orders_for_subscription(&sub.id)
            .await
            .map_err(store_error)?;
        let covered: Vec<(NaiveDate, MealType)> = existing
            .iter()
            .filter(|o| o.status != OrderStatus::Cancelled)
            .flat_map(|o| {
                o.lines
                    .iter()
                    .map(|l| (o.deliver_at.date_naive(), l.meal_type))
                    .collect::<Vec<_>>()
            })
            .collect();
        let slots: Vec<(NaiveDate, &MealSelection)> = sub
            .slots_from(tomorrow)
            .into_iter()
            .filter(|(date, sel)| !covered.contains(&(*date, sel.meal_type)))
            .collect();

        let mut generated = 0usize;
        if !slots.is_empty() {
            let chosen_items = chosen_items_for(&sub, &existing)?;
            let delivery_address = user
                .address
                .clone()
                .ok_or_else(|| ApiError::validation_failed("delivery address required"))?;
            let orders = orders_for_slots(&sub, &slots, &chosen_items, &delivery_address, now)?;
            let totals: Vec<i64> = orders.iter().map(|o| o.total_cents).collect();
            let total = checked_sum_cents(&totals)
                .map_err(|e| ApiError::validation_failed(e.to_string()))?;
            let outcome = state
                .store
                .insert_subscription_orders(&user.id, &orders, total, now)
                .await
                .map_err(store_error)?;
            if let DebitOutcome::Insufficient { balance_cents } = outcome {
                let reverted = state
                    .store
                    .update_subscription_status(
                        &sub.id,
                        SubscriptionStatus::Active,
                        SubscriptionStatus::Paused,
                        now,
                    )
                    .await
                    .map_err(store_error)?;
                if !reverted {
                    warn!(
                        subscription_id = sub.id.as_str(),
                        "unfunded resume could not re-pause the plan"
                    );
                }
                return Err(ApiError::wallet_insufficient(total, balance_cents));
            }
            generated = orders.len();
        }

        info!(
            subscription_id = sub.id.as_str(),
            orders_generated = generated,
            "subscription resumed"
        );
        let updated = fetch_subscription(&state, &id).await?;
        Ok(json!({"subscription": updated, "orders_generated": generated}))
    };
    respond(&state, "/v1/subscriptions/{id}/resume", started, &request_id, work.await).await
}

pub(crate) async fn cancel_subscription_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let work = async {
        let user = authenticate(&state, &headers).await?;
        let sub = fetch_owned_subscription(&state, &id, &user).await?;
        if !sub.status.can_transition(SubscriptionStatus::Cancelled) {
            return Err(ApiError::invalid_transition(
                sub.status.as_str(),
                SubscriptionStatus::Cancelled.as_str(),
            ));
        }
        let now = Utc::now();
        let moved = state
            .store
            .update_subscription_status(&sub.id, sub.status, SubscriptionStatus::Cancelled, now)
            .await
            .map_err(store_error)?;
        if !moved {
            let live = fetch_subscription(&state, &id).await?;
            return Err(ApiError::invalid_transition(
                live.status.as_str(),
                SubscriptionStatus::Cancelled.as_str(),
            ));
        }

        // Future orders refund under the same rules as single-order
        // cancellation.
        let window = chrono::Duration::seconds(state.api.cancellation_window.as_secs() as i64);
        let orders = state
            .store
            .orders_for_subscription(&sub.id)
            .await
            .map_err(store_error)?;
        let mut cancelled = 0usize;
        for order in orders.iter().filter(|o| o.cancellable_at(now, window)) {
            let done = state
                .store
                .update_order_status(&order.id, order.status, OrderStatus::Cancelled, now)
                .await
                .map_err(store_error)?;
            if done {
                state
                    .store
                    .wallet_credit(
                        &order.customer_id,
                        order.total_cents,
                        PaymentKind::Refund,
                        Some(&order.id),
                        None,
                        Some("subscription cancelled"),
                        now,
                    )
                    .await
                    .map_err(store_error)?;
                cancelled += 1;
            }
        }
        info!(
            subscription_id = sub.id.as_str(),
            orders_cancelled = cancelled,
            "subscription cancelled"
        );
        let updated = fetch_subscription(&state, &id).await?;
        Ok(json!({"subscription": updated, "orders_cancelled": cancelled}))
    };
    respond(&state, "/v1/subscriptions/{id}/cancel", started, &request_id, work.await).await
}

async fn fetch_subscription(state: &AppState, id: &str) -> Result<Subscription, ApiError> {
    let sub_id = SubscriptionId::parse(id).map_err(|_| ApiError::not_found("subscription", id))?;
    state
        .store
        .subscription_by_id(&sub_id)
        .await
        .map_err(store_error)?
        .ok_or_else(|| ApiError::not_found("subscription", id))
}

async fn fetch_owned_subscription(
    state: &AppState,
    id: &str,
    user: &User,
) -> Result<Subscription, ApiError> {
    let sub = fetch_subscription(state, id).await?;
    if sub.customer_id != user.id {
        return Err(ApiError::forbidden("not a party to this subscription"));
    }
    Ok(sub)
}

/// Recovers the menu item each meal type maps to from the plan's own
/// generated orders; the order lines carry the snapshotted item id.
fn chosen_items_for(
    sub: &Subscription,
    existing: &[Order],
) -> Result<HashMap<MealType, MenuItemId>, ApiError> {
    let mut chosen = HashMap::new();
    for order in existing {
        for line in &order.lines {
            chosen.entry(line.meal_type).or_insert_with(|| line.menu_item_id.clone());
        }
    }
    for selection in &sub.selections {
        if !chosen.contains_key(&selection.meal_type) {
            warn!(
                subscription_id = sub.id.as_str(),
                meal_type = selection.meal_type.as_str(),
                "plan has no order carrying this meal's menu item id"
            );
            return Err(ApiError::internal("plan selection lost its menu item"));
        }
    }
    Ok(chosen)
}
