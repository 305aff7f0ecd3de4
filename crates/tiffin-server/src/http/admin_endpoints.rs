// SPDX-License-Identifier: Apache-2.0

use super::{next_cursor_token, page_position, parse_body, propagated_request_id, respond, store_error};
use crate::auth::{authenticate, require_role};
use crate::*;
use serde_json::json;
use tiffin_api::dto::{ApprovalRequest, UserView};
use tiffin_api::params::{parse_admin_orders_query, parse_admin_users_query};

pub(crate) async fn admin_users_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<BTreeMap<String, String>>,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let work = async {
        let user = authenticate(&state, &headers).await?;
        require_role(&user, Role::Admin)?;
        let q = parse_admin_users_query(&params)?;
        let secret = state.api.token_secret.as_bytes();
        let (after, depth) = page_position(&q.page, "admin_users", secret)?;
        let page = state
            .store
            .list_users(q.role, after.as_ref(), q.page.limit)
            .await
            .map_err(store_error)?;
        let next_cursor = if page.has_more {
            page.items.last().and_then(|u| {
                next_cursor_token("admin_users", secret, depth, u.created_at, u.id.as_str())
            })
        } else {
            None
        };
        let items: Vec<UserView> = page.items.iter().map(UserView::from).collect();
        Ok(json!({"items": items, "next_cursor": next_cursor}))
    };
    respond(&state, "/v1/admin/users", started, &request_id, work.await).await
}

pub(crate) async fn admin_approval_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Bytes,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let work = async {
        let user = authenticate(&state, &headers).await?;
        require_role(&user, Role::Admin)?;
        let req: ApprovalRequest = parse_body(&body)?;

        let target_id = UserId::parse(&id).map_err(|_| ApiError::not_found("user", &id))?;
        let target = state
            .store
            .user_by_id(&target_id)
            .await
            .map_err(store_error)?
            .ok_or_else(|| ApiError::not_found("user", &id))?;
        if !matches!(target.role, Role::Restaurant | Role::DeliveryStaff) {
            return Err(ApiError::validation_failed(
                "only restaurants and delivery staff carry approval",
            ));
        }

        let now = Utc::now();
        let updated = state
            .store
            .set_user_approval(&target_id, req.approved, now)
            .await
            .map_err(store_error)?;
        if !updated {
            return Err(ApiError::not_found("user", &id));
        }
        info!(
            user_id = target_id.as_str(),
            approved = req.approved,
            "approval changed"
        );
        let fresh = state
            .store
            .user_by_id(&target_id)
            .await
            .map_err(store_error)?
            .ok_or_else(|| ApiError::not_found("user", &id))?;
        Ok(json!({"user": UserView::from(&fresh)}))
    };
    respond(&state, "/v1/admin/users/{id}/approval", started, &request_id, work.await).await
}

pub(crate) async fn admin_orders_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<BTreeMap<String, String>>,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let work = async {
        let user = authenticate(&state, &headers).await?;
        require_role(&user, Role::Admin)?;
        let q = parse_admin_orders_query(&params)?;
        let secret = state.api.token_secret.as_bytes();
        let (after, depth) = page_position(&q.page, "admin_orders", secret)?;
        let page = state
            .store
            .list_orders(&OrderOwner::All, q.status, after.as_ref(), q.page.limit)
            .await
            .map_err(store_error)?;
        let next_cursor = if page.has_more {
            page.items.last().and_then(|o| {
                next_cursor_token("admin_orders", secret, depth, o.created_at, o.id.as_str())
            })
        } else {
            None
        };
        Ok(json!({"items": page.items, "next_cursor": next_cursor}))
    };
    respond(&state, "/v1/admin/orders", started, &request_id, work.await).await
}

pub(crate) async fn admin_stats_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let work = async {
        let user = authenticate(&state, &headers).await?;
        require_role(&user, Role::Admin)?;

        let users_by_role = state
            .store
            .count_users_by_role()
            .await
            .map_err(store_error)?;
        let orders_by_status = state
            .store
            .count_orders_by_status()
            .await
            .map_err(store_error)?;
        let active_subscriptions = state
            .store
            .count_active_subscriptions()
            .await
            .map_err(store_error)?;
        let delivered_revenue_cents = state
            .store
            .delivered_revenue_cents()
            .await
            .map_err(store_error)?;
        let ledger_volume_cents = state
            .store
            .ledger_volume_cents()
            .await
            .map_err(store_error)?;

        let users: BTreeMap<String, u64> = users_by_role.into_iter().collect();
        let orders: BTreeMap<&'static str, u64> = orders_by_status
            .into_iter()
            .map(|(status, count)| (status.as_str(), count))
            .collect();
        Ok(json!({
            "users_by_role": users,
            "orders_by_status": orders,
            "active_subscriptions": active_subscriptions,
            "delivered_revenue_cents": delivered_revenue_cents,
            "ledger_volume_cents": ledger_volume_cents,
        }))
    };
    respond(&state, "/v1/admin/stats", started, &request_id, work.await).await
}

pub(crate) async fn admin_delete_review_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let work = async {
        let user = authenticate(&state, &headers).await?;
        require_role(&user, Role::Admin)?;
        let review_id = ReviewId::parse(&id).map_err(|_| ApiError::not_found("review", &id))?;
        let removed = state
            .store
            .delete_review(&review_id, Utc::now())
            .await
            .map_err(store_error)?
            .ok_or_else(|| ApiError::not_found("review", &id))?;
        info!(
            review_id = removed.id.as_str(),
            restaurant_id = removed.restaurant_id.as_str(),
            "review removed"
        );
        Ok(json!({"deleted": true, "review": removed}))
    };
    respond(&state, "/v1/admin/reviews/{id}", started, &request_id, work.await).await
}
