// SPDX-License-Identifier: Apache-2.0

use super::{next_cursor_token, page_position, propagated_request_id, respond, store_error};
use crate::auth::authenticate;
use crate::*;
use serde_json::json;
use tiffin_api::dto::RestaurantView;
use tiffin_api::params::parse_restaurants_query;

pub(crate) async fn restaurants_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<BTreeMap<String, String>>,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let work = async {
        let q = parse_restaurants_query(&params)?;
        let secret = state.api.token_secret.as_bytes();
        let (after, depth) = page_position(&q.page, "restaurants", secret)?;
        let page = state
            .store
            .list_restaurants(q.text.as_deref(), after.as_ref(), q.page.limit)
            .await
            .map_err(store_error)?;
        let next_cursor = if page.has_more {
            page.items.last().and_then(|u| {
                next_cursor_token("restaurants", secret, depth, u.created_at, u.id.as_str())
            })
        } else {
            None
        };
        let items: Vec<RestaurantView> = page.items.iter().map(RestaurantView::from).collect();
        Ok(json!({"items": items, "next_cursor": next_cursor}))
    };
    respond(&state, "/v1/restaurants", started, &request_id, work.await).await
}

pub(crate) async fn restaurant_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let work = async {
        let restaurant_id = UserId::parse(&id).map_err(|_| ApiError::not_found("restaurant", &id))?;
        let target = state
            .store
            .user_by_id(&restaurant_id)
            .await
            .map_err(store_error)?
            .filter(|u| u.role == Role::Restaurant)
            .ok_or_else(|| ApiError::not_found("restaurant", &id))?;
        if !target.approved {
            // Hidden from the public until approved; the owner and admins
            // still see it.
            let viewer = authenticate(&state, &headers).await.ok();
            let allowed = viewer
                .as_ref()
                .is_some_and(|v| v.id == target.id || v.role == Role::Admin);
            if !allowed {
                return Err(ApiError::not_found("restaurant", &id));
            }
        }
        Ok(json!({"restaurant": RestaurantView::from(&target)}))
    };
    respond(&state, "/v1/restaurants/{id}", started, &request_id, work.await).await
}
