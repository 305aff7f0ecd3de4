// SPDX-License-Identifier: Apache-2.0

use super::{next_cursor_token, page_position, parse_body, propagated_request_id, respond, store_error};
use crate::auth::{authenticate, require_role};
use crate::*;
use serde_json::json;
use tiffin_api::dto::CreateReviewRequest;
use tiffin_api::params::parse_reviews_query;

pub(crate) async fn create_review_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let work = async {
        let user = authenticate(&state, &headers).await?;
        require_role(&user, Role::Customer)?;
        let req: CreateReviewRequest = parse_body(&body)?;

        let order_id =
            OrderId::parse(&req.order_id).map_err(|_| ApiError::not_found("order", &req.order_id))?;
        let order = state
            .store
            .order_by_id(&order_id)
            .await
            .map_err(store_error)?
            .ok_or_else(|| ApiError::not_found("order", &req.order_id))?;
        if order.customer_id != user.id {
            return Err(ApiError::forbidden("order belongs to another customer"));
        }
        if order.status != OrderStatus::Delivered {
            return Err(ApiError::validation_failed("only delivered orders can be reviewed"));
        }

        let review = Review {
            id: ReviewId::fresh(),
            order_id: order.id.clone(),
            customer_id: user.id.clone(),
            restaurant_id: order.restaurant_id.clone(),
            rating: req.rating,
            comment: req.comment.unwrap_or_default(),
            created_at: Utc::now(),
        };
        review
            .validate()
            .map_err(|e| ApiError::validation_failed(e.to_string()))?;

        match state.store.insert_review(&review).await.map_err(store_error)? {
            InsertReviewOutcome::Inserted => {
                info!(
                    review_id = review.id.as_str(),
                    restaurant_id = review.restaurant_id.as_str(),
                    rating = review.rating,
                    "review recorded"
                );
                Ok(json!({"review": review}))
            }
            InsertReviewOutcome::DuplicateOrder => {
                Err(ApiError::duplicate_review(order.id.as_str()))
            }
        }
    };
    respond(&state, "/v1/reviews", started, &request_id, work.await).await
}

pub(crate) async fn reviews_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<BTreeMap<String, String>>,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let work = async {
        let q = parse_reviews_query(&params)?;
        let restaurant_id = UserId::parse(&q.restaurant_id)
            .map_err(|_| ApiError::not_found("restaurant", &q.restaurant_id))?;
        let restaurant = state
            .store
            .user_by_id(&restaurant_id)
            .await
            .map_err(store_error)?
            .filter(|u| u.role == Role::Restaurant && u.approved)
            .ok_or_else(|| ApiError::not_found("restaurant", &q.restaurant_id))?;

        let secret = state.api.token_secret.as_bytes();
        let (after, depth) = page_position(&q.page, "reviews", secret)?;
        let page = state
            .store
            .reviews_for_restaurant(&restaurant.id, after.as_ref(), q.page.limit)
            .await
            .map_err(store_error)?;
        let next_cursor = if page.has_more {
            page.items.last().and_then(|r| {
                next_cursor_token("reviews", secret, depth, r.created_at, r.id.as_str())
            })
        } else {
            None
        };
        Ok(json!({"items": page.items, "next_cursor": next_cursor}))
    };
    respond(&state, "/v1/reviews", started, &request_id, work.await).await
}
