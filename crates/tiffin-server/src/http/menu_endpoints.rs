// SPDX-License-Identifier: Apache-2.0

use super::{parse_body, propagated_request_id, respond, store_error};
use crate::auth::{authenticate, require_approved, require_role};
use crate::*;
use serde_json::json;
use tiffin_api::dto::{CreateMenuItemRequest, UpdateMenuItemRequest, UploadRequest};
use tiffin_api::params::parse_menu_query;

pub(crate) async fn menu_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<BTreeMap<String, String>>,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let work = async {
        let q = parse_menu_query(&params)?;
        let restaurant_id = UserId::parse(&q.restaurant_id)
            .map_err(|_| ApiError::not_found("restaurant", &q.restaurant_id))?;
        let restaurant = state
            .store
            .user_by_id(&restaurant_id)
            .await
            .map_err(store_error)?
            .filter(|u| u.role == Role::Restaurant && u.approved)
            .ok_or_else(|| ApiError::not_found("restaurant", &q.restaurant_id))?;
        let date = q.service_date.unwrap_or_else(|| Utc::now().date_naive());
        let items = state
            .store
            .list_menu(&restaurant.id, date, q.meal_type)
            .await
            .map_err(store_error)?;
        Ok(json!({
            "restaurant_id": restaurant.id.as_str(),
            "date": date.format("%Y-%m-%d").to_string(),
            "items": items,
        }))
    };
    respond(&state, "/v1/menu", started, &request_id, work.await).await
}

pub(crate) async fn create_menu_item_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let work = async {
        let user = authenticate(&state, &headers).await?;
        require_role(&user, Role::Restaurant)?;
        require_approved(&user)?;
        let req: CreateMenuItemRequest = parse_body(&body)?;

        let service_date = parse_service_date(&req.date)
            .map_err(|e| ApiError::validation_failed(e.to_string()))?;
        let meal_type = MealType::parse(&req.meal_type)
            .map_err(|e| ApiError::validation_failed(e.to_string()))?;

        let image_url = match req.image_url {
            Some(url) => Some(url),
            None => match state.integrations.photos.photo_url(&req.name).await {
                Ok(url) => url,
                Err(e) => {
                    warn!(request_id = %request_id, "stock photo lookup failed: {e}");
                    None
                }
            },
        };

        let now = Utc::now();
        let item = MenuItem {
            id: MenuItemId::fresh(),
            restaurant_id: user.id.clone(),
            name: req.name,
            description: req.description.unwrap_or_default(),
            price_cents: req.price_cents,
            service_date,
            meal_type,
            image_url,
            tags: req.tags.unwrap_or_default(),
            active: true,
            created_at: now,
            updated_at: now,
        };
        item.validate()
            .map_err(|e| ApiError::validation_failed(e.to_string()))?;
        state
            .store
            .insert_menu_item(&item)
            .await
            .map_err(store_error)?;
        info!(request_id = %request_id, item_id = %item.id.as_str(), "menu item created");
        Ok(json!({"item": item}))
    };
    respond(&state, "/v1/menu", started, &request_id, work.await).await
}

pub(crate) async fn update_menu_item_handler(
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
        let item_id =
            MenuItemId::parse(&id).map_err(|_| ApiError::not_found("menu item", &id))?;
        let mut item = state
            .store
            .menu_item_by_id(&item_id)
            .await
            .map_err(store_error)?
            .ok_or_else(|| ApiError::not_found("menu item", &id))?;
        if item.restaurant_id != user.id {
            return Err(ApiError::forbidden("menu item belongs to another restaurant"));
        }

        let req: UpdateMenuItemRequest = parse_body(&body)?;
        if let Some(name) = req.name {
            item.name = name;
        }
        if let Some(description) = req.description {
            item.description = description;
        }
        if let Some(price_cents) = req.price_cents {
            item.price_cents = price_cents;
        }
        if let Some(date) = req.date {
            item.service_date = parse_service_date(&date)
                .map_err(|e| ApiError::validation_failed(e.to_string()))?;
        }
        if let Some(meal_type) = req.meal_type {
            item.meal_type = MealType::parse(&meal_type)
                .map_err(|e| ApiError::validation_failed(e.to_string()))?;
        }
        if let Some(image_url) = req.image_url {
            item.image_url = Some(image_url);
        }
        if let Some(tags) = req.tags {
            item.tags = tags;
        }
        if let Some(active) = req.active {
            item.active = active;
        }
        item.updated_at = Utc::now();
        item.validate()
            .map_err(|e| ApiError::validation_failed(e.to_string()))?;

        let updated = state
            .store
            .update_menu_item(&item)
            .await
            .map_err(store_error)?;
        if !updated {
            return Err(ApiError::not_found("menu item", &id));
        }
        Ok(json!({"item": item}))
    };
    respond(&state, "/v1/menu/{id}", started, &request_id, work.await).await
}

pub(crate) async fn delete_menu_item_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let work = async {
        let user = authenticate(&state, &headers).await?;
        require_role(&user, Role::Restaurant)?;
        let item_id =
            MenuItemId::parse(&id).map_err(|_| ApiError::not_found("menu item", &id))?;
        let item = state
            .store
            .menu_item_by_id(&item_id)
            .await
            .map_err(store_error)?
            .ok_or_else(|| ApiError::not_found("menu item", &id))?;
        if item.restaurant_id != user.id {
            return Err(ApiError::forbidden("menu item belongs to another restaurant"));
        }
        let deleted = state
            .store
            .delete_menu_item(&item_id)
            .await
            .map_err(store_error)?;
        if !deleted {
            return Err(ApiError::not_found("menu item", &id));
        }
        info!(request_id = %request_id, item_id = %id, "menu item deleted");
        Ok(json!({"deleted": true, "id": id}))
    };
    respond(&state, "/v1/menu/{id}", started, &request_id, work.await).await
}

pub(crate) async fn upload_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let work = async {
        let user = authenticate(&state, &headers).await?;
        if user.role != Role::Restaurant && user.role != Role::Admin {
            return Err(ApiError::forbidden("requires restaurant or admin role"));
        }
        let req: UploadRequest = parse_body(&body)?;
        if req.filename.trim().is_empty() {
            return Err(ApiError::validation_failed("filename must not be empty"));
        }
        // Base64 expands by 4/3; compare in decoded terms.
        let decoded_estimate = (req.data_base64.len() / 4) * 3;
        if decoded_estimate > state.api.max_upload_bytes {
            return Err(ApiError::payload_too_large(state.api.max_upload_bytes));
        }
        let url = state
            .integrations
            .images
            .upload_base64(&req.filename, &req.data_base64)
            .await
            .map_err(|e| {
                warn!(request_id = %request_id, "image upload failed: {e}");
                ApiError::upstream_failed("image host")
            })?;
        Ok(json!({"url": url}))
    };
    respond(&state, "/v1/upload", started, &request_id, work.await).await
}
