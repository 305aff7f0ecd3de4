// SPDX-License-Identifier: Apache-2.0

use crate::ApiError;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use tiffin_model::{parse_service_date, MealType, OrderStatus, Role};

pub const DEFAULT_PAGE_LIMIT: usize = 20;
pub const MAX_PAGE_LIMIT: usize = 100;
pub const MAX_CURSOR_BYTES: usize = 1024;
pub const MAX_QUERY_TEXT_LEN: usize = 120;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageParams {
    pub limit: usize,
    pub cursor: Option<String>,
}

pub fn parse_page(query: &BTreeMap<String, String>) -> Result<PageParams, ApiError> {
    parse_page_with_limit(query, DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT)
}

pub fn parse_page_with_limit(
    query: &BTreeMap<String, String>,
    default_limit: usize,
    max_limit: usize,
) -> Result<PageParams, ApiError> {
    let limit = if let Some(raw) = query.get("limit") {
        let value = raw
            .parse::<usize>()
            .map_err(|_| ApiError::invalid_param("limit", raw))?;
        if value == 0 || value > max_limit {
            return Err(ApiError::invalid_param("limit", raw));
        }
        value
    } else {
        default_limit
    };

    let cursor = query.get("cursor").cloned();
    if let Some(value) = &cursor {
        if value.len() > MAX_CURSOR_BYTES {
            return Err(ApiError::invalid_cursor(value));
        }
    }

    Ok(PageParams { limit, cursor })
}

#[derive(Debug, Clone, PartialEq)]
pub struct RestaurantsQuery {
    pub text: Option<String>,
    pub page: PageParams,
}

pub fn parse_restaurants_query(
    query: &BTreeMap<String, String>,
) -> Result<RestaurantsQuery, ApiError> {
    let text = query.get("query").cloned();
    if let Some(value) = &text {
        if value.is_empty() || value.len() > MAX_QUERY_TEXT_LEN {
            return Err(ApiError::invalid_param("query", value));
        }
    }
    Ok(RestaurantsQuery {
        text,
        page: parse_page(query)?,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct MenuQuery {
    pub restaurant_id: String,
    pub service_date: Option<NaiveDate>,
    pub meal_type: Option<MealType>,
}

pub fn parse_menu_query(query: &BTreeMap<String, String>) -> Result<MenuQuery, ApiError> {
    let restaurant_id = query
        .get("restaurant_id")
        .cloned()
        .ok_or_else(|| ApiError::missing_param("restaurant_id"))?;

    let service_date = match query.get("date") {
        Some(raw) => {
            Some(parse_service_date(raw).map_err(|_| ApiError::invalid_param("date", raw))?)
        }
        None => None,
    };

    let meal_type = match query.get("meal_type") {
        Some(raw) => {
            Some(MealType::parse(raw).map_err(|_| ApiError::invalid_param("meal_type", raw))?)
        }
        None => None,
    };

    Ok(MenuQuery {
        restaurant_id,
        service_date,
        meal_type,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderScope {
    Mine,
    Restaurant,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrdersQuery {
    pub scope: OrderScope,
    pub status: Option<OrderStatus>,
    pub page: PageParams,
}

pub fn parse_orders_query(query: &BTreeMap<String, String>) -> Result<OrdersQuery, ApiError> {
    let scope = match query.get("scope").map(String::as_str) {
        None | Some("mine") => OrderScope::Mine,
        Some("restaurant") => OrderScope::Restaurant,
        Some(other) => return Err(ApiError::invalid_param("scope", other)),
    };

    let status = match query.get("status") {
        Some(raw) => {
            Some(OrderStatus::parse(raw).map_err(|_| ApiError::invalid_param("status", raw))?)
        }
        None => None,
    };

    Ok(OrdersQuery {
        scope,
        status,
        page: parse_page(query)?,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReviewsQuery {
    pub restaurant_id: String,
    pub page: PageParams,
}

pub fn parse_reviews_query(query: &BTreeMap<String, String>) -> Result<ReviewsQuery, ApiError> {
    let restaurant_id = query
        .get("restaurant_id")
        .cloned()
        .ok_or_else(|| ApiError::missing_param("restaurant_id"))?;
    Ok(ReviewsQuery {
        restaurant_id,
        page: parse_page(query)?,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct AdminUsersQuery {
    pub role: Option<Role>,
    pub page: PageParams,
}

pub fn parse_admin_users_query(
    query: &BTreeMap<String, String>,
) -> Result<AdminUsersQuery, ApiError> {
    let role = match query.get("role") {
        Some(raw) => Some(Role::parse(raw).map_err(|_| ApiError::invalid_param("role", raw))?),
        None => None,
    };
    Ok(AdminUsersQuery {
        role,
        page: parse_page(query)?,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct AdminOrdersQuery {
    pub status: Option<OrderStatus>,
    pub page: PageParams,
}

pub fn parse_admin_orders_query(
    query: &BTreeMap<String, String>,
) -> Result<AdminOrdersQuery, ApiError> {
    let status = match query.get("status") {
        Some(raw) => {
            Some(OrderStatus::parse(raw).map_err(|_| ApiError::invalid_param("status", raw))?)
        }
        None => None,
    };
    Ok(AdminOrdersQuery {
        status,
        page: parse_page(query)?,
    })
}
