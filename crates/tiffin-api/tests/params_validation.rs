use std::collections::BTreeMap;
use tiffin_api::params::{
    parse_admin_users_query, parse_menu_query, parse_orders_query, parse_page,
    parse_restaurants_query, OrderScope, DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT,
};
use tiffin_api::ApiErrorCode;
use tiffin_model::{MealType, OrderStatus, Role};

fn q(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
fn page_defaults_apply() {
    let page = parse_page(&q(&[])).expect("page");
    assert_eq!(page.limit, DEFAULT_PAGE_LIMIT);
    assert!(page.cursor.is_none());
}

#[test]
fn page_limit_bounds_are_enforced() {
    assert!(parse_page(&q(&[("limit", "0")])).is_err());
    assert!(parse_page(&q(&[("limit", "nope")])).is_err());
    let too_big = (MAX_PAGE_LIMIT + 1).to_string();
    assert!(parse_page(&q(&[("limit", &too_big)])).is_err());
    let page = parse_page(&q(&[("limit", "50")])).expect("page");
    assert_eq!(page.limit, 50);
}

#[test]
fn oversized_cursors_are_rejected_before_decoding() {
    let huge = "c".repeat(2000);
    let err = parse_page(&q(&[("cursor", &huge)])).expect_err("cursor too long");
    assert_eq!(err.code, ApiErrorCode::InvalidCursor);
}

#[test]
fn menu_query_requires_restaurant_and_parses_filters() {
    let err = parse_menu_query(&q(&[])).expect_err("missing restaurant_id");
    assert_eq!(err.code, ApiErrorCode::InvalidQueryParameter);

    let parsed = parse_menu_query(&q(&[
        ("restaurant_id", "r-1"),
        ("date", "2025-06-02"),
        ("meal_type", "lunch"),
    ]))
    .expect("menu query");
    assert_eq!(parsed.restaurant_id, "r-1");
    assert_eq!(parsed.meal_type, Some(MealType::Lunch));

    assert!(parse_menu_query(&q(&[("restaurant_id", "r-1"), ("date", "02-06-2025")])).is_err());
    assert!(parse_menu_query(&q(&[("restaurant_id", "r-1"), ("meal_type", "brunch")])).is_err());
}

#[test]
fn orders_query_scope_and_status() {
    let parsed = parse_orders_query(&q(&[])).expect("default scope");
    assert_eq!(parsed.scope, OrderScope::Mine);
    assert!(parsed.status.is_none());

    let parsed =
        parse_orders_query(&q(&[("scope", "restaurant"), ("status", "placed")])).expect("orders");
    assert_eq!(parsed.scope, OrderScope::Restaurant);
    assert_eq!(parsed.status, Some(OrderStatus::Placed));

    assert!(parse_orders_query(&q(&[("scope", "everyone")])).is_err());
    assert!(parse_orders_query(&q(&[("status", "lost")])).is_err());
}

#[test]
fn restaurant_text_filter_is_bounded() {
    let parsed = parse_restaurants_query(&q(&[("query", "dosa")])).expect("query");
    assert_eq!(parsed.text.as_deref(), Some("dosa"));
    let huge = "x".repeat(500);
    assert!(parse_restaurants_query(&q(&[("query", &huge)])).is_err());
}

#[test]
fn admin_users_role_filter_parses() {
    let parsed = parse_admin_users_query(&q(&[("role", "delivery_staff")])).expect("role");
    assert_eq!(parsed.role, Some(Role::DeliveryStaff));
    assert!(parse_admin_users_query(&q(&[("role", "chef")])).is_err());
}
