use tiffin_model::{
    normalize_email, parse_service_date, validate_email, validate_rating, validate_referral_code,
    DeliveryStatus, MealType, OrderId, OrderStatus, PaymentKind, PaymentMethod, Role,
    SubscriptionStatus, UserId, ID_MAX_LEN,
};

#[test]
fn ids_reject_hidden_trimming() {
    assert!(UserId::parse("u-123").is_ok());
    assert!(UserId::parse(" u-123").is_err());
    assert!(UserId::parse("u-123 ").is_err());
    assert!(OrderId::parse("o_456").is_ok());
    assert!(OrderId::parse("o 456").is_err());
}

#[test]
fn max_size_limits_are_enforced() {
    let too_long = "u".repeat(ID_MAX_LEN + 1);
    assert!(UserId::parse(&too_long).is_err());
}

#[test]
fn fresh_ids_survive_the_parser() {
    for _ in 0..8 {
        let id = UserId::fresh();
        assert!(UserId::parse(id.as_str()).is_ok());
    }
}

#[test]
fn email_normalization_then_validation_composes() {
    let email = normalize_email("  Priya@Example.COM ");
    assert_eq!(email, "priya@example.com");
    assert!(validate_email(&email).is_ok());
    assert!(validate_email("nobody").is_err());
}

#[test]
fn enums_round_trip_through_their_string_forms() {
    for status in [
        OrderStatus::PendingPayment,
        OrderStatus::Placed,
        OrderStatus::Accepted,
        OrderStatus::Preparing,
        OrderStatus::Ready,
        OrderStatus::OutForDelivery,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
        OrderStatus::Rejected,
    ] {
        assert_eq!(OrderStatus::parse(status.as_str()).unwrap(), status);
    }
    for status in [
        DeliveryStatus::Unassigned,
        DeliveryStatus::Claimed,
        DeliveryStatus::PickedUp,
        DeliveryStatus::Delivering,
        DeliveryStatus::Delivered,
    ] {
        assert_eq!(DeliveryStatus::parse(status.as_str()).unwrap(), status);
    }
    for status in [
        SubscriptionStatus::Active,
        SubscriptionStatus::Paused,
        SubscriptionStatus::Cancelled,
        SubscriptionStatus::Completed,
    ] {
        assert_eq!(SubscriptionStatus::parse(status.as_str()).unwrap(), status);
    }
    for role in [
        Role::Customer,
        Role::Restaurant,
        Role::DeliveryStaff,
        Role::Admin,
    ] {
        assert_eq!(Role::parse(role.as_str()).unwrap(), role);
    }
    assert_eq!(
        PaymentMethod::parse("wallet").unwrap(),
        PaymentMethod::Wallet
    );
    assert!(PaymentMethod::parse("cheque").is_err());
}

#[test]
fn serde_forms_match_parse_forms() {
    let json = serde_json::to_string(&OrderStatus::OutForDelivery).unwrap();
    assert_eq!(json, "\"out_for_delivery\"");
    let back: OrderStatus = serde_json::from_str(&json).unwrap();
    assert_eq!(back, OrderStatus::OutForDelivery);

    let json = serde_json::to_string(&Role::DeliveryStaff).unwrap();
    assert_eq!(json, "\"delivery_staff\"");

    let json = serde_json::to_string(&PaymentKind::ReferralReward).unwrap();
    assert_eq!(json, "\"referral_reward\"");
}

#[test]
fn service_dates_and_meal_types_are_strict() {
    assert!(parse_service_date("2025-06-01").is_ok());
    assert!(parse_service_date("2025-6-1").is_err());
    assert!(MealType::parse("lunch").is_ok());
    assert!(MealType::parse("supper").is_err());
}

#[test]
fn rating_and_referral_code_bounds() {
    assert!(validate_rating(3).is_ok());
    assert!(validate_rating(0).is_err());
    assert!(validate_referral_code("QWERTY23").is_ok());
    assert!(validate_referral_code("QWERTY2").is_err());
}
