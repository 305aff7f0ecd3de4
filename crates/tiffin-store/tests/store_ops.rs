// SPDX-License-Identifier: Apache-2.0

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Arc;
use tempfile::tempdir;
use tiffin_model::{
    Address, Delivery, DeliveryStatus, MealType, MenuItem, MenuItemId, Order, OrderLine,
    OrderStatus, PaymentKind, PaymentMethod, Referral, ReferralId, RestaurantProfile, Review,
    ReviewId, Role, User, UserId,
};
use tiffin_store::{
    fmt_ts, CheckoutPurpose, CheckoutSession, ClaimOutcome, DebitOutcome, InsertReviewOutcome,
    InsertUserOutcome, OrderOwner, PageAfter, Store,
};

fn ts(offset_secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap() + Duration::seconds(offset_secs)
}

fn mk_address() -> Address {
    Address {
        line1: "12 Curd Rice Lane".to_string(),
        city: "Bengaluru".to_string(),
        postcode: "560001".to_string(),
        geo: None,
    }
}

fn mk_user(tag: &str, role: Role, balance_cents: i64) -> User {
    let restaurant_profile = (role == Role::Restaurant).then(|| RestaurantProfile {
        display_name: format!("Kitchen {tag}"),
        cuisine: "south indian".to_string(),
        description: "daily tiffin".to_string(),
        image_url: None,
        rating_sum: 0,
        rating_count: 0,
    });
    User {
        id: UserId::fresh(),
        role,
        name: format!("user {tag}"),
        email: format!("{tag}@example.test"),
        password_hash: "0".repeat(64),
        password_salt: "1".repeat(32),
        phone: None,
        wallet_balance_cents: balance_cents,
        address: Some(mk_address()),
        referral_code: format!("{:A>8}", tag.to_uppercase()),
        referred_by: None,
        approved: true,
        available: true,
        delivered_order_count: 0,
        restaurant_profile,
        created_at: ts(0),
        updated_at: ts(0),
    }
}

fn mk_order(customer: &User, restaurant: &User, status: OrderStatus, at: DateTime<Utc>) -> Order {
    let line = OrderLine {
        menu_item_id: MenuItemId::fresh(),
        name: "ragi dosa".to_string(),
        unit_price_cents: 450,
        meal_type: MealType::Lunch,
        quantity: 2,
    };
    Order {
        id: tiffin_model::OrderId::fresh(),
        customer_id: customer.id.clone(),
        restaurant_id: restaurant.id.clone(),
        lines: vec![line],
        subtotal_cents: 900,
        delivery_fee_cents: 199,
        total_cents: 1099,
        status,
        payment_method: PaymentMethod::Wallet,
        delivery_address: mk_address(),
        deliver_at: at + Duration::hours(6),
        subscription_id: None,
        created_at: at,
        updated_at: at,
    }
}

fn mk_delivery(order: &Order, at: DateTime<Utc>) -> Delivery {
    Delivery {
        id: tiffin_model::DeliveryId::fresh(),
        order_id: order.id.clone(),
        customer_id: order.customer_id.clone(),
        staff_id: None,
        status: DeliveryStatus::Unassigned,
        pickup_address: mk_address(),
        dropoff_address: mk_address(),
        last_position: None,
        claimed_at: None,
        delivered_at: None,
        created_at: at,
        updated_at: at,
    }
}

async fn seed_order(
    store: &Store,
    customer_tag: &str,
    restaurant_tag: &str,
    status: OrderStatus,
) -> (User, User, Order) {
    let customer = mk_user(customer_tag, Role::Customer, 10_000);
    let restaurant = mk_user(restaurant_tag, Role::Restaurant, 0);
    store.insert_user(&customer).await.expect("insert customer");
    store
        .insert_user(&restaurant)
        .await
        .expect("insert restaurant");
    let order = mk_order(&customer, &restaurant, status, ts(1));
    store.insert_order(&order).await.expect("insert order");
    (customer, restaurant, order)
}

#[tokio::test]
async fn insert_user_enforces_unique_email_and_referral_code() {
    let store = Store::open_in_memory().expect("store");
    let alice = mk_user("alice", Role::Customer, 0);
    assert_eq!(
        store.insert_user(&alice).await.expect("first insert"),
        InsertUserOutcome::Inserted
    );

    let mut dup_email = mk_user("alice2", Role::Customer, 0);
    dup_email.email = alice.email.clone();
    assert_eq!(
        store.insert_user(&dup_email).await.expect("dup email"),
        InsertUserOutcome::DuplicateEmail
    );

    let mut dup_code = mk_user("alice3", Role::Customer, 0);
    dup_code.referral_code = alice.referral_code.clone();
    assert_eq!(
        store.insert_user(&dup_code).await.expect("dup code"),
        InsertUserOutcome::ReferralCodeTaken
    );

    let loaded = store
        .user_by_email(&alice.email)
        .await
        .expect("fetch")
        .expect("present");
    assert_eq!(loaded.id, alice.id);
    assert_eq!(loaded.restaurant_profile, None);
}

#[tokio::test]
async fn wallet_debit_requires_funds_and_appends_ledger() {
    let store = Store::open_in_memory().expect("store");
    let user = mk_user("wally", Role::Customer, 0);
    store.insert_user(&user).await.expect("insert user");

    let balance = store
        .wallet_credit(&user.id, 1_000, PaymentKind::Topup, None, None, None, ts(1))
        .await
        .expect("credit");
    assert_eq!(balance, 1_000);

    let outcome = store
        .wallet_debit(&user.id, 300, PaymentKind::OrderDebit, None, None, ts(2))
        .await
        .expect("debit");
    assert_eq!(outcome, DebitOutcome::Debited(700));

    let outcome = store
        .wallet_debit(&user.id, 10_000, PaymentKind::OrderDebit, None, None, ts(3))
        .await
        .expect("debit over balance");
    assert_eq!(
        outcome,
        DebitOutcome::Insufficient {
            balance_cents: 700
        }
    );

    let reread = store
        .user_by_id(&user.id)
        .await
        .expect("fetch")
        .expect("present");
    assert_eq!(
        reread.wallet_balance_cents, 700,
        "failed debit must not move the balance"
    );

    let ledger = store
        .ledger_for_user(&user.id, None, 10)
        .await
        .expect("ledger");
    assert_eq!(ledger.items.len(), 2, "one credit and one debit recorded");
    assert!(!ledger.has_more);
    assert_eq!(ledger.items[0].kind, PaymentKind::OrderDebit);
    assert_eq!(ledger.items[1].kind, PaymentKind::Topup);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn claim_admits_exactly_one_winner() {
    let store = Store::open_in_memory().expect("store");
    let (_, _, order) = seed_order(&store, "claimc", "claimr", OrderStatus::Ready).await;
    let delivery = mk_delivery(&order, ts(2));
    store.insert_delivery(&delivery).await.expect("insert offer");

    let store = Arc::new(store);
    let mut handles = Vec::new();
    for n in 0..6 {
        let store = Arc::clone(&store);
        let delivery_id = delivery.id.clone();
        handles.push(tokio::spawn(async move {
            let staff = mk_user(&format!("rider{n}"), Role::DeliveryStaff, 0);
            store.insert_user(&staff).await.expect("insert staff");
            store
                .claim_delivery(&delivery_id, &staff.id, ts(3))
                .await
                .expect("claim")
        }));
    }

    let mut winners = 0;
    let mut losers = 0;
    for handle in handles {
        match handle.await.expect("join") {
            ClaimOutcome::Claimed(claimed) => {
                winners += 1;
                assert_eq!(claimed.status, DeliveryStatus::Claimed);
                assert!(claimed.staff_id.is_some());
                assert!(claimed.claimed_at.is_some());
            }
            ClaimOutcome::AlreadyClaimed => losers += 1,
            ClaimOutcome::NotFound => panic!("offer must exist"),
        }
    }
    assert_eq!(winners, 1, "exactly one claim may win");
    assert_eq!(losers, 5);

    let missing = tiffin_model::DeliveryId::fresh();
    let staff = mk_user("riderx", Role::DeliveryStaff, 0);
    store.insert_user(&staff).await.expect("insert staff");
    assert_eq!(
        store
            .claim_delivery(&missing, &staff.id, ts(4))
            .await
            .expect("claim missing"),
        ClaimOutcome::NotFound
    );
}

#[tokio::test]
async fn delivery_status_updates_are_fenced_to_assigned_staff() {
    let store = Store::open_in_memory().expect("store");
    let (_, _, order) = seed_order(&store, "fencec", "fencer", OrderStatus::Ready).await;
    let delivery = mk_delivery(&order, ts(2));
    store.insert_delivery(&delivery).await.expect("insert offer");

    let staff = mk_user("fences", Role::DeliveryStaff, 0);
    let intruder = mk_user("fencei", Role::DeliveryStaff, 0);
    store.insert_user(&staff).await.expect("insert staff");
    store.insert_user(&intruder).await.expect("insert intruder");

    let outcome = store
        .claim_delivery(&delivery.id, &staff.id, ts(3))
        .await
        .expect("claim");
    assert!(matches!(outcome, ClaimOutcome::Claimed(_)));

    let moved = store
        .update_delivery_status(
            &delivery.id,
            &intruder.id,
            DeliveryStatus::Claimed,
            DeliveryStatus::PickedUp,
            ts(4),
        )
        .await
        .expect("intruder update");
    assert!(!moved, "only the assigned staff may advance the delivery");

    let moved = store
        .update_delivery_status(
            &delivery.id,
            &staff.id,
            DeliveryStatus::Claimed,
            DeliveryStatus::PickedUp,
            ts(4),
        )
        .await
        .expect("staff update");
    assert!(moved);

    let reread = store
        .delivery_by_id(&delivery.id)
        .await
        .expect("fetch")
        .expect("present");
    assert_eq!(reread.status, DeliveryStatus::PickedUp);
    assert_eq!(reread.delivered_at, None);
}

#[tokio::test]
async fn order_status_update_is_conditional_on_current_state() {
    let store = Store::open_in_memory().expect("store");
    let (_, _, order) = seed_order(&store, "casc", "casr", OrderStatus::Placed).await;

    let moved = store
        .update_order_status(&order.id, OrderStatus::Placed, OrderStatus::Accepted, ts(5))
        .await
        .expect("first transition");
    assert!(moved);

    let moved = store
        .update_order_status(&order.id, OrderStatus::Placed, OrderStatus::Rejected, ts(6))
        .await
        .expect("stale transition");
    assert!(!moved, "stale precondition must not overwrite the status");

    let reread = store
        .order_by_id(&order.id)
        .await
        .expect("fetch")
        .expect("present");
    assert_eq!(reread.status, OrderStatus::Accepted);
}

#[tokio::test]
async fn referral_reward_is_paid_once() {
    let store = Store::open_in_memory().expect("store");
    let referrer = mk_user("refr", Role::Customer, 0);
    let referee = mk_user("refe", Role::Customer, 0);
    store.insert_user(&referrer).await.expect("insert referrer");
    store.insert_user(&referee).await.expect("insert referee");

    let referral = Referral {
        id: ReferralId::fresh(),
        referrer_id: referrer.id.clone(),
        referee_id: referee.id.clone(),
        code: referrer.referral_code.clone(),
        reward_cents: 500,
        rewarded: false,
        rewarded_at: None,
        created_at: ts(0),
    };
    store.insert_referral(&referral).await.expect("insert referral");

    assert!(store
        .mark_referral_rewarded(&referral.id, ts(10))
        .await
        .expect("first payout"));
    assert!(
        !store
            .mark_referral_rewarded(&referral.id, ts(11))
            .await
            .expect("second payout"),
        "reward must be one-time"
    );

    let rows = store
        .list_referrals_for_referrer(&referrer.id)
        .await
        .expect("list");
    assert_eq!(rows.len(), 1);
    assert!(rows[0].rewarded);
    assert_eq!(rows[0].rewarded_at, Some(ts(10)));
}

#[tokio::test]
async fn checkout_session_completes_exactly_once() {
    let store = Store::open_in_memory().expect("store");
    let user = mk_user("payer", Role::Customer, 0);
    store.insert_user(&user).await.expect("insert user");

    let session = CheckoutSession {
        session_id: "cs_test_123".to_string(),
        user_id: user.id.clone(),
        purpose: CheckoutPurpose::Topup,
        order_id: None,
        amount_cents: 2_500,
        completed: false,
        created_at: ts(0),
    };
    store
        .insert_checkout_session(&session)
        .await
        .expect("insert session");

    let completed = store
        .complete_checkout_session("cs_test_123", ts(1))
        .await
        .expect("complete")
        .expect("first completion wins");
    assert_eq!(completed.purpose, CheckoutPurpose::Topup);
    assert_eq!(completed.amount_cents, 2_500);

    assert!(
        store
            .complete_checkout_session("cs_test_123", ts(2))
            .await
            .expect("replay")
            .is_none(),
        "replayed webhook must be ignored"
    );
    assert!(store
        .complete_checkout_session("cs_unknown", ts(3))
        .await
        .expect("unknown session")
        .is_none());
}

#[tokio::test]
async fn orders_page_newest_first_without_overlap() {
    let store = Store::open_in_memory().expect("store");
    let customer = mk_user("pagec", Role::Customer, 0);
    let restaurant = mk_user("pager", Role::Restaurant, 0);
    store.insert_user(&customer).await.expect("insert customer");
    store
        .insert_user(&restaurant)
        .await
        .expect("insert restaurant");

    let mut inserted = Vec::new();
    for n in 0..5 {
        let order = mk_order(&customer, &restaurant, OrderStatus::Placed, ts(n * 60));
        store.insert_order(&order).await.expect("insert order");
        inserted.push(order);
    }

    let owner = OrderOwner::Customer(customer.id.clone());
    let mut seen = Vec::new();
    let mut after: Option<PageAfter> = None;
    loop {
        let page = store
            .list_orders(&owner, None, after.as_ref(), 2)
            .await
            .expect("page");
        for order in &page.items {
            seen.push(order.id.clone());
        }
        if !page.has_more {
            break;
        }
        let last = page.items.last().expect("non-empty page");
        after = Some(PageAfter {
            created_at: fmt_ts(last.created_at),
            id: last.id.as_str().to_string(),
        });
    }

    let mut expected: Vec<_> = inserted.iter().rev().map(|o| o.id.clone()).collect();
    assert_eq!(seen, expected, "pages must walk newest to oldest");
    expected.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    expected.dedup();
    assert_eq!(expected.len(), 5, "no order may repeat across pages");

    let filtered = store
        .list_orders(&owner, Some(OrderStatus::Delivered), None, 10)
        .await
        .expect("filtered page");
    assert!(filtered.items.is_empty());
}

#[tokio::test]
async fn review_is_unique_per_order_and_moves_rating() {
    let store = Store::open_in_memory().expect("store");
    let (customer, restaurant, order) =
        seed_order(&store, "revc", "revr", OrderStatus::Delivered).await;

    let review = Review {
        id: ReviewId::fresh(),
        order_id: order.id.clone(),
        customer_id: customer.id.clone(),
        restaurant_id: restaurant.id.clone(),
        rating: 4,
        comment: "crisp dosa, quick delivery".to_string(),
        created_at: ts(10),
    };
    assert_eq!(
        store.insert_review(&review).await.expect("insert review"),
        InsertReviewOutcome::Inserted
    );

    let mut repeat = review.clone();
    repeat.id = ReviewId::fresh();
    repeat.rating = 1;
    assert_eq!(
        store.insert_review(&repeat).await.expect("repeat review"),
        InsertReviewOutcome::DuplicateOrder
    );

    let profile = store
        .user_by_id(&restaurant.id)
        .await
        .expect("fetch restaurant")
        .expect("present")
        .restaurant_profile
        .expect("restaurant profile");
    assert_eq!(profile.rating_sum, 4);
    assert_eq!(profile.rating_count, 1);

    let page = store
        .reviews_for_restaurant(&restaurant.id, None, 10)
        .await
        .expect("list reviews");
    assert_eq!(page.items.len(), 1);

    let removed = store
        .delete_review(&review.id, ts(20))
        .await
        .expect("delete")
        .expect("present");
    assert_eq!(removed.id, review.id);
    let profile = store
        .user_by_id(&restaurant.id)
        .await
        .expect("fetch restaurant")
        .expect("present")
        .restaurant_profile
        .expect("restaurant profile");
    assert_eq!(profile.rating_count, 0, "delete must back the rating out");
}

#[tokio::test]
async fn menu_lookup_returns_only_present_ids() {
    let store = Store::open_in_memory().expect("store");
    let restaurant = mk_user("menur", Role::Restaurant, 0);
    store
        .insert_user(&restaurant)
        .await
        .expect("insert restaurant");

    let date = ts(0).date_naive();
    let mut first = MenuItem {
        id: MenuItemId::fresh(),
        restaurant_id: restaurant.id.clone(),
        name: "ven pongal".to_string(),
        description: "with ghee and cashew".to_string(),
        price_cents: 520,
        service_date: date,
        meal_type: MealType::Breakfast,
        image_url: None,
        tags: vec!["veg".to_string()],
        active: true,
        created_at: ts(0),
        updated_at: ts(0),
    };
    store.insert_menu_item(&first).await.expect("insert item");
    let mut second = first.clone();
    second.id = MenuItemId::fresh();
    second.name = "lemon rice".to_string();
    second.meal_type = MealType::Lunch;
    store.insert_menu_item(&second).await.expect("insert item");

    let missing = MenuItemId::fresh();
    let found = store
        .menu_items_by_ids(&[first.id.clone(), second.id.clone(), missing])
        .await
        .expect("lookup");
    assert_eq!(found.len(), 2, "absent ids are skipped, not errors");

    let listed = store
        .list_menu(&restaurant.id, date, Some(MealType::Breakfast))
        .await
        .expect("list menu");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].name, "ven pongal");

    first.active = false;
    first.updated_at = ts(5);
    assert!(store.update_menu_item(&first).await.expect("deactivate"));
    let listed = store
        .list_menu(&restaurant.id, date, None)
        .await
        .expect("list menu");
    assert_eq!(listed.len(), 1, "inactive items drop out of the menu");
    assert_eq!(listed[0].name, "lemon rice");

    assert!(store.delete_menu_item(&second.id).await.expect("delete"));
    assert!(store
        .menu_item_by_id(&second.id)
        .await
        .expect("fetch")
        .is_none());
}

#[tokio::test]
async fn subscription_order_batch_debits_total_atomically() {
    let store = Store::open_in_memory().expect("store");
    let customer = mk_user("subc", Role::Customer, 2_500);
    let restaurant = mk_user("subr", Role::Restaurant, 0);
    store.insert_user(&customer).await.expect("insert customer");
    store
        .insert_user(&restaurant)
        .await
        .expect("insert restaurant");

    let sub_id = tiffin_model::SubscriptionId::fresh();
    let mut first = mk_order(&customer, &restaurant, OrderStatus::Placed, ts(0));
    first.subscription_id = Some(sub_id.clone());
    let mut second = mk_order(&customer, &restaurant, OrderStatus::Placed, ts(1));
    second.subscription_id = Some(sub_id.clone());
    second.deliver_at = first.deliver_at + Duration::days(1);

    let outcome = store
        .insert_subscription_orders(&customer.id, &[first.clone(), second.clone()], 2_198, ts(2))
        .await
        .expect("batch insert");
    assert_eq!(outcome, DebitOutcome::Debited(302));

    let generated = store
        .orders_for_subscription(&sub_id)
        .await
        .expect("orders for plan");
    assert_eq!(generated.len(), 2);
    assert!(generated[0].deliver_at <= generated[1].deliver_at);

    let ledger = store
        .ledger_for_user(&customer.id, None, 10)
        .await
        .expect("ledger");
    assert_eq!(ledger.items.len(), 1, "batch debit writes one ledger row");
    assert_eq!(ledger.items[0].kind, PaymentKind::SubscriptionDebit);
    assert_eq!(ledger.items[0].amount_cents, 2_198);
    assert_eq!(
        ledger.items[0].note.as_deref(),
        Some(format!("subscription {}", sub_id.as_str()).as_str())
    );

    let third = mk_order(&customer, &restaurant, OrderStatus::Placed, ts(3));
    let outcome = store
        .insert_subscription_orders(&customer.id, &[third], 1_099, ts(4))
        .await
        .expect("second batch");
    assert_eq!(
        outcome,
        DebitOutcome::Insufficient {
            balance_cents: 302
        },
        "a short balance must insert nothing"
    );
    let reread = store
        .user_by_id(&customer.id)
        .await
        .expect("fetch")
        .expect("present");
    assert_eq!(reread.wallet_balance_cents, 302);
}

#[tokio::test]
async fn file_backed_store_survives_reopen() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("tiffin.db");

    let user = mk_user("durable", Role::Customer, 0);
    {
        let store = Store::open(&path).expect("open");
        store.insert_user(&user).await.expect("insert user");
        store
            .wallet_credit(&user.id, 4_200, PaymentKind::Topup, None, None, None, ts(1))
            .await
            .expect("credit");
    }

    // Bootstrap must be idempotent against the existing schema.
    let store = Store::open(&path).expect("reopen");
    store.ping().await.expect("ping");
    let reread = store
        .user_by_id(&user.id)
        .await
        .expect("fetch")
        .expect("present");
    assert_eq!(reread.wallet_balance_cents, 4_200);
    let ledger = store
        .ledger_for_user(&user.id, None, 10)
        .await
        .expect("ledger");
    assert_eq!(ledger.items.len(), 1);
}
