// SPDX-License-Identifier: Apache-2.0

mod flow_support;

use chrono::{Duration, Utc};
use flow_support::{customer_body, restaurant_body, spawn_app, TestApp};
use serde_json::json;

struct PlanFixture {
    customer: String,
    restaurant_id: String,
    item_id: String,
    start: chrono::NaiveDate,
    end: chrono::NaiveDate,
}

/// An approved restaurant with one lunch dish, a funded customer, and a
/// two-week window that starts the day after tomorrow. Fourteen days hold
/// every weekday exactly twice, so a mon/wed/fri plan always covers six
/// slots no matter which day the test runs on.
async fn open_plan_market(app: &TestApp, price_cents: i64, topup_cents: i64) -> PlanFixture {
    let admin = app.seed_admin().await;
    let (restaurant, view) = app
        .register(&restaurant_body("Asha's Kitchen", "kitchen@example.com"))
        .await;
    let restaurant_id = view["id"].as_str().expect("restaurant id").to_string();
    app.approve(&admin, &restaurant_id).await;

    let start = Utc::now().date_naive() + Duration::days(2);
    let end = start + Duration::days(13);
    let item = json!({
        "name": "Veg Thali",
        "price_cents": price_cents,
        "date": start.format("%Y-%m-%d").to_string(),
        "meal_type": "lunch",
    });
    let (status, reply) = app.request("POST", "/v1/menu", Some(&restaurant), Some(&item)).await;
    assert_eq!(status, 200, "menu create failed: {reply}");
    let item_id = reply["item"]["id"].as_str().expect("item id").to_string();

    let (customer, _) = app.register(&customer_body("Ravi", "ravi@example.com")).await;
    if topup_cents > 0 {
        app.topup(&customer, topup_cents).await;
    }

    PlanFixture {
        customer,
        restaurant_id,
        item_id,
        start,
        end,
    }
}

fn plan_request(fix: &PlanFixture) -> serde_json::Value {
    json!({
        "restaurant_id": fix.restaurant_id,
        "start_date": fix.start.format("%Y-%m-%d").to_string(),
        "end_date": fix.end.format("%Y-%m-%d").to_string(),
        "days": ["mon", "wed", "fri"],
        "selections": [{"meal_type": "lunch", "menu_item_id": fix.item_id}],
    })
}

async fn wallet_balance(app: &TestApp, token: &str) -> i64 {
    let (status, wallet) = app.request("GET", "/v1/wallet", Some(token), None).await;
    assert_eq!(status, 200);
    wallet["balance_cents"].as_i64().expect("balance")
}

#[tokio::test]
async fn plan_activation_generates_and_debits_every_slot() {
    let app = spawn_app().await;
    let fix = open_plan_market(&app, 1_500, 20_000).await;

    let (status, reply) = app
        .request("POST", "/v1/subscriptions", Some(&fix.customer), Some(&plan_request(&fix)))
        .await;
    assert_eq!(status, 200, "plan create failed: {reply}");
    assert_eq!(reply["orders_generated"], json!(6));
    let sub = &reply["subscription"];
    assert_eq!(sub["status"], json!("active"));
    assert_eq!(sub["meal_count"], json!(6));
    assert_eq!(sub["total_paid_cents"], json!(9_000));
    let sub_id = sub["id"].as_str().expect("subscription id").to_string();

    // One debit for the whole plan.
    assert_eq!(wallet_balance(&app, &fix.customer).await, 11_000);
    let (_, wallet) = app.request("GET", "/v1/wallet", Some(&fix.customer), None).await;
    let debits = wallet["items"]
        .as_array()
        .expect("ledger")
        .iter()
        .filter(|e| e["kind"] == json!("subscription_debit"))
        .count();
    assert_eq!(debits, 1);

    let (status, detail) = app
        .request("GET", &format!("/v1/subscriptions/{sub_id}"), Some(&fix.customer), None)
        .await;
    assert_eq!(status, 200);
    let orders = detail["orders"].as_array().expect("orders");
    assert_eq!(orders.len(), 6);
    for order in orders {
        assert_eq!(order["status"], json!("placed"));
        assert_eq!(order["delivery_fee_cents"], json!(0));
        assert_eq!(order["total_cents"], json!(1_500));
        assert_eq!(order["subscription_id"], json!(sub_id));
    }

    let (status, listed) = app
        .request("GET", "/v1/subscriptions", Some(&fix.customer), None)
        .await;
    assert_eq!(status, 200);
    assert!(listed["items"]
        .as_array()
        .expect("items")
        .iter()
        .any(|s| s["id"] == json!(sub_id)));
}

#[tokio::test]
async fn pause_refunds_and_resume_redebits() {
    let app = spawn_app().await;
    let fix = open_plan_market(&app, 1_500, 20_000).await;

    let (status, reply) = app
        .request("POST", "/v1/subscriptions", Some(&fix.customer), Some(&plan_request(&fix)))
        .await;
    assert_eq!(status, 200, "{reply}");
    let sub_id = reply["subscription"]["id"].as_str().expect("id").to_string();
    assert_eq!(wallet_balance(&app, &fix.customer).await, 11_000);

    let (status, reply) = app
        .request("POST", &format!("/v1/subscriptions/{sub_id}/pause"), Some(&fix.customer), None)
        .await;
    assert_eq!(status, 200, "pause failed: {reply}");
    assert_eq!(reply["orders_cancelled"], json!(6));
    assert_eq!(reply["subscription"]["status"], json!("paused"));
    assert_eq!(wallet_balance(&app, &fix.customer).await, 20_000);

    // Pausing a paused plan is a conflict.
    let (status, reply) = app
        .request("POST", &format!("/v1/subscriptions/{sub_id}/pause"), Some(&fix.customer), None)
        .await;
    assert_eq!(status, 409);
    assert_eq!(reply["error"]["code"], json!("InvalidTransition"));

    // Every slot is still ahead of us, so the resume rebuilds all six.
    let (status, reply) = app
        .request("POST", &format!("/v1/subscriptions/{sub_id}/resume"), Some(&fix.customer), None)
        .await;
    assert_eq!(status, 200, "resume failed: {reply}");
    assert_eq!(reply["orders_generated"], json!(6));
    assert_eq!(reply["subscription"]["status"], json!("active"));
    assert_eq!(wallet_balance(&app, &fix.customer).await, 11_000);

    let (status, reply) = app
        .request("POST", &format!("/v1/subscriptions/{sub_id}/cancel"), Some(&fix.customer), None)
        .await;
    assert_eq!(status, 200, "cancel failed: {reply}");
    assert_eq!(reply["orders_cancelled"], json!(6));
    assert_eq!(reply["subscription"]["status"], json!("cancelled"));
    assert_eq!(wallet_balance(&app, &fix.customer).await, 20_000);

    let (status, reply) = app
        .request("POST", &format!("/v1/subscriptions/{sub_id}/cancel"), Some(&fix.customer), None)
        .await;
    assert_eq!(status, 409);
    assert_eq!(reply["error"]["code"], json!("InvalidTransition"));
}

#[tokio::test]
async fn plans_must_start_in_the_future() {
    let app = spawn_app().await;
    let fix = open_plan_market(&app, 1_500, 20_000).await;

    let mut req = plan_request(&fix);
    req["start_date"] = json!(Utc::now().date_naive().format("%Y-%m-%d").to_string());
    let (status, reply) = app
        .request("POST", "/v1/subscriptions", Some(&fix.customer), Some(&req))
        .await;
    assert_eq!(status, 400, "{reply}");
    assert_eq!(reply["error"]["code"], json!("ValidationFailed"));
}

#[tokio::test]
async fn unfunded_plans_do_not_activate() {
    let app = spawn_app().await;
    let fix = open_plan_market(&app, 1_500, 1_000).await;

    let (status, reply) = app
        .request("POST", "/v1/subscriptions", Some(&fix.customer), Some(&plan_request(&fix)))
        .await;
    assert_eq!(status, 400, "{reply}");
    assert_eq!(reply["error"]["code"], json!("WalletInsufficient"));
    assert_eq!(wallet_balance(&app, &fix.customer).await, 1_000);

    // The stillborn plan is visible but cancelled, and generated nothing.
    let (_, listed) = app
        .request("GET", "/v1/subscriptions", Some(&fix.customer), None)
        .await;
    assert_eq!(listed["items"][0]["status"], json!("cancelled"));
    let (_, orders) = app.request("GET", "/v1/orders?scope=mine", Some(&fix.customer), None).await;
    assert_eq!(orders["items"].as_array().expect("orders").len(), 0);
}

#[tokio::test]
async fn selections_must_match_the_menu() {
    let app = spawn_app().await;
    let fix = open_plan_market(&app, 1_500, 20_000).await;

    // The only dish on the menu is a lunch; a dinner selection cannot use it.
    let mut req = plan_request(&fix);
    req["selections"] = json!([{"meal_type": "dinner", "menu_item_id": fix.item_id}]);
    let (status, reply) = app
        .request("POST", "/v1/subscriptions", Some(&fix.customer), Some(&req))
        .await;
    assert_eq!(status, 400, "{reply}");
    assert_eq!(reply["error"]["code"], json!("ValidationFailed"));
}
