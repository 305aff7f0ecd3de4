// SPDX-License-Identifier: Apache-2.0

//! Two available staff members race for the same delivery offer. The
//! conditional claim in the store must hand it to exactly one of them.

mod flow_support;

use chrono::{Duration, Utc};
use flow_support::{customer_body, restaurant_body, spawn_app, staff_body, TestApp};
use serde_json::json;

/// Drives one wallet order all the way to `ready` so a delivery offer
/// exists, and returns the offer id.
async fn open_offer(app: &TestApp, admin: &str) -> String {
    let deliver_at = Utc::now() + Duration::hours(48);
    let (restaurant, view) = app
        .register(&restaurant_body("Asha's Kitchen", "kitchen@example.com"))
        .await;
    let restaurant_id = view["id"].as_str().expect("restaurant id").to_string();
    app.approve(admin, &restaurant_id).await;

    let item = json!({
        "name": "Curd Rice",
        "price_cents": 1_200,
        "date": deliver_at.date_naive().format("%Y-%m-%d").to_string(),
        "meal_type": "lunch",
    });
    let (status, reply) = app.request("POST", "/v1/menu", Some(&restaurant), Some(&item)).await;
    assert_eq!(status, 200, "menu create failed: {reply}");
    let item_id = reply["item"]["id"].as_str().expect("item id").to_string();

    let (customer, _) = app.register(&customer_body("Ravi", "ravi@example.com")).await;
    app.topup(&customer, 5_000).await;
    let order = json!({
        "restaurant_id": restaurant_id,
        "items": [{"menu_item_id": item_id, "quantity": 1}],
        "deliver_at": deliver_at.to_rfc3339(),
        "payment_method": "wallet",
    });
    let (status, reply) = app.request("POST", "/v1/orders", Some(&customer), Some(&order)).await;
    assert_eq!(status, 200, "order failed: {reply}");
    let order_id = reply["order"]["id"].as_str().expect("order id").to_string();

    for next in ["accepted", "preparing", "ready"] {
        let (status, _) = app
            .request(
                "PATCH",
                &format!("/v1/orders/{order_id}/status"),
                Some(&restaurant),
                Some(&json!({"status": next})),
            )
            .await;
        assert_eq!(status, 200);
    }

    let (_, detail) = app
        .request("GET", &format!("/v1/orders/{order_id}"), Some(&customer), None)
        .await;
    detail["delivery"]["id"].as_str().expect("delivery id").to_string()
}

async fn available_staff(app: &TestApp, admin: &str, name: &str, email: &str) -> String {
    let (token, view) = app.register(&staff_body(name, email)).await;
    app.approve(admin, view["id"].as_str().expect("staff id")).await;
    let (status, _) = app
        .request("PATCH", "/v1/auth/me", Some(&token), Some(&json!({"available": true})))
        .await;
    assert_eq!(status, 200);
    token
}

#[tokio::test]
async fn concurrent_claims_have_exactly_one_winner() {
    let app = spawn_app().await;
    let admin = app.seed_admin().await;
    let delivery_id = open_offer(&app, &admin).await;
    let first = available_staff(&app, &admin, "Dev", "dev@example.com").await;
    let second = available_staff(&app, &admin, "Kiran", "kiran@example.com").await;

    // Both see the open offer.
    for token in [&first, &second] {
        let (status, offers) = app
            .request("GET", "/v1/deliveries/offers", Some(token), None)
            .await;
        assert_eq!(status, 200);
        assert!(offers["items"]
            .as_array()
            .expect("offers")
            .iter()
            .any(|o| o["id"] == json!(delivery_id)));
    }

    let path = format!("/v1/deliveries/{delivery_id}/claim");
    let (a, b) = tokio::join!(
        app.request("POST", &path, Some(&first), None),
        app.request("POST", &path, Some(&second), None),
    );

    let (winner, loser) = if a.0 == 200 { (a, b) } else { (b, a) };
    assert_eq!(winner.0, 200, "no claim won: {} / {}", winner.1, loser.1);
    assert_eq!(winner.1["delivery"]["status"], json!("claimed"));
    assert_eq!(loser.0, 409);
    assert_eq!(loser.1["error"]["code"], json!("OfferAlreadyClaimed"));

    let order_id = winner.1["delivery"]["order_id"].as_str().expect("order id").to_string();
    let winner_staff = winner.1["delivery"]["staff_id"].clone();
    assert!(winner_staff.is_string());

    let (_, detail) = app
        .request("GET", &format!("/v1/orders/{order_id}"), Some(&admin), None)
        .await;
    assert_eq!(detail["order"]["status"], json!("out_for_delivery"));
    assert_eq!(detail["delivery"]["staff_id"], winner_staff);

    // The claimed offer is gone from the board.
    let (_, offers) = app
        .request("GET", "/v1/deliveries/offers", Some(&first), None)
        .await;
    assert!(offers["items"]
        .as_array()
        .expect("offers")
        .iter()
        .all(|o| o["id"] != json!(delivery_id)));

    // The offer is spent; any further claim is a conflict.
    let (status, reply) = app.request("POST", &path, Some(&first), None).await;
    assert_eq!(status, 409, "{reply}");
    assert_eq!(reply["error"]["code"], json!("OfferAlreadyClaimed"));
}
