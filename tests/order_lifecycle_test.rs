//! Order status state machine tests: legal transitions, terminal states,
//! and the restitution side effects of cancellation.

mod common;

use axum::http::StatusCode;
use common::{inline_address, response_json, TestApp};
use rust_decimal_macros::dec;
use sea_orm::{EntityTrait, ModelTrait};
use serde_json::{json, Value};
use storefront_api::entities::Product;
use uuid::Uuid;

/// Seeds a guest cart with one line of the given product and checks it out.
async fn place_guest_order(app: &TestApp, product_id: Uuid, quantity: i32) -> Value {
    let cart = app.seed_cart(None).await;
    let line = app.seed_cart_line(cart.id, product_id, None, quantity).await;

    let response = app
        .post(
            "/api/v1/checkout",
            json!({
                "cart_id": cart.id,
                "selected_items": [line.id],
                "payment_method": "cod",
                "shipping_address": inline_address(),
                "contact_email": "guest@example.com"
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    response_json(response).await["order"].clone()
}

async fn set_status(app: &TestApp, order_id: &str, status: &str) -> axum::response::Response {
    app.put(
        &format!("/api/v1/orders/{}/status", order_id),
        json!({ "status": status }),
    )
    .await
}

#[tokio::test]
async fn happy_path_walks_pending_to_delivered() {
    let app = TestApp::new().await;
    let product = app.seed_product("Trail Runner", dec!(100000), 5).await;
    let order = place_guest_order(&app, product.id, 1).await;
    let order_id = order["id"].as_str().unwrap();

    for (target, expected_history_len) in
        [("confirmed", 2), ("shipping", 3), ("delivered", 4)]
    {
        let response = set_status(&app, order_id, target).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = response_json(response).await;
        assert_eq!(body["order"]["status"], target);

        let history = body["order"]["status_history"].as_array().unwrap();
        assert_eq!(history.len(), expected_history_len);
        // Most recent entry first.
        assert_eq!(history[0]["status"], target);
    }
}

#[tokio::test]
async fn shipped_is_accepted_as_an_alias_for_shipping() {
    let app = TestApp::new().await;
    let product = app.seed_product("Trail Runner", dec!(100000), 5).await;
    let order = place_guest_order(&app, product.id, 1).await;
    let order_id = order["id"].as_str().unwrap();

    let response = set_status(&app, order_id, "shipped").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = response_json(response).await;
    assert_eq!(body["order"]["status"], "shipping");
}

#[tokio::test]
async fn unrecognized_status_is_rejected() {
    let app = TestApp::new().await;
    let product = app.seed_product("Trail Runner", dec!(100000), 5).await;
    let order = place_guest_order(&app, product.id, 1).await;
    let order_id = order["id"].as_str().unwrap();

    let response = set_status(&app, order_id, "teleported").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = response_json(response).await;
    assert_eq!(body["code"], "invalid_status");
}

#[tokio::test]
async fn terminal_states_accept_no_further_transitions() {
    let app = TestApp::new().await;
    let product = app.seed_product("Trail Runner", dec!(100000), 10).await;

    // Walk one order to delivered.
    let delivered = place_guest_order(&app, product.id, 1).await;
    let delivered_id = delivered["id"].as_str().unwrap();
    for target in ["confirmed", "shipping", "delivered"] {
        assert_eq!(
            set_status(&app, delivered_id, target).await.status(),
            StatusCode::OK
        );
    }

    // Cancel another.
    let cancelled = place_guest_order(&app, product.id, 1).await;
    let cancelled_id = cancelled["id"].as_str().unwrap();
    assert_eq!(
        set_status(&app, cancelled_id, "cancelled").await.status(),
        StatusCode::OK
    );

    for (order_id, target) in [
        (delivered_id, "pending"),
        (delivered_id, "cancelled"),
        (cancelled_id, "confirmed"),
        (cancelled_id, "delivered"),
    ] {
        let response = set_status(&app, order_id, target).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = response_json(response).await;
        assert_eq!(body["code"], "order_already_final");
    }
}

#[tokio::test]
async fn listing_with_zero_paging_is_normalized() {
    let app = TestApp::new().await;
    let product = app.seed_product("Trail Runner", dec!(100000), 5).await;
    place_guest_order(&app, product.id, 1).await;

    let response = app.get("/api/v1/orders?page=0&per_page=0").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = response_json(response).await;
    assert_eq!(body["pagination"]["page"], 1);
    assert_eq!(body["pagination"]["per_page"], 1);
    assert_eq!(body["pagination"]["total"], 1);
    assert_eq!(body["pagination"]["total_pages"], 1);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn unknown_order_is_not_found() {
    let app = TestApp::new().await;

    let response = set_status(&app, &Uuid::new_v4().to_string(), "confirmed").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn cancellation_restores_stock_discount_and_points() {
    let app = TestApp::new().await;

    let customer = app.seed_customer("Mai Pham", "mai@example.com", 100).await;
    let product = app.seed_product("Trail Runner", dec!(200000), 5).await;
    let discount = app.seed_discount("WELCOME10", 10, 5).await;

    let cart = app.seed_cart(Some(customer.id)).await;
    let line = app.seed_cart_line(cart.id, product.id, None, 1).await;
    app.attach_discount(cart.id, "WELCOME10").await;

    let response = app
        .post(
            "/api/v1/checkout",
            json!({
                "cart_id": cart.id,
                "selected_items": [line.id],
                "payment_method": "card",
                "shipping_address": inline_address(),
                "used_points": 50
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let order = response_json(response).await["order"].clone();
    let order_id = order["id"].as_str().unwrap();

    // 200000 - 20000 discount + 30000 shipping - 50 points = 160000;
    // earn floor(160000 * 0.10 / 1000) = 16.
    assert_eq!(order["points_spent"], 50);
    assert_eq!(order["points_granted"], 16);
    assert_eq!(app.product_stock(product.id).await, 4);
    assert_eq!(app.discount_used_count(discount.id).await, 1);
    assert_eq!(app.loyalty_points(customer.id).await, 66);

    let response = set_status(&app, order_id, "cancelled").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = response_json(response).await;
    assert_eq!(body["order"]["status"], "cancelled");
    let history = body["order"]["status_history"].as_array().unwrap();
    assert_eq!(history[0]["status"], "cancelled");

    // Stock back, usage slot back, points netted: +50 spent, -16 granted.
    assert_eq!(app.product_stock(product.id).await, 5);
    assert_eq!(app.discount_used_count(discount.id).await, 0);
    assert_eq!(app.loyalty_points(customer.id).await, 100);
}

#[tokio::test]
async fn cancellation_from_confirmed_also_restocks() {
    let app = TestApp::new().await;
    let product = app.seed_product("Trail Runner", dec!(100000), 5).await;
    let order = place_guest_order(&app, product.id, 3).await;
    let order_id = order["id"].as_str().unwrap();
    assert_eq!(app.product_stock(product.id).await, 2);

    assert_eq!(
        set_status(&app, order_id, "confirmed").await.status(),
        StatusCode::OK
    );
    assert_eq!(
        set_status(&app, order_id, "cancelled").await.status(),
        StatusCode::OK
    );

    assert_eq!(app.product_stock(product.id).await, 5);
}

#[tokio::test]
async fn repeated_cancellation_does_not_restock_twice() {
    let app = TestApp::new().await;
    let product = app.seed_product("Trail Runner", dec!(100000), 5).await;
    let order = place_guest_order(&app, product.id, 2).await;
    let order_id = order["id"].as_str().unwrap();
    assert_eq!(app.product_stock(product.id).await, 3);

    assert_eq!(
        set_status(&app, order_id, "cancelled").await.status(),
        StatusCode::OK
    );
    assert_eq!(app.product_stock(product.id).await, 5);

    let response = set_status(&app, order_id, "cancelled").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.product_stock(product.id).await, 5);
}

#[tokio::test]
async fn cancellation_survives_a_deleted_product() {
    let app = TestApp::new().await;
    let product = app.seed_product("Trail Runner", dec!(100000), 5).await;
    let order = place_guest_order(&app, product.id, 2).await;
    let order_id = order["id"].as_str().unwrap();

    // Delete the catalog row out from under the order.
    Product::find_by_id(product.id)
        .one(app.state.db.as_ref())
        .await
        .unwrap()
        .unwrap()
        .delete(app.state.db.as_ref())
        .await
        .unwrap();

    // Cancellation still succeeds; the restock is skipped with a warning.
    let response = set_status(&app, order_id, "cancelled").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = response_json(response).await;
    assert_eq!(body["order"]["status"], "cancelled");
}

#[tokio::test]
async fn non_cancel_transitions_have_no_side_effects() {
    let app = TestApp::new().await;
    let product = app.seed_product("Trail Runner", dec!(100000), 5).await;
    let order = place_guest_order(&app, product.id, 2).await;
    let order_id = order["id"].as_str().unwrap();
    assert_eq!(app.product_stock(product.id).await, 3);

    assert_eq!(
        set_status(&app, order_id, "confirmed").await.status(),
        StatusCode::OK
    );

    // Stock is unchanged by a forward transition.
    assert_eq!(app.product_stock(product.id).await, 3);
}
