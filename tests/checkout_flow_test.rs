//! Checkout pipeline integration tests: pricing against the live catalog,
//! stock reservation, discount usage, loyalty points, and cart cleanup.

mod common;

use axum::http::StatusCode;
use common::{decimal_field, inline_address, response_json, TestApp};
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use serde_json::json;
use storefront_api::entities::{product, Order, Product};
use uuid::Uuid;

#[tokio::test]
async fn guest_checkout_creates_pending_order_and_decrements_stock() {
    let app = TestApp::new().await;

    let product = app.seed_product("Trail Runner", dec!(90000), 0).await;
    let variant = app
        .seed_variant(product.id, "TR-42-RED", dec!(100000), 5)
        .await;

    let cart = app.seed_cart(None).await;
    let line = app
        .seed_cart_line(cart.id, product.id, Some(variant.id), 2)
        .await;

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

    let body = response_json(response).await;
    let order = &body["order"];

    // 100000 * 2 + 30000 flat shipping.
    assert_eq!(decimal_field(order, "total"), dec!(230000));
    assert_eq!(decimal_field(order, "subtotal"), dec!(200000));
    assert_eq!(decimal_field(order, "shipping_fee"), dec!(30000));
    assert_eq!(order["status"], "pending");
    assert_eq!(order["points_spent"], 0);
    assert_eq!(order["points_granted"], 0);
    assert!(order["customer_id"].is_null());

    let items = order["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["name"], "Trail Runner");
    assert_eq!(items[0]["sku"], "TR-42-RED");
    assert_eq!(items[0]["quantity"], 2);
    assert_eq!(decimal_field(&items[0], "unit_price"), dec!(100000));
    assert_eq!(decimal_field(&items[0], "line_subtotal"), dec!(200000));

    let history = order["status_history"].as_array().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["status"], "pending");

    assert_eq!(app.variant_stock(variant.id).await, 3);

    // The consumed line is gone from the cart.
    let cart_view = response_json(app.get(&format!("/api/v1/carts/{}", cart.id)).await).await;
    assert!(cart_view["items"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn line_without_variant_draws_from_product_stock() {
    let app = TestApp::new().await;

    let product = app.seed_product("Gift Card", dec!(50000), 10).await;
    let cart = app.seed_cart(None).await;
    let line = app.seed_cart_line(cart.id, product.id, None, 3).await;

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

    assert_eq!(app.product_stock(product.id).await, 7);
}

#[tokio::test]
async fn insufficient_stock_fails_and_leaves_no_trace() {
    let app = TestApp::new().await;

    let product = app.seed_product("Trail Runner", dec!(90000), 0).await;
    let variant = app
        .seed_variant(product.id, "TR-42-BLUE", dec!(100000), 1)
        .await;

    let cart = app.seed_cart(None).await;
    let line = app
        .seed_cart_line(cart.id, product.id, Some(variant.id), 2)
        .await;

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
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = response_json(response).await;
    assert_eq!(body["code"], "out_of_stock");
    assert!(body["message"].as_str().unwrap().contains("Trail Runner"));

    // Stock untouched, no order created, line still in the cart.
    assert_eq!(app.variant_stock(variant.id).await, 1);
    let orders = Order::find().all(app.state.db.as_ref()).await.unwrap();
    assert!(orders.is_empty());
    let cart_view = response_json(app.get(&format!("/api/v1/carts/{}", cart.id)).await).await;
    assert_eq!(cart_view["items"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn empty_or_unmatched_selection_is_rejected() {
    let app = TestApp::new().await;

    let product = app.seed_product("Trail Runner", dec!(90000), 5).await;
    let cart = app.seed_cart(None).await;
    app.seed_cart_line(cart.id, product.id, None, 1).await;

    for selection in [json!([]), json!([Uuid::new_v4()])] {
        let response = app
            .post(
                "/api/v1/checkout",
                json!({
                    "cart_id": cart.id,
                    "selected_items": selection,
                    "payment_method": "cod",
                    "shipping_address": inline_address(),
                    "contact_email": "guest@example.com"
                }),
            )
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = response_json(response).await;
        assert_eq!(body["code"], "empty_selection");
    }

    assert_eq!(app.product_stock(product.id).await, 5);
}

#[tokio::test]
async fn guests_cannot_spend_points() {
    let app = TestApp::new().await;

    let product = app.seed_product("Trail Runner", dec!(90000), 5).await;
    let cart = app.seed_cart(None).await;
    let line = app.seed_cart_line(cart.id, product.id, None, 1).await;

    let response = app
        .post(
            "/api/v1/checkout",
            json!({
                "cart_id": cart.id,
                "selected_items": [line.id],
                "payment_method": "cod",
                "shipping_address": inline_address(),
                "contact_email": "guest@example.com",
                "used_points": 10
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = response_json(response).await;
    assert_eq!(body["code"], "guest_points_not_allowed");
    assert_eq!(app.product_stock(product.id).await, 5);
}

#[tokio::test]
async fn points_request_above_balance_is_rejected_before_reserving() {
    let app = TestApp::new().await;

    let customer = app.seed_customer("Mai Pham", "mai@example.com", 3).await;
    let product = app.seed_product("Trail Runner", dec!(90000), 5).await;
    let cart = app.seed_cart(Some(customer.id)).await;
    let line = app.seed_cart_line(cart.id, product.id, None, 1).await;

    let response = app
        .post(
            "/api/v1/checkout",
            json!({
                "cart_id": cart.id,
                "selected_items": [line.id],
                "payment_method": "cod",
                "shipping_address": inline_address(),
                "used_points": 100
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = response_json(response).await;
    assert_eq!(body["code"], "insufficient_points");
    assert_eq!(app.product_stock(product.id).await, 5);
    assert_eq!(app.loyalty_points(customer.id).await, 3);
}

#[tokio::test]
async fn points_spend_clamps_to_order_total_and_balance() {
    let app = TestApp::new().await;

    // Subtotal 10000 + shipping 30000 = 40000; balance 50; requested 100.
    // Spend clamps to ceil(40000 / 1000) = 40, which zeroes the total.
    let customer = app.seed_customer("Mai Pham", "mai@example.com", 50).await;
    let product = app.seed_product("Socks", dec!(10000), 5).await;
    let cart = app.seed_cart(Some(customer.id)).await;
    let line = app.seed_cart_line(cart.id, product.id, None, 1).await;

    let response = app
        .post(
            "/api/v1/checkout",
            json!({
                "cart_id": cart.id,
                "selected_items": [line.id],
                "payment_method": "cod",
                "shipping_address": inline_address(),
                "used_points": 100
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = response_json(response).await;
    let order = &body["order"];
    assert_eq!(order["points_spent"], 40);
    assert_eq!(decimal_field(order, "total"), dec!(0));
    // Earned points on a zero total are zero.
    assert_eq!(order["points_granted"], 0);
    assert_eq!(app.loyalty_points(customer.id).await, 10);
}

#[tokio::test]
async fn registered_checkout_earns_points_on_final_total() {
    let app = TestApp::new().await;

    let customer = app.seed_customer("Mai Pham", "mai@example.com", 0).await;
    let product = app.seed_product("Trail Runner", dec!(100000), 5).await;
    let cart = app.seed_cart(Some(customer.id)).await;
    let line = app.seed_cart_line(cart.id, product.id, None, 2).await;

    let response = app
        .post(
            "/api/v1/checkout",
            json!({
                "cart_id": cart.id,
                "selected_items": [line.id],
                "payment_method": "card",
                "shipping_address": inline_address()
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = response_json(response).await;
    let order = &body["order"];
    // floor(230000 * 0.10 / 1000) = 23.
    assert_eq!(order["points_granted"], 23);
    assert_eq!(order["contact_email"], "mai@example.com");
    assert_eq!(app.loyalty_points(customer.id).await, 23);
}

#[tokio::test]
async fn discount_reduces_total_and_takes_a_usage_slot() {
    let app = TestApp::new().await;

    let product = app.seed_product("Trail Runner", dec!(100000), 5).await;
    let discount = app.seed_discount("WELCOME10", 10, 5).await;
    let cart = app.seed_cart(None).await;
    let line = app.seed_cart_line(cart.id, product.id, None, 2).await;
    app.attach_discount(cart.id, "WELCOME10").await;

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

    let body = response_json(response).await;
    let order = &body["order"];
    // 200000 - 10% + 30000 shipping.
    assert_eq!(decimal_field(order, "discount_amount"), dec!(20000));
    assert_eq!(decimal_field(order, "total"), dec!(210000));
    assert_eq!(app.discount_used_count(discount.id).await, 1);
}

#[tokio::test]
async fn partial_checkout_keeps_remaining_lines_and_discount() {
    let app = TestApp::new().await;

    let shoes = app.seed_product("Trail Runner", dec!(100000), 5).await;
    let socks = app.seed_product("Socks", dec!(10000), 5).await;
    app.seed_discount("WELCOME10", 10, 5).await;

    let cart = app.seed_cart(None).await;
    let shoes_line = app.seed_cart_line(cart.id, shoes.id, None, 1).await;
    app.seed_cart_line(cart.id, socks.id, None, 2).await;
    app.attach_discount(cart.id, "WELCOME10").await;

    let response = app
        .post(
            "/api/v1/checkout",
            json!({
                "cart_id": cart.id,
                "selected_items": [shoes_line.id],
                "payment_method": "cod",
                "shipping_address": inline_address(),
                "contact_email": "guest@example.com"
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    // The unselected line stays, and so does the discount reference.
    let cart_view = response_json(app.get(&format!("/api/v1/carts/{}", cart.id)).await).await;
    let items = cart_view["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["name"], "Socks");
    assert_eq!(cart_view["discount_code"], "WELCOME10");
}

#[tokio::test]
async fn emptying_the_cart_clears_its_discount_reference() {
    let app = TestApp::new().await;

    let product = app.seed_product("Trail Runner", dec!(100000), 5).await;
    app.seed_discount("WELCOME10", 10, 5).await;

    let cart = app.seed_cart(None).await;
    let line = app.seed_cart_line(cart.id, product.id, None, 1).await;
    app.attach_discount(cart.id, "WELCOME10").await;

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

    let cart_view = response_json(app.get(&format!("/api/v1/carts/{}", cart.id)).await).await;
    assert!(cart_view["items"].as_array().unwrap().is_empty());
    assert!(cart_view["discount_code"].is_null());
}

#[tokio::test]
async fn deactivated_product_line_is_dropped_silently() {
    let app = TestApp::new().await;

    let live = app.seed_product("Trail Runner", dec!(100000), 5).await;
    let gone = app.seed_product("Discontinued", dec!(50000), 5).await;

    let cart = app.seed_cart(None).await;
    let live_line = app.seed_cart_line(cart.id, live.id, None, 1).await;
    let gone_line = app.seed_cart_line(cart.id, gone.id, None, 1).await;

    // Deactivate after the lines were added.
    let mut active: product::ActiveModel = Product::find_by_id(gone.id)
        .one(app.state.db.as_ref())
        .await
        .unwrap()
        .unwrap()
        .into();
    active.is_active = Set(false);
    active.update(app.state.db.as_ref()).await.unwrap();

    let response = app
        .post(
            "/api/v1/checkout",
            json!({
                "cart_id": cart.id,
                "selected_items": [live_line.id, gone_line.id],
                "payment_method": "cod",
                "shipping_address": inline_address(),
                "contact_email": "guest@example.com"
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = response_json(response).await;
    let order = &body["order"];
    let items = order["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["name"], "Trail Runner");
    assert_eq!(decimal_field(order, "total"), dec!(130000));

    // Both selected lines are consumed, the dead one included.
    let cart_view = response_json(app.get(&format!("/api/v1/carts/{}", cart.id)).await).await;
    assert!(cart_view["items"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn order_lines_keep_their_price_after_catalog_changes() {
    let app = TestApp::new().await;

    let product = app.seed_product("Trail Runner", dec!(100000), 5).await;
    let cart = app.seed_cart(None).await;
    let line = app.seed_cart_line(cart.id, product.id, None, 1).await;

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
    let order_id = response_json(response).await["order"]["id"]
        .as_str()
        .unwrap()
        .to_string();

    // Reprice the product after the order exists.
    let mut active: product::ActiveModel = Product::find_by_id(product.id)
        .one(app.state.db.as_ref())
        .await
        .unwrap()
        .unwrap()
        .into();
    active.price = Set(dec!(999999));
    active.update(app.state.db.as_ref()).await.unwrap();

    let order = response_json(app.get(&format!("/api/v1/orders/{}", order_id)).await).await;
    assert_eq!(decimal_field(&order["items"][0], "unit_price"), dec!(100000));
    assert_eq!(decimal_field(&order, "total"), dec!(130000));
}

#[tokio::test]
async fn registered_checkout_can_use_a_saved_address() {
    let app = TestApp::new().await;

    let customer = app.seed_customer("Mai Pham", "mai@example.com", 0).await;
    let address = response_json(
        app.post(
            &format!("/api/v1/customers/{}/addresses", customer.id),
            inline_address(),
        )
        .await,
    )
    .await;

    let product = app.seed_product("Trail Runner", dec!(100000), 5).await;
    let cart = app.seed_cart(Some(customer.id)).await;
    let line = app.seed_cart_line(cart.id, product.id, None, 1).await;

    let response = app
        .post(
            "/api/v1/checkout",
            json!({
                "cart_id": cart.id,
                "selected_items": [line.id],
                "payment_method": "card",
                "shipping_address_id": address["id"]
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = response_json(response).await;
    assert_eq!(
        body["order"]["shipping_address"]["recipient_name"],
        "Linh Tran"
    );
}

#[tokio::test]
async fn guest_checkout_requires_an_inline_address() {
    let app = TestApp::new().await;

    let product = app.seed_product("Trail Runner", dec!(100000), 5).await;
    let cart = app.seed_cart(None).await;
    let line = app.seed_cart_line(cart.id, product.id, None, 1).await;

    let response = app
        .post(
            "/api/v1/checkout",
            json!({
                "cart_id": cart.id,
                "selected_items": [line.id],
                "payment_method": "cod",
                "contact_email": "guest@example.com"
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.product_stock(product.id).await, 5);
}

#[tokio::test]
async fn checkout_against_unknown_cart_is_not_found() {
    let app = TestApp::new().await;

    let response = app
        .post(
            "/api/v1/checkout",
            json!({
                "cart_id": Uuid::new_v4(),
                "selected_items": [Uuid::new_v4()],
                "payment_method": "cod",
                "shipping_address": inline_address(),
                "contact_email": "guest@example.com"
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
