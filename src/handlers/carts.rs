use crate::handlers::common::{
    created_response, map_service_error, no_content_response, success_response, validate_input,
};
use crate::{errors::ApiError, services::carts::AddItemInput, AppState};
use axum::{
    extract::{Json, Path, State},
    routing::{delete, get, post, put},
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

/// Creates the router for cart endpoints
pub fn carts_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(create_cart))
        .route("/:id", get(get_cart))
        .route("/:id/items", post(add_item))
        .route("/:id/items/:item_id", put(update_item))
        .route("/:id/items/:item_id", delete(remove_item))
        .route("/:id/discount", post(apply_discount))
        .route("/:id/discount", delete(remove_discount))
}

/// Create a cart, anonymous or bound to a customer
async fn create_cart(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateCartRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let cart = state
        .services
        .cart
        .create_cart(payload.customer_id)
        .await
        .map_err(map_service_error)?;

    Ok(created_response(cart))
}

/// Get a cart with its lines priced against the live catalog
async fn get_cart(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let cart = state
        .services
        .cart
        .get_cart_response(id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(cart))
}

/// Add a line to the cart, merging with an existing line for the same
/// product and variant
async fn add_item(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AddItemInput>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    validate_input(&payload)?;

    state
        .services
        .cart
        .add_item(id, payload)
        .await
        .map_err(map_service_error)?;

    let cart = state
        .services
        .cart
        .get_cart_response(id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(cart))
}

/// Set a cart line's quantity
async fn update_item(
    State(state): State<Arc<AppState>>,
    Path((id, item_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<UpdateQuantityRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    validate_input(&payload)?;

    state
        .services
        .cart
        .update_item_quantity(id, item_id, payload.quantity)
        .await
        .map_err(map_service_error)?;

    let cart = state
        .services
        .cart
        .get_cart_response(id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(cart))
}

/// Remove a cart line
async fn remove_item(
    State(state): State<Arc<AppState>>,
    Path((id, item_id)): Path<(Uuid, Uuid)>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    state
        .services
        .cart
        .remove_item(id, item_id)
        .await
        .map_err(map_service_error)?;

    Ok(no_content_response())
}

/// Attach a discount code to the cart
async fn apply_discount(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ApplyDiscountRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    validate_input(&payload)?;

    state
        .services
        .cart
        .apply_discount(id, &payload.code)
        .await
        .map_err(map_service_error)?;

    let cart = state
        .services
        .cart
        .get_cart_response(id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(cart))
}

/// Detach the cart's discount code
async fn remove_discount(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    state
        .services
        .cart
        .remove_discount(id)
        .await
        .map_err(map_service_error)?;

    let cart = state
        .services
        .cart
        .get_cart_response(id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(cart))
}

// Request DTOs

#[derive(Debug, Deserialize)]
pub struct CreateCartRequest {
    pub customer_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateQuantityRequest {
    #[validate(range(min = 1))]
    pub quantity: i32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ApplyDiscountRequest {
    #[validate(length(min = 1, max = 50))]
    pub code: String,
}
