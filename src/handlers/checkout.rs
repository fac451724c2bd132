use crate::handlers::common::{created_response, map_service_error, validate_input};
use crate::{errors::ApiError, services::checkout::CheckoutInput, AppState};
use axum::{
    extract::{Json, State},
    routing::post,
    Router,
};
use serde_json::json;
use std::sync::Arc;

/// Creates the router for checkout
pub fn checkout_routes() -> Router<Arc<AppState>> {
    Router::new().route("/", post(checkout))
}

/// Convert selected cart lines into a pending order
#[utoipa::path(
    post,
    path = "/api/v1/checkout",
    summary = "Checkout",
    description = "Reserves stock, discount usage, and loyalty points for the selected cart lines, then creates a pending order. Any reservation failure rolls back the earlier reservations.",
    request_body = CheckoutInput,
    responses(
        (status = 201, description = "Order created"),
        (status = 400, description = "Empty selection, stock or discount exhausted, points not allowed", body = crate::errors::ErrorResponse),
        (status = 404, description = "Cart or address not found", body = crate::errors::ErrorResponse),
    ),
    tag = "Checkout"
)]
pub async fn checkout(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CheckoutInput>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    validate_input(&payload)?;

    let order = state
        .services
        .checkout
        .checkout(payload)
        .await
        .map_err(map_service_error)?;

    Ok(created_response(json!({ "order": order })))
}
