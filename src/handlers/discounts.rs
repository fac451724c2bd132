use crate::handlers::common::{
    created_response, map_service_error, success_response, validate_input,
};
use crate::{errors::ApiError, AppState};
use axum::{
    extract::{Json, Path, State},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use validator::Validate;

/// Creates the router for discount code endpoints
pub fn discounts_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(create_discount))
        .route("/:code", get(get_discount))
}

/// Create a discount code
async fn create_discount(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateDiscountRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    validate_input(&payload)?;

    let discount = state
        .services
        .discount
        .create_discount(payload.code, payload.percent_value, payload.usage_limit)
        .await
        .map_err(map_service_error)?;

    Ok(created_response(discount))
}

/// Look up a discount code by its code string
async fn get_discount(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let discount = state
        .services
        .discount
        .find_by_code(&code)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(discount))
}

// Request DTOs

#[derive(Debug, Deserialize, Validate)]
pub struct CreateDiscountRequest {
    #[validate(length(min = 1, max = 50))]
    pub code: String,
    /// Percentage off the merchandise subtotal.
    #[validate(range(min = 1, max = 100))]
    pub percent_value: i32,
    #[validate(range(min = 1))]
    pub usage_limit: i32,
}
