use crate::handlers::common::{
    created_response, map_service_error, success_response, validate_input,
};
use crate::{
    errors::ApiError,
    services::customers::{AddAddressInput, CreateCustomerInput},
    AppState,
};
use axum::{
    extract::{Json, Path, State},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use uuid::Uuid;

/// Creates the router for customer endpoints
pub fn customers_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(create_customer))
        .route("/:id", get(get_customer))
        .route("/:id/addresses", post(add_address))
        .route("/:id/addresses", get(list_addresses))
}

/// Register a customer
async fn create_customer(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateCustomerInput>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    validate_input(&payload)?;

    let customer = state
        .services
        .customer
        .create_customer(payload)
        .await
        .map_err(map_service_error)?;

    Ok(created_response(customer))
}

/// Get a customer with their loyalty balance
async fn get_customer(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let customer = state
        .services
        .customer
        .get_customer(id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(customer))
}

/// Save an address to the customer's address book
async fn add_address(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AddAddressInput>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    validate_input(&payload)?;

    let address = state
        .services
        .customer
        .add_address(id, payload)
        .await
        .map_err(map_service_error)?;

    Ok(created_response(address))
}

/// List the customer's saved addresses, newest first
async fn list_addresses(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let addresses = state
        .services
        .customer
        .get_addresses(id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(addresses))
}
