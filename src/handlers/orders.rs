use crate::handlers::common::{
    clamp_paging, map_service_error, success_response, validate_input, PaginatedResponse,
};
use crate::{
    errors::ApiError,
    services::orders::{ListOrdersQuery, OrderResponse},
    AppState,
};
use axum::{
    extract::{Json, Path, Query, State},
    routing::{get, put},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

/// Creates the router for order endpoints
pub fn orders_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_orders))
        .route("/:id", get(get_order))
        .route("/:id/status", put(update_order_status))
}

/// List orders, newest first, optionally filtered by customer and status
#[utoipa::path(
    get,
    path = "/api/v1/orders",
    summary = "List orders",
    params(ListOrdersParams),
    responses(
        (status = 200, description = "Orders retrieved", body = PaginatedResponse<OrderResponse>),
        (status = 400, description = "Unrecognized status filter", body = crate::errors::ErrorResponse),
    ),
    tag = "Orders"
)]
pub async fn list_orders(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListOrdersParams>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let (page, per_page) = clamp_paging(params.page, params.per_page);
    let (orders, total) = state
        .services
        .order
        .list_orders(ListOrdersQuery {
            customer_id: params.customer_id,
            status: params.status,
            page,
            per_page,
        })
        .await
        .map_err(map_service_error)?;

    Ok(success_response(PaginatedResponse::new(
        orders, page, per_page, total,
    )))
}

/// Get an order with its lines and status history
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    summary = "Get order",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order retrieved", body = OrderResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    tag = "Orders"
)]
pub async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let order = state
        .services
        .order
        .get_order(id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(order))
}

/// Move an order to a new status
#[utoipa::path(
    put,
    path = "/api/v1/orders/{id}/status",
    summary = "Update order status",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = UpdateStatusRequest,
    responses(
        (status = 200, description = "Status updated; cancellation also returns stock, discount usage, and points"),
        (status = 400, description = "Unrecognized status or order already final", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order changed concurrently", body = crate::errors::ErrorResponse),
    ),
    tag = "Orders"
)]
pub async fn update_order_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    validate_input(&payload)?;

    let order = state
        .services
        .order_status
        .transition(id, &payload.status)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(json!({
        "message": format!("Order status updated to {}", order.status),
        "order": order,
    })))
}

// Request DTOs

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListOrdersParams {
    pub customer_id: Option<Uuid>,
    pub status: Option<String>,
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_per_page")]
    pub per_page: u64,
}

fn default_page() -> u64 {
    1
}

fn default_per_page() -> u64 {
    20
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateStatusRequest {
    #[validate(length(min = 1, max = 50))]
    pub status: String,
}
