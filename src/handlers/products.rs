use crate::handlers::common::{
    clamp_paging, created_response, ensure_decimal_non_negative, map_service_error,
    success_response, validate_input, PaginatedResponse, PaginationParams,
};
use crate::{
    errors::ApiError,
    services::catalog::{CreateProductInput, CreateVariantInput},
    AppState,
};
use axum::{
    extract::{Json, Path, Query, State},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use uuid::Uuid;

/// Creates the router for product endpoints
pub fn products_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(create_product))
        .route("/", get(list_products))
        .route("/:id", get(get_product))
        .route("/:id/variants", post(create_variant))
        .route("/:id/variants", get(list_variants))
}

/// Create a new product
async fn create_product(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateProductInput>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    validate_input(&payload)?;
    ensure_decimal_non_negative(&payload.price, "price")?;

    let product = state
        .services
        .catalog
        .create_product(payload)
        .await
        .map_err(map_service_error)?;

    Ok(created_response(product))
}

/// List active products, newest first
async fn list_products(
    State(state): State<Arc<AppState>>,
    Query(pagination): Query<PaginationParams>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let (page, per_page) = clamp_paging(pagination.page, pagination.per_page);
    let (products, total) = state
        .services
        .catalog
        .list_products(page, per_page)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(PaginatedResponse::new(
        products, page, per_page, total,
    )))
}

/// Get a product by id
async fn get_product(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let product = state
        .services
        .catalog
        .get_product(id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(product))
}

/// Create a variant under a product
async fn create_variant(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CreateVariantInput>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    validate_input(&payload)?;
    ensure_decimal_non_negative(&payload.price, "price")?;

    let variant = state
        .services
        .catalog
        .create_variant(id, payload)
        .await
        .map_err(map_service_error)?;

    Ok(created_response(variant))
}

/// List a product's variants
async fn list_variants(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let variants = state
        .services
        .catalog
        .list_variants(id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(variants))
}
