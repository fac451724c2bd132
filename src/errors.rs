use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Error body returned to API clients
///
/// `code` is the stable machine-distinguishable reason; `message` is for
/// humans. Internal details never leak here.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "error": "Bad Request",
    "code": "out_of_stock",
    "message": "Product 'Trail Runner' is out of stock",
    "timestamp": "2025-05-01T10:30:00.000Z"
}))]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Not Found", "Bad Request")
    #[schema(example = "Bad Request")]
    pub error: String,
    /// Stable machine-readable reason
    #[schema(example = "out_of_stock")]
    pub code: String,
    /// Human-readable error description
    #[schema(example = "Product 'Trail Runner' is out of stock")]
    pub message: String,
    /// Additional detail (validation breakdown), when available
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// ISO 8601 timestamp when the error occurred
    #[schema(example = "2025-05-01T10:30:00.000Z")]
    pub timestamp: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sea_orm::error::DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("No cart lines were selected for checkout")]
    EmptySelection,

    #[error("Guest checkout cannot spend loyalty points")]
    GuestPointsNotAllowed,

    #[error("Insufficient loyalty points: {0}")]
    InsufficientPoints(String),

    #[error("Product '{0}' is out of stock")]
    OutOfStock(String),

    #[error("Discount code '{0}' has reached its usage limit")]
    DiscountExhausted(String),

    #[error("Order is already {0} and accepts no further status changes")]
    OrderAlreadyFinal(String),

    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    /// Returns the HTTP status code for this error.
    /// This is the single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ValidationError(_)
            | Self::EmptySelection
            | Self::GuestPointsNotAllowed
            | Self::InsufficientPoints(_)
            | Self::OutOfStock(_)
            | Self::DiscountExhausted(_)
            | Self::OrderAlreadyFinal(_)
            | Self::InvalidStatus(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::DatabaseError(_) | Self::InternalError(_) | Self::Other(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Stable machine-readable reason, part of the API contract.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::ValidationError(_) => "validation_error",
            Self::EmptySelection => "empty_selection",
            Self::GuestPointsNotAllowed => "guest_points_not_allowed",
            Self::InsufficientPoints(_) => "insufficient_points",
            Self::OutOfStock(_) => "out_of_stock",
            Self::DiscountExhausted(_) => "discount_exhausted",
            Self::OrderAlreadyFinal(_) => "order_already_final",
            Self::InvalidStatus(_) => "invalid_status",
            Self::Conflict(_) => "conflict",
            Self::DatabaseError(_) => "database_error",
            Self::InternalError(_) | Self::Other(_) => "internal_error",
        }
    }

    /// Returns the error message suitable for HTTP responses.
    /// Internal errors return generic messages to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::InternalError(_) | Self::Other(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let err = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            code: self.code().to_string(),
            message: self.response_message(),
            details: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(err)).into_response()
    }
}

/// API error type for HTTP handlers
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Service error: {0}")]
    ServiceError(#[from] ServiceError),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::ServiceError(service_error) => {
                return service_error_response(service_error);
            }
            ApiError::ValidationError(msg) => {
                (StatusCode::BAD_REQUEST, "validation_error", msg.clone())
            }
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone()),
        };

        let err = ErrorResponse {
            error: status
                .canonical_reason()
                .unwrap_or("Unknown Error")
                .to_string(),
            code: code.to_string(),
            message,
            details: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(err)).into_response()
    }
}

fn service_error_response(err: &ServiceError) -> Response {
    let status = err.status_code();
    let body = ErrorResponse {
        error: status.canonical_reason().unwrap_or("Error").to_string(),
        code: err.code().to_string(),
        message: err.response_message(),
        details: None,
        timestamp: chrono::Utc::now().to_rfc3339(),
    };
    (status, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[test]
    fn business_errors_map_to_bad_request() {
        assert_eq!(
            ServiceError::EmptySelection.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::GuestPointsNotAllowed.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::InsufficientPoints("requested 100, balance 3".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::OutOfStock("Trail Runner".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::DiscountExhausted("WELCOME10".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::OrderAlreadyFinal("cancelled".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::InvalidStatus("teleported".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn lookup_and_internal_errors_keep_their_statuses() {
        assert_eq!(
            ServiceError::NotFound("Order x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServiceError::Conflict("status changed".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ServiceError::InternalError("boom".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn codes_are_stable() {
        assert_eq!(ServiceError::EmptySelection.code(), "empty_selection");
        assert_eq!(
            ServiceError::OutOfStock("x".into()).code(),
            "out_of_stock"
        );
        assert_eq!(
            ServiceError::DiscountExhausted("x".into()).code(),
            "discount_exhausted"
        );
        assert_eq!(
            ServiceError::GuestPointsNotAllowed.code(),
            "guest_points_not_allowed"
        );
        assert_eq!(
            ServiceError::OrderAlreadyFinal("delivered".into()).code(),
            "order_already_final"
        );
    }

    #[test]
    fn response_message_hides_internal_details() {
        assert_eq!(
            ServiceError::InternalError("connection pool exhausted".into()).response_message(),
            "Internal server error"
        );
        assert_eq!(
            ServiceError::OutOfStock("Trail Runner".into()).response_message(),
            "Product 'Trail Runner' is out of stock"
        );
    }

    #[tokio::test]
    async fn error_body_carries_code_and_message() {
        let response = ServiceError::DiscountExhausted("WELCOME10".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let payload: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(payload.code, "discount_exhausted");
        assert!(payload.message.contains("WELCOME10"));
    }
}
