use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Storefront API",
        version = "1.0.0",
        description = r#"
# Storefront Checkout API

Carts, catalog, discounts, loyalty points, and the checkout pipeline that
turns selected cart lines into orders.

## Checkout semantics

Checkout reserves stock per line, takes a discount usage slot, and settles
loyalty points before the order row is written. Every reservation is a
conditional update; a failure after earlier reservations succeeded undoes
them in reverse order, so a failed checkout leaves no trace.

## Error handling

Errors share one response shape with a stable `code` field:

```json
{
  "error": "Bad Request",
  "code": "out_of_stock",
  "message": "Product 'Trail Runner' is out of stock",
  "timestamp": "2025-05-01T10:30:00Z"
}
```

## Pagination

List endpoints accept `page` (default 1) and `per_page` (default 20,
max 100) query parameters.
        "#,
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "Checkout", description = "Cart to order conversion"),
        (name = "Orders", description = "Order retrieval and status transitions"),
        (name = "Carts", description = "Cart and cart line management"),
        (name = "Products", description = "Catalog management"),
        (name = "Customers", description = "Customers, addresses, loyalty balances"),
        (name = "Discounts", description = "Discount code management"),
    ),
    paths(
        crate::handlers::checkout::checkout,
        crate::handlers::orders::list_orders,
        crate::handlers::orders::get_order,
        crate::handlers::orders::update_order_status,
    ),
    components(
        schemas(
            crate::services::checkout::CheckoutInput,
            crate::services::checkout::ShippingAddress,
            crate::services::orders::OrderResponse,
            crate::services::orders::OrderItemResponse,
            crate::services::orders::OrderStatusEntry,
            crate::handlers::orders::UpdateStatusRequest,
            crate::errors::ErrorResponse,
        )
    )
)]
pub struct ApiDoc;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDoc::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_document_lists_checkout_paths() {
        let doc = ApiDoc::openapi();
        let json = serde_json::to_string(&doc).unwrap();
        assert!(json.contains("/api/v1/checkout"));
        assert!(json.contains("/api/v1/orders/{id}/status"));
        assert!(json.contains("out_of_stock"));
    }
}
