use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use lazy_static::lazy_static;
use prometheus::{
    register_int_counter, register_int_counter_vec, Encoder, IntCounter, IntCounterVec,
    TextEncoder,
};
use tracing::error;

lazy_static! {
    pub static ref CHECKOUT_ATTEMPTS: IntCounter = register_int_counter!(
        "checkout_attempts_total",
        "Total number of checkout attempts"
    )
    .expect("metric can be created");
    pub static ref CHECKOUT_SUCCESSES: IntCounter = register_int_counter!(
        "checkout_successes_total",
        "Total number of checkouts that produced an order"
    )
    .expect("metric can be created");
    pub static ref CHECKOUT_FAILURES: IntCounterVec = register_int_counter_vec!(
        "checkout_failures_total",
        "Total number of failed checkouts",
        &["reason"]
    )
    .expect("metric can be created");
    pub static ref COMPENSATION_FAILURES: IntCounterVec = register_int_counter_vec!(
        "checkout_compensation_failures_total",
        "Total number of compensation actions that could not be undone",
        &["action"]
    )
    .expect("metric can be created");
    pub static ref ORDER_STATUS_CHANGES: IntCounterVec = register_int_counter_vec!(
        "order_status_changes_total",
        "Total number of order status transitions",
        &["to_status"]
    )
    .expect("metric can be created");
    pub static ref ORDER_CANCELLATIONS: IntCounter = register_int_counter!(
        "order_cancellations_total",
        "Total number of order cancellations"
    )
    .expect("metric can be created");
    pub static ref RESTITUTION_FAILURES: IntCounterVec = register_int_counter_vec!(
        "order_cancellation_restitution_failures_total",
        "Total number of cancellation restitution actions that failed",
        &["action"]
    )
    .expect("metric can be created");
}

/// Exposes all registered metrics in Prometheus text format.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [(header::CONTENT_TYPE, String::from("text/plain; charset=utf-8"))],
            String::from("failed to encode metrics"),
        );
    }

    match String::from_utf8(buffer) {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, encoder.format_type().to_owned())],
            body,
        ),
        Err(e) => {
            error!("Metrics buffer was not valid UTF-8: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, String::from("text/plain; charset=utf-8"))],
                String::from("failed to encode metrics"),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero_and_increment() {
        let before = CHECKOUT_ATTEMPTS.get();
        CHECKOUT_ATTEMPTS.inc();
        assert_eq!(CHECKOUT_ATTEMPTS.get(), before + 1);
    }

    #[test]
    fn labelled_counters_track_reasons_independently() {
        let out_of_stock = CHECKOUT_FAILURES.with_label_values(&["out_of_stock"]);
        let exhausted = CHECKOUT_FAILURES.with_label_values(&["discount_exhausted"]);
        let before = out_of_stock.get();

        out_of_stock.inc();

        assert_eq!(out_of_stock.get(), before + 1);
        assert_eq!(exhausted.get(), 0);
    }

    #[tokio::test]
    async fn metrics_endpoint_renders_text_format() {
        CHECKOUT_ATTEMPTS.inc();
        let response = metrics_handler().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("checkout_attempts_total"));
    }
}
