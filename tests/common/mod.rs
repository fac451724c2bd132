use std::sync::Arc;

use axum::{
    body::{self, Body},
    http::{Method, Request},
    response::Response,
    Router,
};
use rust_decimal::Decimal;
use sea_orm::EntityTrait;
use serde_json::Value;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

use storefront_api::{
    config::AppConfig,
    db,
    entities::{
        CartItemModel, CartModel, Customer, CustomerModel, DiscountCode, DiscountCodeModel,
        Product, ProductModel, ProductVariant, ProductVariantModel,
    },
    events::{self, EventSender},
    handlers::AppServices,
    services::carts::AddItemInput,
    services::catalog::{CreateProductInput, CreateVariantInput},
    services::customers::CreateCustomerInput,
    AppState,
};

/// Test harness: the full service stack backed by a throwaway SQLite file.
///
/// Each instance gets its own temp directory, so suites never share state.
/// A single pooled connection keeps SQLite happy under the concurrency
/// tests; interleaving still happens between statements.
pub struct TestApp {
    router: Router,
    pub state: Arc<AppState>,
    _event_task: tokio::task::JoinHandle<()>,
    _db_dir: TempDir,
}

impl TestApp {
    /// Construct a new test application with fresh database state.
    pub async fn new() -> Self {
        let db_dir = TempDir::new().expect("create temp dir for test database");
        let db_path = db_dir.path().join("storefront_test.db");

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_path.display()),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let db_arc = Arc::new(pool);
        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let services = AppServices::new(db_arc.clone(), Arc::new(event_sender.clone()), &cfg);

        let state = Arc::new(AppState {
            db: db_arc,
            config: cfg,
            event_sender,
            services,
        });

        let router = Router::new()
            .nest("/api/v1", storefront_api::api_v1_routes())
            .with_state(state.clone());

        Self {
            router,
            state,
            _event_task: event_task,
            _db_dir: db_dir,
        }
    }

    /// Send a JSON request against the router.
    pub async fn request(&self, method: Method, uri: &str, body: Option<Value>) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    #[allow(dead_code)]
    pub async fn get(&self, uri: &str) -> Response {
        self.request(Method::GET, uri, None).await
    }

    #[allow(dead_code)]
    pub async fn post(&self, uri: &str, body: Value) -> Response {
        self.request(Method::POST, uri, Some(body)).await
    }

    #[allow(dead_code)]
    pub async fn put(&self, uri: &str, body: Value) -> Response {
        self.request(Method::PUT, uri, Some(body)).await
    }

    #[allow(dead_code)]
    pub async fn delete(&self, uri: &str) -> Response {
        self.request(Method::DELETE, uri, None).await
    }

    // Seeding helpers go through the services so test data takes the same
    // path production writes do.

    #[allow(dead_code)]
    pub async fn seed_product(&self, name: &str, price: Decimal, stock: i32) -> ProductModel {
        self.state
            .services
            .catalog
            .create_product(CreateProductInput {
                name: name.to_string(),
                description: None,
                price,
                stock: Some(stock),
            })
            .await
            .expect("seed product for tests")
    }

    #[allow(dead_code)]
    pub async fn seed_variant(
        &self,
        product_id: Uuid,
        sku: &str,
        price: Decimal,
        stock: i32,
    ) -> ProductVariantModel {
        self.state
            .services
            .catalog
            .create_variant(
                product_id,
                CreateVariantInput {
                    sku: sku.to_string(),
                    name: format!("Variant {}", sku),
                    price,
                    stock: Some(stock),
                    attributes: None,
                },
            )
            .await
            .expect("seed variant for tests")
    }

    #[allow(dead_code)]
    pub async fn seed_customer(&self, name: &str, email: &str, points: i32) -> CustomerModel {
        self.state
            .services
            .customer
            .create_customer(CreateCustomerInput {
                name: name.to_string(),
                email: email.to_string(),
                loyalty_points: Some(points),
            })
            .await
            .expect("seed customer for tests")
    }

    #[allow(dead_code)]
    pub async fn seed_discount(
        &self,
        code: &str,
        percent_value: i32,
        usage_limit: i32,
    ) -> DiscountCodeModel {
        self.state
            .services
            .discount
            .create_discount(code.to_string(), percent_value, usage_limit)
            .await
            .expect("seed discount code for tests")
    }

    #[allow(dead_code)]
    pub async fn seed_cart(&self, customer_id: Option<Uuid>) -> CartModel {
        self.state
            .services
            .cart
            .create_cart(customer_id)
            .await
            .expect("seed cart for tests")
    }

    #[allow(dead_code)]
    pub async fn seed_cart_line(
        &self,
        cart_id: Uuid,
        product_id: Uuid,
        variant_id: Option<Uuid>,
        quantity: i32,
    ) -> CartItemModel {
        self.state
            .services
            .cart
            .add_item(
                cart_id,
                AddItemInput {
                    product_id,
                    variant_id,
                    quantity,
                },
            )
            .await
            .expect("seed cart line for tests")
    }

    #[allow(dead_code)]
    pub async fn attach_discount(&self, cart_id: Uuid, code: &str) {
        self.state
            .services
            .cart
            .apply_discount(cart_id, code)
            .await
            .expect("attach discount for tests");
    }

    // Raw row readers for state assertions.

    #[allow(dead_code)]
    pub async fn variant_stock(&self, variant_id: Uuid) -> i32 {
        ProductVariant::find_by_id(variant_id)
            .one(self.state.db.as_ref())
            .await
            .expect("read variant")
            .expect("variant row exists")
            .stock
    }

    #[allow(dead_code)]
    pub async fn product_stock(&self, product_id: Uuid) -> i32 {
        Product::find_by_id(product_id)
            .one(self.state.db.as_ref())
            .await
            .expect("read product")
            .expect("product row exists")
            .stock
    }

    #[allow(dead_code)]
    pub async fn discount_used_count(&self, discount_id: Uuid) -> i32 {
        DiscountCode::find_by_id(discount_id)
            .one(self.state.db.as_ref())
            .await
            .expect("read discount code")
            .expect("discount row exists")
            .used_count
    }

    #[allow(dead_code)]
    pub async fn loyalty_points(&self, customer_id: Uuid) -> i32 {
        Customer::find_by_id(customer_id)
            .one(self.state.db.as_ref())
            .await
            .expect("read customer")
            .expect("customer row exists")
            .loyalty_points
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

/// Decode a response body as JSON.
pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    serde_json::from_slice(&bytes).expect("response body is json")
}

/// Read a Decimal out of a JSON field regardless of how serde rendered it.
#[allow(dead_code)]
pub fn decimal_field(value: &Value, key: &str) -> Decimal {
    match &value[key] {
        Value::String(s) => s.parse().expect("decimal string"),
        Value::Number(n) => n.to_string().parse().expect("decimal number"),
        other => panic!("field '{}' is not a decimal: {:?}", key, other),
    }
}

/// An inline shipping address payload for guest checkouts.
#[allow(dead_code)]
pub fn inline_address() -> Value {
    serde_json::json!({
        "recipient_name": "Linh Tran",
        "phone": "+84 90 123 4567",
        "line1": "12 Hang Bac",
        "line2": null,
        "city": "Hanoi",
        "state": null,
        "postal_code": "100000",
        "country": "VN"
    })
}
