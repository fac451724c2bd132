pub mod carts;
pub mod checkout;
pub mod common;
pub mod customers;
pub mod discounts;
pub mod orders;
pub mod products;

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::events::EventSender;
use crate::services::{
    CartService, CatalogService, CheckoutService, CustomerService, DiscountService,
    InventoryService, LoyaltyService, OrderService, OrderStatusService,
};
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub catalog: Arc<CatalogService>,
    pub inventory: Arc<InventoryService>,
    pub discount: Arc<DiscountService>,
    pub loyalty: Arc<LoyaltyService>,
    pub customer: Arc<CustomerService>,
    pub cart: Arc<CartService>,
    pub order: Arc<OrderService>,
    pub checkout: Arc<CheckoutService>,
    pub order_status: Arc<OrderStatusService>,
}

impl AppServices {
    /// Builds the service graph shared by every handler.
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>, config: &AppConfig) -> Self {
        let catalog = Arc::new(CatalogService::new(
            db_pool.clone(),
            event_sender.clone(),
            config.currency.clone(),
        ));
        let inventory = Arc::new(InventoryService::new(db_pool.clone()));
        let discount = Arc::new(DiscountService::new(db_pool.clone()));
        let loyalty = Arc::new(LoyaltyService::new(db_pool.clone()));
        let customer = Arc::new(CustomerService::new(db_pool.clone(), event_sender.clone()));
        let cart = Arc::new(CartService::new(
            db_pool.clone(),
            event_sender.clone(),
            catalog.clone(),
        ));
        let order = Arc::new(OrderService::new(db_pool.clone()));
        let checkout = Arc::new(CheckoutService::new(
            db_pool.clone(),
            event_sender.clone(),
            catalog.clone(),
            inventory.clone(),
            discount.clone(),
            loyalty.clone(),
            cart.clone(),
            order.clone(),
            config.shipping_fee(),
        ));
        let order_status = Arc::new(OrderStatusService::new(
            db_pool,
            event_sender,
            inventory.clone(),
            discount.clone(),
            loyalty.clone(),
            order.clone(),
        ));

        Self {
            catalog,
            inventory,
            discount,
            loyalty,
            customer,
            cart,
            order,
            checkout,
            order_status,
        }
    }
}
