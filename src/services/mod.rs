pub mod carts;
pub mod catalog;
pub mod checkout;
pub mod customers;
pub mod discounts;
pub mod inventory;
pub mod loyalty;
pub mod order_status;
pub mod orders;
pub mod pricing;

pub use carts::CartService;
pub use catalog::CatalogService;
pub use checkout::CheckoutService;
pub use customers::CustomerService;
pub use discounts::DiscountService;
pub use inventory::InventoryService;
pub use loyalty::LoyaltyService;
pub use order_status::OrderStatusService;
pub use orders::OrderService;
