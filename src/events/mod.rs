use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Sending half of the in-process event bus
#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event and logs instead of failing when the channel is gone.
    /// Event emission is fire-and-forget; it never fails a request.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!("Event dropped: {}", e);
        }
    }
}

// The events that can occur in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Cart events
    CartCreated(Uuid),
    CartItemAdded {
        cart_id: Uuid,
        product_id: Uuid,
    },
    CartItemRemoved {
        cart_id: Uuid,
        item_id: Uuid,
    },
    DiscountApplied {
        cart_id: Uuid,
        discount_code_id: Uuid,
    },
    DiscountRemoved {
        cart_id: Uuid,
    },

    // Checkout / order events
    CheckoutCompleted {
        cart_id: Uuid,
        order_id: Uuid,
    },
    OrderCreated(Uuid),
    OrderStatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },
    OrderCancelled(Uuid),

    // Catalog events
    ProductCreated(Uuid),
    VariantCreated {
        product_id: Uuid,
        variant_id: Uuid,
    },

    // Customer events
    CustomerCreated(Uuid),
}

/// Drains the event channel, dispatching each event to its handler.
/// Spawned once at startup; exits when every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match event {
            Event::CheckoutCompleted { cart_id, order_id } => {
                info!(
                    cart_id = %cart_id,
                    order_id = %order_id,
                    "Checkout completed"
                );
            }
            Event::OrderCreated(order_id) => {
                info!(order_id = %order_id, "Order created");
            }
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => {
                info!(
                    order_id = %order_id,
                    old_status = %old_status,
                    new_status = %new_status,
                    "Order status changed"
                );
            }
            Event::OrderCancelled(order_id) => {
                info!(order_id = %order_id, "Order cancelled");
            }
            Event::CartCreated(cart_id) => {
                info!(cart_id = %cart_id, "Cart created");
            }
            Event::CartItemAdded { cart_id, product_id } => {
                info!(cart_id = %cart_id, product_id = %product_id, "Cart item added");
            }
            Event::CartItemRemoved { cart_id, item_id } => {
                info!(cart_id = %cart_id, item_id = %item_id, "Cart item removed");
            }
            Event::DiscountApplied {
                cart_id,
                discount_code_id,
            } => {
                info!(
                    cart_id = %cart_id,
                    discount_code_id = %discount_code_id,
                    "Discount applied to cart"
                );
            }
            Event::DiscountRemoved { cart_id } => {
                info!(cart_id = %cart_id, "Discount removed from cart");
            }
            Event::ProductCreated(product_id) => {
                info!(product_id = %product_id, "Product created");
            }
            Event::VariantCreated {
                product_id,
                variant_id,
            } => {
                info!(product_id = %product_id, variant_id = %variant_id, "Variant created");
            }
            Event::CustomerCreated(customer_id) => {
                info!(customer_id = %customer_id, "Customer created");
            }
        }
    }

    info!("Event processing loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_delivers_to_receiver() {
        let (tx, mut rx) = mpsc::channel(8);
        let sender = EventSender::new(tx);

        let order_id = Uuid::new_v4();
        sender.send(Event::OrderCreated(order_id)).await.unwrap();

        match rx.recv().await {
            Some(Event::OrderCreated(id)) => assert_eq!(id, order_id),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn send_or_log_swallows_closed_channel() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = EventSender::new(tx);

        // Must not panic or error out.
        sender.send_or_log(Event::CartCreated(Uuid::new_v4())).await;
    }
}
