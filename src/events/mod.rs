use crate::entities::{order::OrderStatus, payment::PaymentStatus, shipment::ShipmentStatus};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

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

    /// Best-effort delivery for events emitted after a commit. The committed
    /// operation never fails because the event could not be queued.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(error) = self.send(event).await {
            warn!(%error, "dropping domain event");
        }
    }
}

/// Domain events published after the owning transaction commits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    OrderCreated {
        order_id: i32,
        user_id: i32,
    },
    OrderStatusChanged {
        order_id: i32,
        old_status: OrderStatus,
        new_status: OrderStatus,
    },
    OrderCancelled {
        order_id: i32,
        restocked_units: i64,
    },
    InventoryDebited {
        product_id: i32,
        quantity: i32,
        remaining: i32,
    },
    InventoryRestored {
        product_id: i32,
        quantity: i32,
        remaining: i32,
    },
    PaymentCreated {
        payment_id: i32,
        order_id: i32,
    },
    PaymentStatusChanged {
        payment_id: i32,
        order_id: i32,
        new_status: PaymentStatus,
    },
    ShipmentCreated {
        shipment_id: i32,
        order_id: i32,
    },
    ShipmentUpdated {
        shipment_id: i32,
        order_id: i32,
        status: ShipmentStatus,
    },
    CartUpdated {
        cart_id: i32,
        user_id: i32,
    },
    CouponCreated(i32),
    CouponUpdated(i32),
    CouponDeleted(i32),
    ShippingMethodChanged(i32),
    PaymentMethodChanged(i32),
}

/// Consumes the event channel until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::OrderCreated { order_id, user_id } => {
                info!(order_id, user_id, "order created");
            }
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => {
                info!(order_id, %old_status, %new_status, "order status changed");
            }
            Event::OrderCancelled {
                order_id,
                restocked_units,
            } => {
                info!(order_id, restocked_units, "order cancelled");
            }
            Event::InventoryDebited {
                product_id,
                quantity,
                remaining,
            } => {
                debug!(product_id, quantity, remaining, "inventory debited");
                if *remaining == 0 {
                    warn!(product_id, "product is out of stock");
                }
            }
            Event::InventoryRestored {
                product_id,
                quantity,
                remaining,
            } => {
                debug!(product_id, quantity, remaining, "inventory restored");
            }
            Event::PaymentCreated {
                payment_id,
                order_id,
            } => {
                info!(payment_id, order_id, "payment created");
            }
            Event::PaymentStatusChanged {
                payment_id,
                order_id,
                new_status,
            } => {
                info!(payment_id, order_id, %new_status, "payment status changed");
            }
            Event::ShipmentCreated {
                shipment_id,
                order_id,
            } => {
                info!(shipment_id, order_id, "shipment created");
            }
            Event::ShipmentUpdated {
                shipment_id,
                order_id,
                status,
            } => {
                info!(shipment_id, order_id, %status, "shipment updated");
            }
            Event::CartUpdated { cart_id, user_id } => {
                debug!(cart_id, user_id, "cart updated");
            }
            Event::CouponCreated(id) | Event::CouponUpdated(id) | Event::CouponDeleted(id) => {
                debug!(coupon_id = id, event = ?event, "coupon changed");
            }
            Event::ShippingMethodChanged(id) => {
                debug!(shipping_method_id = id, "shipping method changed");
            }
            Event::PaymentMethodChanged(id) => {
                debug!(payment_method_id = id, "payment method changed");
            }
        }
    }

    info!("Event processing loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_reach_the_receiver_in_order() {
        let (tx, mut rx) = mpsc::channel(4);
        let sender = EventSender::new(tx);

        sender
            .send(Event::OrderCreated {
                order_id: 1,
                user_id: 7,
            })
            .await
            .unwrap();
        sender.send_or_log(Event::CouponDeleted(3)).await;

        assert_eq!(
            rx.recv().await,
            Some(Event::OrderCreated {
                order_id: 1,
                user_id: 7
            })
        );
        assert_eq!(rx.recv().await, Some(Event::CouponDeleted(3)));
    }

    #[tokio::test]
    async fn send_fails_once_the_loop_is_gone() {
        let (tx, rx) = mpsc::channel(1);
        let sender = EventSender::new(tx);
        drop(rx);

        assert!(sender.send(Event::CouponCreated(1)).await.is_err());
        // Must not panic or error out.
        sender.send_or_log(Event::CouponCreated(1)).await;
    }
}
