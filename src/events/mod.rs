use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::models::{OrderStatus, PaymentMethod, PaymentStatus};

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Creates a sender together with its receiving end.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event without blocking on a full channel; failures are only logged.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(err) = self.sender.try_send(event) {
            warn!("Dropping domain event: {}", err);
        }
    }
}

/// Domain events emitted by the checkout and admin services.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    OrderCreated {
        order_id: Uuid,
        user_id: String,
    },
    PaymentStatusChanged {
        order_id: Uuid,
        method: PaymentMethod,
        old_status: PaymentStatus,
        new_status: PaymentStatus,
    },
    OrderStatusChanged {
        order_id: Uuid,
        old_status: OrderStatus,
        new_status: OrderStatus,
    },
    CheckoutCompleted {
        order_id: Uuid,
        method: PaymentMethod,
    },
    NotificationFailed {
        order_id: Uuid,
        reason: String,
    },
    CartCleared {
        item_count: usize,
        timestamp: DateTime<Utc>,
    },
}

impl Event {
    pub fn order_id(&self) -> Option<Uuid> {
        match self {
            Event::OrderCreated { order_id, .. }
            | Event::PaymentStatusChanged { order_id, .. }
            | Event::OrderStatusChanged { order_id, .. }
            | Event::CheckoutCompleted { order_id, .. }
            | Event::NotificationFailed { order_id, .. } => Some(*order_id),
            Event::CartCleared { .. } => None,
        }
    }
}

// Handlers implementing this trait process events asynchronously.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle_event(&self, event: &Event) -> Result<(), String>;
}

/// Drains the channel and hands every event to each handler in turn.
pub async fn process_events(mut rx: mpsc::Receiver<Event>, handlers: Vec<Arc<dyn EventHandler>>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        debug!(?event, "Received event");
        for handler in &handlers {
            if let Err(e) = handler.handle_event(&event).await {
                error!(order_id = ?event.order_id(), "Event handler failed: {}", e);
            }
        }
    }

    info!("Event channel closed; stopping event processing");
}

/// Handler that writes every event to the log.
#[derive(Debug, Default)]
pub struct LoggingEventHandler;

#[async_trait]
impl EventHandler for LoggingEventHandler {
    async fn handle_event(&self, event: &Event) -> Result<(), String> {
        match event {
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => info!(%order_id, %old_status, %new_status, "order status changed"),
            Event::PaymentStatusChanged {
                order_id,
                method,
                old_status,
                new_status,
            } => info!(%order_id, %method, %old_status, %new_status, "payment status changed"),
            Event::NotificationFailed { order_id, reason } => {
                warn!(%order_id, %reason, "confirmation notification failed")
            }
            other => info!(event = ?other, "domain event"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<Event>>,
    }

    #[async_trait]
    impl EventHandler for Recorder {
        async fn handle_event(&self, event: &Event) -> Result<(), String> {
            self.seen.lock().await.push(event.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn events_reach_every_handler() {
        let (sender, rx) = EventSender::channel(8);
        let recorder = Arc::new(Recorder::default());
        let order_id = Uuid::new_v4();

        sender
            .send(Event::CheckoutCompleted {
                order_id,
                method: PaymentMethod::Ussd,
            })
            .await
            .unwrap();
        drop(sender);

        process_events(rx, vec![recorder.clone(), Arc::new(LoggingEventHandler)]).await;

        let seen = recorder.seen.lock().await;
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].order_id(), Some(order_id));
    }

    #[tokio::test]
    async fn send_or_log_never_blocks_on_full_channel() {
        let (sender, _rx) = EventSender::channel(1);
        for _ in 0..3 {
            sender
                .send_or_log(Event::CartCleared {
                    item_count: 1,
                    timestamp: Utc::now(),
                })
                .await;
        }
    }
}
