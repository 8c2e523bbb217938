//! Storefront core
//!
//! Cart, checkout, payment coordination and order administration for a small
//! storefront. Routing, rendering and authentication live outside this crate.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod config;
pub mod db;
pub mod dto;
pub mod entities;
pub mod errors;
pub mod events;
pub mod migrator;
pub mod models;
pub mod notifications;
pub mod repositories;
pub mod services;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::info;

use crate::config::AppConfig;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::models::Product;
use crate::notifications::{LogNotifier, Notifier, WebhookNotifier};
use crate::repositories::{
    DocumentOrderRepository, DocumentStore, DocumentUserRepository, OrderRepository,
    UserRepository,
};
use crate::services::catalog::InMemoryCatalog;
use crate::services::commerce::{CartService, CartStorage, CheckoutService, JsonFileCartStorage};
use crate::services::order_status::OrderStatusService;
use crate::services::orders::OrderQueryService;
use crate::services::payments::{
    BankTransferProcessor, CardPaymentProcessor, GatewayHandle, PaymentCoordinator,
    PaystackClient, UssdProcessor,
};

/// Every service of the storefront wired from one [`AppConfig`].
#[derive(Clone)]
pub struct Storefront {
    pub config: AppConfig,
    pub event_sender: Arc<EventSender>,
    pub orders: Arc<dyn OrderRepository>,
    pub users: Arc<dyn UserRepository>,
    pub payments: Arc<PaymentCoordinator>,
    pub notifier: Arc<dyn Notifier>,
    pub checkout: CheckoutService,
    pub order_queries: OrderQueryService,
    pub order_status: OrderStatusService,
}

impl Storefront {
    /// Builds the services over `store`. Card payments go through `gateway`.
    ///
    /// Returns the receiving end of the event channel; the caller decides
    /// whether to drain it with [`events::process_events`].
    pub fn build(
        config: AppConfig,
        store: Arc<dyn DocumentStore>,
        gateway: GatewayHandle,
    ) -> Result<(Self, mpsc::Receiver<Event>), ServiceError> {
        let (event_sender, event_rx) = EventSender::channel(config.event_channel_capacity);
        let event_sender = Arc::new(event_sender);
        let network_timeout = config.network_timeout();

        let orders: Arc<dyn OrderRepository> = Arc::new(
            DocumentOrderRepository::new(store.clone())
                .with_timeout(network_timeout)
                .with_read_retries(config.read_retry_attempts),
        );
        let users: Arc<dyn UserRepository> = Arc::new(DocumentUserRepository::new(store));

        let mut card = CardPaymentProcessor::new(
            gateway,
            config.gateway.public_key.clone(),
            config.currency.clone(),
            config.card_checkout_timeout(),
            network_timeout,
        );
        if config.gateway.verify_references {
            let secret_key = config.gateway.secret_key.clone().ok_or_else(|| {
                ServiceError::InvalidInput(
                    "gateway.secret_key is required to verify references".to_string(),
                )
            })?;
            let client = PaystackClient::new(&config.gateway.base_url, secret_key, network_timeout)
                .map_err(|e| ServiceError::InternalError(e.to_string()))?;
            card = card.with_verifier(Arc::new(client));
        }

        let payments = Arc::new(
            PaymentCoordinator::new(orders.clone(), network_timeout)
                .with_processor(Arc::new(card))
                .with_processor(Arc::new(BankTransferProcessor::new(
                    config.bank.account(),
                    network_timeout,
                )))
                .with_processor(Arc::new(UssdProcessor::new(
                    config.ussd.code_template.clone(),
                    network_timeout,
                )))
                .with_event_sender(event_sender.clone()),
        );

        // Checkout waits for the whole delivery, retries included.
        let (notifier, notification_budget): (Arc<dyn Notifier>, Duration) =
            match &config.notifications.webhook_url {
                Some(url) => {
                    let webhook = WebhookNotifier::new(
                        url.clone(),
                        config.notifications.webhook_secret.clone(),
                        network_timeout,
                    )
                    .map_err(|e| ServiceError::InternalError(e.to_string()))?
                    .with_retries(
                        config.notifications.max_attempts,
                        config.notifications.retry_delay(),
                    );
                    let budget = webhook.delivery_budget();
                    (Arc::new(webhook), budget)
                }
                None => (Arc::new(LogNotifier), network_timeout),
            };

        let checkout = CheckoutService::new(
            orders.clone(),
            payments.clone(),
            notifier.clone(),
            event_sender.clone(),
            config.currency.clone(),
            notification_budget,
        );
        let order_queries = OrderQueryService::new(orders.clone());
        let order_status =
            OrderStatusService::new(orders.clone(), users.clone(), event_sender.clone());

        info!(environment = %config.environment, currency = %config.currency, "Storefront services ready");

        Ok((
            Self {
                config,
                event_sender,
                orders,
                users,
                payments,
                notifier,
                checkout,
                order_queries,
                order_status,
            },
            event_rx,
        ))
    }

    /// Catalog over `products` with the configured featured shelf size.
    pub fn catalog(&self, products: Vec<Product>) -> InMemoryCatalog {
        InMemoryCatalog::new(products).with_featured_limit(self.config.featured_limit)
    }

    /// The shopper's cart backed by the configured JSON file.
    pub async fn open_cart(&self) -> CartService {
        let storage: Arc<dyn CartStorage> =
            Arc::new(JsonFileCartStorage::new(&self.config.cart_storage_path));
        CartService::load(storage, self.event_sender.clone()).await
    }
}

pub mod prelude {
    pub use crate::auth::{AuthProvider, Identity};
    pub use crate::config::AppConfig;
    pub use crate::dto::CheckoutForm;
    pub use crate::errors::{CheckoutError, FieldViolation, ServiceError};
    pub use crate::events::{Event, EventSender};
    pub use crate::models::*;
    pub use crate::services::catalog::{Catalog, InMemoryCatalog};
    pub use crate::services::commerce::{
        CartService, CartStorage, CheckoutReceipt, CheckoutService, InMemoryCartStorage,
    };
    pub use crate::services::payments::{PaymentCoordinator, PaymentDetails, PaymentOutcome};
    pub use crate::Storefront;
}
