use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, OnceCell};
use tracing::{debug, info, warn};

use super::PaymentError;

/// Parameters the card widget is opened with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayCheckout {
    pub public_key: String,
    pub email: String,
    pub amount_minor_units: i64,
    pub currency: String,
    pub reference: String,
    pub metadata: serde_json::Value,
}

/// Callback reported by the widget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum GatewayEvent {
    Success { reference: String },
    Failed { reason: String },
    /// Widget closed without a result.
    Closed,
}

/// A card payment gateway: opens a checkout and resolves once the shopper
/// finishes, fails or walks away.
#[async_trait]
pub trait CardGateway: Send + Sync {
    async fn checkout(&self, request: GatewayCheckout) -> Result<GatewayEvent, PaymentError>;
}

type Waiters = DashMap<String, oneshot::Sender<GatewayEvent>>;

/// Removes the waiter when the checkout future finishes or is dropped.
struct WaiterGuard<'a> {
    waiters: &'a Waiters,
    reference: String,
}

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        self.waiters.remove(&self.reference);
    }
}

/// Gateway backed by a client-side widget.
///
/// `checkout` publishes the request on the launch channel for the UI to open
/// the widget, then waits for the UI to call [`WidgetGateway::resolve`] with
/// the widget callback for that reference.
#[derive(Debug)]
pub struct WidgetGateway {
    launcher: mpsc::Sender<GatewayCheckout>,
    waiters: Waiters,
}

impl WidgetGateway {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<GatewayCheckout>) {
        let (launcher, launches) = mpsc::channel(capacity.max(1));
        (
            Self {
                launcher,
                waiters: DashMap::new(),
            },
            launches,
        )
    }

    /// Delivers a widget callback. Returns `false` when no checkout is
    /// waiting on `reference` (already resolved, timed out or unknown).
    pub fn resolve(&self, reference: &str, event: GatewayEvent) -> bool {
        match self.waiters.remove(reference) {
            Some((_, waiter)) => waiter.send(event).is_ok(),
            None => {
                warn!(%reference, "Widget callback for unknown checkout");
                false
            }
        }
    }

    pub fn pending_checkouts(&self) -> usize {
        self.waiters.len()
    }
}

#[async_trait]
impl CardGateway for WidgetGateway {
    async fn checkout(&self, request: GatewayCheckout) -> Result<GatewayEvent, PaymentError> {
        let reference = request.reference.clone();
        let (tx, rx) = oneshot::channel();
        self.waiters.insert(reference.clone(), tx);
        let _guard = WaiterGuard {
            waiters: &self.waiters,
            reference: reference.clone(),
        };

        self.launcher
            .send(request)
            .await
            .map_err(|_| PaymentError::Provider("card widget is not available".to_string()))?;
        debug!(%reference, "Card widget launched");

        // A dropped sender means the UI went away without a callback.
        Ok(rx.await.unwrap_or(GatewayEvent::Closed))
    }
}

type GatewayFactory =
    Arc<dyn Fn() -> BoxFuture<'static, Result<Arc<dyn CardGateway>, PaymentError>> + Send + Sync>;

/// Shared handle to the card gateway, created on first use and reused by
/// every checkout afterwards.
#[derive(Clone)]
pub struct GatewayHandle {
    cell: Arc<OnceCell<Arc<dyn CardGateway>>>,
    factory: GatewayFactory,
}

impl GatewayHandle {
    /// Defers creating the gateway (loading the widget script, say) until
    /// the first card payment.
    pub fn lazy<F, Fut>(factory: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Arc<dyn CardGateway>, PaymentError>>
            + Send
            + 'static,
    {
        Self {
            cell: Arc::new(OnceCell::new()),
            factory: Arc::new(move || factory().boxed()),
        }
    }

    pub fn ready(gateway: Arc<dyn CardGateway>) -> Self {
        Self {
            cell: Arc::new(OnceCell::new_with(Some(gateway))),
            factory: Arc::new(|| {
                async {
                    Err::<Arc<dyn CardGateway>, _>(PaymentError::Provider(
                        "gateway handle was created initialized".to_string(),
                    ))
                }
                .boxed()
            }),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.cell.initialized()
    }

    /// The shared gateway. A failed initialization is retried on the next call.
    pub async fn get(&self) -> Result<Arc<dyn CardGateway>, PaymentError> {
        let gateway = self
            .cell
            .get_or_try_init(|| {
                info!("Initializing card gateway");
                (self.factory)()
            })
            .await?;
        Ok(gateway.clone())
    }
}
