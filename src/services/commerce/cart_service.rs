use crate::{
    errors::ServiceError,
    events::{Event, EventSender},
    models::{CartItem, CartSnapshot, Product},
};
use async_trait::async_trait;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

/// Durable storage for the shopper's cart items.
#[async_trait]
pub trait CartStorage: Send + Sync {
    async fn load(&self) -> Result<Vec<CartItem>, ServiceError>;

    /// Replaces the stored items with `items`.
    async fn save(&self, items: &[CartItem]) -> Result<(), ServiceError>;
}

/// Cart persisted as a JSON array in a single file.
///
/// Writes go to a sibling temp file which is then renamed over the target,
/// so a crash never leaves a half-written cart behind.
#[derive(Debug, Clone)]
pub struct JsonFileCartStorage {
    path: PathBuf,
}

impl JsonFileCartStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "cart".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl CartStorage for JsonFileCartStorage {
    async fn load(&self) -> Result<Vec<CartItem>, ServiceError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_str::<Vec<CartItem>>(&raw) {
            Ok(items) => Ok(items),
            Err(e) => {
                error!(path = %self.path.display(), "Failed to parse stored cart, starting empty: {}", e);
                Ok(Vec::new())
            }
        }
    }

    async fn save(&self, items: &[CartItem]) -> Result<(), ServiceError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let body = serde_json::to_vec(items)?;
        let temp = self.temp_path();
        tokio::fs::write(&temp, body).await?;
        tokio::fs::rename(&temp, &self.path).await?;
        Ok(())
    }
}

/// Process-local cart storage. Clones share the same items, like two tabs
/// sharing browser storage.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCartStorage {
    items: Arc<Mutex<Vec<CartItem>>>,
}

impl InMemoryCartStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CartStorage for InMemoryCartStorage {
    async fn load(&self) -> Result<Vec<CartItem>, ServiceError> {
        Ok(self.items.lock().await.clone())
    }

    async fn save(&self, items: &[CartItem]) -> Result<(), ServiceError> {
        *self.items.lock().await = items.to_vec();
        Ok(())
    }
}

/// Drops items with a quantity below one and folds duplicate product ids
/// into the first occurrence. Lines that would push the total out of range
/// are dropped.
fn normalize(items: Vec<CartItem>) -> Vec<CartItem> {
    let mut normalized: Vec<CartItem> = Vec::with_capacity(items.len());
    for item in items.into_iter().filter(|item| item.quantity >= 1) {
        match normalized
            .iter_mut()
            .find(|existing| existing.product.id == item.product.id)
        {
            Some(existing) => existing.quantity = existing.quantity.saturating_add(item.quantity),
            None => normalized.push(item),
        }
    }

    let mut kept: Vec<CartItem> = Vec::with_capacity(normalized.len());
    for item in normalized {
        kept.push(item);
        if CartSnapshot::checked_total(&kept).is_none() {
            if let Some(dropped) = kept.pop() {
                error!(product_id = %dropped.product.id, "Dropping stored cart line with an out-of-range total");
            }
        }
    }
    kept
}

/// The shopper's cart.
///
/// `CartService` keeps the items in memory and persists the full item list
/// through a [`CartStorage`] on every mutation:
/// - a mutation is written to storage before the in-memory copy changes
/// - if the write fails the in-memory cart is left as it was and the error is returned
/// - totals are derived from the items on every [`CartService::snapshot`]
///
/// Two services over the same storage do not see each other's writes until
/// [`CartService::reload`] is called.
///
/// # Examples
///
/// ```ignore
/// let cart = CartService::load(Arc::new(JsonFileCartStorage::new("cart.json")), event_sender).await;
/// cart.add_item(product, 2).await?;
/// let snapshot = cart.snapshot().await;
/// ```
pub struct CartService {
    storage: Arc<dyn CartStorage>,
    items: Mutex<Vec<CartItem>>,
    event_sender: Arc<EventSender>,
}

impl CartService {
    /// Creates a cart backed by `storage`, starting from whatever it holds.
    ///
    /// A storage read failure is logged and the cart starts empty.
    pub async fn load(storage: Arc<dyn CartStorage>, event_sender: Arc<EventSender>) -> Self {
        let items = match storage.load().await {
            Ok(items) => normalize(items),
            Err(e) => {
                error!("Failed to load cart from storage, starting empty: {}", e);
                Vec::new()
            }
        };
        debug!(items = items.len(), "Cart loaded");
        Self {
            storage,
            items: Mutex::new(items),
            event_sender,
        }
    }

    /// Applies `mutate` to a copy of the items, persists the copy and only
    /// then makes it the current cart. A copy whose total is out of range is
    /// rejected.
    async fn commit<F>(&self, mutate: F) -> Result<CartSnapshot, ServiceError>
    where
        F: FnOnce(&mut Vec<CartItem>) -> bool,
    {
        let mut items = self.items.lock().await;
        let mut next = items.clone();
        if !mutate(&mut next) {
            return Ok(CartSnapshot::from_items(items.clone()));
        }
        if CartSnapshot::checked_total(&next).is_none() {
            warn!("Rejecting cart change: total out of range");
            return Err(ServiceError::InvalidInput(
                "cart total is larger than can be represented".to_string(),
            ));
        }

        self.storage.save(&next).await.map_err(|e| {
            error!("Failed to persist cart: {}", e);
            e
        })?;
        *items = next;
        Ok(CartSnapshot::from_items(items.clone()))
    }

    /// Adds `quantity` of `product`.
    ///
    /// If the product is already in the cart its quantity is increased;
    /// otherwise a new line is appended. A `quantity` below one is ignored.
    ///
    /// # Arguments
    ///
    /// * `product` - Product snapshot to store with the line
    /// * `quantity` - Units to add
    ///
    /// # Returns
    ///
    /// * `Ok(CartSnapshot)` - The cart after the change
    /// * `Err(ServiceError)` - Storage error; the cart is unchanged
    #[instrument(skip(self, product), fields(product_id = %product.id))]
    pub async fn add_item(&self, product: Product, quantity: i32) -> Result<CartSnapshot, ServiceError> {
        if quantity < 1 {
            warn!(quantity, "Ignoring add with non-positive quantity");
            return Ok(self.snapshot().await);
        }

        let snapshot = self
            .commit(|items| {
                match items.iter_mut().find(|item| item.product.id == product.id) {
                    Some(item) => item.quantity = item.quantity.saturating_add(quantity),
                    None => items.push(CartItem { product, quantity }),
                }
                true
            })
            .await?;

        info!(quantity, count = snapshot.count, "Added item to cart");
        Ok(snapshot)
    }

    /// Removes the line for `product_id`. Removing an absent product is a no-op.
    #[instrument(skip(self))]
    pub async fn remove_item(&self, product_id: &str) -> Result<CartSnapshot, ServiceError> {
        self.commit(|items| {
            let before = items.len();
            items.retain(|item| item.product.id != product_id);
            items.len() != before
        })
        .await
    }

    /// Replaces the quantity of `product_id`.
    ///
    /// A quantity below one removes the line; an absent product is a no-op.
    #[instrument(skip(self))]
    pub async fn set_quantity(
        &self,
        product_id: &str,
        quantity: i32,
    ) -> Result<CartSnapshot, ServiceError> {
        if quantity < 1 {
            return self.remove_item(product_id).await;
        }

        self.commit(|items| {
            match items.iter_mut().find(|item| item.product.id == product_id) {
                Some(item) if item.quantity != quantity => {
                    item.quantity = quantity;
                    true
                }
                _ => false,
            }
        })
        .await
    }

    /// Empties the cart unconditionally.
    #[instrument(skip(self))]
    pub async fn clear(&self) -> Result<(), ServiceError> {
        let mut cleared = 0;
        self.commit(|items| {
            cleared = items.len();
            items.clear();
            true
        })
        .await?;

        self.event_sender
            .send_or_log(Event::CartCleared {
                item_count: cleared,
                timestamp: Utc::now(),
            })
            .await;
        info!(items = cleared, "Cart cleared");
        Ok(())
    }

    /// Current items with `total` and `count` computed from them.
    pub async fn snapshot(&self) -> CartSnapshot {
        CartSnapshot::from_items(self.items.lock().await.clone())
    }

    /// Re-reads storage, picking up writes made through other services.
    #[instrument(skip(self))]
    pub async fn reload(&self) -> Result<CartSnapshot, ServiceError> {
        let stored = normalize(self.storage.load().await?);
        let mut items = self.items.lock().await;
        *items = stored;
        Ok(CartSnapshot::from_items(items.clone()))
    }
}
