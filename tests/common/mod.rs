#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use storefront_core::{
    auth::Identity,
    dto::CheckoutForm,
    errors::ServiceError,
    events::{Event, EventSender},
    models::{
        BankAccount, CartItem, NewOrder, Order, OrderStatus, PaymentMethod, PaymentRecord,
        Product, Role, User,
    },
    notifications::{ContactMessage, NotificationError, Notifier, OrderConfirmation},
    repositories::{
        DocumentOrderRepository, DocumentStore, DocumentUserRepository, InMemoryDocumentStore,
        OrderRepository, UserRepository,
    },
    services::{
        commerce::{CartService, CartStorage, CheckoutService, InMemoryCartStorage},
        order_status::OrderStatusService,
        payments::{
            BankTransferProcessor, CardGateway, CardPaymentProcessor, GatewayCheckout,
            GatewayEvent, GatewayHandle, PaymentCoordinator, PaymentDetails, PaymentError,
            PaymentOutcome, PaymentProcessor, TransactionVerifier, UssdProcessor,
        },
    },
};
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

pub const USSD_TEMPLATE: &str = "*737*000*{amount}#";
pub const CURRENCY: &str = "NGN";

pub fn product(id: &str, price: Decimal) -> Product {
    Product::new(id, format!("Product {}", id), price).with_category("Electronics")
}

pub fn bank_account() -> BankAccount {
    BankAccount {
        bank_name: "Example Bank".into(),
        account_number: "0123456789".into(),
        account_name: "Storefront Ltd".into(),
    }
}

pub fn shopper() -> Identity {
    Identity::new("user-1", "ada@example.com")
}

pub fn user(id: &str, role: Role, created_at: DateTime<Utc>) -> User {
    User {
        id: id.into(),
        name: format!("User {}", id),
        email: format!("{}@example.com", id),
        role,
        created_at,
    }
}

pub fn admin() -> User {
    user("admin-1", Role::Admin, Utc::now())
}

pub fn customer() -> User {
    user("user-1", Role::Customer, Utc::now())
}

pub fn valid_form(method: PaymentMethod) -> CheckoutForm {
    let card = method == PaymentMethod::Card;
    CheckoutForm {
        email: "ada@example.com".into(),
        first_name: "Ada".into(),
        last_name: "Obi".into(),
        address: "12 Marina Road".into(),
        city: "Lagos".into(),
        postal_code: "100001".into(),
        phone: "08012345678".into(),
        payment_method: method,
        card_number: card.then(|| "4084 0840 8408 4081".to_string()),
        card_expiry: card.then(|| "12/30".to_string()),
        card_cvc: card.then(|| "408".to_string()),
    }
}

/// A pending order as checkout would create it.
pub fn new_order(user_id: &str, total: Decimal, created_at: DateTime<Utc>) -> NewOrder {
    let form = valid_form(PaymentMethod::BankTransfer);
    NewOrder {
        user_id: user_id.into(),
        user_email: format!("{}@example.com", user_id),
        items: vec![(&CartItem {
            product: product("p1", total),
            quantity: 1,
        })
            .into()],
        delivery: form.delivery(),
        payment: PaymentRecord::pending(PaymentMethod::BankTransfer, total),
        total,
        status: OrderStatus::Pending,
        created_at,
    }
}

/// Card gateway that plays back scripted widget callbacks. The last script
/// repeats once the others are used up.
pub struct ScriptedGateway {
    scripts: Mutex<VecDeque<Script>>,
    pub requests: Mutex<Vec<GatewayCheckout>>,
}

#[derive(Clone)]
pub enum Script {
    /// Reports success for the reference it was opened with.
    Succeed,
    /// Reports success for some other reference.
    SucceedAs(String),
    Decline(String),
    Close,
    /// Never calls back.
    Hang,
    Unavailable,
}

impl ScriptedGateway {
    pub fn new(script: Script) -> Arc<Self> {
        Self::sequence(vec![script])
    }

    pub fn sequence(scripts: Vec<Script>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    async fn next_script(&self) -> Script {
        let mut scripts = self.scripts.lock().await;
        if scripts.len() > 1 {
            scripts.pop_front().unwrap_or(Script::Close)
        } else {
            scripts.front().cloned().unwrap_or(Script::Close)
        }
    }
}

#[async_trait]
impl CardGateway for ScriptedGateway {
    async fn checkout(&self, request: GatewayCheckout) -> Result<GatewayEvent, PaymentError> {
        let reference = request.reference.clone();
        self.requests.lock().await.push(request);
        match self.next_script().await {
            Script::Succeed => Ok(GatewayEvent::Success { reference }),
            Script::SucceedAs(other) => Ok(GatewayEvent::Success { reference: other }),
            Script::Decline(reason) => Ok(GatewayEvent::Failed { reason }),
            Script::Close => Ok(GatewayEvent::Closed),
            Script::Hang => {
                futures::future::pending::<()>().await;
                Ok(GatewayEvent::Closed)
            }
            Script::Unavailable => Err(PaymentError::Provider("gateway script failed to load".into())),
        }
    }
}

/// Processor whose provider is always unreachable.
pub struct UnreachableProcessor {
    pub method: PaymentMethod,
    pub calls: AtomicUsize,
}

impl UnreachableProcessor {
    pub fn new(method: PaymentMethod) -> Arc<Self> {
        Arc::new(Self {
            method,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl PaymentProcessor for UnreachableProcessor {
    fn method(&self) -> PaymentMethod {
        self.method
    }

    fn deadline(&self) -> Duration {
        Duration::from_secs(5)
    }

    async fn process(
        &self,
        _order: &Order,
        _details: &PaymentDetails,
    ) -> Result<PaymentOutcome, PaymentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(PaymentError::Provider("connection refused".into()))
    }
}

/// Order repository over the in-memory store with switchable failures.
pub struct FlakyOrders {
    inner: DocumentOrderRepository,
    pub fail_create: AtomicBool,
    pub fail_payment_writes: AtomicBool,
    pub creates: AtomicUsize,
}

impl FlakyOrders {
    pub fn new(store: Arc<dyn DocumentStore>) -> Arc<Self> {
        Arc::new(Self {
            inner: DocumentOrderRepository::new(store),
            fail_create: AtomicBool::new(false),
            fail_payment_writes: AtomicBool::new(false),
            creates: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl OrderRepository for FlakyOrders {
    async fn create(&self, order: NewOrder) -> Result<Order, ServiceError> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(ServiceError::StorageError("store unavailable".into()));
        }
        self.inner.create(order).await
    }

    async fn get(&self, id: Uuid) -> Result<Option<Order>, ServiceError> {
        self.inner.get(id).await
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Order>, ServiceError> {
        self.inner.list_for_user(user_id).await
    }

    async fn list_all(&self) -> Result<Vec<Order>, ServiceError> {
        self.inner.list_all().await
    }

    async fn update_status(&self, id: Uuid, status: OrderStatus) -> Result<(), ServiceError> {
        self.inner.update_status(id, status).await
    }

    async fn update_payment(&self, id: Uuid, payment: &PaymentRecord) -> Result<(), ServiceError> {
        if self.fail_payment_writes.load(Ordering::SeqCst) {
            return Err(ServiceError::StorageError("write rejected".into()));
        }
        self.inner.update_payment(id, payment).await
    }
}

/// Notifier that records what it was asked to send.
#[derive(Default)]
pub struct RecordingNotifier {
    pub confirmations: Mutex<Vec<(OrderConfirmation, String)>>,
    pub contacts: Mutex<Vec<ContactMessage>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_order_confirmation(
        &self,
        confirmation: &OrderConfirmation,
        email: &str,
    ) -> Result<(), NotificationError> {
        self.confirmations
            .lock()
            .await
            .push((confirmation.clone(), email.to_string()));
        Ok(())
    }

    async fn send_contact_message(&self, message: &ContactMessage) -> Result<(), NotificationError> {
        self.contacts.lock().await.push(message.clone());
        Ok(())
    }
}

pub struct FailingNotifier;

#[async_trait]
impl Notifier for FailingNotifier {
    async fn send_order_confirmation(
        &self,
        _confirmation: &OrderConfirmation,
        _email: &str,
    ) -> Result<(), NotificationError> {
        Err(NotificationError::Delivery("mail relay returned 503".into()))
    }

    async fn send_contact_message(&self, _message: &ContactMessage) -> Result<(), NotificationError> {
        Err(NotificationError::Delivery("mail relay returned 503".into()))
    }
}

/// Cart storage whose writes can be switched off.
#[derive(Default)]
pub struct BrokenCartStorage {
    inner: InMemoryCartStorage,
    pub fail_saves: AtomicBool,
}

#[async_trait]
impl CartStorage for BrokenCartStorage {
    async fn load(&self) -> Result<Vec<CartItem>, ServiceError> {
        self.inner.load().await
    }

    async fn save(&self, items: &[CartItem]) -> Result<(), ServiceError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(ServiceError::StorageError("quota exceeded".into()));
        }
        self.inner.save(items).await
    }
}

/// Checkout wired over in-memory collaborators.
pub struct Harness {
    pub store: Arc<InMemoryDocumentStore>,
    pub orders: Arc<FlakyOrders>,
    pub users: Arc<dyn UserRepository>,
    pub payments: Arc<PaymentCoordinator>,
    pub notifier: Arc<RecordingNotifier>,
    pub checkout: CheckoutService,
    pub status: OrderStatusService,
    pub event_sender: Arc<EventSender>,
    pub events: mpsc::Receiver<Event>,
}

pub struct HarnessBuilder {
    gateway: Arc<dyn CardGateway>,
    extra: Vec<Arc<dyn PaymentProcessor>>,
    notifier: Option<Arc<dyn Notifier>>,
    verifier: Option<Arc<dyn TransactionVerifier>>,
    widget_timeout: Duration,
}

impl Default for HarnessBuilder {
    fn default() -> Self {
        Self {
            gateway: ScriptedGateway::new(Script::Succeed),
            extra: Vec::new(),
            notifier: None,
            verifier: None,
            widget_timeout: Duration::from_secs(5),
        }
    }
}

impl HarnessBuilder {
    pub fn gateway(mut self, gateway: Arc<dyn CardGateway>) -> Self {
        self.gateway = gateway;
        self
    }

    /// Replaces the default processor for the same method.
    pub fn processor(mut self, processor: Arc<dyn PaymentProcessor>) -> Self {
        self.extra.push(processor);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn verifier(mut self, verifier: Arc<dyn TransactionVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    pub fn widget_timeout(mut self, timeout: Duration) -> Self {
        self.widget_timeout = timeout;
        self
    }

    pub fn build(self) -> Harness {
        let store = Arc::new(InMemoryDocumentStore::new());
        let orders = FlakyOrders::new(store.clone());
        let users: Arc<dyn UserRepository> = Arc::new(DocumentUserRepository::new(store.clone()));
        let (event_sender, events) = EventSender::channel(256);
        let event_sender = Arc::new(event_sender);

        let network_timeout = Duration::from_secs(5);
        let mut card = CardPaymentProcessor::new(
            GatewayHandle::ready(self.gateway),
            "pk_test_123",
            CURRENCY,
            self.widget_timeout,
            network_timeout,
        );
        if let Some(verifier) = self.verifier {
            card = card.with_verifier(verifier);
        }

        let mut coordinator = PaymentCoordinator::new(orders.clone(), network_timeout)
            .with_processor(Arc::new(card))
            .with_processor(Arc::new(BankTransferProcessor::new(
                bank_account(),
                network_timeout,
            )))
            .with_processor(Arc::new(UssdProcessor::new(USSD_TEMPLATE, network_timeout)))
            .with_event_sender(event_sender.clone());
        for processor in self.extra {
            coordinator = coordinator.with_processor(processor);
        }
        let payments = Arc::new(coordinator);

        let recording = Arc::new(RecordingNotifier::default());
        let notifier: Arc<dyn Notifier> = self.notifier
            .unwrap_or_else(|| recording.clone() as Arc<dyn Notifier>);

        let checkout = CheckoutService::new(
            orders.clone(),
            payments.clone(),
            notifier,
            event_sender.clone(),
            CURRENCY,
            Duration::from_secs(2),
        );
        let status = OrderStatusService::new(orders.clone(), users.clone(), event_sender.clone());

        Harness {
            store,
            orders,
            users,
            payments,
            notifier: recording,
            checkout,
            status,
            event_sender,
            events,
        }
    }
}

impl Harness {
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder::default()
    }

    pub async fn cart_with(&self, items: &[(&str, Decimal, i32)]) -> CartService {
        let cart = CartService::load(Arc::new(InMemoryCartStorage::new()), self.event_sender.clone()).await;
        for (id, price, quantity) in items {
            cart.add_item(product(id, *price), *quantity)
                .await
                .expect("in-memory cart write");
        }
        cart
    }

    pub async fn stored_order(&self, id: Uuid) -> Order {
        self.orders
            .get(id)
            .await
            .expect("order read")
            .expect("order exists")
    }

    /// Events emitted so far.
    pub fn drain_events(&mut self) -> Vec<Event> {
        let mut seen = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            seen.push(event);
        }
        seen
    }
}

pub fn default_total() -> Decimal {
    dec!(2500)
}
