#![allow(dead_code)]

use async_trait::async_trait;
use course_checkout::config::PollerConfig;
use course_checkout::orders::{
    BillingAddress, Order, OrderCreateInput, OrderError, OrderGateway, OrderResult, OrderState,
    PaymentInfo,
};
use course_checkout::payments::interface::SIGNAL_BUFFER;
use course_checkout::payments::runtime::{LightboxRuntime, RuntimeLoader, SurfaceRuntime};
use course_checkout::payments::{
    InteractivePayment, InterfaceMount, MessageBus, PaymentInterface, PaymentInterfaceRegistry,
    ProviderError, ProviderName, ProviderResult, ProviderSignal, SurfaceCommand,
};
use course_checkout::services::{PaymentOrchestrator, PaymentState, PaymentView};
use course_checkout::session::SessionStore;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

pub const PAYMENT_URL: &str = "https://secure.payplug.com/pay/5iHMDxy4ABR4YBVW4UscIn";
pub const PAYMENT_ID: &str = "pay_5iHMDxy4ABR4YBVW4UscIn";

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

pub fn ready_input() -> OrderCreateInput {
    OrderCreateInput {
        course: "00001".to_string(),
        product: Uuid::new_v4(),
        billing_address: Some(BillingAddress {
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            address: "1 rue de Rivoli".to_string(),
            postcode: "75001".to_string(),
            city: "Paris".to_string(),
            country: "FR".to_string(),
        }),
        credit_card_id: None,
    }
}

pub fn order_with(payment_info: Option<PaymentInfo>) -> Order {
    Order {
        id: Uuid::new_v4(),
        state: OrderState::Pending,
        course: Some("00001".to_string()),
        product: Some(Uuid::new_v4()),
        main_invoice: None,
        payment_info,
        created_on: None,
    }
}

pub fn one_click_order() -> Order {
    order_with(Some(PaymentInfo {
        payment_id: PAYMENT_ID.to_string(),
        provider: Some(ProviderName::Payplug),
        url: None,
        is_paid: Some(true),
    }))
}

pub fn interactive_order(provider: ProviderName) -> Order {
    order_with(Some(PaymentInfo {
        payment_id: PAYMENT_ID.to_string(),
        provider: Some(provider),
        url: Some(PAYMENT_URL.to_string()),
        is_paid: Some(false),
    }))
}

// ---------------------------------------------------------------------------
// Gateway
// ---------------------------------------------------------------------------

/// Order API double: scripted creations, validation after a number of gets,
/// recorded aborts.
pub struct FakeGateway {
    create_results: Mutex<VecDeque<OrderResult<Order>>>,
    create_delay: Duration,
    validated_after: Option<u32>,
    creates: AtomicU32,
    gets: AtomicU32,
    aborts: Mutex<Vec<(Uuid, String)>>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self {
            create_results: Mutex::new(VecDeque::new()),
            create_delay: Duration::ZERO,
            validated_after: None,
            creates: AtomicU32::new(0),
            gets: AtomicU32::new(0),
            aborts: Mutex::new(Vec::new()),
        }
    }

    pub fn with_create(self, result: OrderResult<Order>) -> Self {
        self.create_results.lock().unwrap().push_back(result);
        self
    }

    pub fn with_create_delay(mut self, delay: Duration) -> Self {
        self.create_delay = delay;
        self
    }

    pub fn validated_after(mut self, gets: u32) -> Self {
        self.validated_after = Some(gets);
        self
    }

    pub fn creates(&self) -> u32 {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn gets(&self) -> u32 {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn aborts(&self) -> Vec<(Uuid, String)> {
        self.aborts.lock().unwrap().clone()
    }
}

#[async_trait]
impl OrderGateway for FakeGateway {
    async fn create(&self, _input: OrderCreateInput) -> OrderResult<Order> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        if !self.create_delay.is_zero() {
            tokio::time::sleep(self.create_delay).await;
        }
        self.create_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Err(OrderError::NetworkError {
                    message: "no scripted order".to_string(),
                })
            })
    }

    async fn get(&self, id: Uuid) -> OrderResult<Order> {
        let n = self.gets.fetch_add(1, Ordering::SeqCst) + 1;
        let mut order = order_with(None);
        order.id = id;
        if self.validated_after.map_or(false, |after| n >= after) {
            order.state = OrderState::Validated;
        }
        Ok(order)
    }

    async fn abort(&self, id: Uuid, payment_id: &str) -> OrderResult<()> {
        self.aborts.lock().unwrap().push((id, payment_id.to_string()));
        Ok(())
    }

    async fn list(&self) -> OrderResult<Vec<Order>> {
        Ok(Vec::new())
    }
}

pub struct CountingSession(AtomicU32);

impl CountingSession {
    pub fn new() -> Self {
        Self(AtomicU32::new(0))
    }

    pub fn invalidations(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }
}

impl SessionStore for CountingSession {
    fn invalidate(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Provider doubles
// ---------------------------------------------------------------------------

/// Interface whose signals are emitted by the test.
pub struct ScriptedInterface {
    provider: ProviderName,
    mounts: Mutex<Vec<String>>,
    signals: Mutex<Option<mpsc::Sender<ProviderSignal>>>,
    teardowns: Arc<AtomicU32>,
}

impl ScriptedInterface {
    pub fn new(provider: ProviderName) -> Arc<Self> {
        Arc::new(Self {
            provider,
            mounts: Mutex::new(Vec::new()),
            signals: Mutex::new(None),
            teardowns: Arc::new(AtomicU32::new(0)),
        })
    }

    pub fn mounted_urls(&self) -> Vec<String> {
        self.mounts.lock().unwrap().clone()
    }

    pub fn teardowns(&self) -> u32 {
        self.teardowns.load(Ordering::SeqCst)
    }

    /// Returns false once the surface has been unmounted.
    pub async fn emit(&self, signal: ProviderSignal) -> bool {
        let sender = self.signals.lock().unwrap().clone();
        match sender {
            Some(sender) => sender.send(signal).await.is_ok(),
            None => false,
        }
    }
}

impl PaymentInterface for ScriptedInterface {
    fn provider(&self) -> ProviderName {
        self.provider
    }

    fn mount(
        &self,
        payment: &InteractivePayment,
    ) -> (InterfaceMount, mpsc::Receiver<ProviderSignal>) {
        let (tx, rx) = mpsc::channel(SIGNAL_BUFFER);
        self.mounts.lock().unwrap().push(payment.url.clone());
        *self.signals.lock().unwrap() = Some(tx);

        let teardowns = self.teardowns.clone();
        let task = tokio::spawn(std::future::pending::<()>());
        let mount = InterfaceMount::new(self.provider, task).with_teardown(move || {
            teardowns.fetch_add(1, Ordering::SeqCst);
        });
        (mount, rx)
    }
}

/// Runtime loader that never touches the network.
pub struct StaticLoader {
    surface: mpsc::UnboundedSender<SurfaceCommand>,
    loads: AtomicU32,
    fail: bool,
}

impl StaticLoader {
    pub fn new(surface: mpsc::UnboundedSender<SurfaceCommand>) -> Arc<Self> {
        Arc::new(Self {
            surface,
            loads: AtomicU32::new(0),
            fail: false,
        })
    }

    pub fn failing(surface: mpsc::UnboundedSender<SurfaceCommand>) -> Arc<Self> {
        Arc::new(Self {
            surface,
            loads: AtomicU32::new(0),
            fail: true,
        })
    }

    pub fn loads(&self) -> u32 {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RuntimeLoader for StaticLoader {
    async fn load(&self) -> ProviderResult<Arc<dyn LightboxRuntime>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        if self.fail {
            return Err(ProviderError::RuntimeLoad {
                message: "script blocked".to_string(),
            });
        }
        Ok(Arc::new(SurfaceRuntime::new(self.surface.clone())))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub fn orchestrator(
    gateway: Arc<dyn OrderGateway>,
    registry: PaymentInterfaceRegistry,
    successes: Arc<AtomicU32>,
) -> PaymentOrchestrator {
    PaymentOrchestrator::new(
        gateway,
        registry,
        PollerConfig::default(),
        Arc::new(move || {
            successes.fetch_add(1, Ordering::SeqCst);
        }),
    )
}

pub async fn wait_for_state(views: &mut watch::Receiver<PaymentView>, state: PaymentState) {
    tokio::time::timeout(Duration::from_secs(300), views.wait_for(|v| v.state == state))
        .await
        .unwrap_or_else(|_| panic!("state {} never reached", state))
        .expect("orchestrator dropped");
}

pub async fn wait_for_listener(bus: &MessageBus) {
    for _ in 0..100 {
        if bus.listener_count() > 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("nothing subscribed to the message bus");
}
