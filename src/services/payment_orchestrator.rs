//! Checkout payment orchestration
//!
//! Drives one payment attempt at a time: create the order, hand interactive
//! payments to the provider interface, then poll the order API until the
//! order is validated. Transitions run under a short critical section; work
//! spawned for an attempt reports back with the generation it was started
//! for, and reports from older generations are dropped.

use crate::config::PollerConfig;
use crate::error::{PaymentErrorReason, ABORTING_MESSAGE};
use crate::logging::mask_payment_id;
use crate::orders::error::OrderResult;
use crate::orders::gateway::OrderGateway;
use crate::orders::types::{Order, OrderCreateInput, Payment};
use crate::payments::factory::PaymentInterfaceRegistry;
use crate::payments::interface::InterfaceMount;
use crate::payments::types::ProviderSignal;
use crate::workers::validation_poller::{PollHandle, PollOutcome, ValidationPoller};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

// ============================================================================
// State
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentState {
    /// Nothing in flight; the trigger is enabled
    Idle,
    /// Order creation request in flight
    Submitting,
    /// Provider surface mounted, waiting for the user
    AwaitingProviderInteraction,
    /// Waiting for the order API to validate the order
    AwaitingConfirmation,
    /// Success reported; resets to idle
    Succeeded,
    /// Abort request in flight
    Aborting,
    Error(PaymentErrorReason),
}

impl std::fmt::Display for PaymentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentState::Idle => write!(f, "idle"),
            PaymentState::Submitting => write!(f, "submitting"),
            PaymentState::AwaitingProviderInteraction => {
                write!(f, "awaiting_provider_interaction")
            }
            PaymentState::AwaitingConfirmation => write!(f, "awaiting_confirmation"),
            PaymentState::Succeeded => write!(f, "succeeded"),
            PaymentState::Aborting => write!(f, "aborting"),
            PaymentState::Error(reason) => write!(f, "error({})", reason),
        }
    }
}

impl PaymentState {
    /// The checkout trigger is enabled in exactly these states.
    pub fn accepts_submit(&self) -> bool {
        matches!(self, PaymentState::Idle | PaymentState::Error(_))
    }

    pub fn accepts_cancel(&self) -> bool {
        matches!(
            self,
            PaymentState::AwaitingProviderInteraction | PaymentState::AwaitingConfirmation
        )
    }

    /// Check whether `next` may follow this state
    pub fn can_transition_to(&self, next: PaymentState) -> bool {
        use PaymentState::*;
        match (self, next) {
            (Idle, Submitting) | (Error(_), Submitting) => true,
            (Submitting, AwaitingProviderInteraction)
            | (Submitting, AwaitingConfirmation)
            | (Submitting, Error(_)) => true,
            (AwaitingProviderInteraction, AwaitingConfirmation)
            | (AwaitingProviderInteraction, Aborting)
            | (AwaitingProviderInteraction, Error(_)) => true,
            (AwaitingConfirmation, Succeeded) | (AwaitingConfirmation, Aborting) => true,
            (Succeeded, Idle) => true,
            (Aborting, Error(PaymentErrorReason::Abort)) => true,
            _ => false,
        }
    }
}

/// Snapshot published on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaymentView {
    pub state: PaymentState,
    pub error: Option<PaymentErrorReason>,
}

impl PaymentView {
    pub fn of(state: PaymentState) -> Self {
        let error = match state {
            PaymentState::Error(reason) => Some(reason),
            _ => None,
        };
        Self { state, error }
    }

    pub fn trigger_enabled(&self) -> bool {
        self.state.accepts_submit()
    }

    pub fn error_message(&self) -> Option<&'static str> {
        match self.state {
            PaymentState::Error(reason) => Some(reason.default_message()),
            _ => None,
        }
    }

    pub fn status_message(&self) -> Option<&'static str> {
        match self.state {
            PaymentState::Aborting => Some(ABORTING_MESSAGE),
            _ => None,
        }
    }
}

impl Default for PaymentView {
    fn default() -> Self {
        Self::of(PaymentState::Idle)
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrchestratorError {
    #[error("a payment attempt is already in progress ({state})")]
    AttemptInFlight { state: PaymentState },

    #[error("order is not ready to be paid: {reason}")]
    NotReady { reason: String },

    #[error("nothing to cancel while {state}")]
    NothingToCancel { state: PaymentState },

    #[error("payment orchestrator has been torn down")]
    TornDown,

    #[error("internal error: {0}")]
    Internal(String),
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

// ============================================================================
// Orchestrator
// ============================================================================

pub type SuccessCallback = Arc<dyn Fn() + Send + Sync>;

/// Mounted provider surface and the task relaying its signals.
struct ActiveInterface {
    mount: InterfaceMount,
    listener: JoinHandle<()>,
}

impl Drop for ActiveInterface {
    fn drop(&mut self) {
        self.listener.abort();
        debug!(provider = %self.mount.provider(), "payment interface unmounted");
    }
}

struct Attempt {
    generation: u64,
    state: PaymentState,
    payment: Option<Payment>,
    poll: Option<PollHandle>,
    interface: Option<ActiveInterface>,
    abort_issued: bool,
    torn_down: bool,
}

struct Shared {
    gateway: Arc<dyn OrderGateway>,
    registry: PaymentInterfaceRegistry,
    poller: PollerConfig,
    on_success: SuccessCallback,
    view: watch::Sender<PaymentView>,
    attempt: Mutex<Attempt>,
}

pub struct PaymentOrchestrator {
    shared: Arc<Shared>,
}

impl PaymentOrchestrator {
    pub fn new(
        gateway: Arc<dyn OrderGateway>,
        registry: PaymentInterfaceRegistry,
        poller: PollerConfig,
        on_success: SuccessCallback,
    ) -> Self {
        let (view, _) = watch::channel(PaymentView::default());
        Self {
            shared: Arc::new(Shared {
                gateway,
                registry,
                poller,
                on_success,
                view,
                attempt: Mutex::new(Attempt {
                    generation: 0,
                    state: PaymentState::Idle,
                    payment: None,
                    poll: None,
                    interface: None,
                    abort_issued: false,
                    torn_down: false,
                }),
            }),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<PaymentView> {
        self.shared.view.subscribe()
    }

    pub fn view(&self) -> PaymentView {
        *self.shared.view.borrow()
    }

    pub fn state(&self) -> PaymentState {
        self.view().state
    }

    /// Start a payment attempt for `input`.
    ///
    /// Returns once the order creation has been handled, with the state the
    /// attempt moved to. Rejected without side effects unless the trigger is
    /// enabled and the input is complete.
    pub async fn submit(&self, input: OrderCreateInput) -> OrchestratorResult<PaymentState> {
        let generation = self.shared.begin_attempt(&input)?;

        let shared = self.shared.clone();
        let creation = tokio::spawn(async move {
            let result = shared.gateway.create(input).await;
            shared.on_created(generation, result);
        });
        creation
            .await
            .map_err(|e| OrchestratorError::Internal(e.to_string()))?;

        Ok(self.state())
    }

    /// User-initiated cancellation of the attempt in flight.
    pub fn cancel(&self) -> OrchestratorResult<()> {
        self.shared.cancel()
    }

    /// Stops the poll, unmounts the interface and aborts the payment in
    /// flight, if any. Nothing is reported afterwards.
    pub fn teardown(&self) {
        self.shared.teardown();
    }
}

impl Drop for PaymentOrchestrator {
    fn drop(&mut self) {
        self.shared.teardown();
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Attempt> {
        self.attempt.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transition(&self, attempt: &mut Attempt, next: PaymentState) {
        let prev = attempt.state;
        debug_assert!(
            prev.can_transition_to(next),
            "invalid payment transition {} -> {}",
            prev,
            next
        );
        attempt.state = next;
        info!(
            generation = attempt.generation,
            from = %prev,
            to = %next,
            "payment state changed"
        );
        self.view.send_replace(PaymentView::of(next));
    }

    fn begin_attempt(&self, input: &OrderCreateInput) -> OrchestratorResult<u64> {
        let mut attempt = self.lock();
        if attempt.torn_down {
            return Err(OrchestratorError::TornDown);
        }
        if !attempt.state.accepts_submit() {
            return Err(OrchestratorError::AttemptInFlight {
                state: attempt.state,
            });
        }
        input
            .validate()
            .map_err(|reason| OrchestratorError::NotReady { reason })?;

        attempt.generation += 1;
        attempt.payment = None;
        attempt.abort_issued = false;
        self.transition(&mut attempt, PaymentState::Submitting);
        Ok(attempt.generation)
    }

    fn on_created(self: &Arc<Self>, generation: u64, result: OrderResult<Order>) {
        let mut attempt = self.lock();

        if attempt.torn_down || attempt.generation != generation {
            if let Ok(order) = &result {
                if let Some(payment_id) = created_payment_id(order) {
                    info!(order_id = %order.id, "order created for a stale attempt");
                    self.spawn_abort(order.id, payment_id, None);
                }
            }
            return;
        }

        let order = match result {
            Ok(order) => order,
            Err(e) => {
                warn!(generation, error = %e, "order creation failed");
                self.transition(&mut attempt, PaymentState::Error(PaymentErrorReason::Default));
                return;
            }
        };

        let Some(payment) = Payment::from_order(&order) else {
            warn!(order_id = %order.id, "created order carries no usable payment");
            if let Some(payment_id) = created_payment_id(&order) {
                attempt.abort_issued = true;
                self.spawn_abort(order.id, payment_id, None);
            }
            self.transition(&mut attempt, PaymentState::Error(PaymentErrorReason::Default));
            return;
        };

        info!(
            order_id = %order.id,
            payment_id = %mask_payment_id(&payment.payment_id),
            one_click = payment.is_one_click(),
            "order created"
        );
        attempt.payment = Some(payment.clone());

        let Some(interactive) = payment.interactive() else {
            self.start_confirmation(&mut attempt, payment.order_id);
            return;
        };

        match self.registry.get_interface(interactive.provider) {
            Ok(interface) => {
                let (mount, signals) = interface.mount(&interactive);
                let listener = self.spawn_listener(generation, signals);
                attempt.interface = Some(ActiveInterface { mount, listener });
                self.transition(&mut attempt, PaymentState::AwaitingProviderInteraction);
            }
            Err(e) => {
                warn!(order_id = %order.id, error = %e, "no payment interface for provider");
                self.issue_abort(&mut attempt, false);
                self.transition(&mut attempt, PaymentState::Error(PaymentErrorReason::Default));
            }
        }
    }

    fn spawn_listener(
        self: &Arc<Self>,
        generation: u64,
        mut signals: mpsc::Receiver<ProviderSignal>,
    ) -> JoinHandle<()> {
        let shared = Arc::downgrade(self);
        tokio::spawn(async move {
            while let Some(signal) = signals.recv().await {
                let Some(shared) = shared.upgrade() else {
                    break;
                };
                shared.on_provider_signal(generation, signal);
            }
        })
    }

    fn on_provider_signal(self: &Arc<Self>, generation: u64, signal: ProviderSignal) {
        let mut attempt = self.lock();
        if attempt.generation != generation
            || attempt.state != PaymentState::AwaitingProviderInteraction
        {
            debug!(generation, ?signal, "stale provider signal dropped");
            return;
        }

        attempt.interface.take();
        match signal {
            ProviderSignal::Success => {
                let Some(order_id) = attempt.payment.as_ref().map(|p| p.order_id) else {
                    return;
                };
                info!(order_id = %order_id, "provider reported payment");
                self.start_confirmation(&mut attempt, order_id);
            }
            ProviderSignal::Error(reason) => {
                info!(generation, %reason, "provider reported an error");
                if reason == PaymentErrorReason::Abort {
                    self.issue_abort(&mut attempt, false);
                }
                self.transition(&mut attempt, PaymentState::Error(reason));
            }
        }
    }

    fn start_confirmation(self: &Arc<Self>, attempt: &mut Attempt, order_id: Uuid) {
        let generation = attempt.generation;
        let shared: Weak<Self> = Arc::downgrade(self);
        let poller = ValidationPoller::new(self.gateway.clone(), order_id, self.poller.clone());

        attempt.poll.take();
        attempt.poll = Some(poller.spawn(move |outcome| {
            if let Some(shared) = shared.upgrade() {
                shared.on_poll_outcome(generation, outcome);
            }
        }));
        self.transition(attempt, PaymentState::AwaitingConfirmation);
    }

    fn on_poll_outcome(self: &Arc<Self>, generation: u64, outcome: PollOutcome) {
        let mut attempt = self.lock();
        if attempt.generation != generation || attempt.state != PaymentState::AwaitingConfirmation
        {
            debug!(generation, "stale poll outcome dropped");
            return;
        }
        attempt.poll.take();

        match outcome {
            PollOutcome::Validated(order) => {
                info!(order_id = %order.id, "payment confirmed");
                attempt.payment = None;
                self.transition(&mut attempt, PaymentState::Succeeded);
                drop(attempt);

                (self.on_success)();

                let mut attempt = self.lock();
                if attempt.generation == generation && attempt.state == PaymentState::Succeeded {
                    self.transition(&mut attempt, PaymentState::Idle);
                }
            }
            PollOutcome::TimedOut {
                ticks,
                failed_ticks,
            } => {
                warn!(generation, ticks, failed_ticks, "payment confirmation timed out");
                self.begin_aborting(&mut attempt);
            }
        }
    }

    fn begin_aborting(self: &Arc<Self>, attempt: &mut Attempt) {
        attempt.poll.take();
        attempt.interface.take();
        self.transition(attempt, PaymentState::Aborting);

        if !self.issue_abort(attempt, true) {
            self.transition(attempt, PaymentState::Error(PaymentErrorReason::Abort));
        }
    }

    fn on_abort_settled(&self, generation: u64) {
        let mut attempt = self.lock();
        if attempt.generation == generation && attempt.state == PaymentState::Aborting {
            self.transition(&mut attempt, PaymentState::Error(PaymentErrorReason::Abort));
        }
    }

    /// Aborts the attempt's payment at most once. Returns whether an abort
    /// was spawned that will report back through `on_abort_settled`.
    fn issue_abort(self: &Arc<Self>, attempt: &mut Attempt, report: bool) -> bool {
        if attempt.abort_issued {
            return false;
        }
        let Some(payment) = attempt.payment.as_ref() else {
            return false;
        };
        attempt.abort_issued = true;

        let report_to = report.then_some(attempt.generation);
        self.spawn_abort(payment.order_id, payment.payment_id.clone(), report_to) && report
    }

    fn spawn_abort(
        self: &Arc<Self>,
        order_id: Uuid,
        payment_id: String,
        report_to: Option<u64>,
    ) -> bool {
        let masked = mask_payment_id(&payment_id);
        let Ok(runtime) = Handle::try_current() else {
            warn!(order_id = %order_id, payment_id = %masked, "no runtime, payment abort skipped");
            return false;
        };

        let gateway = self.gateway.clone();
        let shared = Arc::downgrade(self);
        runtime.spawn(async move {
            match gateway.abort(order_id, &payment_id).await {
                Ok(()) => info!(order_id = %order_id, payment_id = %masked, "payment aborted"),
                Err(e) => warn!(
                    order_id = %order_id,
                    payment_id = %masked,
                    error = %e,
                    "payment abort failed"
                ),
            }
            if let (Some(generation), Some(shared)) = (report_to, shared.upgrade()) {
                shared.on_abort_settled(generation);
            }
        });
        true
    }

    fn cancel(self: &Arc<Self>) -> OrchestratorResult<()> {
        let mut attempt = self.lock();
        if attempt.torn_down {
            return Err(OrchestratorError::TornDown);
        }
        if !attempt.state.accepts_cancel() {
            return Err(OrchestratorError::NothingToCancel {
                state: attempt.state,
            });
        }

        info!(generation = attempt.generation, "payment cancelled by user");
        self.begin_aborting(&mut attempt);
        Ok(())
    }

    fn teardown(self: &Arc<Self>) {
        let mut attempt = self.lock();
        if attempt.torn_down {
            return;
        }
        attempt.torn_down = true;
        attempt.generation += 1;
        attempt.poll.take();
        attempt.interface.take();

        match attempt.state {
            PaymentState::AwaitingProviderInteraction | PaymentState::AwaitingConfirmation => {
                self.issue_abort(&mut attempt, false);
            }
            PaymentState::Submitting => {
                debug!("torn down while order creation is in flight");
            }
            _ => {}
        }
        info!(state = %attempt.state, "payment orchestrator torn down");
    }
}

fn created_payment_id(order: &Order) -> Option<String> {
    order
        .payment_info
        .as_ref()
        .map(|info| info.payment_id.clone())
        .filter(|id| !id.trim().is_empty())
}
