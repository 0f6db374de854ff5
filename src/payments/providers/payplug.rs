//! Payplug lightbox integration.
//!
//! Loads the Payplug runtime once per process, opens the lightbox on the
//! payment url and listens to the messages the lightbox posts back.
//! <https://docs.payplug.com/api/lightbox.html#lightbox>

use crate::error::PaymentErrorReason;
use crate::logging::mask_payment_id;
use crate::payments::bus::{MessageBus, Subscription};
use crate::payments::error::ProviderError;
use crate::payments::interface::{InterfaceMount, PaymentInterface, SIGNAL_BUFFER};
use crate::payments::runtime::{RuntimeLoader, RuntimeSlot};
use crate::payments::types::{InteractivePayment, ProviderName, ProviderSignal};
use serde_json::Value as JsonValue;
use std::sync::{Arc, Mutex, OnceLock};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub const CLOSE_FRAME_MESSAGE: &str = "closePayPlugFrame";
pub const PAID_EVENT: &str = "paidByPayPlug";

static PAYPLUG_RUNTIME: OnceLock<Arc<RuntimeSlot>> = OnceLock::new();

/// Process-wide Payplug runtime handle.
pub fn payplug_runtime_slot() -> Arc<RuntimeSlot> {
    PAYPLUG_RUNTIME
        .get_or_init(|| Arc::new(RuntimeSlot::new()))
        .clone()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightboxMessage {
    /// The user closed the lightbox.
    Closed,
    /// The payment went through.
    Paid,
    /// Well-formed message we have no use for.
    Ignored,
    Unrecognized,
}

pub fn classify_message(message: &JsonValue) -> LightboxMessage {
    match message {
        JsonValue::String(tag) if tag == CLOSE_FRAME_MESSAGE => LightboxMessage::Closed,
        JsonValue::String(_) => LightboxMessage::Ignored,
        JsonValue::Object(fields) => match fields.get("event") {
            Some(JsonValue::String(event)) if event == PAID_EVENT => LightboxMessage::Paid,
            Some(_) => LightboxMessage::Ignored,
            None => LightboxMessage::Unrecognized,
        },
        _ => LightboxMessage::Unrecognized,
    }
}

#[derive(Default)]
struct ListenerSlot {
    closed: bool,
    subscription: Option<Subscription>,
}

pub struct PayplugLightbox {
    slot: Arc<RuntimeSlot>,
    loader: Arc<dyn RuntimeLoader>,
    bus: MessageBus,
}

impl PayplugLightbox {
    /// Lightbox sharing the process-wide runtime.
    pub fn new(loader: Arc<dyn RuntimeLoader>, bus: MessageBus) -> Self {
        Self::with_slot(payplug_runtime_slot(), loader, bus)
    }

    pub fn with_slot(
        slot: Arc<RuntimeSlot>,
        loader: Arc<dyn RuntimeLoader>,
        bus: MessageBus,
    ) -> Self {
        Self { slot, loader, bus }
    }
}

impl PaymentInterface for PayplugLightbox {
    fn provider(&self) -> ProviderName {
        ProviderName::Payplug
    }

    fn mount(
        &self,
        payment: &InteractivePayment,
    ) -> (InterfaceMount, mpsc::Receiver<ProviderSignal>) {
        let (signals, rx) = mpsc::channel(SIGNAL_BUFFER);
        let listener = Arc::new(Mutex::new(ListenerSlot::default()));

        let task = tokio::spawn(run_lightbox(
            self.slot.clone(),
            self.loader.clone(),
            self.bus.clone(),
            payment.clone(),
            listener.clone(),
            signals,
        ));

        let mount = InterfaceMount::new(ProviderName::Payplug, task).with_teardown(move || {
            if let Ok(mut slot) = listener.lock() {
                slot.closed = true;
                slot.subscription.take();
            }
        });
        (mount, rx)
    }
}

async fn run_lightbox(
    slot: Arc<RuntimeSlot>,
    loader: Arc<dyn RuntimeLoader>,
    bus: MessageBus,
    payment: InteractivePayment,
    listener: Arc<Mutex<ListenerSlot>>,
    signals: mpsc::Sender<ProviderSignal>,
) {
    let payment_ref = mask_payment_id(&payment.payment_id);

    let runtime = match slot.get_or_load(loader.as_ref()).await {
        Ok(runtime) => runtime,
        Err(e) => {
            warn!(
                payment_id = %payment_ref,
                retryable = e.is_retryable(),
                error = %e,
                "payplug runtime unavailable"
            );
            let _ = signals
                .send(ProviderSignal::Error(PaymentErrorReason::Default))
                .await;
            return;
        }
    };

    let mut messages = {
        let Ok(mut guard) = listener.lock() else {
            return;
        };
        if guard.closed {
            return;
        }
        runtime.show_payment(&payment.url);
        let (subscription, rx) = bus.subscribe();
        guard.subscription = Some(subscription);
        rx
    };
    info!(payment_id = %payment_ref, "payplug lightbox opened");

    while let Some(message) = messages.recv().await {
        let signal = match classify_message(&message) {
            LightboxMessage::Closed => {
                info!(payment_id = %payment_ref, "payplug lightbox closed by user");
                ProviderSignal::Error(PaymentErrorReason::Abort)
            }
            LightboxMessage::Paid => {
                info!(payment_id = %payment_ref, "payplug reported payment");
                runtime.close_frame();
                ProviderSignal::Success
            }
            LightboxMessage::Ignored => {
                debug!(message = %message, "payplug message ignored");
                continue;
            }
            LightboxMessage::Unrecognized => {
                let error = ProviderError::UnrecognizedMessage(message.to_string());
                warn!(payment_id = %payment_ref, error = %error, "payplug message dropped");
                continue;
            }
        };

        if signals.send(signal).await.is_err() {
            break;
        }
    }
}
