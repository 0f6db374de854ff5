use crate::payments::interface::{InterfaceMount, PaymentInterface, SIGNAL_BUFFER};
use crate::payments::types::{InteractivePayment, ProviderName, ProviderSignal};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::info;

/// Development provider: the remote side settles the payment by itself, so
/// the surface reports success as soon as it is mounted.
#[derive(Debug, Clone, Default)]
pub struct DummyInterface {
    delay: Duration,
}

impl DummyInterface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self { delay }
    }
}

impl PaymentInterface for DummyInterface {
    fn provider(&self) -> ProviderName {
        ProviderName::Dummy
    }

    fn mount(
        &self,
        payment: &InteractivePayment,
    ) -> (InterfaceMount, mpsc::Receiver<ProviderSignal>) {
        let (signals, rx) = mpsc::channel(SIGNAL_BUFFER);
        let delay = self.delay;
        let order_id = payment.order_id;

        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            info!(order_id = %order_id, "dummy payment settled");
            let _ = signals.send(ProviderSignal::Success).await;
        });

        (InterfaceMount::new(ProviderName::Dummy, task), rx)
    }
}
