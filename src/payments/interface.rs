use crate::payments::types::{InteractivePayment, ProviderName, ProviderSignal};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Capacity of the signal channel; an interface emits at most a handful.
pub const SIGNAL_BUFFER: usize = 4;

/// Embeddable third-party payment surface.
///
/// `mount` opens the surface for an interactive payment and returns the
/// receiving end of its normalized signals together with the mount guard.
/// Dropping the guard tears the surface down: the event subscription is gone
/// when `drop` returns and no further signal is delivered.
pub trait PaymentInterface: Send + Sync {
    fn provider(&self) -> ProviderName;

    fn mount(&self, payment: &InteractivePayment)
        -> (InterfaceMount, mpsc::Receiver<ProviderSignal>);
}

type TeardownHook = Box<dyn FnOnce() + Send>;

/// Guard for a mounted payment interface.
pub struct InterfaceMount {
    provider: ProviderName,
    task: Option<JoinHandle<()>>,
    on_teardown: Option<TeardownHook>,
}

impl InterfaceMount {
    pub fn new(provider: ProviderName, task: JoinHandle<()>) -> Self {
        Self {
            provider,
            task: Some(task),
            on_teardown: None,
        }
    }

    pub fn with_teardown(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.on_teardown = Some(Box::new(hook));
        self
    }

    pub fn provider(&self) -> ProviderName {
        self.provider
    }
}

impl Drop for InterfaceMount {
    fn drop(&mut self) {
        if let Some(hook) = self.on_teardown.take() {
            hook();
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
