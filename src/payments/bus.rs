//! Cross-context message channel between provider surfaces and the core.
//!
//! Whatever hosts a provider surface (a browser bridge, a webview, the CLI's
//! stdin reader) posts the raw messages it receives here. Provider
//! interfaces subscribe while mounted and normalize what they understand.

use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::mpsc;
use tracing::trace;

type Listeners = Mutex<HashMap<u64, mpsc::UnboundedSender<JsonValue>>>;

#[derive(Default)]
struct BusInner {
    next_id: AtomicU64,
    listeners: Listeners,
}

#[derive(Clone, Default)]
pub struct MessageBus {
    inner: Arc<BusInner>,
}

impl MessageBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener. It stays registered until the guard is dropped.
    pub fn subscribe(&self) -> (Subscription, mpsc::UnboundedReceiver<JsonValue>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut listeners) = self.inner.listeners.lock() {
            listeners.insert(id, tx);
        }
        let subscription = Subscription {
            id,
            bus: Arc::downgrade(&self.inner),
        };
        (subscription, rx)
    }

    /// Delivers a message to every live listener, returning how many got it.
    pub fn post(&self, message: JsonValue) -> usize {
        let Ok(mut listeners) = self.inner.listeners.lock() else {
            return 0;
        };
        listeners.retain(|_, tx| tx.send(message.clone()).is_ok());
        trace!(listeners = listeners.len(), "message posted");
        listeners.len()
    }

    pub fn listener_count(&self) -> usize {
        self.inner
            .listeners
            .lock()
            .map(|listeners| listeners.len())
            .unwrap_or(0)
    }
}

/// Removes its listener from the bus when dropped.
pub struct Subscription {
    id: u64,
    bus: Weak<BusInner>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            if let Ok(mut listeners) = bus.listeners.lock() {
                listeners.remove(&self.id);
            }
        }
    }
}
