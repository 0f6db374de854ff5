use crate::config::ProviderConfig;
use crate::payments::bus::MessageBus;
use crate::payments::error::{ProviderError, ProviderResult};
use crate::payments::interface::PaymentInterface;
use crate::payments::providers::{DummyInterface, PayplugLightbox};
use crate::payments::runtime::{HttpRuntimeLoader, RuntimeLoader};
use crate::payments::types::{ProviderName, SurfaceCommand};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Provider name to interface lookup used by the orchestrator.
#[derive(Clone, Default)]
pub struct PaymentInterfaceRegistry {
    interfaces: HashMap<ProviderName, Arc<dyn PaymentInterface>>,
}

impl PaymentInterfaceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the interfaces enabled in `config`. Surface commands of the
    /// Payplug lightbox are forwarded to `surface`.
    pub fn from_config(
        config: &ProviderConfig,
        bus: MessageBus,
        surface: mpsc::UnboundedSender<SurfaceCommand>,
    ) -> ProviderResult<Self> {
        let mut registry = Self::new();
        for provider in &config.enabled_providers {
            match provider {
                ProviderName::Payplug => {
                    let loader: Arc<dyn RuntimeLoader> = Arc::new(HttpRuntimeLoader::new(
                        config.payplug_script_url.clone(),
                        Duration::from_secs(config.script_timeout_secs),
                        surface.clone(),
                    )?);
                    registry =
                        registry.register(Arc::new(PayplugLightbox::new(loader, bus.clone())));
                }
                ProviderName::Dummy => {
                    registry = registry.register(Arc::new(DummyInterface::new()));
                }
            }
        }
        Ok(registry)
    }

    pub fn register(mut self, interface: Arc<dyn PaymentInterface>) -> Self {
        self.interfaces.insert(interface.provider(), interface);
        self
    }

    pub fn get_interface(
        &self,
        provider: ProviderName,
    ) -> ProviderResult<Arc<dyn PaymentInterface>> {
        self.interfaces
            .get(&provider)
            .cloned()
            .ok_or_else(|| ProviderError::ProviderDisabled(provider.to_string()))
    }

    pub fn list_available_providers(&self) -> Vec<ProviderName> {
        let mut providers: Vec<ProviderName> = self.interfaces.keys().copied().collect();
        providers.sort_by_key(|p| p.as_str());
        providers
    }
}
