//! Provider runtime resources.
//!
//! A provider widget needs a runtime (its script, in the browser world) before
//! it can open a surface. The runtime is fetched once per process and shared by
//! every later mount; concurrent mounts wait on the load already in flight.

use crate::payments::error::{ProviderError, ProviderResult};
use crate::payments::types::SurfaceCommand;
use async_trait::async_trait;
use reqwest::Client;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, OnceCell};
use tracing::{debug, info, warn};

/// Handle on a loaded provider runtime.
pub trait LightboxRuntime: Send + Sync {
    fn show_payment(&self, url: &str);
    fn close_frame(&self);
}

#[async_trait]
pub trait RuntimeLoader: Send + Sync {
    async fn load(&self) -> ProviderResult<Arc<dyn LightboxRuntime>>;
}

/// Lazily initialized runtime handle.
///
/// A failed load leaves the slot empty so a later mount can try again.
#[derive(Default)]
pub struct RuntimeSlot {
    cell: OnceCell<Arc<dyn LightboxRuntime>>,
    loads: AtomicUsize,
}

impl RuntimeSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<Arc<dyn LightboxRuntime>> {
        self.cell.get().cloned()
    }

    pub fn is_loaded(&self) -> bool {
        self.cell.initialized()
    }

    pub async fn get_or_load(
        &self,
        loader: &dyn RuntimeLoader,
    ) -> ProviderResult<Arc<dyn LightboxRuntime>> {
        if let Some(runtime) = self.get() {
            return Ok(runtime);
        }

        self.cell
            .get_or_try_init(|| async {
                self.loads.fetch_add(1, Ordering::SeqCst);
                loader.load().await
            })
            .await
            .cloned()
    }

    /// Number of load attempts started, successful or not.
    pub fn load_attempts(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

/// Runtime that forwards surface commands to the embedding UI.
pub struct SurfaceRuntime {
    surface: mpsc::UnboundedSender<SurfaceCommand>,
}

impl SurfaceRuntime {
    pub fn new(surface: mpsc::UnboundedSender<SurfaceCommand>) -> Self {
        Self { surface }
    }
}

impl LightboxRuntime for SurfaceRuntime {
    fn show_payment(&self, url: &str) {
        if self
            .surface
            .send(SurfaceCommand::Open {
                url: url.to_string(),
            })
            .is_err()
        {
            warn!("payment surface is gone, cannot open payment");
        }
    }

    fn close_frame(&self) {
        if self.surface.send(SurfaceCommand::Close).is_err() {
            debug!("payment surface already gone");
        }
    }
}

/// Fetches the provider script before handing out a `SurfaceRuntime`.
pub struct HttpRuntimeLoader {
    client: Client,
    script_url: String,
    surface: mpsc::UnboundedSender<SurfaceCommand>,
}

impl HttpRuntimeLoader {
    pub fn new(
        script_url: impl Into<String>,
        timeout: Duration,
        surface: mpsc::UnboundedSender<SurfaceCommand>,
    ) -> ProviderResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::RuntimeLoad {
                message: format!("failed to initialize HTTP client: {}", e),
            })?;
        Ok(Self {
            client,
            script_url: script_url.into(),
            surface,
        })
    }
}

#[async_trait]
impl RuntimeLoader for HttpRuntimeLoader {
    async fn load(&self) -> ProviderResult<Arc<dyn LightboxRuntime>> {
        let response = self
            .client
            .get(&self.script_url)
            .send()
            .await
            .map_err(|e| ProviderError::RuntimeLoad {
                message: format!("script request failed: {}", e),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::RuntimeLoad {
                message: format!("script answered HTTP {}", status),
            });
        }

        let script = response
            .text()
            .await
            .map_err(|e| ProviderError::RuntimeLoad {
                message: format!("script body unreadable: {}", e),
            })?;
        if script.trim().is_empty() {
            return Err(ProviderError::RuntimeLoad {
                message: "script is empty".to_string(),
            });
        }

        info!(url = %self.script_url, bytes = script.len(), "provider runtime loaded");
        Ok(Arc::new(SurfaceRuntime::new(self.surface.clone())))
    }
}
