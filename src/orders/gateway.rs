use crate::orders::error::OrderResult;
use crate::orders::types::{Order, OrderCreateInput};
use crate::session::SessionStore;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// Remote order API as seen by the checkout core.
#[async_trait]
pub trait OrderGateway: Send + Sync {
    async fn create(&self, input: OrderCreateInput) -> OrderResult<Order>;

    async fn get(&self, id: Uuid) -> OrderResult<Order>;

    /// Must succeed when repeated for an already aborted payment.
    async fn abort(&self, id: Uuid, payment_id: &str) -> OrderResult<()>;

    async fn list(&self) -> OrderResult<Vec<Order>>;
}

/// Invalidates the session whenever the order API rejects our credentials.
pub struct SessionGuardedGateway<G> {
    inner: G,
    session: Arc<dyn SessionStore>,
}

impl<G: OrderGateway> SessionGuardedGateway<G> {
    pub fn new(inner: G, session: Arc<dyn SessionStore>) -> Self {
        Self { inner, session }
    }

    fn observe<T>(&self, operation: &'static str, result: OrderResult<T>) -> OrderResult<T> {
        if let Err(err) = &result {
            if err.is_auth() {
                warn!(
                    operation,
                    status = err.http_status_code(),
                    error = %err,
                    "order API rejected session"
                );
                self.session.invalidate();
            }
        }
        result
    }
}

#[async_trait]
impl<G: OrderGateway> OrderGateway for SessionGuardedGateway<G> {
    async fn create(&self, input: OrderCreateInput) -> OrderResult<Order> {
        let result = self.inner.create(input).await;
        self.observe("create", result)
    }

    async fn get(&self, id: Uuid) -> OrderResult<Order> {
        let result = self.inner.get(id).await;
        self.observe("get", result)
    }

    async fn abort(&self, id: Uuid, payment_id: &str) -> OrderResult<()> {
        let result = self.inner.abort(id, payment_id).await;
        self.observe("abort", result)
    }

    async fn list(&self) -> OrderResult<Vec<Order>> {
        let result = self.inner.list().await;
        self.observe("list", result)
    }
}
