use crate::config::OrderApiConfig;
use crate::orders::error::{OrderError, OrderResult};
use crate::orders::gateway::OrderGateway;
use crate::orders::types::{AbortRequest, Order, OrderCreateInput, OrderPage};
use crate::session::SessionStore;
use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

const BASE_BACKOFF_MS: u64 = 200;

/// `OrderGateway` backed by the order REST API.
#[derive(Clone)]
pub struct HttpOrderGateway {
    client: Client,
    base_url: String,
    token: Option<String>,
    session: Option<Arc<dyn SessionStore>>,
    max_retries: u32,
}

impl HttpOrderGateway {
    pub fn new(config: &OrderApiConfig) -> OrderResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| OrderError::NetworkError {
                message: format!("failed to initialize HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            session: None,
            max_retries: config.max_retries,
        })
    }

    /// Reads the bearer token from `session` on every request instead of
    /// the configured one, so an invalidated session stops authenticating.
    pub fn with_session(mut self, session: Arc<dyn SessionStore>) -> Self {
        self.session = Some(session);
        self
    }

    fn bearer_token(&self) -> Option<String> {
        match &self.session {
            Some(session) => session.access_token(),
            None => self.token.clone(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Sends one request, replaying retryable failures when `idempotent` is
    /// set. Returns the final status and body of any non-5xx answer.
    async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<&JsonValue>,
        idempotent: bool,
    ) -> OrderResult<(u16, String)> {
        let attempts = if idempotent { self.max_retries } else { 0 };
        let mut attempt = 0;

        loop {
            let mut request = self.client.request(method.clone(), url);
            if let Some(token) = self.bearer_token() {
                request = request.bearer_auth(token);
            }
            if let Some(payload) = body {
                request = request.json(payload);
            }

            let failure = match request.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    match resp.text().await {
                        Ok(text) if !status.is_server_error() => {
                            return Ok((status.as_u16(), text));
                        }
                        Ok(text) => classify_status(status.as_u16(), &text, url),
                        Err(e) => OrderError::NetworkError {
                            message: format!("order API response body unreadable: {}", e),
                        },
                    }
                }
                Err(e) => OrderError::NetworkError {
                    message: format!("order API request failed: {}", e),
                },
            };

            if !failure.is_retryable() || attempt >= attempts {
                return Err(failure);
            }
            warn!(
                attempt = attempt + 1,
                url,
                error = %failure,
                "order API call failed, retrying"
            );
            tokio::time::sleep(backoff_delay(attempt)).await;
            attempt += 1;
        }
    }

    async fn request_json<T: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        body: Option<&JsonValue>,
        idempotent: bool,
        resource: &str,
    ) -> OrderResult<T> {
        let (status, text) = self.send(method, url, body, idempotent).await?;
        if !(200..300).contains(&status) {
            return Err(classify_status(status, &text, resource));
        }
        serde_json::from_str::<T>(&text).map_err(|e| OrderError::NetworkError {
            message: format!("invalid order API response: {}", e),
        })
    }
}

#[async_trait]
impl OrderGateway for HttpOrderGateway {
    async fn create(&self, input: OrderCreateInput) -> OrderResult<Order> {
        let payload = serde_json::to_value(&input).map_err(|e| OrderError::ValidationError {
            message: format!("order input cannot be encoded: {}", e),
            field: None,
        })?;

        let order: Order = self
            .request_json(
                Method::POST,
                &self.endpoint("/orders/"),
                Some(&payload),
                false,
                "orders",
            )
            .await?;
        info!(order_id = %order.id, course = %input.course, "order created");
        Ok(order)
    }

    async fn get(&self, id: Uuid) -> OrderResult<Order> {
        self.request_json(
            Method::GET,
            &self.endpoint(&format!("/orders/{}/", id)),
            None,
            true,
            &id.to_string(),
        )
        .await
    }

    async fn abort(&self, id: Uuid, payment_id: &str) -> OrderResult<()> {
        let payload = serde_json::to_value(AbortRequest {
            payment_id: payment_id.to_string(),
        })
        .map_err(|e| OrderError::NetworkError {
            message: format!("abort request cannot be encoded: {}", e),
        })?;

        let (status, text) = self
            .send(
                Method::POST,
                &self.endpoint(&format!("/orders/{}/abort/", id)),
                Some(&payload),
                true,
            )
            .await?;

        match status {
            200..=299 => Ok(()),
            404 | 409 => {
                debug!(order_id = %id, status, "order already aborted");
                Ok(())
            }
            _ => Err(classify_status(status, &text, &id.to_string())),
        }
    }

    async fn list(&self) -> OrderResult<Vec<Order>> {
        let page: OrderPage = self
            .request_json(Method::GET, &self.endpoint("/orders/"), None, true, "orders")
            .await?;
        Ok(page.results)
    }
}

fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_millis(BASE_BACKOFF_MS << attempt.min(6))
}

/// Maps a non-success status of the order API onto the error taxonomy.
pub fn classify_status(status: u16, body: &str, resource: &str) -> OrderError {
    match status {
        401 | 403 => OrderError::AuthError {
            message: format!("HTTP {}", status),
        },
        404 => OrderError::NotFoundError {
            id: resource.to_string(),
        },
        400 | 422 => OrderError::ValidationError {
            message: rejection_message(body),
            field: rejection_field(body),
        },
        _ => OrderError::NetworkError {
            message: format!("HTTP {}: {}", status, body),
        },
    }
}

/// The API answers rejections as `{"field": ["message", ...]}` or `{"detail": "..."}`.
fn rejection_message(body: &str) -> String {
    let parsed: Option<JsonValue> = serde_json::from_str(body).ok();
    let message = parsed.as_ref().and_then(|json| match json.get("detail") {
        Some(JsonValue::String(detail)) => Some(detail.clone()),
        _ => json.as_object().and_then(|fields| {
            fields.values().find_map(|value| match value {
                JsonValue::Array(items) => items.first().and_then(|v| v.as_str()).map(String::from),
                JsonValue::String(s) => Some(s.clone()),
                _ => None,
            })
        }),
    });
    message.unwrap_or_else(|| "order rejected".to_string())
}

fn rejection_field(body: &str) -> Option<String> {
    let json: JsonValue = serde_json::from_str(body).ok()?;
    json.as_object()?
        .keys()
        .find(|key| key.as_str() != "detail")
        .cloned()
}
