use thiserror::Error;

pub type ProviderResult<T> = Result<T, ProviderError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("Provider runtime failed to load: {message}")]
    RuntimeLoad { message: String },

    #[error("Unknown payment provider: {0}")]
    UnknownProvider(String),

    #[error("Payment provider {0} is not enabled")]
    ProviderDisabled(String),

    #[error("Unrecognized provider message: {0}")]
    UnrecognizedMessage(String),
}

impl ProviderError {
    /// A failed load may succeed on the next mount; the slot is left empty.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProviderError::RuntimeLoad { .. })
    }
}
