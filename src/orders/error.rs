use thiserror::Error;

pub type OrderResult<T> = Result<T, OrderError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    #[error("Network error: {message}")]
    NetworkError { message: String },

    #[error("Authentication required: {message}")]
    AuthError { message: String },

    #[error("Order rejected: {message}")]
    ValidationError {
        message: String,
        field: Option<String>,
    },

    #[error("Order not found: {id}")]
    NotFoundError { id: String },
}

impl OrderError {
    /// Whether an idempotent call may be replayed after this failure.
    pub fn is_retryable(&self) -> bool {
        match self {
            OrderError::NetworkError { .. } => true,
            OrderError::AuthError { .. } => false,
            OrderError::ValidationError { .. } => false,
            OrderError::NotFoundError { .. } => false,
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, OrderError::AuthError { .. })
    }

    pub fn http_status_code(&self) -> u16 {
        match self {
            OrderError::NetworkError { .. } => 503,
            OrderError::AuthError { .. } => 401,
            OrderError::ValidationError { .. } => 400,
            OrderError::NotFoundError { .. } => 404,
        }
    }
}
