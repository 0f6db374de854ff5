//! Services module for checkout business logic

pub mod payment_orchestrator;

// Re-export orchestrator types
pub use crate::services::payment_orchestrator::{
    OrchestratorError, OrchestratorResult, PaymentOrchestrator, PaymentState, PaymentView,
    SuccessCallback,
};
