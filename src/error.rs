//! User-facing payment failure reasons.
//!
//! Every failure the checkout core recovers from locally settles into one of
//! these reasons. The embedding UI renders the message keyed by the reason and
//! nothing else; the underlying error is logged where it happened.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentErrorReason {
    /// Creation failed, the provider failed, or the session expired.
    #[default]
    Default,
    /// The user closed the provider surface, cancelled, or confirmation timed out.
    Abort,
}

impl PaymentErrorReason {
    pub fn default_message(&self) -> &'static str {
        match self {
            PaymentErrorReason::Default => "An error occured during payment. Please retry later.",
            PaymentErrorReason::Abort => "You have aborted the payment.",
        }
    }
}

impl std::fmt::Display for PaymentErrorReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentErrorReason::Default => write!(f, "default"),
            PaymentErrorReason::Abort => write!(f, "abort"),
        }
    }
}

/// Shown while an abort request is in flight.
pub const ABORTING_MESSAGE: &str = "Aborting the payment...";
