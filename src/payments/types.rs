use crate::error::PaymentErrorReason;
use crate::payments::error::ProviderError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProviderName {
    Payplug,
    Dummy,
}

impl ProviderName {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderName::Payplug => "payplug",
            ProviderName::Dummy => "dummy",
        }
    }
}

impl std::fmt::Display for ProviderName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ProviderName {
    type Err = ProviderError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "payplug" => Ok(ProviderName::Payplug),
            "dummy" => Ok(ProviderName::Dummy),
            _ => Err(ProviderError::UnknownProvider(value.to_string())),
        }
    }
}

/// What a provider interface needs to open its surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InteractivePayment {
    pub order_id: Uuid,
    pub payment_id: String,
    pub provider: ProviderName,
    pub url: String,
}

/// Normalized outcome of a provider surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderSignal {
    Success,
    Error(PaymentErrorReason),
}

/// Instructions for the UI embedding the provider surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceCommand {
    Open { url: String },
    Close,
}
