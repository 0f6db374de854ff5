use crate::payments::types::{InteractivePayment, ProviderName};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderState {
    Pending,
    Validated,
    Canceled,
    Failed,
}

/// Raw payment payload attached to a freshly created order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaymentInfo {
    pub payment_id: String,
    #[serde(default)]
    pub provider: Option<ProviderName>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub is_paid: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Order {
    pub id: Uuid,
    pub state: OrderState,
    #[serde(default)]
    pub course: Option<String>,
    #[serde(default)]
    pub product: Option<Uuid>,
    #[serde(default)]
    pub main_invoice: Option<String>,
    #[serde(default)]
    pub payment_info: Option<PaymentInfo>,
    #[serde(default)]
    pub created_on: Option<DateTime<Utc>>,
}

impl Order {
    pub fn is_validated(&self) -> bool {
        self.state == OrderState::Validated
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentKind {
    /// Settled by the remote system with a stored card; no provider surface.
    OneClick,
    Interactive { provider: ProviderName, url: String },
}

/// Per-attempt payment descriptor, fixed once the order is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payment {
    pub order_id: Uuid,
    pub payment_id: String,
    pub kind: PaymentKind,
}

impl Payment {
    /// Returns `None` when the order carries no usable payment payload.
    ///
    /// An interactive payload without an explicit provider is routed to
    /// Payplug, the only provider the order API issued before the field existed.
    pub fn from_order(order: &Order) -> Option<Self> {
        let info = order.payment_info.as_ref()?;
        if info.payment_id.trim().is_empty() {
            return None;
        }

        let kind = if info.is_paid == Some(true) {
            PaymentKind::OneClick
        } else {
            let url = info.url.clone().filter(|u| !u.trim().is_empty())?;
            PaymentKind::Interactive {
                provider: info.provider.unwrap_or(ProviderName::Payplug),
                url,
            }
        };

        Some(Self {
            order_id: order.id,
            payment_id: info.payment_id.clone(),
            kind,
        })
    }

    pub fn is_one_click(&self) -> bool {
        matches!(self.kind, PaymentKind::OneClick)
    }

    pub fn interactive(&self) -> Option<InteractivePayment> {
        match &self.kind {
            PaymentKind::OneClick => None,
            PaymentKind::Interactive { provider, url } => Some(InteractivePayment {
                order_id: self.order_id,
                payment_id: self.payment_id.clone(),
                provider: *provider,
                url: url.clone(),
            }),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BillingAddress {
    pub first_name: String,
    pub last_name: String,
    pub address: String,
    pub postcode: String,
    pub city: String,
    pub country: String,
}

impl BillingAddress {
    pub fn is_complete(&self) -> bool {
        [
            &self.first_name,
            &self.last_name,
            &self.address,
            &self.postcode,
            &self.city,
            &self.country,
        ]
        .iter()
        .all(|field| !field.trim().is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrderCreateInput {
    pub course: String,
    pub product: Uuid,
    pub billing_address: Option<BillingAddress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credit_card_id: Option<String>,
}

impl OrderCreateInput {
    /// The checkout trigger stays disabled until this passes.
    pub fn validate(&self) -> Result<(), String> {
        if self.course.trim().is_empty() {
            return Err("course code is required".to_string());
        }
        if self.product.is_nil() {
            return Err("product is required".to_string());
        }
        match &self.billing_address {
            None => Err("billing address is required".to_string()),
            Some(address) if !address.is_complete() => {
                Err("billing address is incomplete".to_string())
            }
            Some(_) => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbortRequest {
    pub payment_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderPage {
    pub count: u64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<Order>,
}
