//! Order API facade: types, errors, the gateway port and its HTTP adapter.

pub mod client;
pub mod error;
pub mod gateway;
pub mod types;

pub use client::HttpOrderGateway;
pub use error::{OrderError, OrderResult};
pub use gateway::{OrderGateway, SessionGuardedGateway};
pub use types::{
    BillingAddress, Order, OrderCreateInput, OrderState, Payment, PaymentInfo, PaymentKind,
};
