//! Payment provider interfaces: the surfaces a user pays through.

pub mod bus;
pub mod error;
pub mod factory;
pub mod interface;
pub mod providers;
pub mod runtime;
pub mod types;

pub use bus::MessageBus;
pub use error::{ProviderError, ProviderResult};
pub use factory::PaymentInterfaceRegistry;
pub use interface::{InterfaceMount, PaymentInterface};
pub use types::{InteractivePayment, ProviderName, ProviderSignal, SurfaceCommand};
