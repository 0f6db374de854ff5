//! Payment core of the course checkout: order creation, provider surfaces and
//! confirmation polling behind a single orchestrator.

pub mod config;
pub mod error;
pub mod logging;
pub mod orders;
pub mod payments;
pub mod services;
pub mod session;
pub mod workers;
