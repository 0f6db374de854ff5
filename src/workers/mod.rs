pub mod validation_poller;

pub use validation_poller::{PollHandle, PollOutcome, ValidationPoller};
