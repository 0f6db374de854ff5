pub mod dummy;
pub mod payplug;

pub use dummy::DummyInterface;
pub use payplug::PayplugLightbox;
