//! Adapters - Concrete implementations of ports.

pub mod events;
pub mod http;
pub mod policy;
pub mod remote;
pub mod stream;

#[cfg(feature = "aws")]
pub mod aws;

#[cfg(feature = "local")]
pub mod local;

pub use events::EventHub;
