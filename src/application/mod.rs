//! Application layer - services that drive jobs through the ports.

pub mod cancellation;
pub mod dispatcher;
pub mod error;
pub mod intake;
pub mod moderation;
pub mod publisher;
pub mod status;
pub mod worker;

pub use error::PipelineError;
