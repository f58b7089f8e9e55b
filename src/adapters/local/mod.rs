//! Local adapters for monolith deployment.

pub mod fs;
pub mod memory;
pub mod redis;

pub use fs::FsAdapter;
pub use memory::{InMemoryJobRepository, InMemoryQueue};
pub use redis::RedisPool;
