//! Redis adapter for local deployment.
//!
//! This module provides Redis-backed implementations of:
//! - `JobQueuePort` on a list consumed with BRPOP
//! - `JobRepository` on one hash per job, with compare-and-set saves in Lua

mod error;
mod pool;
mod queue;
mod repository;

pub use error::RedisAdapterError;
pub use pool::RedisPool;

/// Redis key constants
const JOB_QUEUE: &str = "videogen:jobs";
const JOB_PREFIX: &str = "videogen:job:";

fn job_key(id: crate::domain::jobs::JobId) -> String {
    format!("{}{}", JOB_PREFIX, id)
}
