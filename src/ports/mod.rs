//! Ports - Trait definitions for every collaborator of the pipeline.

pub mod events;
pub mod generation;
pub mod moderation;
pub mod queue;
pub mod repository;
pub mod storage;
