//! Durable, dependency-aware task storage.
//!
//! This crate owns the data model and every transactional operation on it:
//! creation (with cycle detection), claiming under bounded concurrency,
//! terminal transitions, and lease-expiry recovery. It knows nothing about
//! HTTP, the scheduler's tick loop, or simulated execution — those live in
//! the `dts` binary crate and consume this one as a library.

pub mod domain;
pub mod error;
pub mod repository;
pub mod schema;
pub mod store;

pub use domain::{Claim, NewTask, Task, TaskStatus, TaskView};
pub use error::{ErrorCode, StoreError, StoreResult};
pub use store::Store;

#[cfg(test)]
mod tests;
