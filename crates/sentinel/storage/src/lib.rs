//! Sentinel unified storage abstractions.
//!
//! This crate defines the storage contract shared by sentinel components:
//! - agent key/value state (rewritable per agent)
//! - append-only agent memory entries
//! - approval requests with a one-shot pending -> terminal transition
//! - write-once monitoring run history
//!
//! Design stance:
//! - Postgres remains the transactional source of truth.
//! - The in-memory adapter exists for tests and local development.
//! - Decided approval requests and recorded runs are never edited; the only
//!   in-place mutation anywhere is the pending -> terminal status flip.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]
#![warn(rust_2018_idioms)]

mod error;
pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;
mod traits;

pub use error::{StorageError, StorageResult};
pub use traits::{
    update_entity, AgentMemoryStore, AgentStateStore, ApprovalStore, EntityKind, QueryWindow,
    RequestFilter, RunFilter, RunStore, SentinelStore,
};
