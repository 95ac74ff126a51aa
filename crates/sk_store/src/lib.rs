//! sk_store — Local persistence interface for Skein
//!
//! The engine does not own a database. Hosts hand it any implementation
//! of the narrow [`Storage`] trait: get / set / has / append over JSON
//! values with colon-delimited keys. Everything the protocol persists
//! lives in one of eight namespaces (see `keys`).
//!
//! # Modules
//! - `adapter` — the `Storage` trait plus typed JSON helpers
//! - `keys`    — namespaced key constructors
//! - `models`  — typed records stored under those keys
//! - `memory`  — in-memory reference implementation (hosts and tests)
//! - `error`   — unified error type

pub mod adapter;
pub mod error;
pub mod keys;
pub mod memory;
pub mod models;

pub use adapter::Storage;
pub use error::StoreError;
pub use memory::MemoryStore;
pub use models::{IdentityRecord, ThreadInfo, WrappedKey};
