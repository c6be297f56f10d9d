//! Vigil Ledger: durable JSON document storage for fleet liveness state
//!
//! This crate is the only place where Vigil touches storage. Every record the
//! rest of the system produces (echo pulses, the intent trail, the registry,
//! audit runs, certification snapshots, drift reports, sentinel incidents) is
//! a JSON document under a stable key.
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: all-or-nothing writes, read-your-writes, typed empty-state reads.
//!
//! ## Key Components
//!
//! - `LedgerStore`: the `get` / `put_atomic` / `append_atomic` / `update_atomic` contract
//! - `FsLedgerStore`: one file per key, temp-file-and-rename writes
//! - `SurrealLedgerStore`: SurrealDB table backend (`mem://`, `surrealkv://`, `ws://`)
//! - `fakes::MemoryLedgerStore`: in-memory fake with fault injection

mod error;
pub mod fakes;
pub mod fs;
pub mod store;
pub mod surreal;

pub use error::StorageError;
pub use fs::FsLedgerStore;
pub use store::{
    append_typed, decode_or_default, keys, put_typed, read_or_default, DocUpdate, LedgerStore,
    StorageResult,
};
pub use surreal::SurrealLedgerStore;
