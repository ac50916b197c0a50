//! Indirection Cache Engine
//!
//! Orchestrates the blob, reverse-key and forward-key stores and the
//! sequence generator.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                     IndirectionCache                              │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  Sequence     │ Blob Store      │ Reverse Key Store │ Forward Key │
//! │  next() → id  │ id → payload    │ id → key set      │ key → id    │
//! └──────────────────────────────────────────────────────────────────┘
//!        write order:  sequence → blob → reverse → forward
//!        read path:    forward → blob
//! ```

mod cache;
mod lifecycle;
mod stores;

pub use cache::{
    CacheStats, IndirectionCache, GET_CALL_COUNT, GET_CALL_TIME, GET_MISS_COUNT, PUT_CALL_COUNT,
    PUT_CALL_TIME, PUT_FAILURE_COUNT,
};
pub use lifecycle::EngineState;
pub use stores::{BlobStore, ForwardKeyStore, ReverseKeyStore, TypedStore};
