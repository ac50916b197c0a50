//! Domain Layer
//!
//! Value objects, events and ports of the indirection cache.
//!
//! # Architecture
//!
//! The domain layer is organized into:
//!
//! - **Ports** (`ports.rs`) - Trait abstractions for stores, sequence, metrics
//! - **Events** (`events.rs`) - Lifecycle and write events
//!
//! # Usage
//!
//! ```ignore
//! use buckcache::domain::ports::{KeyValueStore, SequenceGenerator};
//!
//! async fn allocate<S: SequenceGenerator>(sequence: &S) -> Result<EntryId> {
//!     sequence.next().await
//! }
//! ```

pub mod events;
pub mod ports;

pub use events::{CacheEvent, WriteStage};
pub use ports::{
    // Port traits
    EventPublisher,
    KeyValueStore,
    MetricsSink,
    SequenceGenerator,
    StorageCluster,
    // Store handles
    DynBlobStore,
    DynForwardKeyStore,
    DynReverseKeyStore,
    // Value objects
    EntryId,
    KeySet,
    LogicalKey,
    TtlUnit,
};
