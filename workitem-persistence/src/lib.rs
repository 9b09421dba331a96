//! Durable storage for workflow instances driven by the work-item executor.
//!
//! # Architecture
//!
//! - **InstanceStore**: async trait owning correlation-key ownership and
//!   instance checkpoints.
//! - **InMemoryInstanceStore**: a reference implementation using HashMaps.
//!
//! # Implementing Custom Stores
//!
//! ```rust,ignore
//! use workitem_persistence::{InstanceStore, StoreError, InstanceCheckpoint};
//! use async_trait::async_trait;
//!
//! pub struct PostgresStore {
//!     // your connection pool
//! }
//!
//! #[async_trait]
//! impl InstanceStore for PostgresStore {
//!     async fn associate_keys(&self, owner: &str, keys: Vec<InstanceKey>) -> Result<(), StoreError> {
//!         // insert rows, failing with KeyCollision on a unique violation
//!     }
//!     // ... implement other methods
//! }
//! ```

mod in_memory;
mod store;

pub use in_memory::InMemoryInstanceStore;
pub use store::{InstanceCheckpoint, InstanceStore, StoreError};
