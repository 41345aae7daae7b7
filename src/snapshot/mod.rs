//! Snapshot storage
//!
//! [`SnapshotStore`] holds the snapshot requests read from; [`kv`] mirrors
//! every installed snapshot into a key-value store with whole-collection
//! replace semantics.

pub mod kv;
pub mod store;

pub use kv::{InMemoryKvStore, KvError, KvMirror, KvStore};
pub use store::SnapshotStore;
