//! Adapters for the domain ports.

pub mod broadcast;
pub mod circle;
pub mod in_memory;
pub mod inference;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
