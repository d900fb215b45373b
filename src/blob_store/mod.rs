/// Blob Storage System
///
/// Persists uploaded documents in a single local directory and hands out
/// locators. The store is constructed once by the application context and
/// injected wherever it is needed.

pub mod disk;
pub mod models;

pub use disk::LocalBlobStore;
pub use models::*;
