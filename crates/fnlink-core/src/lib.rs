//! fnlink-core: Shared protocol library for the appliance control client.
//!
//! Provides the crypto primitives used by the login handshake and request
//! signing, wire message building with correlation ids, the directory data
//! model, and the error taxonomy.

pub mod crypto;
pub mod directory;
pub mod error;
pub mod message;

// Re-export commonly used items at crate root.
pub use directory::{find_by_port, NasRecord, ServiceDescriptor, ServiceUri};
pub use error::{NasError, NasResult};
pub use message::{Reply, DEFAULT_BACK_ID, ENCRYPTED_REQUESTS, UNSIGNED_REQUESTS};
