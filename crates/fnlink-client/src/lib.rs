//! fnlink-client: async client for the appliance control protocol.
//!
//! Connects over WebSocket with ordered fallback strategies, performs the
//! RSA/AES login handshake, correlates replies to requests, and exposes the
//! discovery operations: entry-token exchange, application listing, and the
//! directory address lookup.
//!
//! # Quick Start
//!
//! ```no_run
//! use fnlink_client::{discovery, ConnectOptions, NasClient};
//!
//! # async fn example() -> fnlink_core::NasResult<()> {
//! let record = discovery::resolve_appliance("my-appliance-id").await?;
//! let host = record.primary_host().unwrap_or_default().to_string();
//!
//! let mut client = NasClient::connect(&host, ConnectOptions::for_host(&host)).await?;
//! let outcome = async {
//!     client.login("admin", "password").await?;
//!     client.list_applications(true).await
//! }
//! .await;
//! client.close().await;
//!
//! for app in outcome? {
//!     println!("{} -> {:?}", app.display_title(), app.port());
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod discovery;
pub mod pending;
pub mod transport;

// Re-export primary public types.
pub use client::{ConnectOptions, NasClient, REQUEST_TIMEOUT};
pub use pending::PendingTable;
pub use transport::{normalize_url, AccessHeaders, WsStream, CONNECT_TIMEOUT};

// Re-export fnlink-core error types for convenience.
pub use fnlink_core::{NasError, NasResult};
