//! Wayfare client - resilient HTTP client for the Wayfare backends
//!
//! Every UI action in the Wayfare app funnels through this client. It wraps
//! the transport with:
//!
//! - **Request pipeline**: descriptors resolved against a per-backend base
//!   address, per-attempt timeouts, JSON bodies
//! - **Retry policy**: bounded, method-scoped automatic retry for transient
//!   transport failures
//! - **Timestamp codec**: response fields named `*At` decoded to canonical
//!   RFC 3339 UTC timestamps
//! - **Refresh coordinator**: when the session credential expires while
//!   requests are in flight, the credential is refreshed exactly once and
//!   blocked requests are replayed in arrival order
//!
//! # Example
//!
//! ```no_run
//! use wayfare_client::{Client, ClientConfig, Result};
//!
//! async fn example() -> Result<()> {
//!     let config = ClientConfig::new("http://localhost:8080")?;
//!     let client = Client::new(config)?;
//!
//!     let profile = client.get("/profile").await?;
//!     println!("{:?}", profile.body);
//!     Ok(())
//! }
//! ```
//!
//! The app talks to more than one backend; construct one `Client` per
//! backend so each gets its own refresh coordination and cookie jar.

pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod refresh;
pub mod request;
pub mod retry;

// Re-export main types for convenience
pub use client::{ApiResponse, Client};
pub use config::ClientConfig;
pub use error::{Error, ErrorClassification, Result};
pub use refresh::{RefreshState, SessionEvent};
pub use request::{RequestDescriptor, RequestDescriptorBuilder};
pub use retry::{RetryDecision, RetryPolicy};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
