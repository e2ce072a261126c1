//! Sharekit - publish content to social networks through one abstraction
//!
//! This library hides per-network authentication and wire-format differences
//! behind the [`Service`](service::Service) trait. It provides the OAuth1
//! handshake and request signing, a request builder with multipart support,
//! and a cancellable share operation with response validation.

pub mod account;
pub mod config;
pub mod error;
pub mod logging;
pub mod oauth;
pub mod request;
pub mod service;
pub mod types;

// Re-export commonly used types
pub use account::{Account, AccountStore, FileAccountStore, MemoryAccountStore};
pub use config::Config;
pub use error::{Result, SocialError};
pub use oauth::{OAuth1Config, OAuth1Handshake, OAuth1Signer};
pub use request::{Request, Response};
pub use service::twitter::TwitterService;
pub use service::{Service, ServiceDescriptor};
pub use types::{FileData, ImageData, Item, ShareResult};

/// Cancellation signal threaded through every network operation.
pub use tokio_util::sync::CancellationToken;
