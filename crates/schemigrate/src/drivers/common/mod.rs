//! Utilities shared by the driver implementations.
//!
//! - [`tls`]: TLS settings for the network drivers

pub mod tls;

pub use tls::SslMode;
