//! Static information that is determined at build time.

/// Client ID that is sent to brokers when the user does not specify one.
pub const DEFAULT_CLIENT_ID: &str = env!("CARGO_PKG_NAME");
