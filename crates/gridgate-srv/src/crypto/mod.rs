//! Identity directory and reverse-proxy secret handling.
//!
//! Reverse-proxy secrets arrive encrypted to the gateway. The requester's
//! X25519 public key comes from an [`IdentityDirectory`]; the gateway's
//! static secret and that key agree on an AES-256-GCM key.

pub mod directory;
pub mod secret;

pub use directory::{ExplorerDirectory, IdentityDirectory, StaticDirectory};
pub use secret::{open_secret, seal_secret};
