//! PostCoin Wallet Identity
//!
//! Persists the two identifiers a client keeps across sessions:
//! - the device id, synthesised once and never regenerated
//! - the wallet address, bound by generation or explicit import

pub mod identity;

pub use identity::{generate_device_id, IdentityError, IdentityStore};
