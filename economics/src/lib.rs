//! PostCoin Economics Module
//!
//! Implements the client-side economic model:
//! - Post pricing derived from the observed post count
//! - The mirrored wallet state (balance, post count, cached post cost)

pub mod pricing;
pub mod state;

pub use pricing::compute_cost;
pub use state::EconomicState;

/// Economic constants
pub mod constants {
    /// Cost of the very first post
    pub const BASE_POST_COST: u64 = 10;

    /// Number of posts after which the post cost rises by one
    pub const POSTS_PER_PRICE_STEP: u64 = 5;
}
