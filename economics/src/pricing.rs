//! Post pricing calculations

use crate::constants::{BASE_POST_COST, POSTS_PER_PRICE_STEP};

/// Cost of the next post given how many posts the feed already holds.
///
/// `10 + floor(total_posts / 5)`: starts at [`BASE_POST_COST`] and grows by
/// one every [`POSTS_PER_PRICE_STEP`] posts. Total and monotonic.
pub const fn compute_cost(total_posts: u64) -> u64 {
    BASE_POST_COST + total_posts / POSTS_PER_PRICE_STEP
}
