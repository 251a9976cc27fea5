//! Mirrored wallet state

use crate::pricing::compute_cost;
use serde::{Deserialize, Serialize};

/// Balance, post count and the post cost derived from it.
///
/// `post_cost` is a cached projection of `total_posts`; every mutation of the
/// post count goes through this type so the two cannot drift apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawEconomicState")]
pub struct EconomicState {
    balance: u64,
    total_posts: u64,
    post_cost: u64,
}

impl EconomicState {
    pub fn new() -> Self {
        Self::with(0, 0)
    }

    pub fn with(balance: u64, total_posts: u64) -> Self {
        Self {
            balance,
            total_posts,
            post_cost: compute_cost(total_posts),
        }
    }

    pub fn balance(&self) -> u64 {
        self.balance
    }

    pub fn total_posts(&self) -> u64 {
        self.total_posts
    }

    pub fn post_cost(&self) -> u64 {
        self.post_cost
    }

    pub fn can_afford_post(&self) -> bool {
        self.balance >= self.post_cost
    }

    /// Replace the balance with a value reported by the ledger
    pub fn set_balance(&mut self, balance: u64) {
        self.balance = balance;
    }

    /// Optimistic credit after a faucet payout
    pub fn credit(&mut self, amount: u64) {
        self.balance = self.balance.saturating_add(amount);
    }

    /// Optimistic debit after an accepted post; recomputes the post cost.
    ///
    /// `charged` is the cost in effect when the post was submitted, which may
    /// differ from the current `post_cost` if a feed refresh landed meanwhile.
    pub fn record_post(&mut self, charged: u64) {
        self.balance = self.balance.saturating_sub(charged);
        self.set_total_posts(self.total_posts.saturating_add(1));
    }

    /// Replace the post count with the length of a fresh feed snapshot
    pub fn set_total_posts(&mut self, total_posts: u64) {
        self.total_posts = total_posts;
        self.post_cost = compute_cost(total_posts);
    }
}

impl Default for EconomicState {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Deserialize)]
struct RawEconomicState {
    balance: u64,
    total_posts: u64,
    post_cost: u64,
}

impl TryFrom<RawEconomicState> for EconomicState {
    type Error = String;

    fn try_from(raw: RawEconomicState) -> Result<Self, Self::Error> {
        let state = EconomicState::with(raw.balance, raw.total_posts);
        if state.post_cost != raw.post_cost {
            return Err(format!(
                "post_cost {} does not match {} posts (expected {})",
                raw.post_cost, raw.total_posts, state.post_cost
            ));
        }
        Ok(state)
    }
}
