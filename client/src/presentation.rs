//! Outward notifications from the synchronizer
//!
//! The synchronizer never renders anything itself. It reports state, feed and
//! status changes to a [`PresentationSink`], which owns display concerns such
//! as how long a status line stays visible.

use crate::ledger_client::Post;
use owo_colors::OwoColorize;
use parking_lot::Mutex;
use postcoin_economics::EconomicState;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How long a status message is considered on screen
pub const STATUS_DISPLAY_WINDOW: Duration = Duration::from_secs(4);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Success,
    Error,
}

pub trait PresentationSink: Send + Sync {
    fn on_state_changed(&self, state: &EconomicState);

    fn on_feed_changed(&self, feed: &[Post]);

    /// Transient message; the sink decides when it disappears
    fn on_status(&self, message: &str, kind: StatusKind);

    /// Called after a post was accepted so any pending draft can be discarded
    fn clear_draft(&self) {}
}

impl<P: PresentationSink + ?Sized> PresentationSink for Arc<P> {
    fn on_state_changed(&self, state: &EconomicState) {
        (**self).on_state_changed(state)
    }

    fn on_feed_changed(&self, feed: &[Post]) {
        (**self).on_feed_changed(feed)
    }

    fn on_status(&self, message: &str, kind: StatusKind) {
        (**self).on_status(message, kind)
    }

    fn clear_draft(&self) {
        (**self).clear_draft()
    }
}

/// Terminal sink for the `postcoin` binary.
///
/// Prints state only when it changed, and swallows a status line identical to
/// one still inside [`STATUS_DISPLAY_WINDOW`], so polling does not flood the
/// terminal with the same error.
pub struct ConsoleSink {
    feed_limit: Option<usize>,
    last_state: Mutex<Option<EconomicState>>,
    last_feed_len: Mutex<Option<usize>>,
    last_status: Mutex<Option<(String, Instant)>>,
}

impl ConsoleSink {
    /// `feed_limit` of `None` keeps the feed quiet
    pub fn new(feed_limit: Option<usize>) -> Self {
        Self {
            feed_limit,
            last_state: Mutex::new(None),
            last_feed_len: Mutex::new(None),
            last_status: Mutex::new(None),
        }
    }

    fn print_post(post: &Post) {
        let when = chrono::DateTime::from_timestamp(post.timestamp, 0)
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| post.timestamp.to_string());
        println!("  {} {}", when.dimmed(), post.address.cyan());
        println!("    {}", post.content);
    }
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::new(None)
    }
}

impl PresentationSink for ConsoleSink {
    fn on_state_changed(&self, state: &EconomicState) {
        let mut last = self.last_state.lock();
        if last.as_ref() == Some(state) {
            return;
        }
        *last = Some(*state);

        println!(
            "💰 Balance: {}  |  Posts: {}  |  Next post costs: {}",
            state.balance().bold(),
            state.total_posts(),
            state.post_cost().yellow()
        );
    }

    fn on_feed_changed(&self, feed: &[Post]) {
        let Some(limit) = self.feed_limit else {
            return;
        };

        let mut last_len = self.last_feed_len.lock();
        if *last_len == Some(feed.len()) {
            return;
        }
        *last_len = Some(feed.len());

        println!("\n📰 Feed ({} posts)", feed.len());
        println!("═══════════════════════════════════");
        let skip = feed.len().saturating_sub(limit);
        for post in feed.iter().skip(skip) {
            Self::print_post(post);
        }
        println!();
    }

    fn on_status(&self, message: &str, kind: StatusKind) {
        let mut last = self.last_status.lock();
        if let Some((previous, shown_at)) = last.as_ref() {
            if previous == message && shown_at.elapsed() < STATUS_DISPLAY_WINDOW {
                return;
            }
        }
        *last = Some((message.to_string(), Instant::now()));

        match kind {
            StatusKind::Success => println!("✅ {}", message.green()),
            StatusKind::Error => eprintln!("❌ {}", message.red()),
        }
    }
}
