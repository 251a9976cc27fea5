//! PostCoin Client
//!
//! Keeps a local wallet in step with the remote ledger:
//! - `ledger_client`: typed HTTP boundary to the ledger service
//! - `sync`: the economic state synchronizer (preconditions, guards, reconciliation)
//! - `presentation`: the outward notification contract and a console implementation
//! - `config`: on-disk client configuration

pub mod config;
pub mod ledger_client;
pub mod presentation;
pub mod sync;

pub use config::Config;
pub use ledger_client::{ClientError, FeedSnapshot, Ledger, LedgerClient, Post};
pub use presentation::{ConsoleSink, PresentationSink, StatusKind};
pub use sync::{SyncError, SyncPhase, Synchronizer};
