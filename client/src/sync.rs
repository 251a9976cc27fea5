//! Economic state synchronizer
//!
//! Owns the client's view of the wallet: bound address, mirrored balance,
//! post count and the feed snapshot. Every user action goes through local
//! precondition checks first, then the ledger, then a state update and a
//! notification to the presentation sink.
//!
//! Update policy: successful faucet payouts and posts are applied optimistically
//! as soon as the ledger accepts them; balance and feed refreshes replace the
//! local values wholesale with whatever the ledger reports.

use crate::ledger_client::{failure_message, ClientError, FeedSnapshot, Ledger, Post};
use crate::presentation::{PresentationSink, StatusKind};
use parking_lot::Mutex;
use postcoin_economics::EconomicState;
use postcoin_wallet::{IdentityError, IdentityStore};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Minimum spacing between successful faucet requests
pub const DEFAULT_FAUCET_COOLDOWN: Duration = Duration::from_secs(5);

/// Synchronization phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    /// `start()` has not run yet
    Uninitialized,
    /// Device id known, no wallet
    Identified,
    /// Wallet address bound, first refresh pending
    WalletBound,
    /// Balance and feed refreshed since the wallet was bound
    Ready,
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("No wallet yet. Generate or import one first")]
    NoWallet,

    #[error("Identity not loaded yet")]
    NoDeviceId,

    #[error("Wallet is still syncing with the ledger, try again shortly")]
    NotReady,

    #[error("Post content cannot be empty")]
    EmptyContent,

    #[error("Insufficient balance: {balance} available, post costs {cost}")]
    InsufficientBalance { balance: u64, cost: u64 },

    #[error("Please enter an address")]
    EmptyAddress,

    #[error("A post is already being submitted")]
    SubmitInFlight,

    #[error("A faucet request is already pending")]
    FaucetInFlight,

    #[error("Faucet cooling down, try again in {}s", .remaining.as_millis().div_ceil(1000))]
    FaucetCoolingDown { remaining: Duration },

    #[error("Could not reach the ledger")]
    Transport(#[source] ClientError),

    #[error("{0}")]
    Rejected(String),

    #[error("Identity storage failed: {0}")]
    Identity(#[from] IdentityError),
}

impl SyncError {
    /// Rejected locally, before any request went out
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::NoWallet
                | Self::NoDeviceId
                | Self::NotReady
                | Self::EmptyContent
                | Self::InsufficientBalance { .. }
                | Self::EmptyAddress
                | Self::SubmitInFlight
                | Self::FaucetInFlight
                | Self::FaucetCoolingDown { .. }
        )
    }

    fn from_client(error: ClientError, fallback: &str) -> Self {
        if error.is_transport() {
            Self::Transport(error)
        } else {
            log::debug!("{}: {}", fallback, error);
            Self::Rejected(fallback.to_string())
        }
    }
}

/// Per-action in-flight flag, released on drop
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

struct Inner {
    phase: SyncPhase,
    device_id: Option<String>,
    address: Option<String>,
    state: EconomicState,
    feed: FeedSnapshot,
    balance_synced: bool,
    feed_synced: bool,
    faucet_ready_at: Option<Instant>,
}

impl Inner {
    fn bind(&mut self, address: String) {
        self.address = Some(address);
        self.phase = SyncPhase::WalletBound;
        self.balance_synced = false;
        self.feed_synced = false;
        self.faucet_ready_at = None;
    }

    fn promote(&mut self) {
        if self.phase == SyncPhase::WalletBound && self.balance_synced && self.feed_synced {
            self.phase = SyncPhase::Ready;
        }
    }

    fn is_bound_to(&self, address: &str) -> bool {
        self.address.as_deref() == Some(address)
    }
}

/// Client-side coordinator between the identity store, the ledger and the
/// presentation sink.
///
/// All methods take `&self`; the synchronizer is meant to be shared (e.g. in
/// an `Arc`) between a UI and the background poller. State locks are never
/// held across a ledger call.
pub struct Synchronizer<L, P> {
    ledger: L,
    sink: P,
    identity: IdentityStore,
    faucet_cooldown: Duration,
    inner: Mutex<Inner>,
    submitting: AtomicBool,
    faucet_busy: AtomicBool,
}

impl<L: Ledger, P: PresentationSink> Synchronizer<L, P> {
    pub fn new(ledger: L, sink: P, identity: IdentityStore) -> Self {
        Self::with_faucet_cooldown(ledger, sink, identity, DEFAULT_FAUCET_COOLDOWN)
    }

    pub fn with_faucet_cooldown(
        ledger: L,
        sink: P,
        identity: IdentityStore,
        faucet_cooldown: Duration,
    ) -> Self {
        Self {
            ledger,
            sink,
            identity,
            faucet_cooldown,
            inner: Mutex::new(Inner {
                phase: SyncPhase::Uninitialized,
                device_id: None,
                address: None,
                state: EconomicState::new(),
                feed: Vec::new(),
                balance_synced: false,
                feed_synced: false,
                faucet_ready_at: None,
            }),
            submitting: AtomicBool::new(false),
            faucet_busy: AtomicBool::new(false),
        }
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn phase(&self) -> SyncPhase {
        self.inner.lock().phase
    }

    pub fn state(&self) -> EconomicState {
        self.inner.lock().state
    }

    pub fn feed(&self) -> FeedSnapshot {
        self.inner.lock().feed.clone()
    }

    pub fn address(&self) -> Option<String> {
        self.inner.lock().address.clone()
    }

    pub fn device_id(&self) -> Option<String> {
        self.inner.lock().device_id.clone()
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting.load(Ordering::Acquire)
    }

    /// Whether a faucet request would currently be let through
    pub fn faucet_available(&self) -> bool {
        if self.faucet_busy.load(Ordering::Acquire) {
            return false;
        }
        let ready_at = self.inner.lock().faucet_ready_at;
        ready_at.map_or(true, |at| Instant::now() >= at)
    }

    /// Load the device id and, if a wallet address was persisted, bind it and
    /// run the first balance and feed refresh.
    pub async fn start(&self) -> Result<SyncPhase, SyncError> {
        let device_id = self
            .identity
            .get_or_create_device_id()
            .map_err(|e| self.fail(e.into()))?;
        let persisted = self
            .identity
            .get_persisted_address()
            .map_err(|e| self.fail(e.into()))?;

        {
            let mut inner = self.inner.lock();
            inner.device_id = Some(device_id.clone());
            if inner.phase == SyncPhase::Uninitialized {
                inner.phase = SyncPhase::Identified;
            }
        }
        log::info!("🆔 Device {}", device_id);

        if let Some(address) = persisted {
            let already_bound = self.inner.lock().is_bound_to(&address);
            if !already_bound {
                log::info!("👛 Loaded wallet {}", address);
                self.inner.lock().bind(address);
            }
            self.refresh_balance().await?;
            self.refresh_feed().await?;
        }

        Ok(self.phase())
    }

    /// Ask the ledger for this device's wallet address and bind it.
    ///
    /// An address that is already bound is returned as is; generation never
    /// replaces it.
    pub async fn generate_wallet(&self) -> Result<String, SyncError> {
        let (device_id, bound) = {
            let inner = self.inner.lock();
            (inner.device_id.clone(), inner.address.clone())
        };
        if let Some(address) = bound {
            log::info!("👛 Wallet already bound: {}", address);
            return Ok(address);
        }
        let device_id = device_id.ok_or_else(|| self.fail(SyncError::NoDeviceId))?;

        let response = self
            .ledger
            .generate_address(&device_id)
            .await
            .map_err(|e| self.fail(SyncError::from_client(e, "Failed to generate address")))?;

        let address = match response.address.as_deref().map(str::trim) {
            Some(address) if response.success && !address.is_empty() => address.to_string(),
            _ => {
                let reason = failure_message(&response.error, &response.message)
                    .unwrap_or("Failed to generate address");
                return Err(self.fail(SyncError::Rejected(reason.to_string())));
            }
        };

        let bound = {
            let mut inner = self.inner.lock();
            match inner.address.clone() {
                // another action bound a wallet while we were waiting
                Some(existing) => Ok(existing),
                None => self.identity.persist_address(&address).map(|()| {
                    inner.bind(address.clone());
                    address
                }),
            }
        };
        let bound = bound.map_err(|e| self.fail(e.into()))?;

        let message = response.message.as_deref().unwrap_or("Wallet ready");
        self.sink.on_status(message, StatusKind::Success);
        log::info!("👛 Wallet bound: {}", bound);

        if let Err(e) = self.refresh_after_bind().await {
            log::warn!("⚠️ Initial refresh after generation failed: {}", e);
        }
        Ok(bound)
    }

    /// Bind an existing address after confirming the ledger knows its balance
    pub async fn import_wallet(&self, address: &str) -> Result<u64, SyncError> {
        let address = address.trim();
        if address.is_empty() {
            return Err(self.fail(SyncError::EmptyAddress));
        }

        let response = self.ledger.get_balance(address).await.map_err(|e| {
            self.fail(SyncError::from_client(e, "Invalid address or server error"))
        })?;
        let Some(balance) = response.balance else {
            return Err(self.fail(SyncError::Rejected(
                "Invalid address or server error".to_string(),
            )));
        };

        let state = {
            let mut inner = self.inner.lock();
            self.identity.persist_address(address).map(|()| {
                inner.bind(address.to_string());
                inner.state.set_balance(balance);
                inner.balance_synced = true;
                inner.state
            })
        };
        let state = state.map_err(|e| self.fail(e.into()))?;
        log::info!("📥 Wallet imported: {} (balance {})", address, balance);
        self.sink.on_state_changed(&state);
        self.sink.on_status("Wallet imported", StatusKind::Success);

        if let Err(e) = self.refresh_feed().await {
            log::warn!("⚠️ Feed refresh after import failed: {}", e);
        }
        Ok(balance)
    }

    /// Replace the mirrored balance with the ledger's figure
    pub async fn refresh_balance(&self) -> Result<u64, SyncError> {
        let address = self.require_address()?;

        let response = self
            .ledger
            .get_balance(&address)
            .await
            .map_err(|e| self.fail(SyncError::from_client(e, "Could not fetch balance")))?;
        let Some(balance) = response.balance else {
            return Err(self.fail(SyncError::Rejected(
                "Invalid address or server error".to_string(),
            )));
        };

        let state = {
            let mut inner = self.inner.lock();
            if !inner.is_bound_to(&address) {
                log::debug!("Discarding balance for {}: wallet changed", address);
                return Ok(balance);
            }
            inner.state.set_balance(balance);
            inner.balance_synced = true;
            inner.promote();
            inner.state
        };
        log::debug!("💰 Balance refreshed: {}", balance);
        self.sink.on_state_changed(&state);
        Ok(balance)
    }

    /// Fetch the whole feed and replace the previous snapshot with it.
    ///
    /// Returns the number of posts now known.
    pub async fn refresh_feed(&self) -> Result<u64, SyncError> {
        let response = self
            .ledger
            .list_posts()
            .await
            .map_err(|e| self.fail(SyncError::from_client(e, "Could not load posts")))?;

        let total = response.posts.len() as u64;
        let (state, feed) = {
            let mut inner = self.inner.lock();
            inner.feed = response.posts;
            inner.state.set_total_posts(total);
            inner.feed_synced = true;
            inner.promote();
            (inner.state, inner.feed.clone())
        };

        if let Some(remote_total) = response.total.filter(|remote| *remote != total) {
            log::warn!("⚠️ Ledger reports {} posts but sent {}", remote_total, total);
        }
        if let Some(remote_cost) = response.next_post_cost {
            if remote_cost != state.post_cost() {
                log::warn!(
                    "⚠️ Ledger quotes next post at {}, local pricing says {}",
                    remote_cost,
                    state.post_cost()
                );
            }
        }
        log::debug!("📰 Feed refreshed: {} posts", total);
        self.sink.on_feed_changed(&feed);
        self.sink.on_state_changed(&state);
        Ok(total)
    }

    /// Request coins from the ledger faucet.
    ///
    /// Needs a wallet in the `Ready` phase. A successful request closes the
    /// faucet for the cooldown window, counted from when this call started.
    /// A failed one leaves it open.
    pub async fn request_faucet(&self) -> Result<u64, SyncError> {
        let address = self.require_ready_wallet()?;
        let _guard = InFlight::acquire(&self.faucet_busy)
            .ok_or_else(|| self.fail(SyncError::FaucetInFlight))?;

        let invoked_at = Instant::now();
        let ready_at = self.inner.lock().faucet_ready_at;
        if let Some(ready_at) = ready_at {
            if invoked_at < ready_at {
                return Err(self.fail(SyncError::FaucetCoolingDown {
                    remaining: ready_at - invoked_at,
                }));
            }
        }

        let response = self
            .ledger
            .request_faucet(&address)
            .await
            .map_err(|e| self.fail(SyncError::from_client(e, "Faucet request failed")))?;
        if !response.succeeded() {
            let reason = failure_message(&response.error, &response.message)
                .unwrap_or("Faucet request failed");
            return Err(self.fail(SyncError::Rejected(reason.to_string())));
        }

        let amount = response.amount.unwrap_or_else(|| {
            log::warn!("⚠️ Faucet accepted but reported no amount");
            0
        });

        let state = {
            let mut inner = self.inner.lock();
            inner.faucet_ready_at = Some(invoked_at + self.faucet_cooldown);
            if inner.is_bound_to(&address) {
                inner.state.credit(amount);
            }
            inner.state
        };
        log::info!("🚰 Faucet credited {} to {}", amount, address);
        self.sink.on_state_changed(&state);

        let message = response
            .message
            .unwrap_or_else(|| format!("Received {} coins", amount));
        self.sink.on_status(&message, StatusKind::Success);
        Ok(amount)
    }

    /// Publish a post at the current price.
    ///
    /// Checks, in order: a wallet is bound and `Ready`, the trimmed content is
    /// not empty, the mirrored balance covers the post cost. Only one
    /// submission may be in flight at a time. Returns the cost charged.
    pub async fn submit_post(&self, content: &str) -> Result<u64, SyncError> {
        let address = self.require_ready_wallet()?;
        let content = content.trim();
        if content.is_empty() {
            return Err(self.fail(SyncError::EmptyContent));
        }
        self.check_affordable()?;

        let _guard = InFlight::acquire(&self.submitting)
            .ok_or_else(|| self.fail(SyncError::SubmitInFlight))?;
        // the price may have moved while another submission held the guard
        let cost = self.check_affordable()?;

        let response = self
            .ledger
            .submit_post(&address, content, cost)
            .await
            .map_err(|e| self.fail(SyncError::from_client(e, "Failed to create post")))?;
        if !response.success {
            let reason = failure_message(&response.error, &response.message)
                .unwrap_or("Failed to create post");
            return Err(self.fail(SyncError::Rejected(reason.to_string())));
        }
        if let Some(charged) = response.cost.filter(|charged| *charged != cost) {
            log::warn!("⚠️ Ledger charged {} for a post priced {} locally", charged, cost);
        }

        let state = {
            let mut inner = self.inner.lock();
            if inner.is_bound_to(&address) {
                inner.state.record_post(cost);
            }
            inner.state
        };
        if let Some(remote_balance) = response.new_balance {
            if remote_balance != state.balance() {
                log::warn!(
                    "⚠️ Ledger reports balance {} after the post, local mirror has {}",
                    remote_balance,
                    state.balance()
                );
            }
        }
        log::info!("📝 Post published by {} for {}", address, cost);
        self.sink.on_state_changed(&state);
        self.sink
            .on_status(&format!("Post published (cost {})", cost), StatusKind::Success);

        if let Err(e) = self.refresh_feed().await {
            log::warn!("⚠️ Feed refresh after post failed: {}", e);
        }
        self.sink.clear_draft();
        Ok(cost)
    }

    fn require_address(&self) -> Result<String, SyncError> {
        let address = self.inner.lock().address.clone();
        address.ok_or_else(|| self.fail(SyncError::NoWallet))
    }

    /// Faucet and posts only run once both first refreshes have landed, so
    /// the local price reflects the ledger's post count.
    fn require_ready_wallet(&self) -> Result<String, SyncError> {
        let address = self.require_address()?;
        if self.phase() != SyncPhase::Ready {
            return Err(self.fail(SyncError::NotReady));
        }
        Ok(address)
    }

    fn check_affordable(&self) -> Result<u64, SyncError> {
        let state = self.inner.lock().state;
        if state.can_afford_post() {
            Ok(state.post_cost())
        } else {
            Err(self.fail(SyncError::InsufficientBalance {
                balance: state.balance(),
                cost: state.post_cost(),
            }))
        }
    }

    async fn refresh_after_bind(&self) -> Result<(), SyncError> {
        self.refresh_balance().await?;
        self.refresh_feed().await?;
        Ok(())
    }

    /// Report an error to the sink and hand it back for propagation
    fn fail(&self, error: SyncError) -> SyncError {
        if error.is_precondition() {
            log::debug!("Rejected locally: {}", error);
        } else {
            log::error!("❌ {}", error);
        }
        self.sink.on_status(&error.to_string(), StatusKind::Error);
        error
    }
}

impl<L, P> Synchronizer<L, P>
where
    L: Ledger + 'static,
    P: PresentationSink + 'static,
{
    /// Poll balance (when a wallet is bound) and feed every `period` until the
    /// returned task is aborted.
    pub fn spawn_poller(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let sync = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if sync.address().is_some() {
                    let _ = sync.refresh_balance().await;
                }
                let _ = sync.refresh_feed().await;
            }
        })
    }
}

/// Most recent posts last, as the ledger ordered them
pub fn latest(feed: &[Post], limit: usize) -> &[Post] {
    &feed[feed.len().saturating_sub(limit)..]
}
