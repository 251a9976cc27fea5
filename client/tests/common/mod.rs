//! Shared fixtures: an in-memory ledger, a recording sink and an HTTP ledger
//! served by axum on a random local port.
#![allow(dead_code)]

use async_trait::async_trait;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use postcoin_client::ledger_client::{
    BalanceResponse, FaucetResponse, GenerateAddressResponse, HomeResponse, PostsResponse,
    SubmitPostResponse,
};
use postcoin_client::{ClientError, Ledger, Post, PresentationSink, StatusKind};
use postcoin_economics::{compute_cost, EconomicState};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

// ============================================================================
// In-memory ledger
// ============================================================================

#[derive(Default)]
pub struct MockLedger {
    pub balances: Mutex<HashMap<String, u64>>,
    pub posts: Mutex<Vec<Post>>,
    pub devices: Mutex<HashMap<String, String>>,
    /// Operations that fail as if the ledger were unreachable
    pub offline: Mutex<HashSet<&'static str>>,
    pub faucet_error: Mutex<Option<String>>,
    pub post_error: Mutex<Option<String>>,
    pub generate_error: Mutex<Option<String>>,
    /// When set, `submit_post` waits for a notification before answering
    pub submit_gate: Mutex<Option<Arc<Notify>>>,
    /// When set, `request_faucet` waits for a notification before answering
    pub faucet_gate: Mutex<Option<Arc<Notify>>>,
    calls: Mutex<Vec<&'static str>>,
    next_address: AtomicUsize,
}

impl MockLedger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_balance(self: &Arc<Self>, address: &str, balance: u64) -> Arc<Self> {
        self.balances
            .lock()
            .unwrap()
            .insert(address.to_string(), balance);
        Arc::clone(self)
    }

    pub fn with_posts(self: &Arc<Self>, count: usize) -> Arc<Self> {
        let mut posts = self.posts.lock().unwrap();
        for i in 0..count {
            posts.push(sample_post("addr_seed", &format!("seed post {}", i), i as i64));
        }
        drop(posts);
        Arc::clone(self)
    }

    pub fn set_offline(&self, op: &'static str) {
        self.offline.lock().unwrap().insert(op);
    }

    pub fn set_online(&self, op: &'static str) {
        self.offline.lock().unwrap().remove(op);
    }

    pub fn calls(&self, op: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| **c == op).count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn enter(&self, op: &'static str) -> Result<(), ClientError> {
        self.calls.lock().unwrap().push(op);
        if self.offline.lock().unwrap().contains(op) {
            Err(ClientError::Unavailable)
        } else {
            Ok(())
        }
    }
}

pub fn sample_post(address: &str, content: &str, timestamp: i64) -> Post {
    Post {
        id: None,
        address: address.to_string(),
        content: content.to_string(),
        timestamp,
        cost: None,
    }
}

#[async_trait]
impl Ledger for MockLedger {
    async fn generate_address(
        &self,
        device_id: &str,
    ) -> Result<GenerateAddressResponse, ClientError> {
        self.enter("generate_address")?;
        if let Some(error) = self.generate_error.lock().unwrap().clone() {
            return Ok(GenerateAddressResponse {
                error: Some(error),
                ..Default::default()
            });
        }

        let mut devices = self.devices.lock().unwrap();
        if let Some(address) = devices.get(device_id) {
            return Ok(GenerateAddressResponse {
                success: true,
                address: Some(address.clone()),
                existing: Some(true),
                message: Some("Welcome back! Using your existing address.".to_string()),
                error: None,
            });
        }

        let n = self.next_address.fetch_add(1, Ordering::SeqCst);
        let address = format!("addr_{}_mock", 1_700_000_000_000u64 + n as u64);
        devices.insert(device_id.to_string(), address.clone());
        self.balances.lock().unwrap().insert(address.clone(), 0);
        Ok(GenerateAddressResponse {
            success: true,
            address: Some(address),
            existing: Some(false),
            message: Some("New wallet created!".to_string()),
            error: None,
        })
    }

    async fn get_balance(&self, address: &str) -> Result<BalanceResponse, ClientError> {
        self.enter("get_balance")?;
        Ok(BalanceResponse {
            address: Some(address.to_string()),
            balance: self.balances.lock().unwrap().get(address).copied(),
        })
    }

    async fn request_faucet(&self, address: &str) -> Result<FaucetResponse, ClientError> {
        self.enter("request_faucet")?;
        let gate = self.faucet_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        if let Some(error) = self.faucet_error.lock().unwrap().clone() {
            return Ok(FaucetResponse {
                error: Some(error),
                ..Default::default()
            });
        }
        *self
            .balances
            .lock()
            .unwrap()
            .entry(address.to_string())
            .or_insert(0) += 100;
        Ok(FaucetResponse {
            success: Some(true),
            message: Some(format!("100 coins sent to {}", address)),
            amount: Some(100),
            error: None,
        })
    }

    async fn submit_post(
        &self,
        address: &str,
        content: &str,
        cost: u64,
    ) -> Result<SubmitPostResponse, ClientError> {
        self.enter("submit_post")?;
        let gate = self.submit_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        if let Some(error) = self.post_error.lock().unwrap().clone() {
            return Ok(SubmitPostResponse {
                error: Some(error),
                ..Default::default()
            });
        }

        let mut posts = self.posts.lock().unwrap();
        let mut balances = self.balances.lock().unwrap();
        let balance = balances.entry(address.to_string()).or_insert(0);
        *balance = balance.saturating_sub(cost);
        let timestamp = 1_700_000_000 + posts.len() as i64;
        posts.push(sample_post(address, content, timestamp));
        Ok(SubmitPostResponse {
            success: true,
            message: Some("post created".to_string()),
            cost: Some(cost),
            new_balance: Some(*balance),
            ..Default::default()
        })
    }

    async fn list_posts(&self) -> Result<PostsResponse, ClientError> {
        self.enter("list_posts")?;
        let posts = self.posts.lock().unwrap().clone();
        let total = posts.len() as u64;
        Ok(PostsResponse {
            posts,
            total: Some(total),
            next_post_cost: Some(compute_cost(total)),
        })
    }

    async fn home(&self) -> Result<HomeResponse, ClientError> {
        self.enter("home")?;
        Ok(HomeResponse {
            message: Some("Welcome to PyChain".to_string()),
        })
    }
}

// ============================================================================
// Recording sink
// ============================================================================

#[derive(Default)]
pub struct RecordingSink {
    pub states: Mutex<Vec<EconomicState>>,
    pub feeds: Mutex<Vec<Vec<Post>>>,
    pub statuses: Mutex<Vec<(String, StatusKind)>>,
    pub drafts_cleared: AtomicUsize,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn last_status(&self) -> Option<(String, StatusKind)> {
        self.statuses.lock().unwrap().last().cloned()
    }

    pub fn errors(&self) -> Vec<String> {
        self.statuses
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, kind)| *kind == StatusKind::Error)
            .map(|(message, _)| message.clone())
            .collect()
    }

    pub fn state_count(&self) -> usize {
        self.states.lock().unwrap().len()
    }
}

impl PresentationSink for RecordingSink {
    fn on_state_changed(&self, state: &EconomicState) {
        self.states.lock().unwrap().push(*state);
    }

    fn on_feed_changed(&self, feed: &[Post]) {
        self.feeds.lock().unwrap().push(feed.to_vec());
    }

    fn on_status(&self, message: &str, kind: StatusKind) {
        self.statuses
            .lock()
            .unwrap()
            .push((message.to_string(), kind));
    }

    fn clear_draft(&self) {
        self.drafts_cleared.fetch_add(1, Ordering::SeqCst);
    }
}

// ============================================================================
// HTTP ledger
// ============================================================================

const FAUCET_AMOUNT: u64 = 100;
const BURN_ADDRESS: &str = "POST_FEE";

#[derive(Default)]
struct ServerState {
    balances: HashMap<String, i64>,
    devices: HashMap<String, String>,
    faucet_used: HashSet<String>,
    posts: Vec<Value>,
}

type Shared = Arc<Mutex<ServerState>>;

fn next_cost(state: &ServerState) -> u64 {
    compute_cost(state.posts.len() as u64)
}

async fn home() -> Json<Value> {
    Json(json!({ "message": "Welcome to PyChain" }))
}

async fn generate_address(
    State(shared): State<Shared>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let Some(device_id) = body["device_id"].as_str().filter(|d| !d.is_empty()) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Device ID required" })),
        );
    };

    let mut state = shared.lock().unwrap();
    if let Some(address) = state.devices.get(device_id) {
        return (
            StatusCode::OK,
            Json(json!({
                "address": address,
                "success": true,
                "existing": true,
                "message": "Welcome back! Using your existing address."
            })),
        );
    }

    let created_ms = 1_729_331_234_567u64 + state.devices.len() as u64;
    let address = format!("addr_{}_{:08x}", created_ms, 0x9c1d2e3fu32);
    state.devices.insert(device_id.to_string(), address.clone());
    (
        StatusCode::OK,
        Json(json!({
            "address": address,
            "success": true,
            "existing": false,
            "message": "New wallet created!"
        })),
    )
}

async fn balance(State(shared): State<Shared>, Path(address): Path<String>) -> Json<Value> {
    let state = shared.lock().unwrap();
    let balance = state.balances.get(&address).copied().unwrap_or(0);
    Json(json!({ "address": address, "balance": balance }))
}

async fn faucet(
    State(shared): State<Shared>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let Some(address) = body["address"].as_str().filter(|a| !a.is_empty()) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Address required" })),
        );
    };

    let mut state = shared.lock().unwrap();
    if !state.faucet_used.insert(address.to_string()) {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({ "error": "Faucet cooldown. Try again in 1 minute." })),
        );
    }
    *state.balances.entry(address.to_string()).or_insert(0) += FAUCET_AMOUNT as i64;
    (
        StatusCode::OK,
        Json(json!({
            "message": format!("{} coins sent to {}", FAUCET_AMOUNT, address),
            "success": true,
            "amount": FAUCET_AMOUNT
        })),
    )
}

async fn create_post(
    State(shared): State<Shared>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let address = body["address"].as_str().unwrap_or_default().to_string();
    let content = body["content"].as_str().unwrap_or_default().to_string();
    if address.is_empty() || content.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Address and content required" })),
        );
    }

    let mut state = shared.lock().unwrap();
    let cost = next_cost(&state);
    let balance = state.balances.get(&address).copied().unwrap_or(0);
    if balance < cost as i64 {
        return (
            StatusCode::FORBIDDEN,
            Json(json!({ "error": "Insufficient balance", "needed": cost, "balance": balance })),
        );
    }

    *state.balances.entry(address.clone()).or_insert(0) -= cost as i64;
    *state.balances.entry(BURN_ADDRESS.to_string()).or_insert(0) += cost as i64;
    let index = state.posts.len();
    state.posts.push(json!({
        "id": format!("post-{}", index),
        "address": address,
        "content": content,
        "timestamp": 1_729_331_234.5 + index as f64,
        "cost": cost
    }));
    let new_balance = state.balances[&address];
    (
        StatusCode::CREATED,
        Json(json!({
            "message": "post created",
            "success": true,
            "cost": cost,
            "new_balance": new_balance
        })),
    )
}

async fn list_posts(State(shared): State<Shared>) -> Json<Value> {
    let state = shared.lock().unwrap();
    Json(json!({
        "posts": state.posts,
        "total": state.posts.len(),
        "next_post_cost": next_cost(&state)
    }))
}

/// Serve a ledger with the same routes and error bodies as the real service.
///
/// Returns the base URL.
pub async fn spawn_ledger_server() -> String {
    let shared: Shared = Arc::new(Mutex::new(ServerState::default()));
    let app = Router::new()
        .route("/api/home", get(home))
        .route("/generate-address", post(generate_address))
        .route("/balance/{address}", get(balance))
        .route("/faucet", post(faucet))
        .route("/post", post(create_post))
        .route("/posts", get(list_posts))
        .with_state(shared);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

/// An address nothing listens on
pub async fn closed_endpoint() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}
