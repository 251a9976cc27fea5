//! HTTP client for the ledger service
//!
//! This is a thin boundary: one request, one response, no retries. Error
//! responses from the ledger still carry a JSON body, so bodies are parsed
//! regardless of status and the caller decides what a missing field means.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// The remote operations the synchronizer depends on
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Bind (or look up) the wallet address for a device
    async fn generate_address(
        &self,
        device_id: &str,
    ) -> Result<GenerateAddressResponse, ClientError>;

    async fn get_balance(&self, address: &str) -> Result<BalanceResponse, ClientError>;

    async fn request_faucet(&self, address: &str) -> Result<FaucetResponse, ClientError>;

    async fn submit_post(
        &self,
        address: &str,
        content: &str,
        cost: u64,
    ) -> Result<SubmitPostResponse, ClientError>;

    async fn list_posts(&self) -> Result<PostsResponse, ClientError>;

    /// Liveness probe
    async fn home(&self) -> Result<HomeResponse, ClientError>;
}

#[async_trait]
impl<L: Ledger + ?Sized> Ledger for Arc<L> {
    async fn generate_address(
        &self,
        device_id: &str,
    ) -> Result<GenerateAddressResponse, ClientError> {
        (**self).generate_address(device_id).await
    }

    async fn get_balance(&self, address: &str) -> Result<BalanceResponse, ClientError> {
        (**self).get_balance(address).await
    }

    async fn request_faucet(&self, address: &str) -> Result<FaucetResponse, ClientError> {
        (**self).request_faucet(address).await
    }

    async fn submit_post(
        &self,
        address: &str,
        content: &str,
        cost: u64,
    ) -> Result<SubmitPostResponse, ClientError> {
        (**self).submit_post(address, content, cost).await
    }

    async fn list_posts(&self) -> Result<PostsResponse, ClientError> {
        (**self).list_posts().await
    }

    async fn home(&self) -> Result<HomeResponse, ClientError> {
        (**self).home().await
    }
}

#[derive(Debug, Clone)]
pub struct LedgerClient {
    endpoint: String,
    client: Client,
}

impl LedgerClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::with_timeouts(endpoint, Duration::from_secs(30), Duration::from_secs(10))
    }

    pub fn with_timeouts(
        endpoint: impl Into<String>,
        request_timeout: Duration,
        connect_timeout: Duration,
    ) -> Self {
        let endpoint = endpoint.into().trim_end_matches('/').to_string();
        let client = Client::builder()
            .timeout(request_timeout)
            .connect_timeout(connect_timeout)
            .build()
            .expect("Failed to create HTTP client");

        log::info!("📡 Ledger client initialized: {}", endpoint);
        Self { endpoint, client }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn send(request: RequestBuilder) -> Result<Response, ClientError> {
        request.send().await.map_err(ClientError::from_transport)
    }

    /// Parse a JSON body of type `T`, whatever the status code.
    ///
    /// Falls back to `ClientError::Http` only when a non-2xx body is not the
    /// expected JSON (e.g. an HTML error page).
    async fn decode<T: DeserializeOwned>(response: Response, what: &str) -> Result<T, ClientError> {
        let status = response.status();
        let body = response.bytes().await.map_err(ClientError::from_transport)?;

        match serde_json::from_slice::<T>(&body) {
            Ok(parsed) => {
                if !status.is_success() {
                    log::warn!("⚠️ {} answered {}", what, status);
                }
                Ok(parsed)
            }
            Err(e) if status.is_success() => {
                log::error!("❌ {} returned malformed body: {}", what, e);
                Err(ClientError::InvalidResponse(format!("{}: {}", what, e)))
            }
            Err(_) => {
                log::error!("❌ {} failed: {}", what, status);
                Err(ClientError::http(status.as_u16()))
            }
        }
    }
}

#[async_trait]
impl Ledger for LedgerClient {
    async fn generate_address(
        &self,
        device_id: &str,
    ) -> Result<GenerateAddressResponse, ClientError> {
        let url = format!("{}/generate-address", self.endpoint);
        log::debug!("→ POST {}", url);

        let body = serde_json::json!({ "device_id": device_id });
        let response = Self::send(self.client.post(&url).json(&body)).await?;
        let result: GenerateAddressResponse = Self::decode(response, "Address generation").await?;

        if let Some(address) = &result.address {
            log::info!(
                "✅ Address for device: {} (existing: {})",
                address,
                result.existing.unwrap_or(false)
            );
        }
        Ok(result)
    }

    async fn get_balance(&self, address: &str) -> Result<BalanceResponse, ClientError> {
        let url = format!("{}/balance/{}", self.endpoint, address);
        log::debug!("→ GET {}", url);

        let response = Self::send(self.client.get(&url)).await?;
        let balance: BalanceResponse = Self::decode(response, "Balance fetch").await?;
        log::debug!("✅ Balance retrieved: {:?}", balance);
        Ok(balance)
    }

    async fn request_faucet(&self, address: &str) -> Result<FaucetResponse, ClientError> {
        let url = format!("{}/faucet", self.endpoint);
        log::debug!("→ POST {}", url);

        let body = serde_json::json!({ "address": address });
        let response = Self::send(self.client.post(&url).json(&body)).await?;
        Self::decode(response, "Faucet request").await
    }

    async fn submit_post(
        &self,
        address: &str,
        content: &str,
        cost: u64,
    ) -> Result<SubmitPostResponse, ClientError> {
        let url = format!("{}/post", self.endpoint);
        log::debug!("→ POST {} (cost: {})", url, cost);

        let body = serde_json::json!({
            "address": address,
            "content": content,
            "cost": cost,
        });
        let response = Self::send(self.client.post(&url).json(&body)).await?;
        Self::decode(response, "Post submission").await
    }

    async fn list_posts(&self) -> Result<PostsResponse, ClientError> {
        let url = format!("{}/posts", self.endpoint);
        log::debug!("→ GET {}", url);

        let response = Self::send(self.client.get(&url)).await?;
        let feed: PostsResponse = Self::decode(response, "Feed fetch").await?;
        log::debug!("✅ Retrieved {} posts", feed.posts.len());
        Ok(feed)
    }

    async fn home(&self) -> Result<HomeResponse, ClientError> {
        let url = format!("{}/api/home", self.endpoint);
        log::debug!("→ GET {}", url);

        let response = Self::send(self.client.get(&url)).await?;
        Self::decode(response, "Health check").await
    }
}

// ============================================================================
// Data Structures
// ============================================================================

/// A published post as reported by the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub address: String,
    pub content: String,
    /// Unix seconds
    #[serde(deserialize_with = "unix_seconds")]
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<u64>,
}

/// Ordered posts exactly as the ledger returned them
pub type FeedSnapshot = Vec<Post>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerateAddressResponse {
    pub success: bool,
    pub address: Option<String>,
    pub existing: Option<bool>,
    pub message: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BalanceResponse {
    pub address: Option<String>,
    #[serde(deserialize_with = "coin_amount")]
    pub balance: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FaucetResponse {
    pub success: Option<bool>,
    pub message: Option<String>,
    #[serde(deserialize_with = "coin_amount")]
    pub amount: Option<u64>,
    pub error: Option<String>,
}

impl FaucetResponse {
    /// An explicit `success` flag wins; otherwise a `message` means a payout
    pub fn succeeded(&self) -> bool {
        match self.success {
            Some(success) => success,
            None => self.message.is_some() && self.error.is_none(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SubmitPostResponse {
    pub success: bool,
    pub message: Option<String>,
    pub error: Option<String>,
    pub cost: Option<u64>,
    #[serde(deserialize_with = "coin_amount")]
    pub new_balance: Option<u64>,
    #[serde(deserialize_with = "coin_amount")]
    pub needed: Option<u64>,
    #[serde(deserialize_with = "coin_amount")]
    pub balance: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostsResponse {
    pub posts: FeedSnapshot,
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub next_post_cost: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HomeResponse {
    pub message: Option<String>,
}

/// First of `error` / `message` that the ledger filled in
pub fn failure_message<'a>(
    error: &'a Option<String>,
    message: &'a Option<String>,
) -> Option<&'a str> {
    error.as_deref().or(message.as_deref())
}

/// JSON number the ledger may send as an integer or a float
#[derive(Deserialize)]
#[serde(untagged)]
enum Number {
    Whole(i64),
    Fractional(f64),
}

fn unix_seconds<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Number::deserialize(deserializer)? {
        Number::Whole(seconds) => seconds,
        Number::Fractional(seconds) => seconds.trunc() as i64,
    })
}

/// Coin figures from the ledger's transaction sums, which can go negative or
/// fractional. Clamped to whole non-negative coins.
fn coin_amount<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Number>::deserialize(deserializer)?.map(|amount| match amount {
        Number::Whole(coins) => coins.max(0) as u64,
        Number::Fractional(coins) => coins.max(0.0).floor() as u64,
    }))
}

// ============================================================================
// Error Handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP error {0}: {1}")]
    Http(u16, String),

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Network timeout")]
    Timeout,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Ledger unavailable")]
    Unavailable,
}

impl ClientError {
    pub fn http(status: u16) -> Self {
        let message = match status {
            400 => "Bad Request",
            403 => "Forbidden",
            404 => "Not Found",
            429 => "Too Many Requests",
            500 => "Internal Server Error",
            503 => "Service Unavailable",
            _ => "Unknown Error",
        };
        Self::Http(status, message.to_string())
    }

    fn from_transport(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else {
            Self::Request(error)
        }
    }

    /// The ledger could not be reached at all, as opposed to answering badly
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Request(_) | Self::Timeout | Self::Unavailable)
    }
}
