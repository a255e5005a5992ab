//! HTTP client for the rating backend
//!
//! Endpoints:
//! - `GET  /items/block?cohort=<tag>&count=<n>` → `{success, items, timestamp}`
//! - `POST /comparisons` `{winnerId, loserId, isDraw}` → `{success, message?}`
//! - `GET  /leaderboards/<kind>` → `{entries, metadata}` (404 while unpublished)
//! - `GET  <media reference>` → image bytes
//!
//! A bearer token is attached when the identity provider (or the configured
//! static token) has one; anonymous requests go without.

use async_trait::async_trait;
use hotlympics_common::config::ApiConfig;
use hotlympics_common::leaderboard::LeaderboardResponse;
use hotlympics_common::models::{BlockResponse, SubmitResponse};
use hotlympics_common::{BoardKind, Cohort, ComparisonOutcome, Item, Leaderboard};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::{LeaderboardSource, MediaFetcher, PairSource, RatingService};
use crate::error::{FetchError, FetchResult};
use crate::identity::IdentityProvider;

const USER_AGENT: &str = concat!("hotlympics-rater/", env!("CARGO_PKG_VERSION"));
const BLOCK_PATH: &str = "/items/block";
const COMPARISONS_PATH: &str = "/comparisons";
const LEADERBOARDS_PATH: &str = "/leaderboards";

/// Rating backend client
pub struct ApiClient {
    http_client: reqwest::Client,
    base_url: String,
    static_token: Option<String>,
    identity: Option<Arc<dyn IdentityProvider>>,
}

impl ApiClient {
    pub fn new(config: &ApiConfig) -> FetchResult<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            static_token: config.bearer_token.clone(),
            identity: None,
        })
    }

    /// Use `provider` for bearer tokens (takes precedence over the static token)
    pub fn with_identity(mut self, provider: Arc<dyn IdentityProvider>) -> Self {
        self.identity = Some(provider);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Media references are absolute URLs; server-relative paths hang off the base URL
    fn media_url(&self, reference: &str) -> String {
        if reference.starts_with('/') {
            self.endpoint(reference)
        } else {
            reference.to_string()
        }
    }

    async fn bearer_token(&self) -> Option<String> {
        if let Some(provider) = &self.identity {
            if let Some(token) = provider.bearer_token().await {
                return Some(token);
            }
        }
        self.static_token.clone()
    }

    async fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match self.bearer_token().await {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

/// Map non-200 responses to `Status`
async fn expect_ok(response: Response) -> FetchResult<Response> {
    let status = response.status();
    if status == StatusCode::OK {
        return Ok(response);
    }
    let error_text = response.text().await.unwrap_or_default();
    Err(FetchError::Status(status.as_u16(), error_text))
}

/// Read the whole body, then parse, so decode errors stay distinct from transport errors
async fn decode_body<T: DeserializeOwned>(response: Response) -> FetchResult<T> {
    let body = response.bytes().await?;
    serde_json::from_slice(&body).map_err(|e| FetchError::Decode(e.to_string()))
}

#[async_trait]
impl PairSource for ApiClient {
    async fn fetch_block(&self, cohort: Cohort, count: usize) -> FetchResult<Vec<Item>> {
        let url = self.endpoint(BLOCK_PATH);
        debug!(cohort = %cohort, count, url = %url, "Requesting item block");

        let count_param = count.to_string();
        let request = self
            .http_client
            .get(&url)
            .query(&[("cohort", cohort.as_str()), ("count", count_param.as_str())]);
        let response = self.authorized(request).await.send().await?;
        let block: BlockResponse = decode_body(expect_ok(response).await?).await?;

        if !block.success {
            return Err(FetchError::Rejected("block request returned success=false".to_string()));
        }

        debug!(cohort = %cohort, received = block.items.len(), "Item block received");
        Ok(block.items)
    }
}

#[async_trait]
impl RatingService for ApiClient {
    async fn submit_comparison(&self, outcome: &ComparisonOutcome) -> FetchResult<()> {
        let url = self.endpoint(COMPARISONS_PATH);
        debug!(winner = %outcome.winner_id, loser = %outcome.loser_id, "Posting comparison");

        let request = self.http_client.post(&url).json(outcome);
        let response = self.authorized(request).await.send().await?;
        let ack: SubmitResponse = decode_body(expect_ok(response).await?).await?;

        if ack.success {
            Ok(())
        } else {
            Err(FetchError::Rejected(
                ack.message
                    .unwrap_or_else(|| "comparison returned success=false".to_string()),
            ))
        }
    }
}

#[async_trait]
impl LeaderboardSource for ApiClient {
    async fn fetch_leaderboard(&self, kind: BoardKind) -> FetchResult<Leaderboard> {
        let url = format!("{}/{}", self.endpoint(LEADERBOARDS_PATH), kind.as_str());
        debug!(board = %kind, url = %url, "Requesting leaderboard");

        let request = self.http_client.get(&url);
        let response = self.authorized(request).await.send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!(board = %kind, "Leaderboard not published yet");
            return Ok(Leaderboard::empty(kind));
        }
        let body: LeaderboardResponse = decode_body(expect_ok(response).await?).await?;

        let board = Leaderboard::from_response(kind, body);
        debug!(board = %kind, entries = board.entries.len(), "Leaderboard received");
        Ok(board)
    }
}

#[async_trait]
impl MediaFetcher for ApiClient {
    async fn fetch_media(&self, reference: &str) -> FetchResult<Vec<u8>> {
        let url = self.media_url(reference);
        let response = expect_ok(self.http_client.get(&url).send().await?).await?;
        let bytes = response.bytes().await?;
        debug!(url = %url, size = bytes.len(), "Media fetched");
        Ok(bytes.to_vec())
    }
}
