//! Airtime fulfillment client.
//!
//! Calls the external top-up API with an OAuth2 client-credentials bearer
//! token. Every call carries a `customIdentifier` derived from the
//! on-chain transaction ID so the provider can deduplicate retried
//! requests; the client itself never retries — retry policy, if any,
//! belongs to the caller.

use crate::errors::{ChainPayError, Result};
use crate::types::{FulfillmentRequest, TopupReceipt, TransactionDetails};
use crate::utils::current_timestamp;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// Prefix of every provider-facing idempotency key.
pub const CUSTOM_IDENTIFIER_PREFIX: &str = "chainpay";

/// Fixed confirmation message attached to successful fulfillments.
pub const FULFILLMENT_MESSAGE: &str = "Airtime purchase submitted";

/// Timeout for token acquisition and top-up calls.
pub const TOPUP_API_TIMEOUT: Duration = Duration::from_secs(30);

/// Anything that can fulfill a purchase. The event-listener bridge
/// depends on this trait so tests can swap in a recording mock.
#[async_trait]
pub trait Fulfiller: Send + Sync {
    /// Submits one top-up request on behalf of `wallet_address`.
    async fn fulfill(
        &self,
        request: &FulfillmentRequest,
        wallet_address: &str,
    ) -> Result<TransactionDetails>;
}

/// Credentials and endpoints for the top-up provider.
#[derive(Debug, Clone)]
pub struct TopupConfig {
    /// OAuth2 client-credentials token endpoint
    pub auth_url: String,

    /// Top-up endpoint
    pub topup_url: String,

    /// OAuth2 client ID
    pub client_id: String,

    /// OAuth2 client secret
    pub client_secret: String,

    /// OAuth2 audience claim required by the provider
    pub audience: String,

    /// Optional sender phone required by some provider accounts
    pub sender_phone: Option<String>,
}

/// HTTP client for the airtime top-up provider.
///
/// A fresh bearer token is acquired before each top-up call; token
/// caching is a possible optimization, deliberately not done here.
pub struct TopupClient {
    http: Client,
    config: TopupConfig,
}

#[derive(Serialize)]
struct TokenRequest<'a> {
    client_id: &'a str,
    client_secret: &'a str,
    grant_type: &'static str,
    audience: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

impl TopupClient {
    /// Creates a client over the given provider configuration.
    pub fn new(config: TopupConfig) -> Result<Self> {
        let http = Client::builder().timeout(TOPUP_API_TIMEOUT).build()?;
        Ok(Self { http, config })
    }

    /// Acquires a bearer token from the client-credentials endpoint.
    pub async fn get_access_token(&self) -> Result<String> {
        let body = TokenRequest {
            client_id: &self.config.client_id,
            client_secret: &self.config.client_secret,
            grant_type: "client_credentials",
            audience: &self.config.audience,
        };

        let response = self
            .http
            .post(&self.config.auth_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ChainPayError::Auth(format!("token request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChainPayError::Auth(format!(
                "token endpoint returned HTTP {}: {}",
                status, body
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| ChainPayError::Auth(format!("malformed token response: {}", e)))?;

        debug!("acquired top-up API access token");
        Ok(token.access_token)
    }

    /// Submits a top-up request and returns the provider receipt
    /// augmented with the originating wallet address.
    pub async fn purchase_airtime(
        &self,
        request: &FulfillmentRequest,
        wallet_address: &str,
    ) -> Result<TransactionDetails> {
        let token = self.get_access_token().await?;

        let mut outbound = request.clone();
        if outbound.sender_phone.is_none() {
            outbound.sender_phone = self.config.sender_phone.clone();
        }

        let response = self
            .http
            .post(&self.config.topup_url)
            .bearer_auth(token)
            .json(&outbound)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChainPayError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let receipt: TopupReceipt = response.json().await?;
        info!(
            operator_id = request.operator_id,
            amount = request.amount,
            custom_identifier = %request.custom_identifier,
            provider_tx = ?receipt.transaction_id,
            "top-up submitted"
        );

        Ok(TransactionDetails {
            receipt,
            wallet_address: wallet_address.to_string(),
            message: FULFILLMENT_MESSAGE.to_string(),
        })
    }
}

#[async_trait]
impl Fulfiller for TopupClient {
    async fn fulfill(
        &self,
        request: &FulfillmentRequest,
        wallet_address: &str,
    ) -> Result<TransactionDetails> {
        self.purchase_airtime(request, wallet_address).await
    }
}

/// Builds the provider-facing idempotency key: a fixed prefix, the
/// on-chain transaction ID, and a timestamp suffix.
pub fn build_custom_identifier(transaction_id: &str) -> String {
    format!(
        "{}-{}-{}",
        CUSTOM_IDENTIFIER_PREFIX,
        transaction_id,
        current_timestamp()
    )
}
