//! Environment-backed configuration for the listener host process.
//!
//! The core treats contract address, RPC URL, and API credentials as
//! opaque configuration values; this module loads them from the
//! environment and validates that every required value is present and
//! well-formed before anything connects.

use crate::errors::{ChainPayError, Result};
use crate::fulfillment::TopupConfig;
use crate::listener::ListenerConfig;
use crate::utils::parse_address;
use url::Url;

const DEFAULT_AUTH_URL: &str = "https://auth.reloadly.com/oauth/token";
const DEFAULT_TOPUP_URL: &str = "https://topups.reloadly.com/topups";
const DEFAULT_AUDIENCE: &str = "https://topups.reloadly.com";

/// Everything the listener binary needs to run.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Chain connection and contract settings
    pub listener: ListenerConfig,

    /// Top-up provider credentials and endpoints
    pub topup: TopupConfig,
}

impl Settings {
    /// Loads settings from the environment.
    ///
    /// Required: `RPC_URL` (ws:// or wss://), `CONTRACT_ADDRESS`,
    /// `TOPUP_CLIENT_ID`, `TOPUP_CLIENT_SECRET`. Optional:
    /// `TOPUP_AUTH_URL`, `TOPUP_URL`, `TOPUP_AUDIENCE`, `SENDER_PHONE`.
    pub fn from_env() -> Result<Self> {
        let rpc_url = require_env("RPC_URL")?;
        let parsed = Url::parse(&rpc_url)?;
        if parsed.scheme() != "ws" && parsed.scheme() != "wss" {
            return Err(ChainPayError::Config(format!(
                "RPC_URL must be a ws:// or wss:// endpoint, got {}",
                parsed.scheme()
            )));
        }

        let contract_address = parse_address(&require_env("CONTRACT_ADDRESS")?)?;

        let topup = TopupConfig {
            auth_url: optional_env("TOPUP_AUTH_URL").unwrap_or_else(|| DEFAULT_AUTH_URL.to_string()),
            topup_url: optional_env("TOPUP_URL").unwrap_or_else(|| DEFAULT_TOPUP_URL.to_string()),
            client_id: require_env("TOPUP_CLIENT_ID")?,
            client_secret: require_env("TOPUP_CLIENT_SECRET")?,
            audience: optional_env("TOPUP_AUDIENCE").unwrap_or_else(|| DEFAULT_AUDIENCE.to_string()),
            sender_phone: optional_env("SENDER_PHONE"),
        };

        Ok(Self {
            listener: ListenerConfig::new(rpc_url, contract_address),
            topup,
        })
    }
}

fn require_env(name: &str) -> Result<String> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ChainPayError::Config(format!(
            "missing required environment variable {}",
            name
        ))),
    }
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
