//! Core type definitions for ChainPay.
//!
//! This module contains the data structures shared across the conversion
//! engine, the rate cache, the event-listener bridge, and the fulfillment
//! client: exchange rates, decoded purchase events, and the outbound
//! top-up request/response shapes.

use chrono::{DateTime, Duration, Utc};
use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Where the rate served by [`crate::rates::RateCache`] came from.
///
/// Anything other than `Fresh` means the caller is working with an
/// estimate and should surface a "using estimated rate" indicator.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateOrigin {
    /// Fetched from a live provider within the TTL window
    Fresh,
    /// A previously fetched value served past its TTL because every
    /// refetch attempt failed
    StaleCache,
    /// The hardcoded fallback constant; no provider was ever reachable
    Fallback,
}

/// A single NGN-per-stablecoin exchange rate with its freshness window.
///
/// Created only by a successful external fetch (or the fallback path) and
/// replaced wholesale, never partially updated.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ExchangeRate {
    /// NGN per one unit of the reference stablecoin. Always > 0.
    pub value: f64,

    /// When the rate was fetched
    #[serde(rename = "fetchedAt")]
    pub fetched_at: DateTime<Utc>,

    /// `fetched_at` + TTL; the rate is served without I/O until then
    #[serde(rename = "expiresAt")]
    pub expires_at: DateTime<Utc>,

    /// Provenance of the value, for "estimated rate" display decisions
    pub origin: RateOrigin,
}

impl ExchangeRate {
    /// Creates a rate valid for `ttl_secs` from now.
    pub fn new(value: f64, ttl_secs: i64, origin: RateOrigin) -> Self {
        let now = Utc::now();
        Self {
            value,
            fetched_at: now,
            expires_at: now + Duration::seconds(ttl_secs),
            origin,
        }
    }

    /// Returns `true` while the TTL window is still open.
    pub fn is_fresh(&self) -> bool {
        Utc::now() < self.expires_at
    }

    /// Returns `true` if the value did not come from a live fetch within
    /// its TTL and should be presented as an estimate.
    pub fn is_estimated(&self) -> bool {
        self.origin != RateOrigin::Fresh
    }
}

/// Mobile carrier encoded in the on-chain purchase event.
///
/// The contract emits a `uint8` in 0..=3; anything else is unmapped and
/// the event must be skipped without crashing the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MobileNetwork {
    /// MTN Nigeria (enum 0)
    Mtn,
    /// Airtel Nigeria (enum 1)
    Airtel,
    /// Glo Nigeria (enum 2)
    Glo,
    /// 9mobile Nigeria (enum 3)
    NineMobile,
}

impl MobileNetwork {
    /// Maps the on-chain network enum to a carrier, or `None` if the
    /// value has no known mapping.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Mtn),
            1 => Some(Self::Airtel),
            2 => Some(Self::Glo),
            3 => Some(Self::NineMobile),
            _ => None,
        }
    }

    /// Operator ID used by the top-up provider to select this carrier.
    pub fn operator_id(&self) -> u32 {
        match self {
            Self::Mtn => 341,
            Self::Airtel => 342,
            Self::Glo => 344,
            Self::NineMobile => 340,
        }
    }

    /// Human-readable carrier name, for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Mtn => "MTN",
            Self::Airtel => "Airtel",
            Self::Glo => "Glo",
            Self::NineMobile => "9mobile",
        }
    }
}

/// A purchase decoded from the contract's `AirtimePurchased` log.
///
/// Consumed at most once per instance by the fulfillment client; there is
/// no local persistence. Idempotency across retries is provided by the
/// provider-side custom identifier, not by the bridge.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PurchaseEvent {
    /// On-chain transaction identifier assigned by the contract
    #[serde(rename = "transactionId")]
    pub transaction_id: U256,

    /// Buyer's wallet address
    pub user: Address,

    /// Recipient phone number as submitted on-chain (may carry a `+`)
    #[serde(rename = "phoneNumber")]
    pub phone_number: String,

    /// Token amount paid, in base units
    #[serde(rename = "tokenAmount")]
    pub token_amount: U256,

    /// Mobile network enum (expected 0..=3)
    pub network: u8,

    /// ERC-20 token the purchase was paid with
    #[serde(rename = "tokenAddress")]
    pub token_address: Address,

    /// Block timestamp of the purchase, seconds since the epoch
    pub timestamp: u64,

    /// Credit amount in NGN-pegged credit units
    #[serde(rename = "creditAmount")]
    pub credit_amount: U256,
}

/// Recipient phone number split the way the top-up API expects it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RecipientPhone {
    /// ISO country code (e.g., "NG")
    #[serde(rename = "countryCode")]
    pub country_code: String,

    /// Subscriber number without a leading `+`
    pub number: String,
}

impl RecipientPhone {
    /// Builds a recipient phone from a raw on-chain number, stripping a
    /// leading `+` if present.
    pub fn from_msisdn(raw: &str, country_code: &str) -> Self {
        Self {
            country_code: country_code.to_string(),
            number: raw.trim().trim_start_matches('+').to_string(),
        }
    }
}

/// Outbound top-up request body for the airtime provider.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct FulfillmentRequest {
    /// Provider operator ID selecting the mobile network
    #[serde(rename = "operatorId")]
    pub operator_id: u32,

    /// Top-up amount; in local currency when `use_local_amount` is set
    pub amount: f64,

    /// Interpret `amount` in the recipient's local currency (NGN)
    #[serde(rename = "useLocalAmount")]
    pub use_local_amount: bool,

    /// Provider-facing idempotency key derived from the on-chain
    /// transaction ID
    #[serde(rename = "customIdentifier")]
    pub custom_identifier: String,

    /// Recipient phone number
    #[serde(rename = "recipientPhone")]
    pub recipient_phone: RecipientPhone,

    /// Optional sender phone required by some provider accounts
    #[serde(rename = "senderPhone", skip_serializing_if = "Option::is_none")]
    pub sender_phone: Option<String>,
}

/// Raw top-up response returned by the provider.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct TopupReceipt {
    /// Provider-side transaction ID
    #[serde(rename = "transactionId", skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<i64>,

    /// Provider status string (e.g., "SUCCESSFUL", "PROCESSING")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    /// Carrier-side reference, when the provider relays one
    #[serde(
        rename = "operatorTransactionId",
        skip_serializing_if = "Option::is_none"
    )]
    pub operator_transaction_id: Option<String>,

    /// Remaining provider fields, kept verbatim
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Result of a fulfilled purchase: the provider receipt augmented with
/// the originating wallet and a fixed human-readable message.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TransactionDetails {
    /// Provider receipt as returned by the top-up endpoint
    pub receipt: TopupReceipt,

    /// Wallet address that paid for the purchase on-chain
    #[serde(rename = "walletAddress")]
    pub wallet_address: String,

    /// Fixed confirmation message
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_exchange_rate_freshness() {
        let rate = ExchangeRate::new(1530.0, 300, RateOrigin::Fresh);
        assert!(rate.is_fresh());
        assert!(!rate.is_estimated());

        let expired = ExchangeRate::new(1530.0, -1, RateOrigin::Fresh);
        assert!(!expired.is_fresh());

        let fallback = ExchangeRate::new(1530.0, 0, RateOrigin::Fallback);
        assert!(fallback.is_estimated());
    }

    #[test]
    fn test_network_enum_mapping() {
        assert_eq!(MobileNetwork::from_u8(0), Some(MobileNetwork::Mtn));
        assert_eq!(MobileNetwork::from_u8(1), Some(MobileNetwork::Airtel));
        assert_eq!(MobileNetwork::from_u8(2), Some(MobileNetwork::Glo));
        assert_eq!(MobileNetwork::from_u8(3), Some(MobileNetwork::NineMobile));
        assert_eq!(MobileNetwork::from_u8(4), None);
        assert_eq!(MobileNetwork::from_u8(255), None);
    }

    #[test]
    fn test_operator_ids_are_distinct() {
        let ids: Vec<u32> = (0u8..4)
            .map(|n| MobileNetwork::from_u8(n).unwrap().operator_id())
            .collect();
        let mut deduped = ids.clone();
        deduped.sort_unstable();
        deduped.dedup();
        assert_eq!(ids.len(), deduped.len());
    }

    #[test]
    fn test_phone_normalization() {
        let phone = RecipientPhone::from_msisdn("+2348012345678", "NG");
        assert_eq!(phone.number, "2348012345678");
        assert_eq!(phone.country_code, "NG");

        let already_bare = RecipientPhone::from_msisdn("2348012345678", "NG");
        assert_eq!(already_bare.number, "2348012345678");
    }

    #[test]
    fn test_fulfillment_request_wire_names() {
        let request = FulfillmentRequest {
            operator_id: 341,
            amount: 1000.0,
            use_local_amount: true,
            custom_identifier: "chainpay-7-1700000000".to_string(),
            recipient_phone: RecipientPhone::from_msisdn("+2348012345678", "NG"),
            sender_phone: None,
        };

        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("operatorId"));
        assert!(json.contains("useLocalAmount"));
        assert!(json.contains("customIdentifier"));
        assert!(json.contains("recipientPhone"));
        assert!(json.contains("countryCode"));
        assert!(!json.contains("senderPhone"));
    }

    #[test]
    fn test_topup_receipt_keeps_unknown_fields() {
        let body = json!({
            "transactionId": 99,
            "status": "SUCCESSFUL",
            "deliveredAmount": 1000.0,
            "deliveredAmountCurrencyCode": "NGN"
        });

        let receipt: TopupReceipt = serde_json::from_value(body).unwrap();
        assert_eq!(receipt.transaction_id, Some(99));
        assert_eq!(receipt.status.as_deref(), Some("SUCCESSFUL"));
        assert_eq!(receipt.extra["deliveredAmount"], 1000.0);
    }

    #[test]
    fn test_purchase_event_serialization() {
        let event = PurchaseEvent {
            transaction_id: U256::from(7u64),
            user: Address::zero(),
            phone_number: "+2348012345678".to_string(),
            token_amount: U256::from(653_594u64),
            network: 0,
            token_address: Address::zero(),
            timestamp: 1_700_000_000,
            credit_amount: U256::from(1000u64),
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("transactionId"));
        assert!(json.contains("tokenAmount"));
        assert!(json.contains("creditAmount"));

        let back: PurchaseEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.network, 0);
        assert_eq!(back.credit_amount, U256::from(1000u64));
    }
}
