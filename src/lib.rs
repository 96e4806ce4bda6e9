//! # chainpay-core
//!
//! The core of ChainPay, a blockchain-based bill-payment service: a user
//! buys airtime with a stablecoin, the contract emits a purchase event,
//! and this crate turns NGN credit amounts into token amounts up front
//! and turns emitted events into top-up API calls afterwards.
//!
//! ## Components
//!
//! - **Rate cache** ([`rates`]): a single-slot, TTL-bound cache over
//!   external price providers with retry, a secondary provider, and a
//!   stale/fallback degradation policy. [`rates::RateCache::get_rate`]
//!   never fails — conversions can always produce a number, degraded or
//!   not, and callers can show a "using estimated rate" indicator via
//!   [`types::ExchangeRate::is_estimated`].
//! - **Conversion engine** ([`conversion`]): NGN credit amount → a
//!   full-precision token amount string → token base units. Display
//!   formatting is presentation-only; settlement amounts always derive
//!   from the full-precision amount.
//! - **Retry helper** ([`retry`]): exponential backoff that retries
//!   429/5xx/transport failures and rethrows other client errors
//!   immediately.
//! - **Event-listener bridge** ([`listener`]): WebSocket subscription to
//!   the purchase contract with bounded startup retries, decoded events
//!   flowing over a channel to a consumer that dispatches fulfillments.
//! - **Fulfillment client** ([`fulfillment`]): OAuth2 client-credentials
//!   top-up calls carrying an idempotency key derived from the on-chain
//!   transaction ID.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use chainpay_core::conversion::{credit_to_human_amount, to_base_units};
//! use chainpay_core::rates::{CoinGeckoSource, RateCache};
//! use std::sync::Arc;
//!
//! # async fn example() -> chainpay_core::errors::Result<()> {
//! let cache = RateCache::new(vec![Arc::new(CoinGeckoSource::new("tether")?)]);
//!
//! let human = credit_to_human_amount(&cache, "1000").await?;
//! let base_units = to_base_units(&human, 6); // USDC/USDT decimals
//! assert_ne!(base_units, "0"); // callers must reject zero amounts
//! # Ok(())
//! # }
//! ```
//!
//! The listener binary (`chainpay-listener`) wires the bridge to the
//! fulfillment client; see `src/bin/listener.rs`.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod config;
pub mod conversion;
pub mod errors;
pub mod fulfillment;
pub mod listener;
pub mod rates;
pub mod retry;
pub mod types;
pub mod utils;

// Re-export commonly used items
pub use errors::{ChainPayError, Result};
pub use types::{
    ExchangeRate, FulfillmentRequest, MobileNetwork, PurchaseEvent, RateOrigin, RecipientPhone,
    TopupReceipt, TransactionDetails,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_accessibility() {
        let _ = retry::RetryPolicy::default();
        let _ = rates::RateCache::new(vec![]);
        assert_eq!(MobileNetwork::from_u8(0), Some(MobileNetwork::Mtn));
    }
}
