//! Small helpers shared across modules.

use crate::errors::{ChainPayError, Result};
use ethers::types::{Address, U256};
use std::str::FromStr;

/// Validates and parses an EVM address (with or without 0x prefix).
pub fn parse_address(addr: &str) -> Result<Address> {
    Address::from_str(addr)
        .map_err(|e| ChainPayError::Config(format!("invalid address {}: {}", addr, e)))
}

/// `10^exp` as a U256. Panics above 10^77, far beyond any token's
/// decimals.
pub fn pow10_u256(exp: u32) -> U256 {
    U256::from(10u8).pow(U256::from(exp))
}

/// Current Unix timestamp in seconds.
pub fn current_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
