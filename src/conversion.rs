//! Credit-to-token conversion.
//!
//! Pure numeric functions turning an NGN credit amount into a
//! human-readable stablecoin amount and token base units. One
//! full-precision human amount feeds both the display path and the
//! settlement path: [`format_display_amount`] is strictly presentational
//! and must never be the source of an on-chain amount.

use crate::errors::{ChainPayError, Result};
use crate::rates::RateCache;
use crate::utils::pow10_u256;
use ethers::types::U256;
use tracing::debug;

/// Precision (decimal places) of the full-precision human amount.
pub const HUMAN_AMOUNT_DECIMALS: u32 = 6;

/// Default precision of the display-formatted amount.
pub const DISPLAY_DECIMALS: u32 = 4;

/// Smallest credit purchase the service accepts, in NGN.
///
/// Enforcement belongs to the caller-facing validation layer (see
/// [`validate_credit_amount`]); the conversion functions themselves do
/// not reject small amounts.
pub const MIN_CREDIT_AMOUNT_NGN: f64 = 50.0;

/// Caller-facing validation: parses a credit amount and checks it against
/// the minimum transaction threshold. UI layers call this before any
/// conversion or transaction submission.
pub fn validate_credit_amount(credit_ngn: &str) -> Result<f64> {
    let amount = parse_amount(credit_ngn)?;
    if amount < MIN_CREDIT_AMOUNT_NGN {
        return Err(ChainPayError::Conversion(format!(
            "credit amount {} is below the minimum of {} NGN",
            amount, MIN_CREDIT_AMOUNT_NGN
        )));
    }
    Ok(amount)
}

/// Converts an NGN credit amount into a human-readable stablecoin amount
/// at [`HUMAN_AMOUNT_DECIMALS`] places, truncated (never rounded up).
///
/// The rate comes from the cache, which absorbs fetch failures through
/// its stale/fallback policy — the only error this function can return
/// is [`ChainPayError::Conversion`] on non-numeric input.
pub async fn credit_to_human_amount(cache: &RateCache, credit_ngn: &str) -> Result<String> {
    let amount = parse_amount(credit_ngn)?;
    let rate = cache.get_rate().await;
    let usd = amount / rate.value;
    let truncated = truncate_decimals(usd, HUMAN_AMOUNT_DECIMALS);
    debug!(
        credit_ngn = amount,
        rate = rate.value,
        estimated = rate.is_estimated(),
        human = %truncated,
        "converted credit to token amount"
    );
    Ok(truncated)
}

/// Rounds a human amount to `decimals` places for display and strips
/// trailing zeros and a trailing decimal point. Returns `"0"` for
/// non-numeric input.
///
/// Presentation-only: on-chain amounts must come from
/// [`to_base_units`] applied to the full-precision human amount.
pub fn format_display_amount(human: &str, decimals: u32) -> String {
    let value = match parse_amount(human) {
        Ok(v) => v,
        Err(_) => return "0".to_string(),
    };

    let formatted = format!("{:.*}", decimals as usize, value);
    if formatted.contains('.') {
        formatted
            .trim_end_matches('0')
            .trim_end_matches('.')
            .to_string()
    } else {
        formatted
    }
}

/// Multiplies the full-precision human amount by `10^token_decimals` and
/// floors to an integer, returned as a decimal string.
///
/// The arithmetic is exact: the decimal string is split into integer and
/// fractional digits and assembled into a `U256`, so no float rounding
/// occurs beyond the documented floor. Returns `"0"` as a sentinel on
/// non-numeric or negative input; callers must re-validate that the
/// result is > 0 before submitting a transaction.
pub fn to_base_units(human: &str, token_decimals: u32) -> String {
    match to_base_units_checked(human, token_decimals) {
        Ok(units) => units.to_string(),
        Err(_) => "0".to_string(),
    }
}

fn to_base_units_checked(human: &str, token_decimals: u32) -> Result<U256> {
    let trimmed = human.trim();
    let (int_part, frac_part) = match trimmed.split_once('.') {
        Some((i, f)) => (i, f),
        None => (trimmed, ""),
    };

    if int_part.is_empty() && frac_part.is_empty() {
        return Err(ChainPayError::Conversion("empty amount".to_string()));
    }
    let digits_only = |s: &str| s.chars().all(|c| c.is_ascii_digit());
    if !digits_only(int_part) || !digits_only(frac_part) {
        return Err(ChainPayError::Conversion(format!(
            "non-numeric amount: {:?}",
            human
        )));
    }

    let int_units = if int_part.is_empty() {
        U256::zero()
    } else {
        U256::from_dec_str(int_part)
            .map_err(|e| ChainPayError::Conversion(format!("amount overflow: {}", e)))?
    };

    // Fractional digits beyond the token's precision are dropped: floor.
    let mut frac = frac_part.to_string();
    frac.truncate(token_decimals as usize);
    while frac.len() < token_decimals as usize {
        frac.push('0');
    }
    let frac_units = if frac.is_empty() {
        U256::zero()
    } else {
        U256::from_dec_str(&frac)
            .map_err(|e| ChainPayError::Conversion(format!("amount overflow: {}", e)))?
    };

    int_units
        .checked_mul(pow10_u256(token_decimals))
        .and_then(|scaled| scaled.checked_add(frac_units))
        .ok_or_else(|| ChainPayError::Conversion("amount overflow".to_string()))
}

fn parse_amount(input: &str) -> Result<f64> {
    let value: f64 = input
        .trim()
        .parse()
        .map_err(|_| ChainPayError::Conversion(format!("non-numeric amount: {:?}", input)))?;
    if !value.is_finite() || value < 0.0 {
        return Err(ChainPayError::Conversion(format!(
            "amount must be a non-negative number, got {}",
            value
        )));
    }
    Ok(value)
}

/// Truncates `value` to `decimals` places without rounding up, so the
/// human amount never overstates what the buyer is charged.
fn truncate_decimals(value: f64, decimals: u32) -> String {
    let scale = 10f64.powi(decimals as i32);
    let floored = (value * scale).floor();
    format!("{:.*}", decimals as usize, floored / scale)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rates::RateCache;
    use crate::types::{ExchangeRate, RateOrigin};

    async fn cache_with_rate(value: f64) -> RateCache {
        let cache = RateCache::new(vec![]);
        cache
            .set(ExchangeRate::new(value, 300, RateOrigin::Fresh))
            .await;
        cache
    }

    #[tokio::test]
    async fn test_credit_to_human_scenario() {
        // 1000 NGN at 1530 NGN/USD = 0.6535947712... USD
        let cache = cache_with_rate(1530.0).await;
        let human = credit_to_human_amount(&cache, "1000").await.unwrap();
        assert_eq!(human, "0.653594");

        let expected = 1000.0 / 1530.0;
        let parsed: f64 = human.parse().unwrap();
        assert!((parsed - expected).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_credit_to_human_rejects_non_numeric() {
        let cache = cache_with_rate(1530.0).await;
        assert!(credit_to_human_amount(&cache, "abc").await.is_err());
        assert!(credit_to_human_amount(&cache, "").await.is_err());
        assert!(credit_to_human_amount(&cache, "-5").await.is_err());
    }

    #[tokio::test]
    async fn test_display_and_settlement_derive_from_one_amount() {
        let cache = cache_with_rate(1530.0).await;
        let human = credit_to_human_amount(&cache, "1000").await.unwrap();

        assert_eq!(format_display_amount(&human, DISPLAY_DECIMALS), "0.6536");
        assert_eq!(to_base_units(&human, 6), "653594");
    }

    #[test]
    fn test_format_display_amount() {
        assert_eq!(format_display_amount("0.653594", 4), "0.6536");
        assert_eq!(format_display_amount("1.5000", 4), "1.5");
        assert_eq!(format_display_amount("2.0000", 4), "2");
        assert_eq!(format_display_amount("0", 4), "0");
        assert_eq!(format_display_amount("not-a-number", 4), "0");
    }

    #[test]
    fn test_to_base_units_floor() {
        assert_eq!(to_base_units("0.653594", 6), "653594");
        assert_eq!(to_base_units("1", 6), "1000000");
        assert_eq!(to_base_units("1.5", 18), "1500000000000000000");
        // Digits beyond the token precision are dropped, not rounded.
        assert_eq!(to_base_units("0.1234567", 6), "123456");
        assert_eq!(to_base_units("0.9999999", 6), "999999");
        assert_eq!(to_base_units("0.000001", 6), "1");
        assert_eq!(to_base_units(".5", 6), "500000");
    }

    #[test]
    fn test_to_base_units_sentinel_on_bad_input() {
        assert_eq!(to_base_units("abc", 6), "0");
        assert_eq!(to_base_units("-1", 6), "0");
        assert_eq!(to_base_units("1.2.3", 6), "0");
        assert_eq!(to_base_units("", 6), "0");
        assert_eq!(to_base_units("1e5", 6), "0");
    }

    #[test]
    fn test_to_base_units_exact_for_short_fractions() {
        // For h with <= d fractional digits the result equals
        // floor(h * 10^d) exactly.
        assert_eq!(to_base_units("12.34", 6), "12340000");
        assert_eq!(to_base_units("0.000000", 6), "0");
        assert_eq!(to_base_units("7", 0), "7");
    }

    #[test]
    fn test_minimum_threshold_is_caller_contract() {
        // 49 NGN is rejected by the validation layer...
        assert!(validate_credit_amount("49").is_err());
        assert_eq!(validate_credit_amount("50").unwrap(), 50.0);
        assert!(validate_credit_amount("forty").is_err());
    }

    #[tokio::test]
    async fn test_conversion_engine_does_not_enforce_threshold() {
        // ...but the engine itself converts any non-negative amount; the
        // boundary lives in validate_credit_amount, not here.
        let cache = cache_with_rate(1530.0).await;
        let human = credit_to_human_amount(&cache, "49").await.unwrap();
        assert!(human.parse::<f64>().unwrap() > 0.0);
    }

    #[tokio::test]
    async fn test_conversion_with_fallback_rate_still_produces_number() {
        // Empty source list: the cache degrades to its fallback constant
        // and conversion still succeeds.
        let cache = RateCache::new(vec![]);
        let human = credit_to_human_amount(&cache, "1000").await.unwrap();
        assert!(human.parse::<f64>().unwrap() > 0.0);
    }
}
