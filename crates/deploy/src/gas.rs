//! Gas price selection for deployment transactions.

use alloy_core::primitives::U256;
use serde::{Deserialize, Serialize};

/// Percentage applied to the observed network gas price.
pub const GAS_PRICE_BUMP_PERCENT: u64 = 110;

/// How the gas price of a deployment transaction is chosen.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum GasPricePolicy {
    /// Query `eth_gasPrice` and bump it by [`GAS_PRICE_BUMP_PERCENT`].
    #[default]
    Bumped,
    /// Use the gas price configured for the network.
    Configured,
}

/// Inflate an observed gas price to reduce the chance of a stuck transaction.
///
/// Returns `floor(observed * 110 / 100)`.
pub fn inflate_gas_price(observed: U256) -> U256 {
    observed.saturating_mul(U256::from(GAS_PRICE_BUMP_PERCENT)) / U256::from(100u64)
}

/// Format a wei amount as gwei with up to 9 decimals, e.g. `11.5`.
pub fn format_gwei(wei: U256) -> String {
    let gwei = U256::from(1_000_000_000u64);
    let whole = wei / gwei;
    let frac = wei % gwei;
    if frac.is_zero() {
        return whole.to_string();
    }
    let frac = format!("{:09}", frac.to::<u64>());
    format!("{}.{}", whole, frac.trim_end_matches('0'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inflate_ten_gwei() {
        assert_eq!(
            inflate_gas_price(U256::from(10_000_000_000u64)),
            U256::from(11_000_000_000u64)
        );
    }

    #[test]
    fn test_inflate_rounds_down() {
        // 7 * 110 / 100 = 7.7
        assert_eq!(inflate_gas_price(U256::from(7u64)), U256::from(7u64));
        assert_eq!(inflate_gas_price(U256::from(19u64)), U256::from(20u64));
        assert_eq!(inflate_gas_price(U256::ZERO), U256::ZERO);
    }

    #[test]
    fn test_inflate_saturates() {
        assert_eq!(inflate_gas_price(U256::MAX), U256::MAX / U256::from(100u64));
    }

    #[test]
    fn test_format_gwei() {
        assert_eq!(format_gwei(U256::from(11_000_000_000u64)), "11");
        assert_eq!(format_gwei(U256::from(1_500_000_000u64)), "1.5");
        assert_eq!(format_gwei(U256::from(1u64)), "0.000000001");
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!("bumped".parse::<GasPricePolicy>().unwrap(), GasPricePolicy::Bumped);
        assert_eq!(
            "configured".parse::<GasPricePolicy>().unwrap(),
            GasPricePolicy::Configured
        );
        assert!("fast".parse::<GasPricePolicy>().is_err());
    }
}
