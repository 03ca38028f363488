//! Gas price and limit policy for faucet transfers

use crate::error::FaucetResult;
use serde::{Serialize, Serializer};
use std::future::Future;
use tracing::warn;

/// Gas limit for an ERC-20 transfer
pub const DEFAULT_GAS_LIMIT: u64 = 100_000;

/// Live gas price is scaled by this many percent
pub const DEFAULT_MULTIPLIER_PERCENT: u64 = 120;

/// 20 gwei
pub const FALLBACK_GAS_PRICE: u128 = 20_000_000_000;

/// Gas parameters for one transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GasSettings {
    pub gas_limit: u64,
    /// Wei per gas unit, serialized as a decimal string
    #[serde(serialize_with = "decimal_string")]
    pub gas_price: u128,
}

fn decimal_string<S: Serializer>(value: &u128, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

/// Gas policy configuration
#[derive(Debug, Clone)]
pub struct GasPolicy {
    pub gas_limit: u64,
    pub multiplier_percent: u64,
    pub fallback_gas_price: u128,
}

impl Default for GasPolicy {
    fn default() -> Self {
        Self {
            gas_limit: DEFAULT_GAS_LIMIT,
            multiplier_percent: DEFAULT_MULTIPLIER_PERCENT,
            fallback_gas_price: FALLBACK_GAS_PRICE,
        }
    }
}

impl GasPolicy {
    /// Settings for the next send.
    ///
    /// `query_gas_price` returns the node's current gas price. An error, a
    /// missing value or an overflowing product all fall back to the fixed
    /// price; this never fails.
    pub async fn compute_gas_settings<F, Fut>(&self, query_gas_price: F) -> GasSettings
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = FaucetResult<Option<u128>>>,
    {
        let scaled = match query_gas_price().await {
            Ok(Some(price)) => price
                .checked_mul(self.multiplier_percent as u128)
                .map(|p| p / 100),
            Ok(None) => {
                warn!("Node returned no gas price, using fallback");
                None
            }
            Err(e) => {
                warn!("Error getting gas price, using fallback: {}", e);
                None
            }
        };

        GasSettings {
            gas_limit: self.gas_limit,
            gas_price: scaled.unwrap_or(self.fallback_gas_price),
        }
    }
}
