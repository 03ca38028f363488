//! Faucet service core logic

use crate::config::FaucetConfig;
use crate::disburse::TokenDisburser;
use crate::error::{FaucetError, FaucetResult};
use crate::gas::GasPolicy;
use crate::metrics::{outcome, FaucetMetrics};
use crate::rate_limit::{FixedWindowLimiter, GlobalLimiter, RateLimitStore};
use crate::rpc::ChainClient;
use crate::token::TokenHandle;
use crate::wallet::Wallet;
use chrono::Utc;
use ethabi::Uint;
use kol_common::{Address, TxHash};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Outcome of a faucet request that reached disbursement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaucetResponse {
    pub success: bool,
    pub message: String,
    #[serde(rename = "txHash1", skip_serializing_if = "Option::is_none")]
    pub tx_hash1: Option<TxHash>,
    #[serde(rename = "txHash2", skip_serializing_if = "Option::is_none")]
    pub tx_hash2: Option<TxHash>,
}

/// Faucet service
pub struct FaucetService {
    limiter: Arc<dyn RateLimitStore>,
    global_limiter: Option<GlobalLimiter>,
    /// `None` while the service runs degraded
    disburser: Option<TokenDisburser>,
    unavailable_reason: Option<String>,
    tokens: [TokenHandle; 2],
    send_delay: Duration,
    metrics: FaucetMetrics,
}

impl FaucetService {
    /// Build the service from configuration.
    ///
    /// A configuration error is returned in production mode. Otherwise it is
    /// logged and the service starts with disbursement disabled.
    pub fn from_config(config: &FaucetConfig, chain: Arc<dyn ChainClient>) -> FaucetResult<Self> {
        let metrics = FaucetMetrics::new()
            .map_err(|e| FaucetError::InternalError(format!("metrics registry: {}", e)))?;

        let setup = config.validate().and_then(|_| {
            let tokens = [
                TokenHandle::from_config(&config.token_a, config.token_decimals)?,
                TokenHandle::from_config(&config.token_b, config.token_decimals)?,
            ];
            let wallet = Wallet::from_hex(config.private_key.as_deref().unwrap_or_default())?;
            Ok((tokens, wallet))
        });

        let (tokens, disburser, unavailable_reason) = match setup {
            Ok((tokens, wallet)) => {
                info!("Faucet wallet address: {}", wallet.address());
                let gas = GasPolicy {
                    gas_limit: config.gas_limit,
                    multiplier_percent: config.gas_price_multiplier_percent,
                    fallback_gas_price: config.fallback_gas_price(),
                };
                let disburser = TokenDisburser::new(
                    chain,
                    wallet,
                    gas,
                    config.chain_id,
                    config.rpc_timeout(),
                );
                (tokens, Some(disburser), None)
            }
            Err(e) if config.production => {
                error!("Refusing to start faucet: {}", e);
                return Err(e);
            }
            Err(e) => {
                warn!("Faucet disbursement disabled: {}", e);
                let tokens = [
                    degraded_token(&config.token_a.symbol, &config.token_a.address),
                    degraded_token(&config.token_b.symbol, &config.token_b.address),
                ];
                (tokens, None, Some(e.to_string()))
            }
        };

        for token in &tokens {
            info!(
                "{} at {}: {} per request",
                token.symbol,
                token.address,
                token.display_amount()
            );
        }

        Ok(Self {
            limiter: Arc::new(FixedWindowLimiter::new(
                config.rate_limit_duration(),
                config.max_requests_per_window,
                config.max_tracked_keys,
            )),
            global_limiter: GlobalLimiter::per_minute(config.global_requests_per_minute),
            disburser,
            unavailable_reason,
            tokens,
            send_delay: config.send_delay(),
            metrics,
        })
    }

    /// Replace the in-memory rate-limit windows with another store
    pub fn with_rate_limit_store(mut self, store: Arc<dyn RateLimitStore>) -> Self {
        self.limiter = store;
        self
    }

    /// Handle one faucet request for `user_address`.
    ///
    /// Validation, configuration and rate-limit rejections happen before any
    /// chain access. A failed send is reported with the hashes of the sends
    /// that went through, and the request still counts against the quota.
    pub async fn dispense(&self, user_address: &str) -> FaucetResult<FaucetResponse> {
        let result = self.process(user_address).await;

        let label = match &result {
            Ok(_) => outcome::SUCCESS,
            Err(FaucetError::InvalidAddress(_) | FaucetError::InvalidRequest(_)) => outcome::INVALID,
            Err(FaucetError::RateLimitExceeded(_)) => outcome::RATE_LIMITED,
            Err(FaucetError::Configuration(_)) => outcome::UNAVAILABLE,
            Err(_) => outcome::FAILED,
        };
        self.metrics.record_request(label);

        result
    }

    async fn process(&self, user_address: &str) -> FaucetResult<FaucetResponse> {
        let recipient = parse_recipient(user_address)?;
        let key = recipient.to_lower_hex();

        let disburser = match &self.disburser {
            Some(disburser) => disburser,
            None => {
                return Err(FaucetError::Configuration(
                    self.unavailable_reason
                        .clone()
                        .unwrap_or_else(|| "faucet is disabled".to_string()),
                ))
            }
        };

        if self.tokens.iter().all(|token| token.amount.is_zero()) {
            return Err(FaucetError::Configuration(
                "Faucet amounts are not configured correctly (or are zero).".to_string(),
            ));
        }

        let now_ms = Utc::now().timestamp_millis();

        // Addresses already served are turned away before they can draw on
        // the shared budget
        if !self.limiter.is_allowed(&key, now_ms).await {
            let retry_after = self.limiter.retry_after(&key, now_ms).await;
            info!("Rate limit exceeded for {}", key);
            return Err(FaucetError::RateLimitExceeded(retry_after));
        }

        if let Some(global) = &self.global_limiter {
            if !global.check() {
                warn!("Global faucet rate limit hit");
                return Err(FaucetError::RateLimitExceeded(60));
            }
        }

        // Still checked: a concurrent request for the same address may have
        // recorded its window since the peek above
        if !self.limiter.check_and_record(&key, now_ms).await {
            let retry_after = self.limiter.retry_after(&key, now_ms).await;
            info!("Rate limit exceeded for {}", key);
            return Err(FaucetError::RateLimitExceeded(retry_after));
        }

        info!("Attempting to send tokens to {}", recipient);
        let started = Instant::now();
        let result = self.disburse(disburser, &recipient).await;
        self.metrics.record_disbursement(started.elapsed());
        result
    }

    async fn disburse(
        &self,
        disburser: &TokenDisburser,
        recipient: &Address,
    ) -> FaucetResult<FaucetResponse> {
        let mut hashes: [Option<TxHash>; 2] = [None, None];

        for (i, token) in self.tokens.iter().enumerate() {
            if token.amount.is_zero() {
                debug!("Skipping {}: amount is zero", token.symbol);
                continue;
            }

            if hashes.iter().any(Option::is_some) && !self.send_delay.is_zero() {
                tokio::time::sleep(self.send_delay).await;
            }

            match disburser.send_token(token, recipient, token.amount).await {
                Ok(hash) => {
                    info!("{} sent. Tx hash: {}", token.symbol, hash);
                    self.metrics.record_send(&token.symbol);
                    hashes[i] = Some(hash);
                }
                Err(e) => {
                    error!("Faucet error for {}: {}", recipient, e);
                    self.metrics.record_send_failure();
                    return Err(FaucetError::PartialDisbursement {
                        message: format!("Failed to send tokens: {}", e),
                        tx_hash1: hashes[0],
                        tx_hash2: hashes[1],
                    });
                }
            }
        }

        Ok(FaucetResponse {
            success: true,
            message: "Tokens sent successfully.".to_string(),
            tx_hash1: hashes[0],
            tx_hash2: hashes[1],
        })
    }

    /// Whether requests can be served
    pub fn is_available(&self) -> bool {
        self.disburser.is_some()
    }

    /// Why disbursement is disabled, when it is
    pub fn unavailable_reason(&self) -> Option<&str> {
        self.unavailable_reason.as_deref()
    }

    pub fn tokens(&self) -> &[TokenHandle] {
        &self.tokens
    }

    pub fn metrics(&self) -> &FaucetMetrics {
        &self.metrics
    }

    /// Backend wallet address, when configured
    pub fn sender(&self) -> Option<Address> {
        self.disburser.as_ref().map(TokenDisburser::sender)
    }

    /// Log backend wallet balances; no-op while degraded
    pub async fn log_balances(&self) {
        match &self.disburser {
            Some(disburser) => disburser.log_balances(&self.tokens).await,
            None => warn!("Skipping wallet balance check: faucet is disabled"),
        }
    }
}

/// Recipients must be `0x`-prefixed; mixed case must carry a valid checksum.
///
/// Stricter than `ethers.isAddress`, which also takes bare 40-digit hex.
fn parse_recipient(user_address: &str) -> FaucetResult<Address> {
    let user_address = user_address.trim();
    if !user_address.starts_with("0x") {
        return Err(FaucetError::InvalidAddress(format!(
            "{:?} is missing the 0x prefix",
            user_address
        )));
    }
    user_address
        .parse::<Address>()
        .map_err(|e| FaucetError::InvalidAddress(format!("{:?}: {}", user_address, e)))
}

fn degraded_token(symbol: &str, address: &str) -> TokenHandle {
    TokenHandle {
        symbol: symbol.to_string(),
        address: address.parse().unwrap_or_else(|_| Address::zero()),
        amount: Uint::zero(),
        decimals: 0,
    }
}
