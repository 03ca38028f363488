//! Faucet configuration

use crate::error::{FaucetError, FaucetResult};
use kol_common::utils::config::{env_var, load_config};
use kol_common::utils::logging::LoggingConfig;
use kol_common::Address;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Value shipped in example env files; treated the same as a missing key
pub const PLACEHOLDER_PRIVATE_KEY: &str = "your_backend_wallet_private_key_here";

/// One disbursed test token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    /// Display symbol, used in logs and metrics
    pub symbol: String,

    /// ERC-20 contract address
    pub address: String,

    /// Amount per request in whole tokens (decimal string, fraction allowed)
    pub amount: String,
}

/// Faucet service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FaucetConfig {
    /// Server address
    pub server_addr: String,

    /// Production mode refuses to start on configuration errors; otherwise the
    /// service starts with disbursement disabled
    pub production: bool,

    /// RPC endpoint for blockchain
    pub rpc_url: String,

    /// Backend wallet private key (hex)
    pub private_key: Option<String>,

    /// Chain id for EIP-155 signing; queried from the node when unset
    pub chain_id: Option<u64>,

    /// First token, sent before the second
    pub token_a: TokenConfig,

    /// Second token
    pub token_b: TokenConfig,

    /// Decimals shared by both tokens
    pub token_decimals: u32,

    /// Rate limit: maximum requests per address per window
    pub max_requests_per_window: u32,

    /// Rate limit: window in seconds, anchored at the first request
    pub rate_limit_window_secs: u64,

    /// Upper bound on tracked rate-limit keys
    pub max_tracked_keys: usize,

    /// Process-wide burst guard; 0 disables it
    pub global_requests_per_minute: u32,

    /// Gas limit for transfer transactions
    pub gas_limit: u64,

    /// Multiplier applied to the live gas price, in percent
    pub gas_price_multiplier_percent: u64,

    /// Gas price used when the live fee query fails (gwei)
    pub fallback_gas_price_gwei: u64,

    /// Delay before the second token send (milliseconds)
    pub send_delay_ms: u64,

    /// Timeout for each call to the RPC endpoint (seconds)
    pub rpc_timeout_secs: u64,

    /// Enable CORS
    pub cors_enabled: bool,

    /// Logging
    pub logging: LoggingConfig,
}

impl Default for FaucetConfig {
    fn default() -> Self {
        Self {
            server_addr: "0.0.0.0:8080".to_string(),
            production: false,
            rpc_url: "https://mainnet.base.org".to_string(),
            private_key: None,
            chain_id: None,
            token_a: TokenConfig {
                symbol: "KOLTEST1".to_string(),
                address: "0x52bc5Caf2520c31a7669A7FAaD0F8E37aF53c5D3".to_string(),
                amount: "100".to_string(),
            },
            token_b: TokenConfig {
                symbol: "KOLTEST2".to_string(),
                address: "0xFe3Ad79f52CD53bf8e948A32936d7d5EB53f00a7".to_string(),
                amount: "100".to_string(),
            },
            token_decimals: 18,
            max_requests_per_window: 1,
            rate_limit_window_secs: 86400, // 24 hours
            max_tracked_keys: 100_000,
            global_requests_per_minute: 60,
            gas_limit: 100_000,
            gas_price_multiplier_percent: 120,
            fallback_gas_price_gwei: 20,
            send_delay_ms: 1000,
            rpc_timeout_secs: 30,
            cors_enabled: true,
            logging: LoggingConfig::default(),
        }
    }
}

impl FaucetConfig {
    /// Load from environment variables with defaults
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Load from an optional config file, then apply environment overrides
    pub fn load(path: Option<&str>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => load_config::<Self, _>(path)?,
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Override fields from environment variables
    pub fn apply_env(&mut self) {
        if let Some(addr) = env_var("FAUCET_SERVER_ADDR") {
            self.server_addr = addr;
        } else if let Some(port) = env_var("PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.server_addr = format!("0.0.0.0:{}", port);
            }
        }

        if let Some(env) = env_var("NODE_ENV") {
            self.production = env == "production";
        }

        if let Some(rpc_url) = env_var("FAUCET_RPC_URL").or_else(|| env_var("RPC_URL")) {
            self.rpc_url = rpc_url;
        }

        if let Some(key) =
            env_var("FAUCET_PRIVATE_KEY").or_else(|| env_var("BACKEND_WALLET_PRIVATE_KEY"))
        {
            self.private_key = Some(key);
        }

        if let Some(chain_id) = env_var("FAUCET_CHAIN_ID") {
            self.chain_id = chain_id.parse().ok().or(self.chain_id);
        }

        if let Some(address) = env_var("KOLTEST1_ADDRESS") {
            self.token_a.address = address;
        }

        if let Some(address) = env_var("KOLTEST2_ADDRESS") {
            self.token_b.address = address;
        }

        if let Some(amount) = env_var("FAUCET_AMOUNT_KOLTEST1") {
            self.token_a.amount = amount;
        }

        if let Some(amount) = env_var("FAUCET_AMOUNT_KOLTEST2") {
            self.token_b.amount = amount;
        }

        if let Some(max_req) = env_var("FAUCET_MAX_REQUESTS") {
            self.max_requests_per_window = max_req.parse().unwrap_or(self.max_requests_per_window);
        }

        if let Some(window) = env_var("FAUCET_RATE_LIMIT_WINDOW") {
            self.rate_limit_window_secs = window.parse().unwrap_or(self.rate_limit_window_secs);
        }

        if let Some(per_minute) = env_var("FAUCET_GLOBAL_REQUESTS_PER_MINUTE") {
            self.global_requests_per_minute =
                per_minute.parse().unwrap_or(self.global_requests_per_minute);
        }

        if let Some(delay) = env_var("FAUCET_SEND_DELAY_MS") {
            self.send_delay_ms = delay.parse().unwrap_or(self.send_delay_ms);
        }

        if let Some(timeout) = env_var("FAUCET_RPC_TIMEOUT") {
            self.rpc_timeout_secs = timeout.parse().unwrap_or(self.rpc_timeout_secs);
        }

        if let Some(level) = env_var("FAUCET_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Some(format) = env_var("FAUCET_LOG_FORMAT") {
            self.logging.format = format;
        }
    }

    /// Check the settings disbursement depends on
    pub fn validate(&self) -> FaucetResult<()> {
        match self.private_key.as_deref().map(str::trim) {
            None | Some("") => {
                return Err(FaucetError::Configuration(
                    "BACKEND_WALLET_PRIVATE_KEY is not configured".to_string(),
                ))
            }
            Some(PLACEHOLDER_PRIVATE_KEY) => {
                return Err(FaucetError::Configuration(
                    "BACKEND_WALLET_PRIVATE_KEY still holds the placeholder value".to_string(),
                ))
            }
            Some(_) => {}
        }

        for token in [&self.token_a, &self.token_b] {
            token.address.parse::<Address>().map_err(|e| {
                FaucetError::Configuration(format!(
                    "{} contract address {:?} is invalid: {}",
                    token.symbol, token.address, e
                ))
            })?;
        }

        if self.max_requests_per_window == 0 {
            return Err(FaucetError::Configuration(
                "max_requests_per_window must be at least 1".to_string(),
            ));
        }

        if self.rate_limit_window_secs == 0 {
            return Err(FaucetError::Configuration(
                "rate_limit_window_secs must be positive".to_string(),
            ));
        }

        if self.server_addr.parse::<std::net::SocketAddr>().is_err() {
            return Err(FaucetError::Configuration(format!(
                "server_addr {:?} is not a socket address",
                self.server_addr
            )));
        }

        Ok(())
    }

    /// Get rate limit duration
    pub fn rate_limit_duration(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }

    /// Delay between the two token sends
    pub fn send_delay(&self) -> Duration {
        Duration::from_millis(self.send_delay_ms)
    }

    /// Per-call RPC timeout
    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }

    /// Fallback gas price in wei
    pub fn fallback_gas_price(&self) -> u128 {
        self.fallback_gas_price_gwei as u128 * 1_000_000_000
    }
}
