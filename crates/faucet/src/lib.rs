//! Test token faucet for the KOL referral dApp
//!
//! Sends a fixed amount of two ERC-20 test tokens to a requesting address,
//! at most once per address per rate-limit window:
//! - Fixed-window per-address rate limiting with a global burst guard
//! - Nonce sequencing for the single backend account
//! - Live gas pricing with a fixed fallback
//! - Partial-failure reporting with the hashes of completed sends

pub mod api;
pub mod config;
pub mod disburse;
pub mod error;
pub mod gas;
pub mod metrics;
pub mod nonce;
pub mod rate_limit;
pub mod rpc;
pub mod service;
pub mod token;
pub mod wallet;

pub use config::{FaucetConfig, TokenConfig};
pub use error::{FaucetError, FaucetResult};
pub use rate_limit::{FixedWindowLimiter, GlobalLimiter, RateLimitStore};
pub use rpc::{ChainClient, JsonRpcClient};
pub use service::{FaucetResponse, FaucetService};
