//! Shared building blocks for the KOL referral services: account and
//! transaction identifiers, logging setup and configuration loading.

pub mod types;
pub mod utils;

pub use types::{Address, AddressError, TxHash};
