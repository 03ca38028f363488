//! Blockchain RPC access
//!
//! `ChainClient` is the seam between the faucet and the node: the service only
//! ever talks to the chain through it, and tests substitute an in-memory mock.

use crate::error::{FaucetError, FaucetResult};
use async_trait::async_trait;
use ethabi::Uint;
use kol_common::{Address, TxHash};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

/// Operations the faucet needs from an Ethereum-compatible node
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// `eth_chainId`
    async fn chain_id(&self) -> FaucetResult<u64>;

    /// Next nonce for `account`, counting pending transactions
    async fn pending_nonce(&self, account: &Address) -> FaucetResult<u64>;

    /// Current gas price in wei, `None` when the node reports none
    async fn gas_price(&self) -> FaucetResult<Option<u128>>;

    /// Native balance in wei
    async fn balance(&self, account: &Address) -> FaucetResult<Uint>;

    /// Read-only contract call at the latest block
    async fn call(&self, to: &Address, data: &[u8]) -> FaucetResult<Vec<u8>>;

    /// Submit a signed transaction, returning its hash
    async fn send_raw_transaction(&self, raw: &[u8]) -> FaucetResult<TxHash>;
}

/// JSON-RPC over HTTP
pub struct JsonRpcClient {
    rpc_url: String,
    client: reqwest::Client,
    timeout: Duration,
    next_id: AtomicU64,
}

impl JsonRpcClient {
    pub fn new(rpc_url: String, timeout: Duration) -> FaucetResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FaucetError::InternalError(format!("HTTP client: {}", e)))?;

        Ok(Self {
            rpc_url,
            client,
            timeout,
            next_id: AtomicU64::new(1),
        })
    }

    async fn request(&self, method: &str, params: Value) -> FaucetResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let payload = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": id
        });

        debug!(method, id, "RPC request");

        let response = self
            .client
            .post(&self.rpc_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FaucetError::Timeout {
                        operation: method.to_string(),
                        seconds: self.timeout.as_secs(),
                    }
                } else {
                    FaucetError::RpcError(format!("{} request failed: {}", method, e))
                }
            })?;

        let json: Value = response
            .json()
            .await
            .map_err(|e| FaucetError::RpcError(format!("{} invalid response: {}", method, e)))?;

        if let Some(error) = json.get("error") {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string());
            return Err(FaucetError::RpcError(format!("{}: {}", method, message)));
        }

        Ok(json.get("result").cloned().unwrap_or(Value::Null))
    }
}

#[async_trait]
impl ChainClient for JsonRpcClient {
    async fn chain_id(&self) -> FaucetResult<u64> {
        let result = self.request("eth_chainId", json!([])).await?;
        parse_u64(&result)
    }

    async fn pending_nonce(&self, account: &Address) -> FaucetResult<u64> {
        let result = self
            .request(
                "eth_getTransactionCount",
                json!([account.to_lower_hex(), "pending"]),
            )
            .await?;
        parse_u64(&result)
    }

    async fn gas_price(&self) -> FaucetResult<Option<u128>> {
        let result = self.request("eth_gasPrice", json!([])).await?;
        if result.is_null() {
            return Ok(None);
        }
        parse_u128(&result).map(Some)
    }

    async fn balance(&self, account: &Address) -> FaucetResult<Uint> {
        let result = self
            .request("eth_getBalance", json!([account.to_lower_hex(), "latest"]))
            .await?;
        parse_uint(&result)
    }

    async fn call(&self, to: &Address, data: &[u8]) -> FaucetResult<Vec<u8>> {
        let result = self
            .request(
                "eth_call",
                json!([{ "to": to.to_lower_hex(), "data": format!("0x{}", hex::encode(data)) }, "latest"]),
            )
            .await?;
        parse_bytes(&result)
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> FaucetResult<TxHash> {
        let result = self
            .request(
                "eth_sendRawTransaction",
                json!([format!("0x{}", hex::encode(raw))]),
            )
            .await?;

        match result.as_str() {
            Some(s) => s
                .parse()
                .map_err(|e| FaucetError::RpcError(format!("bad transaction hash {:?}: {}", s, e))),
            // Some nodes answer with null on success; the hash is derivable
            None => Ok(TxHash::of(raw)),
        }
    }
}

fn quantity_str(value: &Value) -> FaucetResult<&str> {
    value
        .as_str()
        .map(|s| s.trim_start_matches("0x"))
        .ok_or_else(|| FaucetError::RpcError(format!("expected hex quantity, got {}", value)))
}

/// Parse a hex quantity such as `"0x1a"`
pub fn parse_u64(value: &Value) -> FaucetResult<u64> {
    let s = quantity_str(value)?;
    if s.is_empty() {
        return Ok(0);
    }
    u64::from_str_radix(s, 16)
        .map_err(|e| FaucetError::RpcError(format!("bad quantity {:?}: {}", s, e)))
}

pub fn parse_u128(value: &Value) -> FaucetResult<u128> {
    let s = quantity_str(value)?;
    if s.is_empty() {
        return Ok(0);
    }
    u128::from_str_radix(s, 16)
        .map_err(|e| FaucetError::RpcError(format!("bad quantity {:?}: {}", s, e)))
}

pub fn parse_uint(value: &Value) -> FaucetResult<Uint> {
    let s = quantity_str(value)?;
    if s.is_empty() {
        return Ok(Uint::zero());
    }
    Uint::from_str_radix(s, 16)
        .map_err(|e| FaucetError::RpcError(format!("bad quantity {:?}: {:?}", s, e)))
}

pub fn parse_bytes(value: &Value) -> FaucetResult<Vec<u8>> {
    let s = quantity_str(value)?;
    hex::decode(s).map_err(|e| FaucetError::RpcError(format!("bad hex data: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_quantities() {
        assert_eq!(parse_u64(&json!("0x1a")).unwrap(), 26);
        assert_eq!(parse_u64(&json!("0x")).unwrap(), 0);
        assert_eq!(parse_u128(&json!("0x4a817c800")).unwrap(), 20_000_000_000);
        assert_eq!(
            parse_uint(&json!("0x56bc75e2d63100000")).unwrap(),
            Uint::from(100u64) * Uint::exp10(18)
        );
    }

    #[test]
    fn test_parse_rejects_non_strings() {
        assert!(parse_u64(&json!(26)).is_err());
        assert!(parse_u64(&Value::Null).is_err());
        assert!(parse_u64(&json!("0xzz")).is_err());
    }

    #[test]
    fn test_parse_bytes() {
        assert_eq!(parse_bytes(&json!("0x00ff")).unwrap(), vec![0x00, 0xff]);
        assert!(parse_bytes(&json!("0x0")).is_err());
    }

    #[tokio::test]
    async fn test_unreachable_node_is_rpc_error() {
        let client =
            JsonRpcClient::new("http://127.0.0.1:1".to_string(), Duration::from_secs(2)).unwrap();
        let err = client.chain_id().await.unwrap_err();
        assert!(err.is_external());
    }
}
