//! Common test utilities and mock implementations

#![allow(dead_code)]

use async_trait::async_trait;
use ethabi::Uint;
use kol_common::{Address, TxHash};
use kol_faucet::{ChainClient, FaucetConfig, FaucetError, FaucetResult, FaucetService};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

pub const TEST_PRIVATE_KEY: &str =
    "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

pub const RECIPIENT: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";

/// Mock chain for testing
pub struct MockChain {
    /// Pending nonce reported for the backend account
    pub pending_nonce: u64,
    /// Gas price reported by the node
    pub gas_price: Option<u128>,
    /// 1-based index of the send that fails, if any
    pub fail_send: Option<usize>,
    /// 1-based index of the send that never answers, if any
    pub stall_send: Option<usize>,
    /// Captured raw transactions for verification
    pub sent: Arc<Mutex<Vec<Vec<u8>>>>,
    /// Every RPC call, in order
    pub calls: Arc<Mutex<Vec<&'static str>>>,
    send_attempts: AtomicUsize,
}

impl MockChain {
    pub fn new() -> Self {
        Self {
            pending_nonce: 0,
            gas_price: Some(1_000_000_000),
            fail_send: None,
            stall_send: None,
            sent: Arc::new(Mutex::new(Vec::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
            send_attempts: AtomicUsize::new(0),
        }
    }

    pub fn with_pending_nonce(mut self, nonce: u64) -> Self {
        self.pending_nonce = nonce;
        self
    }

    pub fn failing_send(mut self, attempt: usize) -> Self {
        self.fail_send = Some(attempt);
        self
    }

    pub fn stalling_send(mut self, attempt: usize) -> Self {
        self.stall_send = Some(attempt);
        self
    }

    pub async fn send_calls(&self) -> usize {
        self.calls
            .lock()
            .await
            .iter()
            .filter(|method| **method == "eth_sendRawTransaction")
            .count()
    }

    pub async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }

    pub async fn call_count(&self) -> usize {
        self.calls.lock().await.len()
    }

    async fn record(&self, method: &'static str) {
        self.calls.lock().await.push(method);
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn chain_id(&self) -> FaucetResult<u64> {
        self.record("eth_chainId").await;
        Ok(84532)
    }

    async fn pending_nonce(&self, _account: &Address) -> FaucetResult<u64> {
        self.record("eth_getTransactionCount").await;
        Ok(self.pending_nonce)
    }

    async fn gas_price(&self) -> FaucetResult<Option<u128>> {
        self.record("eth_gasPrice").await;
        Ok(self.gas_price)
    }

    async fn balance(&self, _account: &Address) -> FaucetResult<Uint> {
        self.record("eth_getBalance").await;
        Ok(Uint::exp10(18))
    }

    async fn call(&self, _to: &Address, _data: &[u8]) -> FaucetResult<Vec<u8>> {
        self.record("eth_call").await;
        Ok(ethabi::encode(&[ethabi::Token::Uint(Uint::exp10(21))]))
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> FaucetResult<TxHash> {
        self.record("eth_sendRawTransaction").await;
        let attempt = self.send_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if self.stall_send == Some(attempt) {
            futures::future::pending::<()>().await;
        }
        if self.fail_send == Some(attempt) {
            return Err(FaucetError::RpcError(
                "insufficient funds for gas * price + value".to_string(),
            ));
        }
        self.sent.lock().await.push(raw.to_vec());
        Ok(TxHash::of(raw))
    }
}

/// Configuration with a usable key and no send delay
pub fn test_config() -> FaucetConfig {
    FaucetConfig {
        private_key: Some(TEST_PRIVATE_KEY.to_string()),
        chain_id: Some(84532),
        send_delay_ms: 0,
        rpc_timeout_secs: 5,
        ..Default::default()
    }
}

pub fn service_with(config: &FaucetConfig, chain: Arc<MockChain>) -> Arc<FaucetService> {
    Arc::new(FaucetService::from_config(config, chain).unwrap())
}
