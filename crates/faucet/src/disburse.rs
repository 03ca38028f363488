//! Token disbursement from the backend wallet

use crate::error::{FaucetError, FaucetResult};
use crate::gas::GasPolicy;
use crate::nonce::NonceSequencer;
use crate::rpc::ChainClient;
use crate::token::{decode_uint, encode_balance_of, encode_transfer, format_units, TokenHandle};
use crate::wallet::{LegacyTransaction, Wallet};
use ethabi::Uint;
use kol_common::{Address, TxHash};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{error, info, warn};

/// Signs and submits ERC-20 transfers from the backend wallet
pub struct TokenDisburser {
    chain: Arc<dyn ChainClient>,
    wallet: Wallet,
    nonces: NonceSequencer,
    gas: GasPolicy,
    chain_id: OnceCell<u64>,
    call_timeout: Duration,
}

impl TokenDisburser {
    /// `chain_id` is queried from the node on first use when `None`
    pub fn new(
        chain: Arc<dyn ChainClient>,
        wallet: Wallet,
        gas: GasPolicy,
        chain_id: Option<u64>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            chain,
            wallet,
            nonces: NonceSequencer::new(),
            gas,
            chain_id: OnceCell::new_with(chain_id),
            call_timeout,
        }
    }

    /// Backend wallet address
    pub fn sender(&self) -> Address {
        self.wallet.address()
    }

    /// Last nonce used by this process
    pub async fn last_nonce(&self) -> Option<u64> {
        self.nonces.last_issued().await
    }

    /// Transfer `amount` of `token` to `to`.
    ///
    /// Returns once the node has accepted the transaction; inclusion in a
    /// block is not awaited.
    pub async fn send_token(
        &self,
        token: &TokenHandle,
        to: &Address,
        amount: Uint,
    ) -> FaucetResult<TxHash> {
        info!(
            "Sending {} {} to {}",
            format_units(amount, token.decimals),
            token.symbol,
            to
        );

        let chain_id = self.chain_id().await?;

        let gas = self
            .gas
            .compute_gas_settings(|| self.timed("eth_gasPrice", self.chain.gas_price()))
            .await;

        let sender = self.wallet.address();
        let nonce = self
            .nonces
            .next_nonce(|| self.timed("eth_getTransactionCount", self.chain.pending_nonce(&sender)))
            .await?;

        let tx = LegacyTransaction {
            nonce,
            gas_price: gas.gas_price,
            gas_limit: gas.gas_limit,
            to: token.address,
            value: 0,
            data: encode_transfer(to, amount),
        };
        let raw = self.wallet.sign_transaction(&tx, chain_id)?;

        let tx_hash = self
            .timed("eth_sendRawTransaction", self.chain.send_raw_transaction(&raw))
            .await
            .map_err(|e| match e {
                FaucetError::RpcError(msg) => FaucetError::TransactionFailed(msg),
                other => other,
            })?;

        info!(
            nonce,
            gas_price = %gas.gas_price,
            "{} transfer submitted: {}",
            token.symbol,
            tx_hash
        );
        Ok(tx_hash)
    }

    /// Log the wallet's native and token balances. Failures are logged only.
    pub async fn log_balances(&self, tokens: &[TokenHandle]) {
        let sender = self.wallet.address();

        match self.timed("eth_getBalance", self.chain.balance(&sender)).await {
            Ok(balance) => {
                info!("Backend wallet {} native balance: {}", sender, format_units(balance, 18));
                if balance.is_zero() {
                    warn!("Backend wallet has 0 native balance. Faucet transactions will fail due to lack of gas.");
                }
            }
            Err(e) => error!("Error fetching backend wallet balance: {}", e),
        }

        for token in tokens {
            match self.token_balance(token, &sender).await {
                Ok(balance) => info!(
                    "Backend wallet {} balance: {}",
                    token.symbol,
                    format_units(balance, token.decimals)
                ),
                Err(e) => error!("Error fetching {} balance: {}", token.symbol, e),
            }
        }
    }

    /// `balanceOf(owner)` on the token contract
    pub async fn token_balance(&self, token: &TokenHandle, owner: &Address) -> FaucetResult<Uint> {
        let output = self
            .timed("eth_call", self.chain.call(&token.address, &encode_balance_of(owner)))
            .await?;
        decode_uint(&output)
    }

    async fn chain_id(&self) -> FaucetResult<u64> {
        self.chain_id
            .get_or_try_init(|| self.timed("eth_chainId", self.chain.chain_id()))
            .await
            .copied()
    }

    async fn timed<T>(
        &self,
        operation: &str,
        call: impl Future<Output = FaucetResult<T>>,
    ) -> FaucetResult<T> {
        tokio::time::timeout(self.call_timeout, call)
            .await
            .map_err(|_| FaucetError::Timeout {
                operation: operation.to_string(),
                seconds: self.call_timeout.as_secs(),
            })?
    }
}
