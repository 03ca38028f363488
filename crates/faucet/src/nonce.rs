//! Nonce sequencing for the backend sending account
//!
//! Only sequences sends issued by this process. Another process or instance
//! sending from the same account can still collide.
//!
//! A nonce stays issued even when the send that used it is rejected or times
//! out. Later sends then queue behind that gap until the account's pending
//! nonce catches up or the gap is filled.

use crate::error::FaucetResult;
use std::future::Future;
use tokio::sync::Mutex;
use tracing::debug;

/// Hands out transaction nonces for one account
#[derive(Debug, Default)]
pub struct NonceSequencer {
    last_issued: Mutex<Option<u64>>,
}

impl NonceSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next nonce to use.
    ///
    /// `query_pending` fetches the chain's pending nonce for the account. A
    /// value above the last issued nonce is adopted as-is, otherwise the last
    /// issued nonce is incremented. The lock is held across the query so
    /// concurrent callers are served one at a time.
    pub async fn next_nonce<F, Fut>(&self, query_pending: F) -> FaucetResult<u64>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = FaucetResult<u64>>,
    {
        let mut last_issued = self.last_issued.lock().await;
        let pending = query_pending().await?;

        let next = match *last_issued {
            Some(last) if pending <= last => last + 1,
            _ => pending,
        };

        debug!(pending, next, "Issued nonce");
        *last_issued = Some(next);
        Ok(next)
    }

    /// Last nonce handed out, if any
    pub async fn last_issued(&self) -> Option<u64> {
        *self.last_issued.lock().await
    }
}
