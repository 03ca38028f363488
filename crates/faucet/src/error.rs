//! Error types for the faucet service

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use kol_common::TxHash;
use serde_json::json;
use thiserror::Error;

/// Faucet service errors
#[derive(Error, Debug)]
pub enum FaucetError {
    #[error("Invalid user address provided: {0}")]
    InvalidAddress(String),

    #[error("{0}")]
    InvalidRequest(String),

    #[error("Rate limit exceeded: try again in {0} seconds")]
    RateLimitExceeded(u64),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("RPC error: {0}")]
    RpcError(String),

    #[error("{operation} timed out after {seconds}s")]
    Timeout { operation: String, seconds: u64 },

    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    #[error("Signing error: {0}")]
    Signing(String),

    /// A disbursement call failed after the request was accepted. Carries the
    /// hashes of any sends that were submitted before the failure.
    #[error("Faucet attempt failed. {message}")]
    PartialDisbursement {
        message: String,
        tx_hash1: Option<TxHash>,
        tx_hash2: Option<TxHash>,
    },

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl FaucetError {
    /// True for failures of the chain or its RPC endpoint
    pub fn is_external(&self) -> bool {
        matches!(
            self,
            FaucetError::RpcError(_)
                | FaucetError::Timeout { .. }
                | FaucetError::TransactionFailed(_)
                | FaucetError::PartialDisbursement { .. }
        )
    }

    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            FaucetError::InvalidAddress(_) => (StatusCode::BAD_REQUEST, "INVALID_ADDRESS"),
            FaucetError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
            FaucetError::RateLimitExceeded(_) => {
                (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMIT_EXCEEDED")
            }
            FaucetError::Configuration(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "FAUCET_UNAVAILABLE")
            }
            FaucetError::RpcError(_) | FaucetError::Timeout { .. } => {
                (StatusCode::BAD_GATEWAY, "RPC_ERROR")
            }
            FaucetError::TransactionFailed(_) | FaucetError::PartialDisbursement { .. } => {
                (StatusCode::BAD_GATEWAY, "DISBURSEMENT_FAILED")
            }
            FaucetError::Signing(_) | FaucetError::InternalError(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
        }
    }
}

impl IntoResponse for FaucetError {
    fn into_response(self) -> Response {
        let (status, error_code) = self.status_and_code();

        // Internal details stay in the logs
        let message = match &self {
            FaucetError::Signing(_) | FaucetError::InternalError(_) => {
                "Internal Server Error while processing faucet request.".to_string()
            }
            other => other.to_string(),
        };

        let (tx_hash1, tx_hash2) = match &self {
            FaucetError::PartialDisbursement {
                tx_hash1, tx_hash2, ..
            } => (*tx_hash1, *tx_hash2),
            _ => (None, None),
        };

        let body = Json(json!({
            "success": false,
            "error": error_code,
            "message": message,
            "txHash1": tx_hash1,
            "txHash2": tx_hash2,
            "timestamp": chrono::Utc::now().to_rfc3339()
        }));

        (status, body).into_response()
    }
}

pub type FaucetResult<T> = Result<T, FaucetError>;
