//! HTTP API for faucet service

use crate::error::{FaucetError, FaucetResult};
use crate::service::FaucetService;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Faucet request body
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaucetRequest {
    pub user_address: Option<String>,
}

/// Router with every faucet endpoint
pub fn create_router(service: Arc<FaucetService>) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/api/health", get(health_handler))
        .route("/api/faucet", post(faucet_handler))
        .route("/api/faucet/health", get(faucet_health_handler))
        .route("/metrics", get(metrics_handler))
        .fallback(not_found_handler)
        .with_state(service)
}

/// Faucet request handler
///
/// `userAddress` must be `0x`-prefixed hex; a bare 40-digit string is
/// rejected even though `ethers.isAddress` accepts it.
///
/// Status codes: 200 on success, 400 for a bad body or address, 429 when
/// rate limited, 503 while the faucet is misconfigured or degraded, 502 when
/// the chain call or a send fails (`txHash1`/`txHash2` still reported) and
/// 500 otherwise. The Express route answered every failure other than 429
/// with 400; clients that branched on that see 502 and 503 here.
pub async fn faucet_handler(
    State(service): State<Arc<FaucetService>>,
    headers: HeaderMap,
    payload: Result<Json<FaucetRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            warn!("Rejected faucet payload: {}", rejection.body_text());
            return FaucetError::InvalidRequest("Invalid JSON payload.".to_string()).into_response();
        }
    };

    let user_address = match request.user_address.filter(|a| !a.trim().is_empty()) {
        Some(address) => address,
        None => {
            return FaucetError::InvalidRequest("Valid userAddress is required.".to_string())
                .into_response()
        }
    };

    // Logged only; the rate-limit key is the recipient address
    let client_ip = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .or_else(|| headers.get("true-client-ip").and_then(|v| v.to_str().ok()))
        .unwrap_or("unknown-ip");
    info!("Faucet request for {} from IP: {}", user_address, client_ip);

    match service.dispense(&user_address).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => {
            if e.is_external() {
                error!("Faucet request failed: {}", e);
            } else {
                info!("Faucet request rejected: {}", e);
            }
            e.into_response()
        }
    }
}

/// Liveness check for the faucet route
pub async fn faucet_health_handler() -> impl IntoResponse {
    Json(json!({ "status": "Faucet route is healthy" }))
}

/// Service health: degraded while disbursement is disabled
pub async fn health_handler(State(service): State<Arc<FaucetService>>) -> impl IntoResponse {
    let available = service.is_available();

    let contracts: Map<String, Value> = service
        .tokens()
        .iter()
        .map(|token| {
            (
                token.symbol.to_lowercase(),
                Value::String(token.address.to_string()),
            )
        })
        .collect();

    let body = json!({
        "status": if available { "healthy" } else { "degraded" },
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "services": {
            "faucet": if available { "available" } else { "unavailable" }
        },
        "reason": service.unavailable_reason(),
        "wallet": service.sender(),
        "contracts": contracts
    });

    let status = if available {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

/// Root handler with info
pub async fn root_handler(State(service): State<Arc<FaucetService>>) -> impl IntoResponse {
    Json(json!({
        "name": "KOL Faucet",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Test token faucet for the KOL referral dApp",
        "endpoints": {
            "POST /api/faucet": "Request test tokens",
            "GET /api/faucet/health": "Faucet route liveness",
            "GET /api/health": "Service health",
            "GET /metrics": "Prometheus metrics"
        },
        "status": if service.is_available() { "running" } else { "degraded" }
    }))
}

/// Prometheus text exposition
pub async fn metrics_handler(
    State(service): State<Arc<FaucetService>>,
) -> FaucetResult<impl IntoResponse> {
    let text = service
        .metrics()
        .gather()
        .map_err(|e| FaucetError::InternalError(format!("metrics encoding: {}", e)))?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        text,
    ))
}

pub async fn not_found_handler(uri: Uri) -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "Not found",
            "message": format!("Route {} not found", uri),
            "available_endpoints": [
                "/",
                "/api/health",
                "/api/faucet",
                "/api/faucet/health",
                "/metrics"
            ]
        })),
    )
}
