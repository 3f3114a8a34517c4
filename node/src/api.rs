//! # REST + JSON-RPC + WebSocket API
//!
//! The node's HTTP interface to the vault. Write endpoints submit a
//! transaction on behalf of the `from` account; reads go through `GET`
//! routes or the JSON-RPC gateway.
//!
//! ## Endpoints
//!
//! | Method | Path                  | Description                          |
//! |--------|-----------------------|--------------------------------------|
//! | GET    | `/health`             | Liveness probe                       |
//! | GET    | `/status`             | Vault summary                        |
//! | GET    | `/accounts/:address`  | Share and native balances            |
//! | GET    | `/events`             | Event log (`?since=N`)               |
//! | POST   | `/deposit`            | Deposit attached value               |
//! | POST   | `/withdraw`           | Redeem all shares                    |
//! | POST   | `/withdraw-partial`   | Redeem a share amount                |
//! | POST   | `/send`               | Plain native transfer                |
//! | POST   | `/transfer`           | Move shares                          |
//! | POST   | `/approve`            | Set a share allowance                |
//! | POST   | `/transfer-from`      | Move shares on an allowance          |
//! | POST   | `/rpc`                | JSON-RPC 2.0 reads                   |
//! | GET    | `/ws`                 | Live event stream                    |
//!
//! Amounts are decimal strings of smallest units on the way out, and
//! either strings or JSON integers on the way in.

use axum::{
    extract::{
        rejection::JsonRejection,
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use lendvault_contracts::types::amount_str;
use lendvault_contracts::{
    Address, Amount, Call, EventRecord, ExecutionError, Runtime, Transaction,
};

use crate::metrics::SharedMetrics;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared state for all handlers. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub version: String,
    pub network: String,
    /// The single writer. Held only for the duration of one transaction.
    pub runtime: Arc<Mutex<Runtime>>,
    /// Every event emitted by a successful transaction, in order.
    pub event_tx: broadcast::Sender<EventRecord>,
    pub metrics: SharedMetrics,
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the API router with CORS and request tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/accounts/:address", get(account_handler))
        .route("/events", get(events_handler))
        .route("/deposit", post(deposit_handler))
        .route("/withdraw", post(withdraw_handler))
        .route("/withdraw-partial", post(withdraw_partial_handler))
        .route("/send", post(send_handler))
        .route("/transfer", post(transfer_handler))
        .route("/approve", post(approve_handler))
        .route("/transfer-from", post(transfer_from_handler))
        .route("/rpc", post(rpc_handler))
        .route("/ws", get(ws_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Amount encoding
// ---------------------------------------------------------------------------

fn amount_string(amount: Amount) -> String {
    amount.to_string()
}

// ---------------------------------------------------------------------------
// Request Types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct DepositRequest {
    pub from: Address,
    #[serde(with = "amount_str")]
    pub value: Amount,
}

#[derive(Debug, Deserialize)]
pub struct WithdrawRequest {
    pub from: Address,
}

#[derive(Debug, Deserialize)]
pub struct WithdrawPartialRequest {
    pub from: Address,
    #[serde(with = "amount_str")]
    pub amount: Amount,
}

#[derive(Debug, Deserialize)]
pub struct SendRequest {
    pub from: Address,
    pub to: Address,
    #[serde(with = "amount_str")]
    pub value: Amount,
}

#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    pub from: Address,
    pub to: Address,
    #[serde(with = "amount_str")]
    pub amount: Amount,
}

#[derive(Debug, Deserialize)]
pub struct ApproveRequest {
    pub from: Address,
    pub spender: Address,
    #[serde(with = "amount_str")]
    pub amount: Amount,
}

#[derive(Debug, Deserialize)]
pub struct TransferFromRequest {
    /// The spender submitting the transaction.
    pub spender: Address,
    pub owner: Address,
    pub to: Address,
    #[serde(with = "amount_str")]
    pub amount: Amount,
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    #[serde(default)]
    pub since: u64,
}

// ---------------------------------------------------------------------------
// Response Types
// ---------------------------------------------------------------------------

/// Response payload for `GET /status`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub version: String,
    pub network: String,
    pub vault: Address,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub total_supply: String,
    pub pool_balance: String,
    pub holders: usize,
    pub events: usize,
    pub timestamp: String,
}

/// Response payload for `GET /accounts/:address`.
#[derive(Debug, Serialize, Deserialize)]
pub struct AccountResponse {
    pub address: Address,
    pub shares: String,
    pub native_balance: String,
    /// Native value the shares would redeem for right now.
    pub redeemable: String,
}

/// Response payload for write endpoints.
#[derive(Debug, Serialize, Deserialize)]
pub struct TxResponse {
    pub tx_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payout: Option<String>,
    pub events: Vec<EventRecord>,
}

/// Error body for non-2xx responses.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    /// Stable failure name, e.g. `ZeroAmount`, when the vault rejected the
    /// call.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

/// Handler failures.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Rejected(ExecutionError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::BadRequest(error) => {
                (StatusCode::BAD_REQUEST, ErrorResponse { error, kind: None })
            }
            ApiError::Rejected(err) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorResponse {
                    error: err.to_string(),
                    kind: Some(err.kind().to_string()),
                },
            ),
        };
        (status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// JSON-RPC Types
// ---------------------------------------------------------------------------

/// A JSON-RPC 2.0 request envelope.
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    pub params: Option<serde_json::Value>,
    pub id: serde_json::Value,
}

/// A JSON-RPC 2.0 response envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: serde_json::Value,
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl JsonRpcError {
    fn invalid_params(expected: &str) -> Self {
        Self {
            code: -32602,
            message: format!("Invalid params: expected {}", expected),
            data: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Submission
// ---------------------------------------------------------------------------

/// Unwraps a JSON body, reporting any rejection as a 400.
fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(req)| req)
        .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))
}

/// Executes one transaction under the runtime lock, records metrics, and
/// broadcasts the resulting events.
///
/// Events are sent before the lock is released so subscribers see them in
/// sequence order.
fn submit(state: &AppState, caller: Address, call: Call) -> Result<Json<TxResponse>, ApiError> {
    let started = Instant::now();
    let call_name = call.name();

    let outcome = {
        let mut runtime = state.runtime.lock();
        let outcome = runtime.execute(Transaction::new(caller, call));
        if let Ok(receipt) = &outcome {
            for record in &receipt.events {
                // No subscribers is fine.
                let _ = state.event_tx.send(record.clone());
            }
        }
        state.metrics.observe(&runtime);
        outcome
    };
    state
        .metrics
        .transaction_latency_seconds
        .observe(started.elapsed().as_secs_f64());

    match outcome {
        Ok(receipt) => {
            state.metrics.record_success(call_name);
            Ok(Json(TxResponse {
                tx_id: receipt.tx_id.to_string(),
                payout: receipt.payout.map(amount_string),
                events: receipt.events,
            }))
        }
        Err(err) => {
            state.metrics.record_failure(err.kind());
            Err(ApiError::Rejected(err))
        }
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health`
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// `GET /status`
async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let runtime = state.runtime.lock();
    let vault = runtime.vault();
    Json(StatusResponse {
        version: state.version.clone(),
        network: state.network.clone(),
        vault: vault.address(),
        name: vault.name().to_string(),
        symbol: vault.symbol().to_string(),
        decimals: vault.decimals(),
        total_supply: amount_string(vault.total_supply()),
        pool_balance: amount_string(runtime.pool_balance()),
        holders: vault.ledger().holder_count(),
        events: vault.events().len(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// `GET /accounts/:address`
async fn account_handler(
    Path(address): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<AccountResponse>, ApiError> {
    let address: Address = address
        .parse()
        .map_err(|e| ApiError::BadRequest(format!("invalid address: {}", e)))?;

    let runtime = state.runtime.lock();
    let shares = runtime.share_balance(&address);
    Ok(Json(AccountResponse {
        address,
        shares: amount_string(shares),
        native_balance: amount_string(runtime.native_balance(&address)),
        redeemable: amount_string(
            runtime
                .vault()
                .preview_redeem(shares, runtime.pool_balance()),
        ),
    }))
}

/// `GET /events?since=N`
async fn events_handler(
    Query(query): Query<EventsQuery>,
    State(state): State<AppState>,
) -> Json<Vec<EventRecord>> {
    let runtime = state.runtime.lock();
    Json(runtime.vault().events().since(query.since).to_vec())
}

/// `POST /deposit`
async fn deposit_handler(
    State(state): State<AppState>,
    payload: Result<Json<DepositRequest>, JsonRejection>,
) -> Result<Json<TxResponse>, ApiError> {
    let req = body(payload)?;
    submit(&state, req.from, Call::Deposit { value: req.value })
}

/// `POST /withdraw`
async fn withdraw_handler(
    State(state): State<AppState>,
    payload: Result<Json<WithdrawRequest>, JsonRejection>,
) -> Result<Json<TxResponse>, ApiError> {
    let req = body(payload)?;
    submit(&state, req.from, Call::WithdrawAll)
}

/// `POST /withdraw-partial`
async fn withdraw_partial_handler(
    State(state): State<AppState>,
    payload: Result<Json<WithdrawPartialRequest>, JsonRejection>,
) -> Result<Json<TxResponse>, ApiError> {
    let req = body(payload)?;
    submit(&state, req.from, Call::WithdrawPartial { amount: req.amount })
}

/// `POST /send`
async fn send_handler(
    State(state): State<AppState>,
    payload: Result<Json<SendRequest>, JsonRejection>,
) -> Result<Json<TxResponse>, ApiError> {
    let req = body(payload)?;
    submit(
        &state,
        req.from,
        Call::Send {
            to: req.to,
            value: req.value,
        },
    )
}

/// `POST /transfer`
async fn transfer_handler(
    State(state): State<AppState>,
    payload: Result<Json<TransferRequest>, JsonRejection>,
) -> Result<Json<TxResponse>, ApiError> {
    let req = body(payload)?;
    submit(
        &state,
        req.from,
        Call::TransferShares {
            to: req.to,
            amount: req.amount,
        },
    )
}

/// `POST /approve`
async fn approve_handler(
    State(state): State<AppState>,
    payload: Result<Json<ApproveRequest>, JsonRejection>,
) -> Result<Json<TxResponse>, ApiError> {
    let req = body(payload)?;
    submit(
        &state,
        req.from,
        Call::Approve {
            spender: req.spender,
            amount: req.amount,
        },
    )
}

/// `POST /transfer-from`
async fn transfer_from_handler(
    State(state): State<AppState>,
    payload: Result<Json<TransferFromRequest>, JsonRejection>,
) -> Result<Json<TxResponse>, ApiError> {
    let req = body(payload)?;
    submit(
        &state,
        req.spender,
        Call::TransferSharesFrom {
            from: req.owner,
            to: req.to,
            amount: req.amount,
        },
    )
}

/// `POST /rpc`: JSON-RPC 2.0 gateway for read-only queries.
///
/// Unknown methods return -32601, bad params -32602.
async fn rpc_handler(
    State(state): State<AppState>,
    Json(req): Json<JsonRpcRequest>,
) -> Json<JsonRpcResponse> {
    if req.jsonrpc != "2.0" {
        return Json(JsonRpcResponse {
            jsonrpc: "2.0".into(),
            result: None,
            error: Some(JsonRpcError {
                code: -32600,
                message: "Invalid Request: jsonrpc must be \"2.0\"".into(),
                data: None,
            }),
            id: req.id,
        });
    }

    let outcome = {
        let runtime = state.runtime.lock();
        dispatch_rpc(&runtime, &req.method, req.params.as_ref())
    };
    let (result, error) = match outcome {
        Ok(value) => (Some(value), None),
        Err(err) => (None, Some(err)),
    };

    Json(JsonRpcResponse {
        jsonrpc: "2.0".into(),
        result,
        error,
        id: req.id,
    })
}

fn dispatch_rpc(
    runtime: &Runtime,
    method: &str,
    params: Option<&serde_json::Value>,
) -> Result<serde_json::Value, JsonRpcError> {
    let vault = runtime.vault();
    let value = match method {
        "vault_name" => serde_json::json!(vault.name()),
        "vault_symbol" => serde_json::json!(vault.symbol()),
        "vault_decimals" => serde_json::json!(vault.decimals()),
        "vault_address" => serde_json::json!(vault.address()),
        "vault_totalSupply" => serde_json::json!(amount_string(vault.total_supply())),
        "vault_poolBalance" => serde_json::json!(amount_string(runtime.pool_balance())),
        "vault_balanceOf" => {
            let holder = address_param(params, 0)
                .ok_or_else(|| JsonRpcError::invalid_params("[address]"))?;
            serde_json::json!(amount_string(vault.balance_of(&holder)))
        }
        "vault_allowance" => {
            let (owner, spender) = address_param(params, 0)
                .zip(address_param(params, 1))
                .ok_or_else(|| JsonRpcError::invalid_params("[owner, spender]"))?;
            serde_json::json!(amount_string(vault.allowance(&owner, &spender)))
        }
        _ => {
            return Err(JsonRpcError {
                code: -32601,
                message: format!("Method not found: {}", method),
                data: None,
            })
        }
    };
    Ok(value)
}

fn address_param(params: Option<&serde_json::Value>, index: usize) -> Option<Address> {
    params
        .and_then(|p| p.as_array())
        .and_then(|arr| arr.get(index))
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse().ok())
}

/// `GET /ws`: push-only stream of [`EventRecord`]s as they are emitted.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

async fn handle_ws_connection(mut socket: WebSocket, state: AppState) {
    let mut rx = state.event_tx.subscribe();

    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(record) => {
                        let payload = match serde_json::to_string(&record) {
                            Ok(s) => s,
                            Err(e) => {
                                tracing::warn!("failed to serialize ws event: {}", e);
                                continue;
                            }
                        };
                        if socket.send(Message::Text(payload)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("ws subscriber lagged by {} events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            msg = socket.recv() => {
                match msg {
                    // Client messages are ignored.
                    Some(Ok(_)) => {}
                    _ => break,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use lendvault_contracts::VaultConfig;
    use tower::ServiceExt;

    const ONE: Amount = 1_000_000_000_000_000_000;

    fn user() -> Address {
        Address::from_low_u8(0x0a)
    }

    fn other() -> Address {
        Address::from_low_u8(0x0b)
    }

    /// AppState over a fresh vault with `user` and `other` holding 10 each.
    fn test_app_state() -> AppState {
        let mut runtime = Runtime::new(VaultConfig::default()).unwrap();
        runtime.fund(&user(), 10 * ONE).unwrap();
        runtime.fund(&other(), 10 * ONE).unwrap();
        let (event_tx, _) = broadcast::channel(64);

        AppState {
            version: "0.1.0-test".into(),
            network: "devnet".into(),
            runtime: Arc::new(Mutex::new(runtime)),
            event_tx,
            metrics: Arc::new(crate::metrics::VaultMetrics::new()),
        }
    }

    async fn get(router: &Router, path: &str) -> (StatusCode, Vec<u8>) {
        let req = Request::builder().uri(path).body(Body::empty()).unwrap();
        let resp = router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let body = resp
            .into_body()
            .collect()
            .await
            .unwrap()
            .to_bytes()
            .to_vec();
        (status, body)
    }

    async fn post_json(
        router: &Router,
        path: &str,
        body: serde_json::Value,
    ) -> (StatusCode, Vec<u8>) {
        let req = Request::builder()
            .method("POST")
            .uri(path)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap();
        let resp = router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let body = resp
            .into_body()
            .collect()
            .await
            .unwrap()
            .to_bytes()
            .to_vec();
        (status, body)
    }

    async fn rpc(router: &Router, method: &str, params: serde_json::Value) -> JsonRpcResponse {
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        });
        let (status, bytes) = post_json(router, "/rpc", body).await;
        assert_eq!(status, StatusCode::OK);
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let router = create_router(test_app_state());
        let (status, body) = get(&router, "/health").await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn status_reports_token_metadata() {
        let router = create_router(test_app_state());
        let (status, body) = get(&router, "/status").await;
        assert_eq!(status, StatusCode::OK);
        let resp: StatusResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(resp.name, "LendToken");
        assert_eq!(resp.symbol, "LEND");
        assert_eq!(resp.decimals, 18);
        assert_eq!(resp.total_supply, "0");
        assert_eq!(resp.network, "devnet");
    }

    #[tokio::test]
    async fn deposit_then_account_shows_shares() {
        let router = create_router(test_app_state());
        let (status, body) = post_json(
            &router,
            "/deposit",
            serde_json::json!({ "from": user(), "value": ONE.to_string() }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let tx: TxResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(tx.events.last().unwrap().event.name(), "Deposit");
        assert!(tx.payout.is_none());

        let (status, body) = get(&router, &format!("/accounts/{}", user())).await;
        assert_eq!(status, StatusCode::OK);
        let account: AccountResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(account.shares, ONE.to_string());
        assert_eq!(account.native_balance, (9 * ONE).to_string());
        assert_eq!(account.redeemable, ONE.to_string());
    }

    #[tokio::test]
    async fn deposit_accepts_integer_amounts() {
        let router = create_router(test_app_state());
        let (status, _) = post_json(
            &router,
            "/deposit",
            serde_json::json!({ "from": user(), "value": 1000 }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn zero_deposit_is_unprocessable() {
        let state = test_app_state();
        let router = create_router(state.clone());
        let (status, body) = post_json(
            &router,
            "/deposit",
            serde_json::json!({ "from": user(), "value": "0" }),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        let err: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(err.kind.as_deref(), Some("ZeroAmount"));
        assert!(state
            .metrics
            .encode()
            .unwrap()
            .contains("lendvault_failed_transactions_total{kind=\"ZeroAmount\"} 1"));
    }

    #[tokio::test]
    async fn withdraw_without_shares_is_insufficient() {
        let router = create_router(test_app_state());
        let (status, body) =
            post_json(&router, "/withdraw", serde_json::json!({ "from": user() })).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        let err: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(err.kind.as_deref(), Some("InsufficientShares"));
    }

    #[tokio::test]
    async fn partial_then_full_withdraw_reports_payouts() {
        let router = create_router(test_app_state());
        post_json(
            &router,
            "/deposit",
            serde_json::json!({ "from": user(), "value": ONE.to_string() }),
        )
        .await;

        let (status, body) = post_json(
            &router,
            "/withdraw-partial",
            serde_json::json!({ "from": user(), "amount": (ONE / 2).to_string() }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let tx: TxResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(tx.payout, Some((ONE / 2).to_string()));
        assert_eq!(tx.events.last().unwrap().event.name(), "PartialWithdraw");

        let (_, body) =
            post_json(&router, "/withdraw", serde_json::json!({ "from": user() })).await;
        let tx: TxResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(tx.payout, Some((ONE / 2).to_string()));
        assert_eq!(tx.events.last().unwrap().event.name(), "Withdraw");
    }

    #[tokio::test]
    async fn send_to_vault_raises_pool_without_minting() {
        let state = test_app_state();
        let vault = state.runtime.lock().vault_address();
        let router = create_router(state);

        let (status, _) = post_json(
            &router,
            "/send",
            serde_json::json!({ "from": other(), "to": vault, "value": ONE.to_string() }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let resp = rpc(&router, "vault_poolBalance", serde_json::json!([])).await;
        assert_eq!(resp.result.unwrap(), ONE.to_string());
        let resp = rpc(&router, "vault_totalSupply", serde_json::json!([])).await;
        assert_eq!(resp.result.unwrap(), "0");
    }

    #[tokio::test]
    async fn approve_and_transfer_from() {
        let router = create_router(test_app_state());
        post_json(
            &router,
            "/deposit",
            serde_json::json!({ "from": user(), "value": "100" }),
        )
        .await;
        let (status, _) = post_json(
            &router,
            "/approve",
            serde_json::json!({ "from": user(), "spender": other(), "amount": "40" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let resp = rpc(
            &router,
            "vault_allowance",
            serde_json::json!([user(), other()]),
        )
        .await;
        assert_eq!(resp.result.unwrap(), "40");

        let (status, _) = post_json(
            &router,
            "/transfer-from",
            serde_json::json!({
                "spender": other(), "owner": user(), "to": other(), "amount": "30"
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let resp = rpc(&router, "vault_balanceOf", serde_json::json!([other()])).await;
        assert_eq!(resp.result.unwrap(), "30");
    }

    #[tokio::test]
    async fn transfer_to_zero_address_is_rejected() {
        let router = create_router(test_app_state());
        post_json(
            &router,
            "/deposit",
            serde_json::json!({ "from": user(), "value": "100" }),
        )
        .await;
        let (status, body) = post_json(
            &router,
            "/transfer",
            serde_json::json!({ "from": user(), "to": Address::ZERO, "amount": "1" }),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        let err: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(err.kind.as_deref(), Some("InvalidReceiver"));
    }

    #[tokio::test]
    async fn malformed_amount_is_bad_request() {
        let router = create_router(test_app_state());
        let (status, body) = post_json(
            &router,
            "/deposit",
            serde_json::json!({ "from": user(), "value": "1.5" }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let err: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert!(err.kind.is_none());
    }

    #[tokio::test]
    async fn invalid_address_is_bad_request() {
        let router = create_router(test_app_state());
        let (status, _) = get(&router, "/accounts/not-an-address").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn events_endpoint_pages_by_sequence() {
        let router = create_router(test_app_state());
        post_json(
            &router,
            "/deposit",
            serde_json::json!({ "from": user(), "value": "5" }),
        )
        .await;

        let (_, body) = get(&router, "/events").await;
        let all: Vec<EventRecord> = serde_json::from_slice(&body).unwrap();
        assert_eq!(all.len(), 2);

        let (_, body) = get(&router, "/events?since=1").await;
        let tail: Vec<EventRecord> = serde_json::from_slice(&body).unwrap();
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].event.name(), "Deposit");
    }

    #[tokio::test]
    async fn successful_transactions_are_broadcast() {
        let state = test_app_state();
        let mut rx = state.event_tx.subscribe();
        let router = create_router(state);
        post_json(
            &router,
            "/deposit",
            serde_json::json!({ "from": user(), "value": "5" }),
        )
        .await;

        assert_eq!(rx.recv().await.unwrap().event.name(), "Transfer");
        assert_eq!(rx.recv().await.unwrap().event.name(), "Deposit");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writes_broadcast_in_sequence_order() {
        let state = test_app_state();
        let mut rx = state.event_tx.subscribe();
        let router = create_router(state);

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let router = router.clone();
                let from = if i % 2 == 0 { user() } else { other() };
                tokio::spawn(async move {
                    post_json(
                        &router,
                        "/deposit",
                        serde_json::json!({ "from": from, "value": "5" }),
                    )
                    .await
                })
            })
            .collect();
        for task in tasks {
            let (status, _) = task.await.unwrap();
            assert_eq!(status, StatusCode::OK);
        }

        let mut sequences = Vec::new();
        while let Ok(record) = rx.try_recv() {
            sequences.push(record.sequence);
        }
        assert_eq!(sequences, (0..32).collect::<Vec<u64>>());
    }

    #[tokio::test]
    async fn rpc_metadata_and_errors() {
        let router = create_router(test_app_state());

        let resp = rpc(&router, "vault_symbol", serde_json::json!([])).await;
        assert_eq!(resp.result.unwrap(), "LEND");

        let resp = rpc(&router, "vault_balanceOf", serde_json::json!([])).await;
        assert_eq!(resp.error.unwrap().code, -32602);

        let resp = rpc(&router, "vault_mint", serde_json::json!([])).await;
        assert_eq!(resp.error.unwrap().code, -32601);
    }

    #[tokio::test]
    async fn rpc_invalid_version_returns_error() {
        let router = create_router(test_app_state());
        let body = serde_json::json!({
            "jsonrpc": "1.0",
            "method": "vault_name",
            "params": [],
            "id": 20
        });
        let (_, bytes) = post_json(&router, "/rpc", body).await;
        let resp: JsonRpcResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(resp.error.unwrap().code, -32600);
    }
}
