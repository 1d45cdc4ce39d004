use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use ledger_metrics::{metrics_middleware, metrics_router};
use ledger_store::{NewTransaction, Transaction, TransactionStore};
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use uuid::Uuid;

// ── Shared state ────────────────────────────────────────────────────

/// Shared application state provided to all handlers.
pub struct AppState {
    pub store: Box<dyn TransactionStore>,
}

impl AppState {
    pub fn new(store: impl TransactionStore + 'static) -> Self {
        Self {
            store: Box::new(store),
        }
    }
}

// ── Error handling ──────────────────────────────────────────────────

const INVALID_TRANSACTION: &str = "Missing or invalid transaction data";

#[derive(Debug)]
enum AppError {
    BadRequest(String),
    Conflict(String),
    Internal(String),
}

impl AppError {
    /// Map a store failure to 409 for uniqueness conflicts and 500 otherwise,
    /// keeping the underlying detail in the message.
    fn store(context: &str, e: ledger_store::Error) -> Self {
        error!(error = %e, "{context}");
        let message = format!("{context}: {e}");
        if e.is_conflict() {
            AppError::Conflict(message)
        } else {
            AppError::Internal(message)
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

type AppResult<T> = Result<T, AppError>;

// ── Request types ───────────────────────────────────────────────────

/// Body of `POST /v1/transactions`. `id` and `created_at` are assigned by
/// the store, so any client-supplied values are ignored.
#[derive(Deserialize)]
struct CreateTransactionRequest {
    from_id: Option<String>,
    to_id: Option<String>,
    amount: Option<f64>,
}

// ── Helpers ─────────────────────────────────────────────────────────

fn invalid_payload(detail: impl std::fmt::Display) -> AppError {
    AppError::BadRequest(format!("Invalid request payload: {detail}"))
}

/// Empty, absent and nil ids all count as missing. Anything else must be a
/// UUID as written, surrounding whitespace included.
fn parse_participant(field: &str, raw: Option<&str>) -> AppResult<Option<Uuid>> {
    let raw = match raw {
        None | Some("") => return Ok(None),
        Some(raw) => raw,
    };
    let id = Uuid::parse_str(raw).map_err(|e| invalid_payload(format!("{field}: {e}")))?;
    Ok((!id.is_nil()).then_some(id))
}

fn parse_candidate(body: &[u8]) -> AppResult<NewTransaction> {
    // Derived `Deserialize` also accepts a struct as a positional array, so
    // require an object before mapping fields.
    let object: serde_json::Map<String, serde_json::Value> =
        serde_json::from_slice(body).map_err(invalid_payload)?;
    let req: CreateTransactionRequest =
        serde_json::from_value(serde_json::Value::Object(object)).map_err(invalid_payload)?;
    let from_id = parse_participant("from_id", req.from_id.as_deref())?;
    let to_id = parse_participant("to_id", req.to_id.as_deref())?;

    let (Some(from_id), Some(to_id)) = (from_id, to_id) else {
        return Err(AppError::BadRequest(INVALID_TRANSACTION.into()));
    };
    let amount = match req.amount {
        Some(amount) if amount >= 0.0 => amount,
        _ => return Err(AppError::BadRequest(INVALID_TRANSACTION.into())),
    };

    Ok(NewTransaction {
        from_id,
        to_id,
        amount,
    })
}

// ── Handlers ────────────────────────────────────────────────────────

async fn list_transactions(
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<Vec<Transaction>>> {
    let transactions = state
        .store
        .list()
        .await
        .map_err(|e| AppError::store("Failed to retrieve transactions", e))?;
    Ok(Json(transactions))
}

async fn create_transaction(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> AppResult<impl IntoResponse> {
    let candidate = parse_candidate(&body)?;
    let transaction = state
        .store
        .insert(candidate)
        .await
        .map_err(|e| AppError::store("Failed to create transaction", e))?;

    info!(
        id = transaction.id,
        from_id = %transaction.from_id,
        to_id = %transaction.to_id,
        amount = transaction.amount,
        "transaction created"
    );
    Ok((StatusCode::CREATED, Json(transaction)))
}

// ── Router ──────────────────────────────────────────────────────────

/// Build the axum [`Router`] with the v1 endpoints and `/metrics`.
///
/// Every v1 route is measured by [`metrics_middleware`]; the exposition
/// endpoint is merged outside of that layer.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            "/v1/transactions",
            get(list_transactions).post(create_transaction),
        )
        .route_layer(middleware::from_fn(metrics_middleware))
        .with_state(state)
        .merge(metrics_router())
        .layer(TraceLayer::new_for_http())
}
