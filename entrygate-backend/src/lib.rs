pub mod config;
pub mod db;
pub mod nullifier;
pub mod pipeline;
pub mod roster;
pub mod store;

use std::{sync::Arc, time::Duration};

use axum::{
    extract::{Path as AxumPath, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use entrygate_common::{
    event_id_to_field, FieldElement, GateError, MerkleTreeBuilder, TicketRecord, MAX_TREE_DEPTH,
};
use entrygate_verifier::{ProofChecker, SnarkjsChecker};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

use crate::{
    config::GateConfig,
    db::{current_epoch_secs, GateDb},
    nullifier::SledNullifierLedger,
    pipeline::{EntryPipeline, EntryRequest, HolderPath, TreeSummary, Verdict},
    roster::SledTicketRoster,
    store::SledTreeStore,
};

const CODE_INVALID_ARGUMENT: &str = "INVALID_ARGUMENT";
const CODE_NOT_FOUND: &str = "NOT_FOUND";
const CODE_ALREADY_EXISTS: &str = "ALREADY_EXISTS";
const CODE_CANCELLED: &str = "REQUEST_CANCELLED";
const CODE_DEADLINE: &str = "DEADLINE_EXCEEDED";
const CODE_INTERNAL: &str = "INTERNAL_SERVER_ERROR";

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    pipeline: EntryPipeline,
    roster: Arc<SledTicketRoster>,
    ledger: Arc<SledNullifierLedger>,
    verify_timeout: Duration,
    shutdown: CancellationToken,
}

impl AppState {
    pub fn with_components(
        store: Arc<SledTreeStore>,
        ledger: Arc<SledNullifierLedger>,
        roster: Arc<SledTicketRoster>,
        checker: Arc<dyn ProofChecker>,
        tree_depth: u8,
        verify_timeout: Duration,
    ) -> Self {
        let pipeline = EntryPipeline::new(
            store,
            ledger.clone(),
            roster.clone(),
            checker,
            MerkleTreeBuilder::new(tree_depth.min(MAX_TREE_DEPTH)),
        );
        Self {
            inner: Arc::new(AppStateInner {
                pipeline,
                roster,
                ledger,
                verify_timeout,
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Opens every component on one sled database.
    pub fn open(db: &GateDb, config: &GateConfig) -> Result<Self, GateError> {
        let checker = SnarkjsChecker::new(&config.snarkjs_bin, &config.verification_key);
        Ok(Self::with_components(
            Arc::new(SledTreeStore::new(db)?),
            Arc::new(SledNullifierLedger::new(db)?),
            Arc::new(SledTicketRoster::new(db)?),
            Arc::new(checker),
            config.tree_depth,
            config.verify_timeout,
        ))
    }

    /// Temporary database with a caller-supplied checker.
    pub fn in_memory(checker: Arc<dyn ProofChecker>, tree_depth: u8) -> Result<Self, GateError> {
        let db = GateDb::in_memory()?;
        Ok(Self::with_components(
            Arc::new(SledTreeStore::new(&db)?),
            Arc::new(SledNullifierLedger::new(&db)?),
            Arc::new(SledTicketRoster::new(&db)?),
            checker,
            tree_depth,
            Duration::from_secs(crate::config::DEFAULT_VERIFY_TIMEOUT_SECS),
        ))
    }

    pub fn pipeline(&self) -> &EntryPipeline {
        &self.inner.pipeline
    }

    pub fn roster(&self) -> &SledTicketRoster {
        &self.inner.roster
    }

    pub fn ledger(&self) -> &SledNullifierLedger {
        &self.inner.ledger
    }

    /// Cancelled on shutdown; every request token is a child of it.
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.inner.shutdown
    }

    fn request_token(&self) -> CancellationToken {
        self.inner.shutdown.child_token()
    }
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, CODE_INVALID_ARGUMENT, message)
    }

    fn deadline(message: impl Into<String>) -> Self {
        Self::new(StatusCode::GATEWAY_TIMEOUT, CODE_DEADLINE, message)
    }
}

impl From<GateError> for ApiError {
    fn from(err: GateError) -> Self {
        match err {
            GateError::InvalidArgument(message) => Self::bad_request(message),
            GateError::NotFound(message) => Self::new(StatusCode::NOT_FOUND, CODE_NOT_FOUND, message),
            GateError::AlreadyExists(message) => {
                Self::new(StatusCode::CONFLICT, CODE_ALREADY_EXISTS, message)
            }
            GateError::Cancelled(message) => {
                Self::new(StatusCode::SERVICE_UNAVAILABLE, CODE_CANCELLED, message)
            }
            GateError::Internal(message) => {
                error!(error = %message, "request failed");
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, CODE_INTERNAL, message)
            }
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    error_code: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.message,
            error_code: self.code,
        };
        (self.status, Json(body)).into_response()
    }
}

#[derive(Serialize)]
struct VerifyResponse {
    valid: bool,
    reason: Option<&'static str>,
    error_code: Option<&'static str>,
}

impl VerifyResponse {
    fn success() -> Self {
        Self {
            valid: true,
            reason: None,
            error_code: None,
        }
    }

    fn failure(code: &'static str, reason: &'static str) -> Self {
        Self {
            valid: false,
            reason: Some(reason),
            error_code: Some(code),
        }
    }
}

impl From<Verdict> for VerifyResponse {
    fn from(verdict: Verdict) -> Self {
        match verdict {
            Verdict::Verified => Self::success(),
            Verdict::Rejected(reason) => Self::failure(reason.code(), reason.as_str()),
        }
    }
}

/// Proof and signals as the wallet's snarkjs run emitted them; either may be
/// sent as a JSON value or as a string holding JSON.
#[derive(Deserialize)]
struct VerifyRequest {
    proof: JsonValue,
    public_signals: JsonValue,
}

#[derive(Deserialize)]
struct IssueTicketRequest {
    ticket_id: String,
    user_id: String,
    minted_at: Option<u64>,
}

#[derive(Serialize)]
struct RootResponse {
    event_id: String,
    root: FieldElement,
}

#[derive(Serialize)]
struct LeafResponse {
    event_id: String,
    index: u64,
    leaf: FieldElement,
}

#[derive(Serialize)]
struct NullifierStatusResponse {
    event_id: String,
    nullifier_hash: FieldElement,
    spent: bool,
    used_at: Option<u64>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

pub async fn serve(config: GateConfig) -> anyhow::Result<()> {
    let db = GateDb::persistent(&config.db_path)?;
    let state = AppState::open(&db, &config)?;
    let shutdown = state.shutdown_token().clone();

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let app = app_router(state).layer(cors);

    let listener = TcpListener::bind(&config.listen_addr).await?;
    info!(
        addr = %config.listen_addr,
        db = %config.db_path.display(),
        depth = config.tree_depth,
        "entry gate listening"
    );
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    db.flush().await?;
    info!("entry gate stopped");
    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
    }
    info!("shutdown requested; cancelling in-flight requests");
    shutdown.cancel();
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/entry/health", get(health))
        .route("/entry/events/:event_id/tickets", post(issue_ticket_handler))
        .route("/entry/events/:event_id/tree", post(build_tree_handler))
        .route("/entry/events/:event_id/root", get(root_handler))
        .route("/entry/events/:event_id/leaves/:index", get(leaf_handler))
        .route("/entry/events/:event_id/path/:user_id", get(path_handler))
        .route("/entry/events/:event_id/verify", post(verify_handler))
        .route(
            "/entry/events/:event_id/nullifiers/:nullifier_hash",
            get(nullifier_handler),
        )
        .with_state(state)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

async fn issue_ticket_handler(
    State(state): State<AppState>,
    AxumPath(event_id): AxumPath<String>,
    Json(req): Json<IssueTicketRequest>,
) -> Result<Json<TreeSummary>, ApiError> {
    let ticket = TicketRecord {
        ticket_id: req.ticket_id,
        user_id: req.user_id,
        minted_at: req.minted_at.unwrap_or_else(current_epoch_secs),
    };
    event_id_to_field(&event_id)?;
    let inserted = state.roster().record_ticket(&event_id, &ticket)?;
    info!(event_id = %event_id, ticket_id = %ticket.ticket_id, inserted, "ticket recorded");

    match state
        .pipeline()
        .build_merkle_tree(&event_id, &state.request_token())
        .await
    {
        Ok(summary) => Ok(Json(summary)),
        // A roster the tree cannot hold must not outlive the failed rebuild.
        Err(err @ GateError::InvalidArgument(_)) if inserted => {
            warn!(event_id = %event_id, ticket_id = %ticket.ticket_id, error = %err, "withdrawing ticket after rejected rebuild");
            state.roster().remove_ticket(&event_id, &ticket)?;
            Err(err.into())
        }
        Err(err) => Err(err.into()),
    }
}

async fn build_tree_handler(
    State(state): State<AppState>,
    AxumPath(event_id): AxumPath<String>,
) -> Result<Json<TreeSummary>, ApiError> {
    let summary = state
        .pipeline()
        .build_merkle_tree(&event_id, &state.request_token())
        .await?;
    Ok(Json(summary))
}

async fn root_handler(
    State(state): State<AppState>,
    AxumPath(event_id): AxumPath<String>,
) -> Result<Json<RootResponse>, ApiError> {
    let root = state.pipeline().store().get_root(&event_id)?;
    Ok(Json(RootResponse { event_id, root }))
}

async fn leaf_handler(
    State(state): State<AppState>,
    AxumPath((event_id, index)): AxumPath<(String, u64)>,
) -> Result<Json<LeafResponse>, ApiError> {
    let leaf = state.pipeline().store().get_leaf(&event_id, index)?;
    Ok(Json(LeafResponse {
        event_id,
        index,
        leaf,
    }))
}

async fn path_handler(
    State(state): State<AppState>,
    AxumPath((event_id, user_id)): AxumPath<(String, String)>,
) -> Result<Json<HolderPath>, ApiError> {
    let path = state
        .pipeline()
        .get_merkle_path(&event_id, &user_id, &state.request_token())
        .await?;
    Ok(Json(path))
}

async fn verify_handler(
    State(state): State<AppState>,
    AxumPath(event_id): AxumPath<String>,
    Json(req): Json<VerifyRequest>,
) -> Result<Json<VerifyResponse>, ApiError> {
    let request = EntryRequest {
        event_id,
        proof: json_document(req.proof),
        public_signals: json_document(req.public_signals),
    };
    let cancel = state.request_token();
    let timeout = state.inner.verify_timeout;

    let outcome = tokio::time::timeout(timeout, state.pipeline().verify(&request, &cancel)).await;
    let verdict = match outcome {
        Ok(result) => result?,
        Err(_) => {
            cancel.cancel();
            warn!(event_id = %request.event_id, ?timeout, "entry verification timed out");
            return Err(ApiError::deadline(format!(
                "verification exceeded {}s",
                timeout.as_secs()
            )));
        }
    };
    Ok(Json(VerifyResponse::from(verdict)))
}

async fn nullifier_handler(
    State(state): State<AppState>,
    AxumPath((event_id, nullifier_hash)): AxumPath<(String, String)>,
) -> Result<Json<NullifierStatusResponse>, ApiError> {
    let nullifier = FieldElement::from_decimal(&nullifier_hash)?;
    let used_at = state.ledger().used_at(&event_id, nullifier.as_bytes())?;
    Ok(Json(NullifierStatusResponse {
        event_id,
        nullifier_hash: nullifier,
        spent: used_at.is_some(),
        used_at,
    }))
}

/// Strings are forwarded as-is; any other JSON value is re-serialized.
fn json_document(value: JsonValue) -> String {
    match value {
        JsonValue::String(raw) => raw,
        other => other.to_string(),
    }
}
