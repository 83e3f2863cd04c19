//! Admin HTTP server: REST API for agents and task uploads.

use crate::auth::Claims;
use crate::db::{Agent, AgentPatch, NewAgent, PlatformDb};
use agentdesk_core::{DeskError, PlatformConfig};
use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, StatusCode, header};
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::{
    Extension, Json, Router,
    extract::{Path, State},
    routing::{get, post, put},
};
use serde::Deserialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Body limit for every route except the upload.
const DEFAULT_BODY_LIMIT: usize = 1_048_576;

/// Shared application state for the admin server.
pub struct AdminState {
    pub db: Mutex<PlatformDb>,
    pub jwt_secret: String,
    /// Body limit of `POST /api/tasks/upload`.
    pub max_upload_bytes: usize,
    pub cors_origins: Vec<String>,
    pub bind_all: bool,
}

impl AdminState {
    pub fn new(db: PlatformDb, config: &PlatformConfig) -> Self {
        Self {
            db: Mutex::new(db),
            jwt_secret: config.jwt_secret.clone(),
            max_upload_bytes: config.max_upload_bytes,
            cors_origins: config.cors_origins.clone(),
            bind_all: config.bind_all,
        }
    }

    /// Lock the database. A panicked holder leaves SQLite consistent, so a
    /// poisoned lock is taken over rather than propagated.
    pub fn db(&self) -> MutexGuard<'_, PlatformDb> {
        self.db.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handler reply: status plus JSON body.
pub(crate) type ApiReply = (StatusCode, Json<serde_json::Value>);

pub(crate) fn reply(status: StatusCode, body: serde_json::Value) -> ApiReply {
    (status, Json(body))
}

pub(crate) fn fail(status: StatusCode, message: &str) -> ApiReply {
    reply(status, serde_json::json!({"ok": false, "message": message}))
}

/// JWT auth middleware: validates Authorization: Bearer <token>.
async fn require_auth(
    State(state): State<Arc<AdminState>>,
    mut req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Response {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match token.map(|t| crate::auth::validate_token(t, &state.jwt_secret)) {
        Some(Ok(claims)) => {
            req.extensions_mut().insert(claims);
            next.run(req).await
        }
        Some(Err(e)) => {
            tracing::debug!("auth: rejected token: {e}");
            fail(StatusCode::UNAUTHORIZED, "Unauthorized: invalid or missing token").into_response()
        }
        None => fail(StatusCode::UNAUTHORIZED, "Unauthorized: invalid or missing token").into_response(),
    }
}

/// Admin API server.
pub struct AdminServer;

impl AdminServer {
    /// Build the admin router.
    pub fn router(state: Arc<AdminState>) -> Router {
        let protected = Router::new()
            // Agents
            .route("/api/agents", get(list_agents).post(create_agent))
            .route(
                "/api/agents/{id}",
                get(get_agent).put(update_agent).delete(delete_agent),
            )
            .route("/api/agents/{id}/status", put(update_agent_status))
            // Tasks
            .route(
                "/api/tasks/upload",
                post(crate::tasks::upload_tasks)
                    .layer(DefaultBodyLimit::max(state.max_upload_bytes)),
            )
            .route("/api/tasks/agent/{agent_id}", get(crate::tasks::tasks_by_agent))
            .route("/api/tasks/all", get(crate::tasks::all_tasks))
            .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

        let public = Router::new().route("/", get(health));

        let cors = Self::cors_layer(&state);

        protected
            .merge(public)
            .layer(axum::middleware::from_fn_with_state(state.clone(), platform_security_headers))
            .layer(cors)
            .layer(DefaultBodyLimit::max(DEFAULT_BODY_LIMIT))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Configured origins win; otherwise `bind_all` (dev) allows any origin
    /// and the default is same-origin only.
    fn cors_layer(state: &AdminState) -> CorsLayer {
        let methods = [
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PUT,
            axum::http::Method::DELETE,
            axum::http::Method::OPTIONS,
        ];
        let base = CorsLayer::new().allow_methods(methods).allow_headers(Any);
        if !state.cors_origins.is_empty() {
            let allowed: Vec<HeaderValue> = state
                .cors_origins
                .iter()
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            base.allow_origin(allowed)
        } else if state.bind_all {
            base.allow_origin(Any)
        } else {
            base
        }
    }

    /// Start the admin server.
    pub async fn start(state: Arc<AdminState>, port: u16) -> agentdesk_core::Result<()> {
        // Loopback only unless bind_all; production sits behind a reverse proxy.
        let bind_addr = if state.bind_all { [0, 0, 0, 0] } else { [127, 0, 0, 1] };
        let app = Self::router(state);
        let addr = std::net::SocketAddr::from((bind_addr, port));
        tracing::info!("AgentDesk admin API running at http://{addr}");

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| DeskError::Server(format!("Bind error: {e}")))?;

        axum::serve(listener, app)
            .await
            .map_err(|e| DeskError::Server(format!("Server error: {e}")))?;

        Ok(())
    }
}

// ── Security Headers ──────────────────────────

/// Security headers middleware: X-Frame-Options, X-Content-Type-Options,
/// Referrer-Policy, and HSTS when served behind a proxy.
async fn platform_security_headers(
    State(state): State<Arc<AdminState>>,
    req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    headers.insert("X-Content-Type-Options", HeaderValue::from_static("nosniff"));
    headers.insert("X-Frame-Options", HeaderValue::from_static("SAMEORIGIN"));
    headers.insert("Referrer-Policy", HeaderValue::from_static("strict-origin-when-cross-origin"));
    if !state.bind_all {
        headers.insert(
            "Strict-Transport-Security",
            HeaderValue::from_static("max-age=31536000; includeSubDomains"),
        );
    }
    response
}

// ── Error Sanitization ────────────────────────

/// Log the real error server-side and send a generic message to the client.
pub(crate) fn internal_error(context: &str, e: impl std::fmt::Display) -> ApiReply {
    tracing::error!("[{context}] {e}");
    fail(StatusCode::INTERNAL_SERVER_ERROR, "An internal error occurred")
}

/// Write an audit row; failures are logged, never surfaced.
pub(crate) fn audit(state: &AdminState, event_type: &str, actor_id: &str, details: Option<&str>) {
    if let Err(e) = state.db().log_event(event_type, actor_id, details) {
        tracing::warn!("audit: failed to record {event_type}: {e}");
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"message": "Server is running", "status": "OK"}))
}

// ═════════════════════════════════════════════════════════════
// AGENTS
// ═════════════════════════════════════════════════════════════

fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || local.contains(' ') || domain.contains('@') {
        return false;
    }
    if domain.len() < 3 || !domain.contains('.') || domain.contains(' ') {
        return false;
    }
    if domain.starts_with(['.', '-']) || domain.ends_with(['.', '-']) {
        return false;
    }
    let tld_ok = domain
        .rsplit('.')
        .next()
        .is_some_and(|tld| tld.len() >= 2 && tld.chars().all(|c| c.is_ascii_alphanumeric()));
    tld_ok && email.len() <= 254
}

fn agent_json(agent: &Agent) -> serde_json::Value {
    serde_json::to_value(agent).unwrap_or_default()
}

fn not_found() -> ApiReply {
    fail(StatusCode::NOT_FOUND, "Agent not found")
}

fn duplicate_email() -> ApiReply {
    fail(StatusCode::BAD_REQUEST, "Agent with this email already exists")
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateAgentReq {
    name: String,
    email: String,
    mobile_number: String,
    #[serde(default)]
    country_code: Option<String>,
}

async fn create_agent(
    State(state): State<Arc<AdminState>>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateAgentReq>,
) -> ApiReply {
    let name = req.name.trim();
    let email = req.email.trim().to_lowercase();
    let mobile = req.mobile_number.trim();
    if name.is_empty() || mobile.is_empty() {
        return fail(StatusCode::BAD_REQUEST, "Name, email and mobile number are required");
    }
    if !is_valid_email(&email) {
        return fail(StatusCode::BAD_REQUEST, "Invalid email address");
    }
    let country_code = req
        .country_code
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or("+1");

    let new_agent = NewAgent {
        name,
        email: &email,
        mobile_number: mobile,
        country_code,
    };
    // Emails are unique across all admins. The UNIQUE constraint still
    // catches a concurrent insert that slips past this check.
    let taken = state.db().is_agent_email_taken(&email);
    match taken {
        Ok(true) => return duplicate_email(),
        Ok(false) => {}
        Err(e) => return internal_error("create_agent", e),
    }
    // Lock released before the audit write re-locks.
    let created = state.db().create_agent(&claims.sub, &new_agent);
    match created {
        Ok(agent) => {
            audit(&state, "agent_created", &claims.sub, Some(&format!("agent={} email={}", agent.id, agent.email)));
            tracing::info!("agent created: {} ({})", agent.name, agent.id);
            reply(
                StatusCode::CREATED,
                serde_json::json!({"ok": true, "message": "Agent created successfully", "agent": agent_json(&agent)}),
            )
        }
        Err(DeskError::Conflict(_)) => duplicate_email(),
        Err(e) => internal_error("create_agent", e),
    }
}

async fn list_agents(
    State(state): State<Arc<AdminState>>,
    Extension(claims): Extension<Claims>,
) -> ApiReply {
    let agents = state.db().list_agents(&claims.sub);
    match agents {
        Ok(agents) => reply(
            StatusCode::OK,
            serde_json::json!({"ok": true, "agents": agents}),
        ),
        Err(e) => internal_error("list_agents", e),
    }
}

async fn get_agent(
    State(state): State<Arc<AdminState>>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> ApiReply {
    let agent = state.db().get_agent(&claims.sub, &id);
    match agent {
        Ok(Some(agent)) => reply(StatusCode::OK, serde_json::json!({"ok": true, "agent": agent_json(&agent)})),
        Ok(None) => not_found(),
        Err(e) => internal_error("get_agent", e),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UpdateAgentReq {
    name: Option<String>,
    email: Option<String>,
    mobile_number: Option<String>,
    country_code: Option<String>,
}

async fn update_agent(
    State(state): State<Arc<AdminState>>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
    Json(req): Json<UpdateAgentReq>,
) -> ApiReply {
    let email = req.email.as_deref().map(|e| e.trim().to_lowercase());
    if let Some(email) = &email {
        if !is_valid_email(email) {
            return fail(StatusCode::BAD_REQUEST, "Invalid email address");
        }
    }
    fn non_blank(v: &Option<String>) -> Option<&str> {
        v.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
    let patch = AgentPatch {
        name: non_blank(&req.name),
        email: email.as_deref(),
        mobile_number: non_blank(&req.mobile_number),
        country_code: non_blank(&req.country_code),
    };

    let updated = state.db().update_agent(&claims.sub, &id, &patch);
    match updated {
        Ok(Some(agent)) => {
            audit(&state, "agent_updated", &claims.sub, Some(&format!("agent={id}")));
            reply(
                StatusCode::OK,
                serde_json::json!({"ok": true, "message": "Agent updated successfully", "agent": agent_json(&agent)}),
            )
        }
        Ok(None) => not_found(),
        Err(DeskError::Conflict(_)) => duplicate_email(),
        Err(e) => internal_error("update_agent", e),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UpdateAgentStatusReq {
    is_active: bool,
}

async fn update_agent_status(
    State(state): State<Arc<AdminState>>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
    Json(req): Json<UpdateAgentStatusReq>,
) -> ApiReply {
    let updated = state.db().set_agent_active(&claims.sub, &id, req.is_active);
    match updated {
        Ok(Some(agent)) => {
            audit(
                &state,
                "agent_status_changed",
                &claims.sub,
                Some(&format!("agent={id} active={}", req.is_active)),
            );
            reply(
                StatusCode::OK,
                serde_json::json!({"ok": true, "message": "Agent status updated successfully", "agent": agent_json(&agent)}),
            )
        }
        Ok(None) => not_found(),
        Err(e) => internal_error("update_agent_status", e),
    }
}

async fn delete_agent(
    State(state): State<Arc<AdminState>>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> ApiReply {
    let deleted = state.db().delete_agent(&claims.sub, &id);
    match deleted {
        Ok(true) => {
            audit(&state, "agent_deleted", &claims.sub, Some(&format!("agent={id}")));
            reply(StatusCode::OK, serde_json::json!({"ok": true, "message": "Agent deleted successfully"}))
        }
        Ok(false) => not_found(),
        Err(e) => internal_error("delete_agent", e),
    }
}
