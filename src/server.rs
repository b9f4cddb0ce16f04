//!
//! inkpost HTTP server
//! -------------------
//! Axum-based HTTP API for the admin backend. Auth routes are wired through
//! the access gate middleware; everything behind `/api/admin` additionally
//! requires the admin role.
//!
//! Responsibilities:
//! - Login endpoint: Argon2 password check, credential issuance.
//! - Logout and who-am-I endpoints behind the mandatory policy.
//! - Admin account listing behind the role-restricted policy.
//! - Viewer endpoint behind the optional policy.
//! - Startup wiring: account store under the data root, default admin seed.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::middleware;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::error::{AppError, AppResult};
use crate::identity::{
    self, issue_credential, AccountStatus, AccountStore, AuthContext, AuthError, CurrentAccount,
    FileAccountStore, Role, SigningSecret,
};

const ADMIN_ONLY: &[Role] = &[Role::Admin];

const DEFAULT_ADMIN_EMAIL: &str = "admin@inkpost.local";

/// Shared server state injected into all handlers.
#[derive(Clone)]
pub struct AppState {
    pub auth: AuthContext,
    /// Credential lifetime in seconds.
    pub token_ttl_secs: i64,
}

/// Build the full route table around the given state.
pub fn router(state: AppState) -> Router {
    let gate = state.auth.clone();

    let protected = Router::new()
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/me", get(me))
        .layer(middleware::from_fn_with_state(gate.clone(), identity::protect));

    let admin = Router::new()
        .route("/api/admin/accounts", get(list_accounts))
        .layer(middleware::from_fn(|req: axum::extract::Request, next: middleware::Next| {
            identity::authorize(ADMIN_ONLY, req, next)
        }))
        .layer(middleware::from_fn_with_state(gate.clone(), identity::protect));

    let optional = Router::new()
        .route("/api/session", get(session_info))
        .layer(middleware::from_fn_with_state(gate, identity::optional_auth));

    Router::new()
        .route("/", get(|| async { "inkpost ok" }))
        .route("/api/auth/login", post(login))
        .merge(protected)
        .merge(admin)
        .merge(optional)
        .with_state(state)
}

/// Start the HTTP server bound to the given port, with accounts stored under
/// `data_root`. Seeds the default admin on first run so the install is
/// reachable.
pub async fn run_with_config(
    http_port: u16,
    data_root: &str,
    secret: SigningSecret,
    token_ttl_secs: i64,
) -> anyhow::Result<()> {
    let store = FileAccountStore::open(std::path::Path::new(data_root))?;
    let admin_password = std::env::var("INKPOST_ADMIN_PASSWORD").unwrap_or_else(|_| "inkpost".to_string());
    store.ensure_default_admin(DEFAULT_ADMIN_EMAIL, &admin_password)?;

    let state = AppState {
        auth: AuthContext { store: Arc::new(store), secret },
        token_ttl_secs,
    };
    let app = router(state);

    let addr: SocketAddr = format!("0.0.0.0:{}", http_port).parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Convenience entry point configured from the environment.
pub async fn run() -> anyhow::Result<()> {
    let http_port: u16 = std::env::var("INKPOST_HTTP_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(7878);
    let data_root = std::env::var("INKPOST_DATA_DIR").unwrap_or_else(|_| "data".to_string());
    let token_ttl_secs: i64 = std::env::var("INKPOST_TOKEN_TTL_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(24 * 3600);
    let secret = match std::env::var("INKPOST_SECRET") {
        Ok(s) if !s.is_empty() => SigningSecret::new(s.into_bytes()),
        _ => {
            warn!("INKPOST_SECRET not set; using a process-lifetime random secret");
            SigningSecret::random()?
        }
    };
    run_with_config(http_port, &data_root, secret, token_ttl_secs).await
}

#[derive(Debug, Deserialize)]
struct LoginPayload {
    email: String,
    password: String,
}

async fn login(State(state): State<AppState>, Json(payload): Json<LoginPayload>) -> AppResult<impl IntoResponse> {
    let record = state
        .auth
        .store
        .find_record_by_email(&payload.email)
        .await
        .map_err(AppError::from)?;
    // Unknown email and wrong password are indistinguishable to the caller
    let Some(record) = record else {
        return Err(AppError::auth("auth", "Invalid email or password."));
    };
    if !identity::verify_password(&record.password_hash, &payload.password) {
        return Err(AppError::auth("auth", "Invalid email or password."));
    }
    if record.status != AccountStatus::Active {
        return Err(AuthError::AccountInactive { status: record.status.to_string() }.into());
    }
    let token = issue_credential(&record.id, state.token_ttl_secs, &state.auth.secret, Utc::now());
    info!(target: "identity", "login id={} role={}", record.id, record.role);
    Ok(Json(json!({
        "status": "success",
        "data": {"token": token, "user": record.project()}
    })))
}

async fn logout(Extension(CurrentAccount(account)): Extension<CurrentAccount>) -> impl IntoResponse {
    // Credentials are stateless; discarding the token is the client's job.
    // The endpoint exists so clients have something to notify.
    info!(target: "identity", "logout id={}", account.id);
    (StatusCode::OK, Json(json!({"status": "success"})))
}

async fn me(Extension(CurrentAccount(account)): Extension<CurrentAccount>) -> impl IntoResponse {
    Json(json!({"status": "success", "data": {"user": account}}))
}

async fn list_accounts(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let accounts = state.auth.store.list().await.map_err(AppError::from)?;
    Ok(Json(json!({"status": "success", "data": {"accounts": accounts}})))
}

async fn session_info(viewer: Option<Extension<CurrentAccount>>) -> impl IntoResponse {
    let user = viewer.map(|Extension(CurrentAccount(account))| account);
    Json(json!({"status": "success", "data": {"user": user}}))
}
