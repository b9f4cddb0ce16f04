//! Access gate: the per-request authentication pipeline and the three
//! policies composed around it.
//!
//! `protect` (mandatory), `authorize` (role-restricted, layered after
//! `protect`) and `optional_auth` all run the same extract -> verify ->
//! resolve steps; they differ only in what happens on failure. The resolved
//! account travels in request extensions as `CurrentAccount`.

use axum::extract::{Request, State};
use axum::http::{header, HeaderMap};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use std::sync::Arc;
use tracing::warn;

use crate::error::AppError;

use super::account::{Account, Role};
use super::credential::{extract_bearer, verify_credential, SigningSecret};
use super::error::AuthError;
use super::resolver::{resolve_active_account, AccountStore};

/// Read-only state the gate needs: the signing secret and the store handle.
#[derive(Clone)]
pub struct AuthContext {
    pub store: Arc<dyn AccountStore>,
    pub secret: SigningSecret,
}

/// Resolved account attached to the request by `protect`/`optional_auth`.
#[derive(Debug, Clone)]
pub struct CurrentAccount(pub Account);

/// The shared pipeline: extract bearer, verify, resolve to an active account.
pub async fn authenticate_request(ctx: &AuthContext, headers: &HeaderMap) -> Result<Account, AuthError> {
    let raw = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok());
    let token = extract_bearer(raw)?;
    let claims = verify_credential(token, &ctx.secret, Utc::now())?;
    resolve_active_account(ctx.store.as_ref(), &claims.sub).await
}

/// Mandatory policy: reject with the taxonomy's status/message on any
/// failure, otherwise attach the account and continue.
pub async fn protect(State(ctx): State<AuthContext>, mut req: Request, next: Next) -> Response {
    match authenticate_request(&ctx, req.headers()).await {
        Ok(account) => {
            req.extensions_mut().insert(CurrentAccount(account));
            next.run(req).await
        }
        Err(err) => AppError::from(err).into_response(),
    }
}

/// Optional pipeline outcome, stated in the signature: an identity or none,
/// never an error.
pub async fn resolve_optional_identity(ctx: &AuthContext, headers: &HeaderMap) -> Option<Account> {
    match authenticate_request(ctx, headers).await {
        Ok(account) => Some(account),
        Err(AuthError::MissingCredential) => None,
        Err(err) => {
            // Includes store faults: the optional policy swallows those too
            warn!(target: "identity", "optional auth continuing anonymously: {err}");
            None
        }
    }
}

/// Optional policy: same pipeline, but every failure means "continue without
/// identity". Never rejects.
pub async fn optional_auth(State(ctx): State<AuthContext>, mut req: Request, next: Next) -> Response {
    if let Some(account) = resolve_optional_identity(&ctx, req.headers()).await {
        req.extensions_mut().insert(CurrentAccount(account));
    }
    next.run(req).await
}

/// Set-membership role check over the closed `Role` enumeration.
pub fn check_role(allowed: &[Role], account: Option<&Account>) -> Result<(), AuthError> {
    let account = account.ok_or(AuthError::MissingCredential)?;
    if allowed.contains(&account.role) {
        return Ok(());
    }
    Err(AuthError::RoleNotAllowed {
        required: allowed.iter().map(Role::as_str).collect::<Vec<_>>().join(", "),
        actual: account.role.to_string(),
    })
}

/// Role-restricted policy. Must be layered after `protect`; a request that
/// reaches it without an attached identity is rejected 401.
///
/// Wired with a closure so the allowed set stays explicit at the route table:
/// `middleware::from_fn(|req, next| authorize(&[Role::Admin], req, next))`.
pub async fn authorize(allowed: &[Role], req: Request, next: Next) -> Response {
    let verdict = check_role(allowed, req.extensions().get::<CurrentAccount>().map(|c| &c.0));
    match verdict {
        Ok(()) => next.run(req).await,
        Err(err) => AppError::from(err).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::account::AccountStatus;
    use crate::identity::credential::issue_credential;
    use crate::identity::resolver::{MemoryAccountStore, NewAccount};
    use axum::http::HeaderValue;

    fn ctx() -> AuthContext {
        let store = MemoryAccountStore::new();
        store.insert_new("u1", NewAccount {
            email: "admin@example.com".into(),
            password: "pw".into(),
            role: Role::Admin,
            status: AccountStatus::Active,
            display_name: None,
        });
        store.insert_new("u2", NewAccount {
            email: "frozen@example.com".into(),
            password: "pw".into(),
            role: Role::Editor,
            status: AccountStatus::Suspended,
            display_name: None,
        });
        AuthContext { store: Arc::new(store), secret: SigningSecret::new(b"gate-secret".to_vec()) }
    }

    fn bearer(ctx: &AuthContext, sub: &str) -> HeaderMap {
        let token = issue_credential(sub, 3600, &ctx.secret, Utc::now());
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {token}")).unwrap());
        headers
    }

    #[tokio::test]
    async fn pipeline_resolves_active_admin() {
        let ctx = ctx();
        let headers = bearer(&ctx, "u1");
        let account = authenticate_request(&ctx, &headers).await.unwrap();
        assert_eq!(account.id, "u1");
        assert_eq!(account.role, Role::Admin);
    }

    #[tokio::test]
    async fn missing_header_is_missing_credential() {
        let ctx = ctx();
        let headers = HeaderMap::new();
        assert!(matches!(
            authenticate_request(&ctx, &headers).await,
            Err(AuthError::MissingCredential)
        ));
    }

    #[tokio::test]
    async fn valid_token_unknown_subject_is_not_found() {
        let ctx = ctx();
        let headers = bearer(&ctx, "ghost");
        assert!(matches!(
            authenticate_request(&ctx, &headers).await,
            Err(AuthError::AccountNotFound)
        ));
    }

    #[tokio::test]
    async fn suspended_subject_surfaces_status() {
        let ctx = ctx();
        let headers = bearer(&ctx, "u2");
        match authenticate_request(&ctx, &headers).await {
            Err(e @ AuthError::AccountInactive { .. }) => {
                assert_eq!(e.public_message(), "Admin account is suspended.");
            }
            other => panic!("expected inactive, got {:?}", other.map(|a| a.id)),
        }
    }

    #[tokio::test]
    async fn optional_resolution_swallows_every_failure() {
        let ctx = ctx();

        assert!(resolve_optional_identity(&ctx, &HeaderMap::new()).await.is_none());

        let mut garbage = HeaderMap::new();
        garbage.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer junk"));
        assert!(resolve_optional_identity(&ctx, &garbage).await.is_none());

        let frozen = bearer(&ctx, "u2");
        assert!(resolve_optional_identity(&ctx, &frozen).await.is_none());

        let ok = bearer(&ctx, "u1");
        assert_eq!(resolve_optional_identity(&ctx, &ok).await.unwrap().id, "u1");
    }

    #[test]
    fn role_check_is_set_membership() {
        let account = Account {
            id: "u1".into(),
            email: "e@example.com".into(),
            role: Role::Editor,
            status: AccountStatus::Active,
            display_name: None,
            created_at: Utc::now(),
        };
        assert!(check_role(&[Role::Editor], Some(&account)).is_ok());
        assert!(check_role(&[Role::Admin, Role::Editor], Some(&account)).is_ok());
        match check_role(&[Role::Admin], Some(&account)) {
            Err(e @ AuthError::RoleNotAllowed { .. }) => {
                assert_eq!(e.public_message(), "Access denied. Required role: admin");
            }
            other => panic!("expected role rejection, got {other:?}"),
        }
        // No identity attached at all: 401, not 403
        assert!(matches!(check_role(&[Role::Admin], None), Err(AuthError::MissingCredential)));
    }
}
