//! Client-side session store: the single source of truth for "who is logged
//! in", reconciled with the server at startup and after login/logout.
//!
//! Lifecycle is `Uninitialized -> Loading -> Resolved`. While loading,
//! callers must treat the user as unauthenticated; the store never reports
//! authenticated optimistically.

use anyhow::{Context, Result};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::tprintln;

use super::account::Account;
use super::client::{ApiClient, CredentialStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Uninitialized,
    Loading,
    Resolved,
}

struct SessionState {
    phase: Phase,
    account: Option<Account>,
    /// Bumped by logout. A refresh only applies its result if the epoch it
    /// started under is still current, so a logout racing a refresh wins.
    epoch: u64,
}

/// Read-only view of the session for UI consumption.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub account: Option<Account>,
    pub loading: bool,
}

pub struct SessionStore {
    api: Arc<dyn ApiClient>,
    storage: Arc<dyn CredentialStore>,
    state: RwLock<SessionState>,
}

impl SessionStore {
    pub fn new(api: Arc<dyn ApiClient>, storage: Arc<dyn CredentialStore>) -> Self {
        Self {
            api,
            storage,
            state: RwLock::new(SessionState { phase: Phase::Uninitialized, account: None, epoch: 0 }),
        }
    }

    /// Authenticated iff an account is held in memory AND a credential is
    /// still present in storage. Both checked independently; a half-cleared
    /// session counts as logged out.
    pub fn is_authenticated(&self) -> bool {
        let state = self.state.read();
        state.phase == Phase::Resolved && state.account.is_some() && self.storage.token().is_some()
    }

    pub fn account(&self) -> Option<Account> {
        self.state.read().account.clone()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.state.read();
        SessionSnapshot {
            account: state.account.clone(),
            loading: state.phase != Phase::Resolved,
        }
    }

    /// Startup reconciliation. Without a stored credential this resolves
    /// immediately and makes no network call; with one, it asks the server
    /// who the credential belongs to and discards it on any failure.
    pub async fn initialize(&self) {
        let Some(token) = self.storage.token() else {
            // No credential means no session; a leftover persisted projection
            // from an interrupted logout goes with it
            self.storage.remove_account();
            let mut state = self.state.write();
            state.account = None;
            state.phase = Phase::Resolved;
            return;
        };
        {
            let mut state = self.state.write();
            state.phase = Phase::Loading;
        }
        match self.api.me(&token).await {
            Ok(account) => {
                self.storage.set_account(&account);
                let mut state = self.state.write();
                state.account = Some(account);
                state.phase = Phase::Resolved;
            }
            Err(e) => {
                // Stale or rejected credential; local truth is cleared either way
                debug!(target: "identity", "startup reconciliation failed, discarding credential: {e}");
                self.storage.remove_token();
                self.storage.remove_account();
                let mut state = self.state.write();
                state.account = None;
                state.phase = Phase::Resolved;
            }
        }
    }

    /// Submit credentials; on success store token and account. On failure
    /// session state is untouched and the error propagates.
    pub async fn login(&self, email: &str, password: &str) -> Result<Account> {
        let outcome = self.api.login(email, password).await.context("login failed")?;
        self.storage.set_token(&outcome.token);
        self.storage.set_account(&outcome.account);
        let mut state = self.state.write();
        state.account = Some(outcome.account.clone());
        state.phase = Phase::Resolved;
        tprintln!("session.login id={}", outcome.account.id);
        Ok(outcome.account)
    }

    /// Best-effort server notification, then unconditional local cleanup:
    /// in-memory account, stored credential, persisted projection, in that
    /// order. Idempotent; never fails.
    pub async fn logout(&self) {
        if let Some(token) = self.storage.token() {
            if let Err(e) = self.api.logout(&token).await {
                warn!(target: "identity", "logout notification failed, clearing locally anyway: {e}");
            }
        }
        let mut state = self.state.write();
        state.account = None;
        state.phase = Phase::Resolved;
        state.epoch += 1;
        drop(state);
        self.storage.remove_token();
        self.storage.remove_account();
        tprintln!("session.logout");
    }

    /// Re-fetch the current identity. Success replaces the account; any
    /// failure logs out rather than holding a possibly stale identity. A
    /// logout that lands while the fetch is in flight wins.
    pub async fn refresh(&self) {
        let token = self.storage.token();
        let started_epoch = self.state.read().epoch;
        let Some(token) = token else {
            self.logout().await;
            return;
        };
        match self.api.me(&token).await {
            Ok(account) => {
                // The storage write stays under the lock so a logout cannot
                // interleave between the state update and the persist
                let mut state = self.state.write();
                if state.epoch != started_epoch {
                    debug!(target: "identity", "refresh result discarded: session epoch moved");
                    return;
                }
                state.account = Some(account.clone());
                state.phase = Phase::Resolved;
                self.storage.set_account(&account);
            }
            Err(e) => {
                debug!(target: "identity", "refresh failed, logging out: {e}");
                self.logout().await;
            }
        }
    }
}
