//! Client-side collaborators for the session store: the server transport
//! (`ApiClient`) and the durable local key-value store (`CredentialStore`).

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

use super::account::Account;

/// Successful login payload: the issued credential plus the account it
/// belongs to.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub token: String,
    pub account: Account,
}

/// Network transport to the auth endpoints. Timeout and retry policy belong
/// to the implementation, not to the session store.
#[async_trait]
pub trait ApiClient: Send + Sync {
    async fn login(&self, email: &str, password: &str) -> Result<LoginOutcome>;
    async fn me(&self, token: &str) -> Result<Account>;
    async fn logout(&self, token: &str) -> Result<()>;
}

/// Durable local key-value storage for the credential and the persisted
/// account projection. Write failures are the implementation's problem;
/// callers treat these as fire-and-forget.
pub trait CredentialStore: Send + Sync {
    fn token(&self) -> Option<String>;
    fn set_token(&self, token: &str);
    fn remove_token(&self);
    fn account(&self) -> Option<Account>;
    fn set_account(&self, account: &Account);
    fn remove_account(&self);
}

/// HTTP implementation of `ApiClient` over reqwest.
pub struct HttpApiClient {
    base: Url,
    client: reqwest::Client,
}

impl HttpApiClient {
    pub fn new(base: &str) -> Result<Self> {
        let base = Url::parse(base).context("invalid base URL")?;
        let client = reqwest::Client::builder().build()?;
        Ok(Self { base, client })
    }
}

#[async_trait]
impl ApiClient for HttpApiClient {
    async fn login(&self, email: &str, password: &str) -> Result<LoginOutcome> {
        let url = self.base.join("/api/auth/login")?;
        let resp = self
            .client
            .post(url)
            .json(&serde_json::json!({"email": email, "password": password}))
            .send()
            .await?;
        let status = resp.status();
        let v: serde_json::Value = resp.json().await.unwrap_or(serde_json::json!({"status":"error"}));
        if !status.is_success() || v.get("status").and_then(|s| s.as_str()) != Some("success") {
            let msg = v.get("message").and_then(|m| m.as_str()).unwrap_or("login failed");
            return Err(anyhow!("login failed: HTTP {}: {}", status, msg));
        }
        let data = v.get("data").ok_or_else(|| anyhow!("login response missing data"))?;
        let token = data
            .get("token")
            .and_then(|t| t.as_str())
            .ok_or_else(|| anyhow!("login response missing token"))?
            .to_string();
        let account: Account = serde_json::from_value(
            data.get("user").cloned().ok_or_else(|| anyhow!("login response missing user"))?,
        )?;
        Ok(LoginOutcome { token, account })
    }

    async fn me(&self, token: &str) -> Result<Account> {
        let url = self.base.join("/api/auth/me")?;
        let resp = self.client.get(url).bearer_auth(token).send().await?;
        let status = resp.status();
        let v: serde_json::Value = resp.json().await.unwrap_or(serde_json::json!({"status":"error"}));
        if !status.is_success() {
            let msg = v.get("message").and_then(|m| m.as_str()).unwrap_or("rejected");
            return Err(anyhow!("identity fetch failed: HTTP {}: {}", status, msg));
        }
        let user = v
            .get("data")
            .and_then(|d| d.get("user"))
            .cloned()
            .ok_or_else(|| anyhow!("identity response missing user"))?;
        Ok(serde_json::from_value(user)?)
    }

    async fn logout(&self, token: &str) -> Result<()> {
        let url = self.base.join("/api/auth/logout")?;
        let resp = self.client.post(url).bearer_auth(token).send().await?;
        if !resp.status().is_success() {
            return Err(anyhow!("logout rejected: HTTP {}", resp.status()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoredSession {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    account: Option<Account>,
}

/// File-backed credential store: one `session.json` under the profile
/// directory, surviving process restarts.
pub struct FileCredentialStore {
    path: PathBuf,
    cache: Mutex<StoredSession>,
}

impl FileCredentialStore {
    pub fn open(profile_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(profile_dir)
            .with_context(|| format!("creating profile dir {}", profile_dir.display()))?;
        let path = profile_dir.join("session.json");
        let cache = if path.exists() {
            let raw = std::fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&raw).unwrap_or_default()
        } else {
            StoredSession::default()
        };
        Ok(Self { path, cache: Mutex::new(cache) })
    }

    fn persist(&self, cache: &StoredSession) {
        match serde_json::to_string_pretty(cache) {
            Ok(raw) => {
                if let Err(e) = std::fs::write(&self.path, raw) {
                    warn!(target: "identity", "failed to persist session file {}: {e}", self.path.display());
                }
            }
            Err(e) => warn!(target: "identity", "failed to serialize session state: {e}"),
        }
    }
}

impl CredentialStore for FileCredentialStore {
    fn token(&self) -> Option<String> {
        self.cache.lock().token.clone()
    }

    fn set_token(&self, token: &str) {
        let mut cache = self.cache.lock();
        cache.token = Some(token.to_string());
        self.persist(&cache);
    }

    fn remove_token(&self) {
        let mut cache = self.cache.lock();
        cache.token = None;
        self.persist(&cache);
    }

    fn account(&self) -> Option<Account> {
        self.cache.lock().account.clone()
    }

    fn set_account(&self, account: &Account) {
        let mut cache = self.cache.lock();
        cache.account = Some(account.clone());
        self.persist(&cache);
    }

    fn remove_account(&self) {
        let mut cache = self.cache.lock();
        cache.account = None;
        self.persist(&cache);
    }
}

/// In-memory credential store for tests.
#[derive(Default)]
pub struct MemoryCredentialStore {
    cache: Mutex<StoredSession>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: &str) -> Self {
        let store = Self::default();
        store.set_token(token);
        store
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn token(&self) -> Option<String> {
        self.cache.lock().token.clone()
    }

    fn set_token(&self, token: &str) {
        self.cache.lock().token = Some(token.to_string());
    }

    fn remove_token(&self) {
        self.cache.lock().token = None;
    }

    fn account(&self) -> Option<Account> {
        self.cache.lock().account.clone()
    }

    fn set_account(&self, account: &Account) {
        self.cache.lock().account = Some(account.clone());
    }

    fn remove_account(&self) {
        self.cache.lock().account = None;
    }
}
