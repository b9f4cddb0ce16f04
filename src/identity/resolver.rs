//! Identity resolution: claim subject -> live account.
//!
//! The persistence collaborator is modeled as the `AccountStore` trait. Two
//! implementations ship with the crate: a JSON-file store used by the server
//! (accounts live under the data root, seeded with a default admin on first
//! run) and an in-memory store for tests.

use anyhow::{anyhow, Context, Result};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use password_hash::{PasswordHash, SaltString};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::account::{Account, AccountRecord, AccountStatus, Role};
use super::error::AuthError;

/// Persistence collaborator for account records.
///
/// `find_by_id` returns the secret-free projection; only the login path needs
/// the full record (password hash) and goes through `find_record_by_email`.
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<Account>>;
    async fn find_record_by_email(&self, email: &str) -> Result<Option<AccountRecord>>;
    async fn list(&self) -> Result<Vec<Account>>;
}

/// Look up the subject and require an active account.
pub async fn resolve_active_account(store: &dyn AccountStore, id: &str) -> Result<Account, AuthError> {
    let found = store
        .find_by_id(id)
        .await
        .map_err(|e| AuthError::Internal(format!("account lookup failed: {e}")))?;
    let account = found.ok_or(AuthError::AccountNotFound)?;
    if account.status != AccountStatus::Active {
        return Err(AuthError::AccountInactive { status: account.status.to_string() });
    }
    Ok(account)
}

pub fn hash_password(password: &str) -> Result<String> {
    let mut salt_bytes = [0u8; 16];
    getrandom::getrandom(&mut salt_bytes).map_err(|e| anyhow!(e.to_string()))?;
    let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| anyhow!(e.to_string()))?;
    let argon2 = Argon2::default();
    let phc = argon2.hash_password(password.as_bytes(), &salt).map_err(|e| anyhow!(e.to_string()))?.to_string();
    Ok(phc)
}

pub fn verify_password(hash: &str, password: &str) -> bool {
    if let Ok(parsed) = PasswordHash::new(hash) {
        let argon2 = Argon2::default();
        argon2.verify_password(password.as_bytes(), &parsed).is_ok()
    } else {
        false
    }
}

/// Input for creating an account through a store implementation.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub email: String,
    pub password: String,
    pub role: Role,
    pub status: AccountStatus,
    pub display_name: Option<String>,
}

/// JSON-file backed store: one `accounts.json` under the data root, loaded at
/// open and rewritten on mutation. Adequate for an admin roster of a handful
/// of rows.
pub struct FileAccountStore {
    path: PathBuf,
    records: RwLock<HashMap<String, AccountRecord>>,
}

impl FileAccountStore {
    pub fn open(data_root: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_root)
            .with_context(|| format!("creating data root {}", data_root.display()))?;
        let path = data_root.join("accounts.json");
        let records: HashMap<String, AccountRecord> = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?
        } else {
            HashMap::new()
        };
        Ok(Self { path, records: RwLock::new(records) })
    }

    /// Seed a default admin on first run so a fresh install is reachable.
    pub fn ensure_default_admin(&self, email: &str, password: &str) -> Result<()> {
        {
            let map = self.records.read();
            if map.values().any(|r| r.role == Role::Admin) {
                return Ok(());
            }
        }
        self.add(NewAccount {
            email: email.to_string(),
            password: password.to_string(),
            role: Role::Admin,
            status: AccountStatus::Active,
            display_name: Some("Administrator".to_string()),
        })?;
        info!(target: "identity", "seeded default admin account '{}'", email);
        warn!(target: "identity", "default admin password in use; change it before exposing the server");
        Ok(())
    }

    pub fn add(&self, new: NewAccount) -> Result<Account> {
        let record = AccountRecord {
            id: uuid::Uuid::new_v4().to_string(),
            email: new.email,
            password_hash: hash_password(&new.password)?,
            role: new.role,
            status: new.status,
            display_name: new.display_name,
            created_at: Utc::now(),
        };
        let projection = record.project();
        {
            let mut map = self.records.write();
            map.insert(record.id.clone(), record);
            self.persist(&map)?;
        }
        Ok(projection)
    }

    fn persist(&self, map: &HashMap<String, AccountRecord>) -> Result<()> {
        let raw = serde_json::to_string_pretty(map)?;
        std::fs::write(&self.path, raw).with_context(|| format!("writing {}", self.path.display()))?;
        Ok(())
    }
}

#[async_trait]
impl AccountStore for FileAccountStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<Account>> {
        Ok(self.records.read().get(id).map(AccountRecord::project))
    }

    async fn find_record_by_email(&self, email: &str) -> Result<Option<AccountRecord>> {
        let map = self.records.read();
        Ok(map.values().find(|r| r.email.eq_ignore_ascii_case(email)).cloned())
    }

    async fn list(&self) -> Result<Vec<Account>> {
        let mut out: Vec<Account> = self.records.read().values().map(AccountRecord::project).collect();
        out.sort_by(|a, b| a.email.cmp(&b.email));
        Ok(out)
    }
}

/// In-memory store for tests and embedding.
#[derive(Default)]
pub struct MemoryAccountStore {
    records: RwLock<HashMap<String, AccountRecord>>,
    /// When set, every lookup fails. Lets tests exercise the 500 path.
    pub fail_lookups: std::sync::atomic::AtomicBool,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: AccountRecord) {
        self.records.write().insert(record.id.clone(), record);
    }

    pub fn insert_new(&self, id: &str, new: NewAccount) -> Account {
        let record = AccountRecord {
            id: id.to_string(),
            email: new.email,
            password_hash: hash_password(&new.password).expect("hash"),
            role: new.role,
            status: new.status,
            display_name: new.display_name,
            created_at: Utc::now(),
        };
        let projection = record.project();
        self.insert(record);
        projection
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<Account>> {
        if self.fail_lookups.load(std::sync::atomic::Ordering::Relaxed) {
            return Err(anyhow!("store offline"));
        }
        Ok(self.records.read().get(id).map(AccountRecord::project))
    }

    async fn find_record_by_email(&self, email: &str) -> Result<Option<AccountRecord>> {
        if self.fail_lookups.load(std::sync::atomic::Ordering::Relaxed) {
            return Err(anyhow!("store offline"));
        }
        let map = self.records.read();
        Ok(map.values().find(|r| r.email.eq_ignore_ascii_case(email)).cloned())
    }

    async fn list(&self) -> Result<Vec<Account>> {
        let mut out: Vec<Account> = self.records.read().values().map(AccountRecord::project).collect();
        out.sort_by(|a, b| a.email.cmp(&b.email));
        Ok(out)
    }
}
