//! Central identity and session management for inkpost.
//! Keep the public surface thin and split implementation across sub-modules.

mod account;
mod credential;
mod error;
mod resolver;
mod gate;
mod session;
mod client;

pub use account::{Account, AccountRecord, AccountStatus, Role};
pub use credential::{extract_bearer, issue_credential, verify_credential, Claims, SigningSecret};
pub use error::AuthError;
pub use resolver::{hash_password, resolve_active_account, verify_password, AccountStore, FileAccountStore, MemoryAccountStore, NewAccount};
pub use gate::{
    authenticate_request, authorize, check_role, optional_auth, protect, resolve_optional_identity,
    AuthContext, CurrentAccount,
};
pub use session::{SessionSnapshot, SessionStore};
pub use client::{ApiClient, CredentialStore, FileCredentialStore, HttpApiClient, LoginOutcome, MemoryCredentialStore};
