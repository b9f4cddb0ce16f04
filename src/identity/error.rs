use thiserror::Error;

/// Failure taxonomy of the authentication pipeline.
///
/// Public messages are fixed and deliberately generic: signature, payload and
/// expiry problems all surface as `InvalidCredential` so nothing about the
/// verification internals leaks to the client. The underlying cause is logged
/// server-side at the point of failure.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("no bearer credential presented")]
    MissingCredential,
    #[error("credential failed verification")]
    InvalidCredential,
    #[error("no account matches the credential subject")]
    AccountNotFound,
    #[error("account is {status}")]
    AccountInactive { status: String },
    #[error("role {actual} not in allowed set: {required}")]
    RoleNotAllowed { required: String, actual: String },
    #[error("internal fault: {0}")]
    Internal(String),
}

impl AuthError {
    /// HTTP status this failure maps to under the mandatory policy.
    pub fn http_status(&self) -> u16 {
        match self {
            AuthError::RoleNotAllowed { .. } => 403,
            AuthError::Internal(_) => 500,
            _ => 401,
        }
    }

    /// The exact client-facing message. Never includes internal detail.
    pub fn public_message(&self) -> String {
        match self {
            AuthError::MissingCredential => "Access denied. No token provided.".to_string(),
            AuthError::InvalidCredential => "Token is not valid.".to_string(),
            AuthError::AccountNotFound => "Token is not valid. User not found.".to_string(),
            AuthError::AccountInactive { status } => format!("Admin account is {}.", status),
            AuthError::RoleNotAllowed { required, .. } => format!("Access denied. Required role: {}", required),
            AuthError::Internal(_) => "Internal server error.".to_string(),
        }
    }
}
