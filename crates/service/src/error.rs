use crate::registry::RegistryError;
use mtbridge_core::TerminalError;

/// Errors surfaced by [`ConnectionService`](crate::ConnectionService).
#[derive(Debug, Clone, thiserror::Error)]
pub enum ServiceError {
    #[error("Connection not found: {0}")]
    NotFound(String),
    #[error("Invalid request: {0}")]
    Validation(String),
    #[error("Connection {0} is already active; disconnect it first")]
    SessionInUse(String),
    #[error(transparent)]
    Terminal(#[from] TerminalError),
}

impl From<RegistryError> for ServiceError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound(id) => ServiceError::NotFound(id),
        }
    }
}

/// Coarse error category reported to API clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InitError,
    AuthError,
    NotFound,
    ValidationError,
    SessionInUse,
    UnknownError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InitError => "init_error",
            ErrorKind::AuthError => "auth_error",
            ErrorKind::NotFound => "not_found",
            ErrorKind::ValidationError => "validation_error",
            ErrorKind::SessionInUse => "session_in_use",
            ErrorKind::UnknownError => "unknown_error",
        }
    }
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::NotFound(_) => ErrorKind::NotFound,
            ServiceError::Validation(_) => ErrorKind::ValidationError,
            ServiceError::SessionInUse(_) => ErrorKind::SessionInUse,
            ServiceError::Terminal(TerminalError::Init(_)) => ErrorKind::InitError,
            ServiceError::Terminal(TerminalError::Auth { .. }) => ErrorKind::AuthError,
            // The terminal lost the session the connection was created with.
            ServiceError::Terminal(TerminalError::NoActiveSession) => ErrorKind::NotFound,
            ServiceError::Terminal(_) => ErrorKind::UnknownError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        let auth = ServiceError::from(TerminalError::Auth {
            code: -6,
            message: "Authorization failed".to_string(),
        });
        assert_eq!(auth.kind(), ErrorKind::AuthError);
        assert_eq!(auth.to_string(), "Login failed (-6): Authorization failed");

        let missing = ServiceError::from(RegistryError::NotFound("MT5_1_2".to_string()));
        assert_eq!(missing.kind().as_str(), "not_found");

        let transport = ServiceError::from(TerminalError::Transport("reset".to_string()));
        assert_eq!(transport.kind(), ErrorKind::UnknownError);
    }
}
