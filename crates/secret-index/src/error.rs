use std::time::Duration;

/// Error returned by a [`SecretBackend`](crate::backend::SecretBackend) call.
///
/// Carries the HTTP-style status code when the backend reported one so that
/// permission failures can be told apart from everything else.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct BackendError {
    status: Option<u16>,
    message: String,
}

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }

    pub fn with_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
        }
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::with_status(403, message)
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns true for 403-class failures.
    ///
    /// The structured status wins when present; otherwise the message text is
    /// checked for "permission denied" or "403".
    pub fn is_permission_denied(&self) -> bool {
        if let Some(status) = self.status {
            return status == 403;
        }
        let message = self.message.to_ascii_lowercase();
        message.contains("permission denied") || message.contains("403")
    }
}

/// A LIST call failed somewhere in the tree.
#[derive(Debug, Clone, thiserror::Error)]
#[error("failed to list secrets at path {path:?}: {source}")]
pub struct EnumerationError {
    pub path: String,
    #[source]
    pub source: BackendError,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum RebuildError {
    #[error("enumeration failed: {0}")]
    Enumeration(#[from] EnumerationError),

    #[error("rebuild cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum SearchError {
    #[error("invalid search criteria: {0}")]
    InvalidCriteria(String),

    #[error("search timed out after {0:?}")]
    Timeout(Duration),

    #[error("internal search error: {0}")]
    Internal(String),
}

pub type SearchResult<T> = std::result::Result<T, SearchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structured_status_decides_permission_denied() {
        assert!(BackendError::with_status(403, "nope").is_permission_denied());
        assert!(!BackendError::with_status(500, "permission denied").is_permission_denied());
    }

    #[test]
    fn message_fallback_detects_permission_denied() {
        assert!(BackendError::new("Code: 403. Errors: * permission denied").is_permission_denied());
        assert!(BackendError::new("Permission Denied").is_permission_denied());
        assert!(!BackendError::new("connection refused").is_permission_denied());
    }
}
