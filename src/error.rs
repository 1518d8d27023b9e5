//! Error types.
//!
//! [`RemoteError`] is what every backend call fails with. [`ChatError`] is
//! the taxonomy surfaced by the sync layer and the facade.

/// A failed call to the remote collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{}", self.describe())]
pub struct RemoteError {
    /// Human-readable detail reported by the server or transport.
    pub detail: Option<String>,
    /// HTTP status, when the failure came with one.
    pub status: Option<u16>,
}

impl RemoteError {
    #[must_use]
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: Some(detail.into()),
            status: None,
        }
    }

    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Failure with no detail at all.
    #[must_use]
    pub fn unknown() -> Self {
        Self {
            detail: None,
            status: None,
        }
    }

    fn describe(&self) -> String {
        match (&self.detail, self.status) {
            (Some(detail), Some(status)) => format!("remote call failed ({status}): {detail}"),
            (Some(detail), None) => format!("remote call failed: {detail}"),
            (None, Some(status)) => format!("remote call failed ({status})"),
            (None, None) => "remote call failed: unknown error".to_string(),
        }
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        Self {
            detail: Some(err.to_string()),
            status: err.status().map(|s| s.as_u16()),
        }
    }
}

/// Errors surfaced by chat operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChatError {
    /// Input rejected locally before any network call.
    #[error("invalid input: {0}")]
    Validation(String),

    /// The operation needs a current session and there is none.
    #[error("no session selected")]
    NoSession,

    /// The target session or message is no longer present.
    #[error("not found")]
    NotFound,

    /// The same operation is already in flight.
    #[error("operation already in progress")]
    Busy,

    /// The remote collaborator failed.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// Neither the clipboard nor its fallback accepted the text.
    #[error("clipboard unavailable: {0}")]
    Clipboard(String),
}

impl ChatError {
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_error_display() {
        let err = RemoteError::new("session missing").with_status(404);
        assert_eq!(err.to_string(), "remote call failed (404): session missing");
        assert_eq!(
            RemoteError::unknown().to_string(),
            "remote call failed: unknown error"
        );
    }

    #[test]
    fn test_chat_error_wraps_remote() {
        let err: ChatError = RemoteError::new("boom").into();
        assert!(matches!(err, ChatError::Remote(_)));
        assert_eq!(err.to_string(), "remote call failed: boom");
    }
}
