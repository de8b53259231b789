use std::fmt;

/// Status codes returned by the database for a procedure invocation.
///
/// Only [`ResponseStatus::Success`] counts as success; every other status is
/// a failure of some kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStatus {
    /// The invocation committed.
    Success,
    /// The procedure aborted with a user-visible error.
    UserError,
    /// The cluster rejected the invocation without executing it.
    GracefulFailure,
    /// The cluster failed while executing the invocation.
    UnexpectedFailure,
    /// The connection carrying the invocation was lost; the outcome is
    /// unknown. The only status that re-enters the submit loop.
    ConnectionLost,
    /// No cluster node was available to accept the invocation.
    ServerUnavailable,
}

impl ResponseStatus {
    pub fn is_success(self) -> bool {
        matches!(self, ResponseStatus::Success)
    }
}

impl fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResponseStatus::Success => "success",
            ResponseStatus::UserError => "user error",
            ResponseStatus::GracefulFailure => "graceful failure",
            ResponseStatus::UnexpectedFailure => "unexpected failure",
            ResponseStatus::ConnectionLost => "connection lost",
            ResponseStatus::ServerUnavailable => "server unavailable",
        };
        f.write_str(name)
    }
}

/// A procedure invocation response.
///
/// Bulk-load responses carry no result tables; callers only inspect the
/// status and the human-readable status string.
#[derive(Debug, Clone)]
pub struct ClientResponse {
    status: ResponseStatus,
    status_string: String,
}

impl ClientResponse {
    pub fn new(status: ResponseStatus, status_string: impl Into<String>) -> Self {
        Self {
            status,
            status_string: status_string.into(),
        }
    }

    pub fn success() -> Self {
        Self::new(ResponseStatus::Success, "")
    }

    /// The response the loader synthesizes when a submit fails because the
    /// connection to the database was lost and the client does not reconnect.
    pub fn connection_lost() -> Self {
        Self::new(
            ResponseStatus::ConnectionLost,
            "connection to database was lost",
        )
    }

    pub fn status(&self) -> ResponseStatus {
        self.status
    }

    pub fn status_string(&self) -> &str {
        &self.status_string
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_success_is_success() {
        assert!(ClientResponse::success().is_success());
        for status in [
            ResponseStatus::UserError,
            ResponseStatus::GracefulFailure,
            ResponseStatus::UnexpectedFailure,
            ResponseStatus::ConnectionLost,
            ResponseStatus::ServerUnavailable,
        ] {
            assert!(!ClientResponse::new(status, "boom").is_success());
        }
    }
}
