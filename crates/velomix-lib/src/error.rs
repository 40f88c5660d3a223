use std::path::PathBuf;

use thiserror::Error;

/// Convenient result alias for the velomix library.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level library error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Fragment database could not be located at the resolved path.
    #[error("fragment database not found at {path}")]
    DatabaseNotFound { path: PathBuf },

    /// No suitable project directories could be resolved for this platform.
    #[error("failed to resolve project directories for the fragment database")]
    ProjectDirsUnavailable,

    /// Raised when a generation query carries out-of-range parameters.
    #[error("invalid generation query: {reason}")]
    InvalidQuery { reason: String },

    /// Raised when a stored or imported fragment kind is not recognised.
    #[error("unknown fragment kind: {value}")]
    UnknownFragmentKind { value: String },

    /// Raised when an imported fragment has neither geometry nor endpoints.
    #[error("fragment '{title}' cannot be used: {reason}")]
    InvalidFragment { title: String, reason: String },

    /// Raised when the store connection lock was poisoned by a panicking writer.
    #[error("fragment store is unavailable")]
    StoreUnavailable,

    /// The routing service answered with a non-success HTTP status.
    #[error("routing service returned HTTP {status}")]
    RoutingStatus { status: u16 },

    /// The routing service answered, but without a usable route.
    #[error("routing service response rejected: {reason}")]
    RoutingResponse { reason: String },

    /// The routing service did not answer within the configured timeout.
    #[error("routing service timed out after {millis} ms")]
    RoutingTimeout { millis: u128 },

    /// A task moved onto the blocking thread pool panicked or was cancelled.
    #[error("blocking task failed")]
    BlockingTask(#[from] tokio::task::JoinError),

    /// Wrapper for SQLite errors.
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    /// Wrapper for IO errors.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Wrapper for HTTP client errors.
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// Wrapper for JSON decoding errors.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether a routing call that failed with this error is worth repeating.
    ///
    /// Transport failures, timeouts, throttling, and server-side errors are
    /// retried; a well-formed "no route" answer is not.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Http(_) | Error::RoutingTimeout { .. } => true,
            Error::RoutingStatus { status } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_transient() {
        assert!(Error::RoutingStatus { status: 503 }.is_transient());
        assert!(Error::RoutingStatus { status: 429 }.is_transient());
        assert!(Error::RoutingTimeout { millis: 10 }.is_transient());
    }

    #[test]
    fn rejected_routes_are_final() {
        assert!(!Error::RoutingStatus { status: 422 }.is_transient());
        assert!(!Error::RoutingResponse {
            reason: "NoRoute".to_string()
        }
        .is_transient());
    }
}
