//! Error types for client adapter operations.

use thiserror::Error;

/// Failure while talking to a torrent client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Could not reach or authenticate with the client.
    #[error("failed connecting to client")]
    Connect {
        /// Operation identifier, e.g. `qbit.login`.
        operation: &'static str,
        /// Underlying transport failure, when there is one.
        #[source]
        source: Option<reqwest::Error>,
    },
    /// The client rejected the supplied credentials.
    #[error("client rejected credentials")]
    Unauthorized,
    /// One API call failed in transit.
    #[error("client request failed")]
    Request {
        /// Operation identifier.
        operation: &'static str,
        /// Underlying transport failure.
        #[source]
        source: reqwest::Error,
    },
    /// The client answered with an unexpected HTTP status.
    #[error("client returned status {status}")]
    Status {
        /// Operation identifier.
        operation: &'static str,
        /// HTTP status code received.
        status: u16,
    },
    /// The response body could not be decoded.
    #[error("decoding client response failed")]
    Decode {
        /// Operation identifier.
        operation: &'static str,
        /// Underlying decode failure.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// The client's application-level response signalled an error.
    #[error("client API error: {message}")]
    Api {
        /// Application-level error message.
        message: String,
    },
    /// The server version does not support the requested call; callers
    /// with a fallback path (e.g. tag replacement) should take it.
    #[error("operation not supported by this client version")]
    UnsupportedVersion,
    /// The client has no tag concept at all.
    #[error("client does not support tags")]
    TagsUnsupported,
    /// Hardlink-based relabel needs a per-label path the client lacks.
    #[error("no label path known for label `{label}`")]
    LabelPathMissing {
        /// The label that has no configured path.
        label: String,
    },
    /// A filesystem step of a hardlink relabel failed.
    #[error("filesystem operation `{operation}` failed for {path}")]
    Fs {
        /// Operation identifier, e.g. `link`.
        operation: &'static str,
        /// Path the operation was applied to.
        path: String,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
}

/// Convenience alias for adapter results.
pub type ClientResult<T> = Result<T, ClientError>;
