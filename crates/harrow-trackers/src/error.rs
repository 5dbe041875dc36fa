//! Error type for tracker API calls.
//!
//! Every variant is non-authoritative: a failed lookup never classifies
//! a torrent, it only withholds the plugin's answer.

use thiserror::Error;

/// Failure while querying a tracker API.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// The HTTP request could not be completed.
    #[error("tracker request failed")]
    Request {
        /// Operation identifier, e.g. `btn.get_torrent_by_id`.
        operation: &'static str,
        /// Underlying transport failure.
        #[source]
        source: reqwest::Error,
    },
    /// The tracker answered with an unexpected HTTP status.
    #[error("tracker returned status {status}")]
    Status {
        /// Operation identifier.
        operation: &'static str,
        /// HTTP status code received.
        status: u16,
    },
    /// The response body could not be decoded.
    #[error("decoding tracker response failed")]
    Decode {
        /// Operation identifier.
        operation: &'static str,
        /// Underlying decode failure.
        #[source]
        source: reqwest::Error,
    },
    /// The tracker's application-level response signalled an error.
    #[error("tracker API error: {message}")]
    Api {
        /// Application-level error message.
        message: String,
    },
    /// The torrent carries no comment to parse a web ID from.
    #[error("empty comment field")]
    MissingComment,
    /// No web ID could be parsed from the comment.
    #[error("no torrent ID found in comment")]
    MissingTorrentId,
    /// The plugin observed a transport failure earlier in the run and
    /// refuses further calls.
    #[error("tracker API degraded for this run")]
    Degraded,
}

/// Convenience alias for tracker operation results.
pub type TrackerResult<T> = Result<T, TrackerError>;
