//! Engine-level error taxonomy.
//!
//! Everything surfacing from here is fatal for the run; per-torrent and
//! per-file failures are logged, counted in the action summary, and
//! never propagate.

use std::path::PathBuf;

use thiserror::Error;

use harrow_client::ClientError;
use harrow_config::ConfigError;
use harrow_rules::CompileError;

/// Fatal failure while driving an action.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Configuration lookup or validation failed.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The filter did not compile.
    #[error(transparent)]
    Compile(#[from] CompileError),
    /// A client call the action cannot proceed without failed.
    #[error(transparent)]
    Client(#[from] ClientError),
    /// The filter reads free-space figures but the client cannot supply
    /// them without a configured `free_space_path`.
    #[error("client requires free_space_path for free-space rules")]
    FreeSpacePathRequired,
    /// The orphan scan needs the client's `download_path`.
    #[error("client download_path must be set for the orphan scan")]
    DownloadPathRequired,
    /// The orphan scan could not read the download root.
    #[error("failed walking download root {path}")]
    Scan {
        /// Root that was being walked.
        path: PathBuf,
        /// Underlying walk failure.
        #[source]
        source: walkdir::Error,
    },
}

/// Convenience alias for engine results.
pub type EngineResult<T> = Result<T, EngineError>;
