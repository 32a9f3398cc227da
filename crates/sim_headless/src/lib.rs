//! Headless simulation runner.
//!
//! Runs the deterministic game core without any frontend, for CI
//! verification, determinism checks and replay validation. Reports are
//! emitted as JSON on stdout; logs go to stderr.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod runner;
pub mod scenario;

use thiserror::Error;

/// Errors the headless runner can surface to the operator.
#[derive(Debug, Error)]
pub enum HeadlessError {
    /// Reading a scenario or rules file failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A scenario file failed to parse.
    #[error("Failed to parse scenario {path}: {message}")]
    ScenarioParse {
        /// The offending file.
        path: String,
        /// Parser diagnostic.
        message: String,
    },

    /// The simulation rejected a scenario's contents.
    #[error(transparent)]
    Game(#[from] sim_core::error::GameError),

    /// Report serialization failed.
    #[error("Failed to serialize report: {0}")]
    Report(#[from] serde_json::Error),
}

/// Result alias for headless operations.
pub type Result<T> = std::result::Result<T, HeadlessError>;
