//! Error types for the simulation core.
//!
//! Nothing in the simulation is fatal to the process: invariant violations
//! are logged and the offending operation degrades to a no-op or an error
//! return that callers are expected to check.

use thiserror::Error;

/// Result type alias using [`GameError`].
pub type Result<T> = std::result::Result<T, GameError>;

/// Top-level error type for all simulation errors.
#[derive(Debug, Error)]
pub enum GameError {
    /// Item creation was requested outside the map bounds.
    #[error("Position ({x}, {y}) is outside the map")]
    InvalidPosition {
        /// Requested x coordinate (cell units).
        x: i64,
        /// Requested y coordinate (cell units).
        y: i64,
    },

    /// Unknown unit type identifier.
    #[error("Unknown unit type: {0}")]
    UnknownUnitType(u32),

    /// Stale or never-assigned item reference.
    #[error("Item not found: {0}")]
    ItemNotFound(u32),

    /// Unknown player identifier.
    #[error("Player not found: {0}")]
    PlayerNotFound(u32),

    /// An event was enqueued under a name that was never declared.
    #[error("Event name not declared: {0}")]
    UndeclaredEvent(String),

    /// Rule data file parsing error.
    #[error("Failed to parse data file '{path}': {message}")]
    DataParseError {
        /// Path to the file that failed to parse.
        path: String,
        /// Error message.
        message: String,
    },

    /// Invalid simulation state (serialization failures and the like).
    #[error("Invalid game state: {0}")]
    InvalidState(String),

    /// A sync acknowledgement referenced an unknown check.
    #[error("Unknown sync check id: {0}")]
    UnknownSyncId(u32),

    /// Desync detected in multiplayer.
    #[error("Desync detected at tick {tick}: local hash {local_hash}, remote hash {remote_hash}")]
    DesyncDetected {
        /// Tick where desync occurred.
        tick: u64,
        /// Local simulation hash.
        local_hash: u64,
        /// Remote simulation hash.
        remote_hash: u64,
    },
}
