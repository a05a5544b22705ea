//! Error types for simulation setup and teardown.

use thiserror::Error;

use crate::sim::BodyId;

/// Errors surfaced by the simulation API.
///
/// Per-tick motion and collision work never produces these; they come from
/// configuration, settings files, or calls on a torn-down arena.
#[derive(Debug, Error)]
pub enum SimError {
    /// Bad startup parameters (body count, table size, settings ranges).
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Normalization of a zero-length or non-finite vector.
    #[error("cannot normalize a zero-length or non-finite vector")]
    DegenerateVector,

    /// The arena has already been stopped.
    #[error("simulation already stopped")]
    AlreadyStopped,

    /// No body with this id exists in the arena.
    #[error("unknown body {0}")]
    UnknownBody(BodyId),

    /// Settings file could not be read, or a mover thread could not be spawned.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Settings JSON could not be parsed or written.
    #[error("settings json: {0}")]
    Parse(#[from] serde_json::Error),
}

impl SimError {
    /// Creates an invalid configuration error.
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration(reason.into())
    }
}

pub type SimResult<T> = Result<T, SimError>;
