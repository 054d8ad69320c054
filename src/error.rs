//! Error types
//!
//! Library-level failures. Nothing here is fatal to the process: job errors
//! end up as terminal job states and guard failures as rejected transitions.

use std::time::Duration;

use thiserror::Error;

use crate::workflow::Stage;

/// Errors surfaced by the portrait workflow and its collaborators
#[derive(Debug, Error)]
pub enum PortraitError {
    /// Upload input could not be decoded as an image
    #[error("unreadable image: {0}")]
    UnreadableImage(String),

    /// Style id is not present in the catalog
    #[error("unknown style '{0}'")]
    InvalidStyle(String),

    /// No job with the given id is tracked by the controller
    #[error("job {0} not found")]
    JobNotFound(u64),

    /// The active generation job failed
    #[error(transparent)]
    Job(#[from] JobError),

    /// An operation needs a generation job but none is active
    #[error("no generation job is active")]
    NoActiveJob,

    /// Nothing to export or the exporter failed
    #[error("export failed: {0}")]
    Export(String),

    /// The share collaborator failed
    #[error("share failed: {0}")]
    Share(String),

    /// A workflow transition was rejected
    #[error(transparent)]
    Transition(#[from] TransitionError),
}

/// Why a generation job ended in `Failed`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobError {
    /// The transformation backend could not produce a result
    #[error("transformation failed: {0}")]
    Transform(String),

    /// The job did not reach a terminal state in time
    #[error("job timed out after {0:?}")]
    Timeout(Duration),
}

/// A workflow event that the state machine refused
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    /// Guard for the target stage does not hold
    #[error("cannot enter {target:?} stage: {reason}")]
    GuardRejected { target: Stage, reason: &'static str },

    /// Selected style id is unknown
    #[error("unknown style '{0}'")]
    InvalidStyle(String),

    /// Event is not meaningful in the current stage
    #[error("event not allowed in {0:?} stage")]
    WrongStage(Stage),
}

/// Invalid style catalog construction
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("style catalog must not be empty")]
    Empty,

    #[error("duplicate style id '{0}'")]
    DuplicateId(String),
}

/// Invalid milestone table
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MilestoneError {
    #[error("milestone table must not be empty")]
    Empty,

    #[error("milestone percentages must strictly increase (got {0} after {1})")]
    NotIncreasing(u8, u8),

    #[error("final milestone must be 100 (got {0})")]
    DoesNotComplete(u8),
}

pub type Result<T> = std::result::Result<T, PortraitError>;
