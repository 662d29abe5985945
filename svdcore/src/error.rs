//! Error types for the strip-cluster engine.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClusterError {
    #[error("Strip index went backwards: previous {previous}, got {got}")]
    UnsortedStrip { previous: usize, got: usize },

    #[error("Time index went backwards on strip {strip}: previous {previous}, got {got}")]
    UnsortedTime { strip: usize, previous: usize, got: usize },

    #[error("Invalid noise {noise} on strip {strip}, noise must be positive and finite")]
    InvalidNoise { strip: usize, noise: f32 },

    #[error("Time index {time} on strip {strip} outside the cache window of {capacity} bins")]
    TimeOutOfWindow { strip: usize, time: usize, capacity: usize },

    #[error("Candidate {0} is not alive in this scan")]
    DeadCandidate(usize),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ClusterError {
    /// Recoverable errors only cost the offending sample, everything else aborts the scan.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ClusterError::TimeOutOfWindow { .. })
    }
}

pub type Result<T> = std::result::Result<T, ClusterError>;
