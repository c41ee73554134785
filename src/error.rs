use glam::Vec3;
use thiserror::Error;
use crate::Digest;

/// Everything that can go wrong inside the tree. All variants are
/// recoverable by the caller; a failed insert leaves the tree exactly
/// as it was.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TreeError {
    /// The point lies outside the root volume. Only ever raised at the
    /// root entry call; recursive descent is pre-routed and cannot miss.
    #[error("point {position} lies outside the root volume")]
    OutOfBounds { position: Vec3 },

    /// The volume is malformed: `min` must be strictly below `max` on
    /// every axis.
    #[error("invalid bounds: min {min} is not strictly below max {max} on every axis")]
    InvalidBounds { min: Vec3, max: Vec3 },

    /// Points collided past the maximum subdivision depth and the
    /// terminal cluster is full (or the cluster fallback is disabled).
    #[error("cluster capacity exhausted at {position}")]
    CapacityExceeded { position: Vec3 },

    /// A stored digest does not match its recomputation. Signals
    /// possible corruption, not a structural bug; surfaced only by
    /// verification, never by insert.
    #[error("digest mismatch at depth {depth}: expected {expected}, computed {computed}")]
    HashMismatch {
        depth: u8,
        expected: Digest,
        computed: Digest,
    },

    /// No point is stored at the given position.
    #[error("no point stored at {position}")]
    NotFound { position: Vec3 },
}
