// (c) Copyright 2025 Helsing GmbH. All rights reserved.
use crate::{Kind, Path};

/// Errors raised by the drafting engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DraftError {
    /// A session was started on something that is not an object, sequence, map or set.
    #[error("cannot draft a {found} value; expected an object, sequence, map or set")]
    InvalidArgument { found: Kind },
    /// An operation that the container kind does not support.
    #[error("{op} is not supported on a {kind} at `{path}`")]
    Protocol {
        path: Path,
        op: &'static str,
        kind: Kind,
    },
    /// A sequence write past the end.
    #[error("index {index} is out of bounds for sequence of length {len} at `{path}`")]
    OutOfBounds { path: Path, index: usize, len: usize },
    /// A child draft was requested for a primitive or missing value.
    #[error("value at `{path}` is not a compound")]
    NotCompound { path: Path },
    /// The descriptor graph is in a state it should never reach.
    #[error("internal consistency violation at `{path}`: {reason}")]
    InternalConsistency { path: Path, reason: &'static str },
    /// The draft was used after its session ended.
    #[error("draft used after its session ended")]
    Revoked,
    /// The draft's node was replaced or removed by a later write.
    #[error("draft at `{path}` no longer refers to a live value")]
    Stale { path: Path },
}

impl DraftError {
    #[inline]
    pub(crate) fn protocol(path: &Path, op: &'static str, kind: Kind) -> Self {
        Self::Protocol {
            path: path.clone(),
            op,
            kind,
        }
    }

    #[inline]
    pub(crate) fn out_of_bounds(path: &Path, index: usize, len: usize) -> Self {
        Self::OutOfBounds {
            path: path.clone(),
            index,
            len,
        }
    }

    #[inline]
    pub(crate) fn not_compound(path: Path) -> Self {
        Self::NotCompound { path }
    }

    #[inline]
    pub(crate) fn inconsistent(path: &Path, reason: &'static str) -> Self {
        Self::InternalConsistency {
            path: path.clone(),
            reason,
        }
    }
}

/// Errors raised when mutating a [`crate::Compound`] directly or converting a [`crate::Value`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValueError {
    #[error("cannot mutate a frozen {kind}")]
    Frozen { kind: Kind },
    #[error("{op} is not supported on a {kind}")]
    KindMismatch { op: &'static str, kind: Kind },
    #[error("index {index} is out of bounds for sequence of length {len}")]
    OutOfBounds { index: usize, len: usize },
    /// The value has no equivalent in the target representation.
    #[error("a {what} cannot be represented")]
    NotRepresentable { what: &'static str },
}
