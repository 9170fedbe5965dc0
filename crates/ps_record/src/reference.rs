use core::fmt;

use serde::{Deserialize, Serialize};

// -----------------------------------------------------------------------------
// RecordRef

/// An opaque identifier linking records within one serialization session.
///
/// A `RecordRef` stands in for a live object wherever one record needs to
/// point at another: shared and cyclic object relationships are expressed as
/// reference values instead of duplicated data. References are allocated by
/// the writer, densely and in `begin_record` order, and are meaningful only
/// within the session that produced them.
///
/// Every reference appearing in a session's output must resolve to exactly
/// one record produced in the same session; the decode walker reports a
/// reference that never resolves as a dangling-reference failure.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordRef(u32);

impl RecordRef {
    /// Creates a reference from its dense index.
    #[inline]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Returns the dense index of this reference.
    #[inline]
    pub const fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for RecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

impl fmt::Debug for RecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordRef(@{})", self.0)
    }
}

// -----------------------------------------------------------------------------
// Tests
