//! Domain-specific identifier types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Replica identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReplicaId(pub u64);

impl fmt::Display for ReplicaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "replica_{}", self.0)
    }
}

/// Identity of the client that submitted a request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(pub String);

impl ClientId {
    /// Create a client identity.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// View number. Each view has a fixed primary.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ViewNumber(pub u64);

impl ViewNumber {
    /// The first view.
    pub const INITIAL: Self = ViewNumber(0);

    /// Get the next view number.
    pub fn next(self) -> Self {
        ViewNumber(self.0 + 1)
    }
}

impl fmt::Display for ViewNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "View({})", self.0)
    }
}

/// Sequence number assigned by the primary during pre-prepare.
///
/// Zero is never assigned; it marks "nothing yet" (no request ordered, no
/// checkpoint taken).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SequenceNumber(pub u64);

impl SequenceNumber {
    /// Sentinel for "nothing assigned yet".
    pub const ZERO: Self = SequenceNumber(0);

    /// Get the next sequence number.
    pub fn next(self) -> Self {
        SequenceNumber(self.0 + 1)
    }

    /// Subtract an interval, stopping at zero.
    pub fn saturating_sub(self, interval: u64) -> Self {
        SequenceNumber(self.0.saturating_sub(interval))
    }

    /// Whether this sequence lands on a checkpoint boundary.
    pub fn is_multiple_of(self, interval: u64) -> bool {
        interval > 0 && self.0 > 0 && self.0 % interval == 0
    }
}

impl fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Seq({})", self.0)
    }
}

/// A (view, sequence) pair that a pre-prepare binds a digest to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Slot {
    /// View the digest was ordered in.
    pub view: ViewNumber,
    /// Sequence number assigned by that view's primary.
    pub sequence: SequenceNumber,
}

impl Slot {
    /// Create a slot.
    pub fn new(view: ViewNumber, sequence: SequenceNumber) -> Self {
        Self { view, sequence }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.view.0, self.sequence.0)
    }
}
