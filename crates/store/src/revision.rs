use serde::{Deserialize, Serialize};

/// Monotone revision token assigned by the catalog store.
///
/// Every write to a product document bumps its revision. Writers that need
/// read-modify-write safety pass the revision they read back as a guard; the
/// store rejects the write if the document has moved on since.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Revision(i64);

impl Revision {
    /// The revision of a document that has never been written.
    pub fn initial() -> Self {
        Self(0)
    }

    /// The revision assigned by the first write.
    pub fn first() -> Self {
        Self(1)
    }

    /// Creates a revision from a raw value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the next revision.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the raw revision value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Revision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
