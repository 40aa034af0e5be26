//! Identity types for bodies and futures

use std::fmt;

/// Identity of an active object's execution body.
///
/// The identity survives migration: a relocated body keeps its id and only
/// its endpoint changes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BodyId(pub uuid::Uuid);

impl BodyId {
    /// Generate a fresh random identity
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Short form used in logs
    pub fn short(&self) -> String {
        let s = self.0.simple().to_string();
        s[..8].to_string()
    }

    /// Stable hash value exposed to callers through `hash_code`
    pub fn hash_code(&self) -> i64 {
        let v = self.0.as_u128();
        ((v >> 64) as u64 ^ v as u64) as i64
    }
}

impl fmt::Debug for BodyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BodyId({})", self.short())
    }
}

impl fmt::Display for BodyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.short())
    }
}

/// Identity of a future: the body that created it and a per-creator sequence number
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FutureId {
    /// Body on whose behalf the call was sent
    pub creator: BodyId,
    /// Sequence number, unique per creator
    pub seq: u64,
}

impl FutureId {
    pub fn new(creator: BodyId, seq: u64) -> Self {
        Self { creator, seq }
    }
}

impl fmt::Debug for FutureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FutureId({}#{})", self.creator.short(), self.seq)
    }
}

impl fmt::Display for FutureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.creator.short(), self.seq)
    }
}
