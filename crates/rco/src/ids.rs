//! Handle id generation.
//!
//! Ids name functions across the wire, so they must never repeat within a connection
//! and should not be guessable by the peer.

use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

/// Source of fresh handle ids.
pub trait IdGenerator: Send + Sync + 'static {
    fn next_id(&self) -> String;
}

/// Random v4 UUIDs in simple (hyphenless) form. The default.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn next_id(&self) -> String {
        uuid::Uuid::new_v4().simple().to_string()
    }
}

/// Predictable `prefix-N` ids. Unique, but guessable; meant for tests and traces.
#[derive(Debug)]
pub struct SequentialIds {
    prefix: String,
    next: AtomicU64,
}

impl SequentialIds {
    /// Creates a generator whose first id is `{prefix}-1`.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(1),
        }
    }
}

impl IdGenerator for SequentialIds {
    fn next_id(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{}-{}", self.prefix, n)
    }
}
