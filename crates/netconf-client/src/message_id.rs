//! Generators for `message-id` attribute values.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use uuid::Uuid;

/// Produces a fresh `message-id` for every outbound RPC.
pub trait MessageIdGenerator: fmt::Debug + Send + Sync {
    /// Returns the next id. Ids must not repeat within a session.
    fn next_id(&self) -> String;
}

/// Random UUIDv4 ids.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidGenerator;

impl MessageIdGenerator for UuidGenerator {
    fn next_id(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

/// Increasing decimal ids, as most device CLIs use.
#[derive(Debug, Default)]
pub struct SequentialGenerator {
    next: AtomicU64,
}

impl SequentialGenerator {
    /// Starts counting at `first`.
    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }
}

impl MessageIdGenerator for SequentialGenerator {
    fn next_id(&self) -> String {
        self.next.fetch_add(1, Ordering::Relaxed).to_string()
    }
}
