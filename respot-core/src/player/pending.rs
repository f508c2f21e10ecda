//! Outstanding key requests keyed by sequence number.
//!
//! Each registration carries a generation number. The waiter removes its
//! slot by `(sequence, generation)`, so an abandoned wait can never evict
//! a newer request that happens to reuse the same sequence number.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::oneshot;

use crate::error::KeyError;
use crate::protocol::ids::AudioKey;

pub(crate) type KeySlot = oneshot::Sender<Result<AudioKey, KeyError>>;

// ── PendingKey ────────────────────────────────────────────────────

/// A key request waiting for its response.
#[derive(Debug)]
pub(crate) struct PendingKey {
    pub(crate) slot: KeySlot,
    pub(crate) generation: u64,
    /// When the slot was registered.
    pub(crate) sent_at: Instant,
}

impl PendingKey {
    /// How long this request has been in flight.
    pub(crate) fn elapsed(&self) -> Duration {
        self.sent_at.elapsed()
    }
}

// ── PendingKeys ───────────────────────────────────────────────────

#[derive(Debug, Default)]
pub(crate) struct PendingKeys {
    requests: HashMap<u32, PendingKey>,
    next_generation: u64,
    closed: bool,
}

impl PendingKeys {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }

    /// Register a slot for `sequence`.
    ///
    /// Returns the generation, or hands the slot back if the sequence is
    /// still pending.
    pub(crate) fn track(&mut self, sequence: u32, slot: KeySlot) -> Result<u64, KeySlot> {
        if self.is_pending(sequence) {
            return Err(slot);
        }
        let generation = self.next_generation;
        self.next_generation += 1;
        self.requests.insert(
            sequence,
            PendingKey {
                slot,
                generation,
                sent_at: Instant::now(),
            },
        );
        Ok(generation)
    }

    /// Take the slot for an arriving response.
    pub(crate) fn resolve(&mut self, sequence: u32) -> Option<PendingKey> {
        self.requests.remove(&sequence)
    }

    /// Remove the slot only if it still belongs to `generation`.
    pub(crate) fn abandon(&mut self, sequence: u32, generation: u64) -> bool {
        match self.requests.get(&sequence) {
            Some(pending) if pending.generation == generation => {
                self.requests.remove(&sequence);
                true
            }
            _ => false,
        }
    }

    pub(crate) fn is_pending(&self, sequence: u32) -> bool {
        self.requests.contains_key(&sequence)
    }

    pub(crate) fn pending_count(&self) -> usize {
        self.requests.len()
    }

    /// Refuse new registrations and hand back every outstanding slot.
    pub(crate) fn close(&mut self) -> Vec<(u32, PendingKey)> {
        self.closed = true;
        self.requests.drain().collect()
    }
}
