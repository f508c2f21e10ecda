//! Session-wide sequence numbers for key requests.

use std::sync::atomic::{AtomicU32, Ordering};

/// Source of correlation tags for key requests.
///
/// Implementations must hand out increasing values for the lifetime of the
/// session. The player additionally refuses to reuse a value that is still
/// pending, so a wrapping counter is acceptable.
pub trait SequenceSource: Send + Sync + 'static {
    fn next_sequence(&self) -> u32;
}

/// Atomic wrapping counter.
#[derive(Debug, Default)]
pub struct SequenceCounter {
    next: AtomicU32,
}

impl SequenceCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(first: u32) -> Self {
        Self {
            next: AtomicU32::new(first),
        }
    }
}

impl SequenceSource for SequenceCounter {
    fn next_sequence(&self) -> u32 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_up_and_wraps() {
        let seq = SequenceCounter::starting_at(u32::MAX - 1);
        assert_eq!(seq.next_sequence(), u32::MAX - 1);
        assert_eq!(seq.next_sequence(), u32::MAX);
        assert_eq!(seq.next_sequence(), 0);
    }

    #[test]
    fn unique_across_threads() {
        let seq = std::sync::Arc::new(SequenceCounter::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let seq = std::sync::Arc::clone(&seq);
                std::thread::spawn(move || (0..250).map(|_| seq.next_sequence()).collect::<Vec<_>>())
            })
            .collect();
        let mut all: Vec<u32> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 1000);
    }
}
