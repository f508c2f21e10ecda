//! Channel-id registry.
//!
//! Ids are handed out from a wrapping 16-bit cursor, skipping ids that
//! are still open. Each allocation also gets a serial number so that a
//! stale release for an id that has since been reused cannot remove the
//! new owner.

use std::collections::HashMap;

use crate::channel::Channel;
use crate::error::RespotError;

/// Number of distinct channel ids.
pub const CHANNEL_ID_SPACE: usize = u16::MAX as usize + 1;

struct Entry {
    serial: u64,
    channel: Channel,
}

#[derive(Default)]
pub(crate) struct ChannelTable {
    entries: HashMap<u16, Entry>,
    next_id: u16,
    next_serial: u64,
    closed: bool,
}

impl ChannelTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Pick a free id and a fresh serial. Does not register anything.
    pub(crate) fn reserve(&mut self) -> Result<(u16, u64), RespotError> {
        if self.closed {
            return Err(RespotError::SessionClosed);
        }
        for _ in 0..CHANNEL_ID_SPACE {
            let id = self.next_id;
            self.next_id = id.wrapping_add(1);
            if !self.entries.contains_key(&id) {
                let serial = self.next_serial;
                self.next_serial += 1;
                return Ok((id, serial));
            }
        }
        Err(RespotError::ChannelsExhausted(CHANNEL_ID_SPACE))
    }

    pub(crate) fn insert(&mut self, serial: u64, channel: Channel) {
        self.entries.insert(channel.id(), Entry { serial, channel });
    }

    pub(crate) fn get(&self, id: u16) -> Option<Channel> {
        self.entries.get(&id).map(|e| e.channel.clone())
    }

    /// Remove `id` only if it still belongs to allocation `serial`.
    pub(crate) fn release(&mut self, id: u16, serial: u64) -> bool {
        match self.entries.get(&id) {
            Some(entry) if entry.serial == serial => {
                self.entries.remove(&id);
                true
            }
            _ => false,
        }
    }

    /// Remove `id` only if it still maps to this very channel.
    pub(crate) fn release_channel(&mut self, channel: &Channel) -> bool {
        match self.entries.get(&channel.id()) {
            Some(entry) if entry.channel.same_channel(channel) => {
                self.entries.remove(&channel.id());
                true
            }
            _ => false,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Refuse further allocations and hand back every open channel.
    pub(crate) fn close(&mut self) -> Vec<Channel> {
        self.closed = true;
        self.entries.drain().map(|(_, e)| e.channel).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelMode;

    fn register(table: &mut ChannelTable) -> (Channel, u64) {
        let (id, serial) = table.reserve().unwrap();
        let channel = Channel::new(id, ChannelMode::Raw, Box::new(|_| {}));
        table.insert(serial, channel.clone());
        (channel, serial)
    }

    #[test]
    fn ids_start_at_zero_and_increase() {
        let mut table = ChannelTable::new();
        assert_eq!(register(&mut table).0.id(), 0);
        assert_eq!(register(&mut table).0.id(), 1);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn wraparound_skips_open_ids() {
        let mut table = ChannelTable::new();
        let (zero, _) = register(&mut table);
        table.next_id = u16::MAX;
        assert_eq!(register(&mut table).0.id(), u16::MAX);
        // 0 is still open, so the cursor wraps past it.
        assert_eq!(register(&mut table).0.id(), 1);
        assert_eq!(zero.id(), 0);
    }

    #[test]
    fn stale_serial_does_not_remove_new_owner() {
        let mut table = ChannelTable::new();
        let (first, first_serial) = register(&mut table);
        assert!(table.release(first.id(), first_serial));
        assert!(!table.release(first.id(), first_serial));

        table.next_id = first.id();
        let (second, _) = register(&mut table);
        assert_eq!(second.id(), first.id());
        assert!(!table.release(first.id(), first_serial));
        assert!(!table.release_channel(&first));
        assert!(table.get(second.id()).is_some());
    }

    #[test]
    fn exhaustion_is_reported() {
        let mut table = ChannelTable::new();
        for _ in 0..CHANNEL_ID_SPACE {
            register(&mut table);
        }
        assert!(matches!(
            table.reserve(),
            Err(RespotError::ChannelsExhausted(CHANNEL_ID_SPACE))
        ));
    }

    #[test]
    fn closed_table_refuses_allocation() {
        let mut table = ChannelTable::new();
        register(&mut table);
        let drained = table.close();
        assert_eq!(drained.len(), 1);
        assert_eq!(table.len(), 0);
        assert!(matches!(table.reserve(), Err(RespotError::SessionClosed)));
    }
}
