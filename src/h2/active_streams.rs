//! Active-streams table
//!
//! Streams live in a fixed-capacity slot arena addressed by
//! `(id - 1) % capacity`. Each slot is explicitly `Idle` or `Opened`; slots are
//! reused as streams come and go. Alongside the arena the table keeps two id
//! buckets, flow-controlled and not, and every opened stream is in exactly
//! one of them.

use super::error::{Error, Result};
use super::stream::{H2Stream, StreamId};
use std::collections::BTreeSet;

/// Default number of slots
pub const DEFAULT_POOL_CAPACITY: usize = 1024;

#[derive(Debug)]
enum Slot {
    Idle,
    Opened(Box<H2Stream>),
}

/// Table of live streams, the only owner of stream state
#[derive(Debug)]
pub struct ActiveStreams {
    slots: Vec<Slot>,
    flow_controlled: BTreeSet<StreamId>,
    non_flow_controlled: BTreeSet<StreamId>,
}

impl ActiveStreams {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_POOL_CAPACITY)
    }

    /// Create a table with `capacity` slots (at least one)
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || Slot::Idle);
        ActiveStreams {
            slots,
            flow_controlled: BTreeSet::new(),
            non_flow_controlled: BTreeSet::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn slot_index(&self, id: StreamId) -> usize {
        (id.saturating_sub(1) as usize) % self.slots.len()
    }

    /// Add a stream; fails if its slot is already taken
    pub fn insert(&mut self, stream: H2Stream) -> Result<()> {
        let id = stream.id();
        if id == 0 {
            return Err(Error::InvalidStreamId(id));
        }
        let index = self.slot_index(id);
        if let Slot::Opened(_) = &self.slots[index] {
            return Err(Error::StreamIdCollision(id));
        }

        if stream.is_flow_controlled() {
            self.flow_controlled.insert(id);
        } else {
            self.non_flow_controlled.insert(id);
        }
        self.slots[index] = Slot::Opened(Box::new(stream));
        Ok(())
    }

    pub fn get(&self, id: StreamId) -> Option<&H2Stream> {
        if id == 0 {
            return None;
        }
        match &self.slots[self.slot_index(id)] {
            Slot::Opened(stream) if stream.id() == id => Some(stream.as_ref()),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, id: StreamId) -> Option<&mut H2Stream> {
        if id == 0 {
            return None;
        }
        let index = self.slot_index(id);
        match &mut self.slots[index] {
            Slot::Opened(stream) if stream.id() == id => Some(stream.as_mut()),
            _ => None,
        }
    }

    pub fn contains(&self, id: StreamId) -> bool {
        self.get(id).is_some()
    }

    /// Remove a stream, returning its slot to `Idle`
    pub fn remove(&mut self, id: StreamId) -> Option<H2Stream> {
        if !self.contains(id) {
            return None;
        }
        let index = self.slot_index(id);
        self.flow_controlled.remove(&id);
        self.non_flow_controlled.remove(&id);
        match std::mem::replace(&mut self.slots[index], Slot::Idle) {
            Slot::Opened(stream) => Some(*stream),
            Slot::Idle => None,
        }
    }

    /// Move a stream to the non-flow-controlled bucket
    pub fn disable_flow_control(&mut self, id: StreamId) -> bool {
        match self.get_mut(id) {
            Some(stream) => stream.disable_flow_control(),
            None => return false,
        }
        self.flow_controlled.remove(&id);
        self.non_flow_controlled.insert(id);
        true
    }

    pub fn len(&self) -> usize {
        self.flow_controlled.len() + self.non_flow_controlled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn flow_controlled_len(&self) -> usize {
        self.flow_controlled.len()
    }

    pub fn non_flow_controlled_len(&self) -> usize {
        self.non_flow_controlled.len()
    }

    /// All live ids in ascending order
    pub fn ids(&self) -> Vec<StreamId> {
        let mut ids: Vec<StreamId> = self
            .flow_controlled
            .iter()
            .chain(self.non_flow_controlled.iter())
            .copied()
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Ids of flow-controlled streams in ascending order
    pub fn flow_controlled_ids(&self) -> Vec<StreamId> {
        self.flow_controlled.iter().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &H2Stream> {
        self.slots.iter().filter_map(|slot| match slot {
            Slot::Opened(stream) => Some(stream.as_ref()),
            Slot::Idle => None,
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut H2Stream> {
        self.slots.iter_mut().filter_map(|slot| match slot {
            Slot::Opened(stream) => Some(stream.as_mut()),
            Slot::Idle => None,
        })
    }

    /// Remove every stream, in ascending id order
    pub fn drain(&mut self) -> Vec<H2Stream> {
        self.ids()
            .into_iter()
            .filter_map(|id| self.remove(id))
            .collect()
    }
}

impl Default for ActiveStreams {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_buckets(table: &ActiveStreams) {
        assert_eq!(
            table.len(),
            table.flow_controlled_len() + table.non_flow_controlled_len()
        );
        assert_eq!(table.len(), table.iter().count());
    }

    #[test]
    fn test_insert_get_remove() {
        let mut table = ActiveStreams::with_capacity(8);
        table.insert(H2Stream::new(1)).unwrap();
        table.insert(H2Stream::new(3)).unwrap();
        assert_buckets(&table);
        assert_eq!(table.len(), 2);
        assert!(table.contains(1));
        assert!(!table.contains(5));

        let removed = table.remove(1).unwrap();
        assert_eq!(removed.id(), 1);
        assert!(table.remove(1).is_none());
        assert_buckets(&table);
        assert_eq!(table.ids(), vec![3]);
    }

    #[test]
    fn test_collision_is_an_error() {
        let mut table = ActiveStreams::with_capacity(4);
        table.insert(H2Stream::new(1)).unwrap();
        assert!(matches!(
            table.insert(H2Stream::new(1)),
            Err(Error::StreamIdCollision(1))
        ));
        // 5 maps onto the same slot as 1
        assert!(matches!(
            table.insert(H2Stream::new(5)),
            Err(Error::StreamIdCollision(5))
        ));
        // the original is untouched and not shadowed by the congruent id
        assert!(table.contains(1));
        assert!(table.get(5).is_none());
        assert_buckets(&table);

        // slot is reusable once freed
        table.remove(1);
        table.insert(H2Stream::new(5)).unwrap();
        assert!(table.contains(5));
    }

    #[test]
    fn test_bucketing_invariant() {
        let mut table = ActiveStreams::with_capacity(64);
        for id in (1..40).step_by(2) {
            let mut stream = H2Stream::new(id);
            if id % 3 == 0 {
                stream.disable_flow_control();
            }
            table.insert(stream).unwrap();
            assert_buckets(&table);
        }

        assert!(table.disable_flow_control(1));
        assert!(!table.disable_flow_control(2));
        assert!(!table.get(1).unwrap().is_flow_controlled());
        assert_buckets(&table);

        for id in (1..40).step_by(4) {
            table.remove(id);
            assert_buckets(&table);
        }

        let drained = table.drain();
        assert!(drained.windows(2).all(|w| w[0].id() < w[1].id()));
        assert!(table.is_empty());
        assert_buckets(&table);
    }

    #[test]
    fn test_stream_zero_rejected() {
        let mut table = ActiveStreams::new();
        assert!(matches!(
            table.insert(H2Stream::new(0)),
            Err(Error::InvalidStreamId(0))
        ));
        assert!(table.get(0).is_none());
        assert_eq!(table.capacity(), DEFAULT_POOL_CAPACITY);
    }
}
