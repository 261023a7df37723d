use std::collections::VecDeque;
use std::time::Duration;

use super::entry::RouteEntry;
use crate::sim::EventId;

/// Stable identity of a table entry. Stays unique after the entry is removed,
/// so a late timer for a deleted route can never hit a newer one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RouteId {
    index: u32,
    generation: u32,
}

#[derive(Debug, Clone)]
pub struct RouteRecord {
    pub entry: RouteEntry,
    /// Pending invalidation or deletion, never both.
    pub timer: Option<EventId>,
    /// Per-route garbage-collection delay; zero falls back to the protocol's.
    pub garbage_collection: Duration,
}

#[derive(Debug, Clone)]
struct Slot {
    generation: u32,
    record: Option<RouteRecord>,
}

/// Insertion-ordered route table. Entries live in a slot arena and the scan
/// order (front = most recent) is kept separately.
#[derive(Debug, Clone, Default)]
pub struct RoutingTable {
    slots: Vec<Slot>,
    free: Vec<u32>,
    order: VecDeque<RouteId>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts at the front of the scan order.
    pub fn push_front(&mut self, entry: RouteEntry, garbage_collection: Duration) -> RouteId {
        let record = RouteRecord {
            entry,
            timer: None,
            garbage_collection,
        };

        let id = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.record = Some(record);
                RouteId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    record: Some(record),
                });
                RouteId { index, generation: 0 }
            }
        };

        self.order.push_front(id);
        id
    }

    pub fn remove(&mut self, id: RouteId) -> Option<RouteRecord> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }

        let record = slot.record.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);

        if let Some(pos) = self.order.iter().position(|other| *other == id) {
            self.order.remove(pos);
        }
        Some(record)
    }

    pub fn get(&self, id: RouteId) -> Option<&RouteRecord> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.record.as_ref())
    }

    pub fn get_mut(&mut self, id: RouteId) -> Option<&mut RouteRecord> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.record.as_mut())
    }

    pub fn contains(&self, id: RouteId) -> bool {
        self.get(id).is_some()
    }

    pub fn entry(&self, id: RouteId) -> Option<&RouteEntry> {
        self.get(id).map(|record| &record.entry)
    }

    /// Ids in scan order, front first.
    pub fn ids(&self) -> Vec<RouteId> {
        self.order.iter().copied().collect()
    }

    /// Records in scan order, front first.
    pub fn iter(&self) -> impl Iterator<Item = (RouteId, &RouteRecord)> {
        self.order
            .iter()
            .filter_map(move |id| self.get(*id).map(|record| (*id, record)))
    }

    pub fn entries_mut(&mut self) -> impl Iterator<Item = &mut RouteEntry> {
        self.slots
            .iter_mut()
            .filter_map(|slot| slot.record.as_mut())
            .map(|record| &mut record.entry)
    }

    /// Empties the table and hands back every pending timer so the caller can
    /// cancel them. Slots are kept and their generations bumped, so ids handed
    /// out before the clear stay dead.
    pub fn clear(&mut self) -> Vec<EventId> {
        let mut timers = Vec::new();
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if let Some(record) = slot.record.take() {
                timers.extend(record.timer);
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(index as u32);
            }
        }
        self.order.clear();
        timers
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
