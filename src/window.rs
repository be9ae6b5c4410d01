//! Circular window of per-position record pools
//!
//! Each slot owns a growable pool of [`HitRecord`]s that is reused every time
//! the slot comes around again. `in_use` counts the live prefix of the pool;
//! `-1` marks a slot blacklisted after an overflow until the window slides
//! past it.

use crate::hit::{HitHandle, HitRecord};
use crate::mate_index::MateIndex;

/// `in_use` value of a slot that overflowed and accepts nothing until evicted
pub const BLACKLISTED: i32 = -1;

#[derive(Debug, Default)]
pub struct Slot {
    records: Vec<HitRecord>,
    in_use: i32,
}

impl Slot {
    pub fn in_use(&self) -> i32 {
        self.in_use
    }

    pub fn is_blacklisted(&self) -> bool {
        self.in_use == BLACKLISTED
    }

    pub fn live_count(&self) -> usize {
        self.in_use.max(0) as usize
    }

    pub fn pool_len(&self) -> usize {
        self.records.len()
    }

    pub fn live_records(&self) -> &[HitRecord] {
        &self.records[..self.live_count()]
    }
}

/// Result of asking a slot for a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquire {
    Granted(HitHandle),
    /// The slot was full; its records were purged and it is now blacklisted
    Overflowed,
    Blacklisted,
}

pub struct WindowBuffer {
    slots: Vec<Slot>,
    window_size: i64,
    capacity: i32,
    trim_threshold: usize,
    live: usize,
}

impl WindowBuffer {
    pub fn new(window_size: i64, capacity: usize, trim_threshold: usize) -> Self {
        let mut slots = Vec::with_capacity(window_size as usize);
        slots.resize_with(window_size as usize, Slot::default);
        WindowBuffer {
            slots,
            window_size,
            capacity: capacity.min(i32::MAX as usize) as i32,
            trim_threshold,
            live: 0,
        }
    }

    pub fn window_size(&self) -> i64 {
        self.window_size
    }

    pub fn capacity(&self) -> usize {
        self.capacity as usize
    }

    /// Total number of live records across all slots
    pub fn live(&self) -> usize {
        self.live
    }

    /// Map an absolute reference position onto a slot, negative positions included
    pub fn window_position(&self, pos: i64) -> usize {
        window_position(pos, self.window_size)
    }

    pub fn slot(&self, slot: usize) -> &Slot {
        &self.slots[slot]
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn record(&self, handle: HitHandle) -> &HitRecord {
        &self.slots[handle.slot as usize].records[handle.index as usize]
    }

    pub fn record_mut(&mut self, handle: HitHandle) -> &mut HitRecord {
        &mut self.slots[handle.slot as usize].records[handle.index as usize]
    }

    /// Handles of the live records of a slot, in pool order
    pub fn live_handles(&self, slot: usize) -> impl Iterator<Item = HitHandle> {
        (0..self.slots[slot].live_count()).map(move |index| HitHandle::new(slot, index))
    }

    /// Borrow two distinct records mutably at once
    pub fn pair_mut(&mut self, a: HitHandle, b: HitHandle) -> (&mut HitRecord, &mut HitRecord) {
        assert_ne!(a, b, "cannot borrow the same record twice");
        if a.slot == b.slot {
            let records = &mut self.slots[a.slot as usize].records;
            let (lo, hi) = (a.index.min(b.index) as usize, a.index.max(b.index) as usize);
            let (head, tail) = records.split_at_mut(hi);
            let (low, high) = (&mut head[lo], &mut tail[0]);
            if a.index < b.index {
                (low, high)
            } else {
                (high, low)
            }
        } else {
            let (lo, hi) = (a.slot.min(b.slot) as usize, a.slot.max(b.slot) as usize);
            let (head, tail) = self.slots.split_at_mut(hi);
            let (low_slot, high_slot) = (&mut head[lo], &mut tail[0]);
            if a.slot < b.slot {
                (
                    &mut low_slot.records[a.index as usize],
                    &mut high_slot.records[b.index as usize],
                )
            } else {
                (
                    &mut high_slot.records[a.index as usize],
                    &mut low_slot.records[b.index as usize],
                )
            }
        }
    }

    /// Hand out the next pooled record of `slot`.
    ///
    /// A full slot is purged from `index` and blacklisted; the caller drops the
    /// hit that triggered the overflow as well.
    pub fn acquire(&mut self, slot: usize, index: &mut MateIndex) -> Acquire {
        let in_use = self.slots[slot].in_use;
        if in_use == BLACKLISTED {
            return Acquire::Blacklisted;
        }
        if in_use >= self.capacity {
            self.purge(slot, index);
            self.slots[slot].in_use = BLACKLISTED;
            return Acquire::Overflowed;
        }

        let pool = &mut self.slots[slot];
        let position = in_use as usize;
        if pool.records.len() <= position {
            pool.records.push(HitRecord::default());
        }
        pool.in_use += 1;
        self.live += 1;
        Acquire::Granted(HitHandle::new(slot, position))
    }

    /// Return the most recently acquired record of `slot` to the pool
    pub fn release(&mut self, slot: usize) {
        let pool = &mut self.slots[slot];
        debug_assert!(pool.in_use > 0, "release on a slot with nothing acquired");
        if pool.in_use > 0 {
            pool.in_use -= 1;
            self.live -= 1;
        }
    }

    /// Clear a slot as the window moves past `position`.
    ///
    /// Mate discovery over the slot must already have run.
    pub fn evict(&mut self, slot: usize, position: i64, index: &mut MateIndex) {
        let live = self.slots[slot].live_count();
        if live > 0 {
            let handles: Vec<HitHandle> = self.live_handles(slot).collect();
            index.remove_through(self, &handles, position);
            self.live -= live;
        }

        let pool = &mut self.slots[slot];
        if pool.records.len() > self.trim_threshold {
            pool.records.truncate(self.trim_threshold);
            pool.records.shrink_to_fit();
        }
        pool.in_use = 0;
    }

    fn purge(&mut self, slot: usize, index: &mut MateIndex) {
        let handles: Vec<HitHandle> = self.live_handles(slot).collect();
        for handle in &handles {
            index.unlink(self, *handle);
        }
        self.live -= handles.len();
    }

    /// Drop every record without touching any index (used after the index is cleared)
    pub fn reset(&mut self) {
        for slot in &mut self.slots {
            slot.in_use = 0;
            if slot.records.len() > self.trim_threshold {
                slot.records.truncate(self.trim_threshold);
                slot.records.shrink_to_fit();
            }
        }
        self.live = 0;
    }
}

/// `((pos mod window_size) + window_size) mod window_size`
pub fn window_position(pos: i64, window_size: i64) -> usize {
    pos.rem_euclid(window_size) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_position_wraps_into_range() {
        for window_size in [1i64, 7, 200, 1021] {
            for pos in [-5000i64, -201, -200, -1, 0, 1, 199, 200, 201, 123_456_789] {
                let slot = window_position(pos, window_size);
                assert!((slot as i64) < window_size);
                assert_eq!((pos - slot as i64).rem_euclid(window_size), 0);
            }
        }
        assert_eq!(window_position(i64::MIN, 200), i64::MIN.rem_euclid(200) as usize);
        assert_eq!(window_position(i64::MAX, 200), i64::MAX.rem_euclid(200) as usize);
    }

    #[test]
    fn test_acquire_reuses_pool_entries() {
        let mut window = WindowBuffer::new(10, 4, 100);
        let mut index = MateIndex::new(64);

        assert_eq!(window.acquire(3, &mut index), Acquire::Granted(HitHandle::new(3, 0)));
        assert_eq!(window.acquire(3, &mut index), Acquire::Granted(HitHandle::new(3, 1)));
        window.release(3);
        assert_eq!(window.slot(3).in_use(), 1);
        assert_eq!(window.acquire(3, &mut index), Acquire::Granted(HitHandle::new(3, 1)));
        assert_eq!(window.slot(3).pool_len(), 2);
        assert_eq!(window.live(), 2);
    }

    #[test]
    fn test_acquire_overflow_blacklists_until_evicted() {
        let mut window = WindowBuffer::new(10, 2, 100);
        let mut index = MateIndex::new(64);
        for i in 0..2 {
            let Acquire::Granted(handle) = window.acquire(5, &mut index) else {
                panic!("slot should have room");
            };
            window.record_mut(handle).reset(false, false, i, 5);
            index.insert_sorted(&mut window, handle);
        }

        assert_eq!(window.acquire(5, &mut index), Acquire::Overflowed);
        assert!(window.slot(5).is_blacklisted());
        assert_eq!(window.live(), 0);
        assert!(index.is_empty());
        assert_eq!(window.acquire(5, &mut index), Acquire::Blacklisted);

        window.evict(5, 5, &mut index);
        assert_eq!(window.slot(5).in_use(), 0);
        assert!(matches!(window.acquire(5, &mut index), Acquire::Granted(_)));
    }

    #[test]
    fn test_evict_trims_oversized_pool() {
        let mut window = WindowBuffer::new(4, 500, 8);
        let mut index = MateIndex::new(64);
        for i in 0..20 {
            let Acquire::Granted(handle) = window.acquire(1, &mut index) else {
                panic!("slot should have room");
            };
            window.record_mut(handle).reset(false, false, i, 1);
            index.insert_sorted(&mut window, handle);
        }
        assert_eq!(window.slot(1).pool_len(), 20);

        window.evict(1, 1, &mut index);
        assert_eq!(window.slot(1).pool_len(), 8);
        assert_eq!(window.live(), 0);
        assert!(index.is_empty());
    }

    #[test]
    fn test_pair_mut_in_same_and_different_slots() {
        let mut window = WindowBuffer::new(4, 8, 100);
        let mut index = MateIndex::new(64);
        let handles: Vec<HitHandle> = [0usize, 0, 2]
            .iter()
            .map(|&slot| match window.acquire(slot, &mut index) {
                Acquire::Granted(handle) => handle,
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        for (i, handle) in handles.iter().enumerate() {
            window.record_mut(*handle).reset(false, false, i as u32, 0);
        }

        let (a, b) = window.pair_mut(handles[1], handles[0]);
        assert_eq!((a.read_id(), b.read_id()), (1, 0));
        let (a, b) = window.pair_mut(handles[2], handles[0]);
        assert_eq!((a.read_id(), b.read_id()), (2, 0));
        let (a, b) = window.pair_mut(handles[0], handles[2]);
        assert_eq!((a.read_id(), b.read_id()), (0, 2));
    }
}
