//! Hash table of per-(read, arm) chains for mate lookup
//!
//! Chains are doubly linked through the `next`/`prev` handles stored in the
//! records themselves, so the index only keeps a head and a tail per bucket.
//! Every chain is kept in non-decreasing `template_start` order: hits arrive
//! nearly sorted, which makes tail insertion and duplicate detection cheap.

use crate::hit::HitHandle;
use crate::window::WindowBuffer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insert {
    Linked,
    /// An identical hit is already linked; the new record was left out
    Duplicate,
}

pub struct MateIndex {
    heads: Vec<Option<HitHandle>>,
    tails: Vec<Option<HitHandle>>,
    mask: u32,
    len: usize,
}

impl MateIndex {
    /// `size` is rounded up to a power of two
    pub fn new(size: usize) -> Self {
        let size = size.max(2).next_power_of_two();
        MateIndex {
            heads: vec![None; size],
            tails: vec![None; size],
            mask: (size - 1) as u32,
            len: 0,
        }
    }

    pub fn bucket_count(&self) -> usize {
        self.heads.len()
    }

    /// Number of records currently linked across all chains
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// `(read_id & mask) ^ arm`; both arms of a read land in adjacent buckets
    pub fn bucket(&self, read_id: u32, arm: bool) -> usize {
        ((read_id & self.mask) ^ arm as u32) as usize
    }

    pub fn head(&self, bucket: usize) -> Option<HitHandle> {
        self.heads[bucket]
    }

    pub fn tail(&self, bucket: usize) -> Option<HitHandle> {
        self.tails[bucket]
    }

    /// Forward traversal of one bucket
    pub fn chain<'a>(&self, arena: &'a WindowBuffer, bucket: usize) -> Chain<'a> {
        Chain {
            arena,
            cursor: self.heads[bucket],
        }
    }

    /// Link `handle` into its bucket in start order, unless an identical hit is already there
    pub fn insert_sorted(&mut self, arena: &mut WindowBuffer, handle: HitHandle) -> Insert {
        let record = arena.record(handle);
        let bucket = self.bucket(record.read_id(), record.arm());
        let start = record.template_start();

        let Some(tail) = self.tails[bucket] else {
            let record = arena.record_mut(handle);
            record.next = None;
            record.prev = None;
            self.heads[bucket] = Some(handle);
            self.tails[bucket] = Some(handle);
            self.len += 1;
            return Insert::Linked;
        };

        if start > arena.record(tail).template_start() {
            self.link_after(arena, bucket, tail, handle);
            return Insert::Linked;
        }

        let mut cursor = Some(tail);
        while let Some(at) = cursor {
            let existing = arena.record(at);
            if existing.template_start() < start {
                break;
            }
            if existing.same(arena.record(handle)) {
                return Insert::Duplicate;
            }
            cursor = existing.prev;
        }

        match cursor {
            Some(prev) => self.link_after(arena, bucket, prev, handle),
            None => self.link_front(arena, bucket, handle),
        }
        Insert::Linked
    }

    /// Bulk removal for an evicted slot: pop every chain touched by `handles`
    /// from the head while the head starts at or before `position`.
    pub fn remove_through(&mut self, arena: &mut WindowBuffer, handles: &[HitHandle], position: i64) {
        for &handle in handles {
            let record = arena.record(handle);
            let bucket = self.bucket(record.read_id(), record.arm());
            while let Some(head) = self.heads[bucket] {
                if arena.record(head).template_start() > position {
                    break;
                }
                self.pop_front(arena, bucket, head);
            }
        }
    }

    /// Remove exactly one record, leaving the rest of its chain intact
    pub fn unlink(&mut self, arena: &mut WindowBuffer, handle: HitHandle) {
        let record = arena.record(handle);
        let bucket = self.bucket(record.read_id(), record.arm());
        let (prev, next) = (record.prev, record.next);

        match prev {
            Some(prev) => arena.record_mut(prev).next = next,
            None => self.heads[bucket] = next,
        }
        match next {
            Some(next) => arena.record_mut(next).prev = prev,
            None => self.tails[bucket] = prev,
        }

        let record = arena.record_mut(handle);
        record.next = None;
        record.prev = None;
        self.len -= 1;
    }

    /// Forget every chain; records themselves are reset by the window
    pub fn clear(&mut self) {
        self.heads.fill(None);
        self.tails.fill(None);
        self.len = 0;
    }

    fn pop_front(&mut self, arena: &mut WindowBuffer, bucket: usize, head: HitHandle) {
        let next = arena.record(head).next;
        self.heads[bucket] = next;
        match next {
            Some(next) => arena.record_mut(next).prev = None,
            None => self.tails[bucket] = None,
        }
        let record = arena.record_mut(head);
        record.next = None;
        record.prev = None;
        self.len -= 1;
    }

    fn link_after(&mut self, arena: &mut WindowBuffer, bucket: usize, prev: HitHandle, handle: HitHandle) {
        let next = arena.record(prev).next;
        {
            let record = arena.record_mut(handle);
            record.prev = Some(prev);
            record.next = next;
        }
        arena.record_mut(prev).next = Some(handle);
        match next {
            Some(next) => arena.record_mut(next).prev = Some(handle),
            None => self.tails[bucket] = Some(handle),
        }
        self.len += 1;
    }

    fn link_front(&mut self, arena: &mut WindowBuffer, bucket: usize, handle: HitHandle) {
        let head = self.heads[bucket];
        {
            let record = arena.record_mut(handle);
            record.prev = None;
            record.next = head;
        }
        match head {
            Some(head) => arena.record_mut(head).prev = Some(handle),
            None => self.tails[bucket] = Some(handle),
        }
        self.heads[bucket] = Some(handle);
        self.len += 1;
    }
}

pub struct Chain<'a> {
    arena: &'a WindowBuffer,
    cursor: Option<HitHandle>,
}

impl Iterator for Chain<'_> {
    type Item = HitHandle;

    fn next(&mut self) -> Option<HitHandle> {
        let current = self.cursor?;
        self.cursor = self.arena.record(current).next;
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::{window_position, Acquire};

    const WINDOW: i64 = 50;

    fn add(
        window: &mut WindowBuffer,
        index: &mut MateIndex,
        read_id: u32,
        arm: bool,
        rc: bool,
        pos: i64,
    ) -> (HitHandle, Insert) {
        let slot = window_position(pos, WINDOW);
        let Acquire::Granted(handle) = window.acquire(slot, index) else {
            panic!("slot {} should have room", slot);
        };
        window.record_mut(handle).reset(arm, rc, read_id, pos);
        let outcome = index.insert_sorted(window, handle);
        if outcome == Insert::Duplicate {
            window.release(slot);
        }
        (handle, outcome)
    }

    fn starts(window: &WindowBuffer, index: &MateIndex, bucket: usize) -> Vec<i64> {
        index
            .chain(window, bucket)
            .map(|h| window.record(h).template_start())
            .collect()
    }

    #[test]
    fn test_bucket_hash_flips_low_bit_for_arm() {
        let index = MateIndex::new(1000);
        assert_eq!(index.bucket_count(), 1024);
        assert_eq!(index.bucket(5, false), 5);
        assert_eq!(index.bucket(5, true), 4);
        assert_eq!(index.bucket(1024 + 6, false), 6);
        assert_eq!(index.bucket(6, true), 7);
    }

    #[test]
    fn test_insert_keeps_chain_sorted_for_late_arrivals() {
        let mut window = WindowBuffer::new(WINDOW, 16, 100);
        let mut index = MateIndex::new(64);
        for (i, pos) in [10, 14, 12, 20, 11, 14].into_iter().enumerate() {
            add(&mut window, &mut index, 3, false, i == 5, pos);
        }
        let bucket = index.bucket(3, false);
        assert_eq!(starts(&window, &index, bucket), vec![10, 11, 12, 14, 14, 20]);
        assert_eq!(index.len(), 6);

        let tail = index.tail(bucket).unwrap();
        assert_eq!(window.record(tail).template_start(), 20);
        let head = index.head(bucket).unwrap();
        assert!(window.record(head).prev.is_none());
    }

    #[test]
    fn test_duplicate_is_not_linked() {
        let mut window = WindowBuffer::new(WINDOW, 16, 100);
        let mut index = MateIndex::new(64);
        add(&mut window, &mut index, 9, true, false, 30);
        add(&mut window, &mut index, 9, true, false, 31);
        let (_, outcome) = add(&mut window, &mut index, 9, true, false, 30);
        assert_eq!(outcome, Insert::Duplicate);

        let bucket = index.bucket(9, true);
        assert_eq!(starts(&window, &index, bucket), vec![30, 31]);
        assert_eq!(window.slot(window_position(30, WINDOW)).in_use(), 1);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_remove_through_pops_only_evicted_prefix() {
        let mut window = WindowBuffer::new(WINDOW, 16, 100);
        let mut index = MateIndex::new(64);
        let (first, _) = add(&mut window, &mut index, 1, false, false, 5);
        add(&mut window, &mut index, 1, false, true, 5);
        add(&mut window, &mut index, 1, false, false, 8);

        let handles = vec![first, HitHandle::new(first.slot as usize, 1)];
        index.remove_through(&mut window, &handles, 5);
        let bucket = index.bucket(1, false);
        assert_eq!(starts(&window, &index, bucket), vec![8]);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_unlink_middle_and_ends() {
        let mut window = WindowBuffer::new(WINDOW, 16, 100);
        let mut index = MateIndex::new(64);
        let handles: Vec<HitHandle> = [1, 2, 3, 4]
            .iter()
            .map(|&pos| add(&mut window, &mut index, 2, true, false, pos).0)
            .collect();
        let bucket = index.bucket(2, true);

        index.unlink(&mut window, handles[1]);
        assert_eq!(starts(&window, &index, bucket), vec![1, 3, 4]);
        index.unlink(&mut window, handles[0]);
        index.unlink(&mut window, handles[3]);
        assert_eq!(starts(&window, &index, bucket), vec![3]);
        assert_eq!(index.head(bucket), index.tail(bucket));
        index.unlink(&mut window, handles[2]);
        assert!(index.head(bucket).is_none() && index.tail(bucket).is_none());
        assert!(index.is_empty());
    }
}
