//! Consistency check between the window buffer and the mate index
//!
//! Every live record must sit in exactly one chain (the bucket its read and
//! arm hash to), every chain entry must be live, and chains must be sorted by
//! start with matching back-links. Cost is linear in the index size, so this
//! runs from tests and in paranoid mode only.

use crate::hit::HitHandle;
use crate::mate_index::MateIndex;
use crate::window::{window_position, WindowBuffer, BLACKLISTED};
use rustc_hash::FxHashSet;

pub fn check_integrity(window: &WindowBuffer, index: &MateIndex) -> Result<(), String> {
    let capacity = window.capacity() as i32;
    let mut live_in_slots = 0usize;
    for (slot_index, slot) in window.slots().iter().enumerate() {
        if slot.in_use() < BLACKLISTED || slot.in_use() > capacity {
            return Err(format!(
                "slot {} has in_use {} outside [-1, {}]",
                slot_index,
                slot.in_use(),
                capacity
            ));
        }
        if slot.pool_len() < slot.live_count() {
            return Err(format!(
                "slot {} claims {} live records but pools only {}",
                slot_index,
                slot.live_count(),
                slot.pool_len()
            ));
        }
        for record in slot.live_records() {
            let expected = window_position(record.template_start(), window.window_size());
            if expected != slot_index {
                return Err(format!(
                    "record at {} (read {}) is stored in slot {} instead of {}",
                    record.template_start(),
                    record.read_id(),
                    slot_index,
                    expected
                ));
            }
        }
        live_in_slots += slot.live_count();
    }
    if live_in_slots != window.live() {
        return Err(format!(
            "window counts {} live records but slots hold {}",
            window.live(),
            live_in_slots
        ));
    }

    let mut seen: FxHashSet<HitHandle> = FxHashSet::default();
    for bucket in 0..index.bucket_count() {
        let head = index.head(bucket);
        let tail = index.tail(bucket);
        if head.is_none() != tail.is_none() {
            return Err(format!("bucket {} has only one of head and tail set", bucket));
        }

        let mut previous: Option<HitHandle> = None;
        let mut cursor = head;
        while let Some(handle) = cursor {
            if seen.len() > index.len() {
                return Err(format!("bucket {} chain does not terminate", bucket));
            }
            let slot = window.slot(handle.slot as usize);
            if handle.index as usize >= slot.live_count() {
                return Err(format!(
                    "bucket {} links {:?}, which is not a live record",
                    bucket, handle
                ));
            }
            if !seen.insert(handle) {
                return Err(format!("{:?} is linked more than once", handle));
            }

            let record = window.record(handle);
            if index.bucket(record.read_id(), record.arm()) != bucket {
                return Err(format!(
                    "read {} arm {} is chained in bucket {}",
                    record.read_id(),
                    record.arm() as u8,
                    bucket
                ));
            }
            if record.prev != previous {
                return Err(format!(
                    "{:?} has back-link {:?}, expected {:?}",
                    handle, record.prev, previous
                ));
            }
            if let Some(previous) = previous {
                if window.record(previous).template_start() > record.template_start() {
                    return Err(format!("bucket {} is not sorted by start", bucket));
                }
            }
            previous = Some(handle);
            cursor = record.next;
        }
        if previous != tail {
            return Err(format!("bucket {} tail does not match last chain entry", bucket));
        }
    }

    if seen.len() != index.len() || seen.len() != live_in_slots {
        return Err(format!(
            "{} records chained, index counts {}, window holds {}",
            seen.len(),
            index.len(),
            live_in_slots
        ));
    }
    Ok(())
}
