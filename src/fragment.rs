//! Fragment-length and orientation arithmetic, plus the read-length and
//! orientation collaborators injected into the engine.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::cmp::{max, min};

/// Genomic span covered by two alignments `[a, a + len_a)` and `[b, b + len_b)`.
///
/// Symmetric in its two ends and correct when one read envelops the other.
pub fn fragment_length(a: i64, len_a: i64, b: i64, len_b: i64) -> i64 {
    max(a + len_a, b + len_b) - min(a, b)
}

/// 5'-most reference position of an alignment: its start on the forward strand,
/// its last base when reverse complemented.
pub fn five_prime(start: i64, len: i64, reverse_complement: bool) -> i64 {
    if reverse_complement {
        start + len - 1
    } else {
        start
    }
}

/// Length of a read arm, looked up by the engine for every candidate pair
pub trait ReadLengths {
    fn read_length(&self, read_id: u32, arm: bool) -> i64;
}

/// Same length for every read of an arm
#[derive(Debug, Clone, Copy)]
pub struct FixedReadLengths {
    pub first: i64,
    pub second: i64,
}

impl FixedReadLengths {
    pub fn uniform(len: i64) -> Self {
        Self {
            first: len,
            second: len,
        }
    }
}

impl ReadLengths for FixedReadLengths {
    fn read_length(&self, _read_id: u32, arm: bool) -> i64 {
        if arm {
            self.second
        } else {
            self.first
        }
    }
}

/// Per-read lengths, with a fallback for reads that were never registered
#[derive(Debug, Clone, Default)]
pub struct ReadLengthTable {
    lengths: FxHashMap<(u32, bool), i64>,
    fallback: i64,
}

impl ReadLengthTable {
    pub fn new(fallback: i64) -> Self {
        Self {
            lengths: FxHashMap::default(),
            fallback,
        }
    }

    pub fn insert(&mut self, read_id: u32, arm: bool, len: i64) {
        self.lengths.insert((read_id, arm), len);
    }

    pub fn len(&self) -> usize {
        self.lengths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lengths.is_empty()
    }

    /// Longest registered read, useful for sizing the window
    pub fn max_length(&self) -> i64 {
        self.lengths.values().copied().max().unwrap_or(self.fallback)
    }
}

impl ReadLengths for ReadLengthTable {
    fn read_length(&self, read_id: u32, arm: bool) -> i64 {
        self.lengths
            .get(&(read_id, arm))
            .copied()
            .unwrap_or(self.fallback)
    }
}

/// Predicate over the 5' position and strand of the left and right ends of a pair
pub trait OrientationPolicy {
    fn orientation_ok(&self, left_5p: i64, left_rc: bool, right_5p: i64, right_rc: bool) -> bool;
}

impl<F> OrientationPolicy for F
where
    F: Fn(i64, bool, i64, bool) -> bool,
{
    fn orientation_ok(&self, left_5p: i64, left_rc: bool, right_5p: i64, right_rc: bool) -> bool {
        self(left_5p, left_rc, right_5p, right_rc)
    }
}

/// Library layouts produced by the common sequencing protocols
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum MachineOrientation {
    /// Paired-end: forward read upstream, reverse-complemented mate pointing back at it
    #[default]
    ForwardReverse,
    /// Mate-pair libraries: ends point away from each other
    ReverseForward,
    /// Both ends on the same strand
    ForwardForward,
    Any,
}

impl MachineOrientation {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "fr" => Some(MachineOrientation::ForwardReverse),
            "rf" => Some(MachineOrientation::ReverseForward),
            "ff" => Some(MachineOrientation::ForwardForward),
            "any" => Some(MachineOrientation::Any),
            _ => None,
        }
    }
}

impl OrientationPolicy for MachineOrientation {
    fn orientation_ok(&self, left_5p: i64, left_rc: bool, right_5p: i64, right_rc: bool) -> bool {
        match self {
            MachineOrientation::ForwardReverse => !left_rc && right_rc && left_5p <= right_5p,
            MachineOrientation::ReverseForward => left_rc && !right_rc,
            MachineOrientation::ForwardForward => left_rc == right_rc,
            MachineOrientation::Any => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fragment_length_envelopment() {
        assert_eq!(fragment_length(0, 100, 10, 5), 100);
        assert_eq!(fragment_length(10, 5, 0, 100), 100);
    }

    #[test]
    fn test_fragment_length_is_order_independent() {
        let cases = [
            (10, 10, 60, 10),
            (0, 100, 10, 5),
            (-40, 30, -45, 2),
            (7, 1, 7, 1),
            (1000, 150, 1100, 250),
        ];
        for (a, len_a, b, len_b) in cases {
            assert_eq!(fragment_length(a, len_a, b, len_b), fragment_length(b, len_b, a, len_a));
        }
        assert_eq!(fragment_length(10, 10, 60, 10), 60);
        assert_eq!(fragment_length(7, 1, 7, 1), 1);
    }

    #[test]
    fn test_five_prime() {
        assert_eq!(five_prime(100, 50, false), 100);
        assert_eq!(five_prime(100, 50, true), 149);
    }

    #[test]
    fn test_forward_reverse_orientation() {
        let fr = MachineOrientation::ForwardReverse;
        assert!(fr.orientation_ok(10, false, 69, true));
        assert!(!fr.orientation_ok(10, true, 69, false));
        assert!(!fr.orientation_ok(10, false, 69, false));
        assert!(!fr.orientation_ok(70, false, 69, true));
        assert!(MachineOrientation::ReverseForward.orientation_ok(10, true, 69, false));
        assert!(MachineOrientation::ForwardForward.orientation_ok(10, true, 69, true));
        assert!(MachineOrientation::Any.orientation_ok(10, true, 0, false));
    }

    #[test]
    fn test_orientation_names_and_closures() {
        assert_eq!(
            MachineOrientation::from_name("FR"),
            Some(MachineOrientation::ForwardReverse)
        );
        assert_eq!(MachineOrientation::from_name("xy"), None);

        let only_forward = |_: i64, left_rc: bool, _: i64, right_rc: bool| !left_rc && !right_rc;
        assert!(only_forward.orientation_ok(0, false, 5, false));
        assert!(!only_forward.orientation_ok(0, false, 5, true));
    }

    #[test]
    fn test_read_length_table_fallback() {
        let mut table = ReadLengthTable::new(100);
        table.insert(4, true, 75);
        assert_eq!(table.read_length(4, true), 75);
        assert_eq!(table.read_length(4, false), 100);
        assert_eq!(table.max_length(), 75);
        assert_eq!(FixedReadLengths { first: 1, second: 2 }.read_length(0, true), 2);
    }
}
