/// Opaque reference to an alignment computed by the upstream aligner.
///
/// The engine never looks inside; it only carries the handle so that a
/// policy can hand it back to the record writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AlignmentHandle(pub u64);

/// Location of a pooled record: window slot plus index into that slot's pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HitHandle {
    pub slot: u32,
    pub index: u32,
}

impl HitHandle {
    pub fn new(slot: usize, index: usize) -> Self {
        Self {
            slot: slot as u32,
            index: index as u32,
        }
    }
}

/// Identity used for deduplication: `(template_start, read_id, reverse_complement, arm)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HitKey {
    pub template_start: i64,
    pub read_id: u32,
    pub reverse_complement: bool,
    pub arm: bool,
}

/// A single candidate placement of one read arm on the reference.
///
/// Records live in the per-slot pools of the window buffer and are reused
/// across positions. The `next`/`prev` links are only meaningful while the
/// record is part of a mate index chain.
#[derive(Debug, Clone, Default)]
pub struct HitRecord {
    arm: bool,
    reverse_complement: bool,
    read_id: u32,
    template_start: i64,
    cached_score: Option<i32>,
    cached_alignment: Option<AlignmentHandle>,
    pub(crate) next: Option<HitHandle>,
    pub(crate) prev: Option<HitHandle>,
}

impl HitRecord {
    pub fn new(arm: bool, reverse_complement: bool, read_id: u32, template_start: i64) -> Self {
        Self {
            arm,
            reverse_complement,
            read_id,
            template_start,
            ..Self::default()
        }
    }

    /// Overwrite a pooled record with a new hit, dropping any cached state
    pub(crate) fn reset(&mut self, arm: bool, reverse_complement: bool, read_id: u32, template_start: i64) {
        self.arm = arm;
        self.reverse_complement = reverse_complement;
        self.read_id = read_id;
        self.template_start = template_start;
        self.cached_score = None;
        self.cached_alignment = None;
        self.next = None;
        self.prev = None;
    }

    pub fn arm(&self) -> bool {
        self.arm
    }

    pub fn reverse_complement(&self) -> bool {
        self.reverse_complement
    }

    pub fn read_id(&self) -> u32 {
        self.read_id
    }

    pub fn template_start(&self) -> i64 {
        self.template_start
    }

    pub fn cached_score(&self) -> Option<i32> {
        self.cached_score
    }

    pub fn cached_alignment(&self) -> Option<AlignmentHandle> {
        self.cached_alignment
    }

    /// Store the aligner's result so later pairings of this hit skip re-alignment
    pub fn cache_alignment(&mut self, score: i32, alignment: Option<AlignmentHandle>) {
        self.cached_score = Some(score);
        self.cached_alignment = alignment;
    }

    pub fn key(&self) -> HitKey {
        HitKey {
            template_start: self.template_start,
            read_id: self.read_id,
            reverse_complement: self.reverse_complement,
            arm: self.arm,
        }
    }

    /// True when both records describe the same placement of the same read arm
    pub fn same(&self, other: &HitRecord) -> bool {
        self.template_start == other.template_start
            && self.read_id == other.read_id
            && self.reverse_complement == other.reverse_complement
            && self.arm == other.arm
    }
}
