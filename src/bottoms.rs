//! Bottom (leaf) nodes of the mixed and separated trees.
//!
//! A mixed bottom (`BtmM`) holds up to [`BTM_B`] runs: packed weights,
//! the packed cross-link vector `m2s` (one separated-tree slot per run),
//! a tag-range label and its mixed-tree parent link. A separated bottom
//! (`BtmS`) holds the packed back-links `s2m` into mixed slots for a
//! single character, sorted by the label of the owning mixed bottom.
//!
//! Bottoms live in paged arenas and are addressed by `u32` ids; a *slot
//! index* (`idxM` / `idxS`) addresses one run or entry as
//! `bottom_id * BTM_B + slot`. Cross-links store slot indices in both
//! directions, so shifting or moving entries always rewrites the reverse
//! links of whatever moved.

use crate::blockvec::BlockVec;
use crate::btree::{LeafLinks, NodeId, NONE};
use crate::wbits::WBitsVec;

/// Maximum number of runs (entries) per bottom.
pub const BTM_B: usize = 32;

/// Entries moved to the fresh bottom by a split.
pub const BTM_HALF: usize = BTM_B / 2;

/// Slot index of `slot` within bottom `btm`.
#[inline]
pub fn idx(btm: u32, slot: usize) -> u64 {
    btm as u64 * BTM_B as u64 + slot as u64
}

/// Bottom id of a slot index.
#[inline]
pub fn btm_of(i: u64) -> u32 {
    (i / BTM_B as u64) as u32
}

/// Slot within its bottom of a slot index.
#[inline]
pub fn slot_of(i: u64) -> usize {
    (i % BTM_B as u64) as usize
}

/// A mixed-tree bottom: up to [`BTM_B`] runs in text order.
pub struct BtmM {
    /// Run weights.
    pub weights: WBitsVec,
    /// Cross-links: separated slot index per run (`idxM2S`).
    pub m2s: WBitsVec,
    /// Tag-range label; strictly increasing across bottoms in text order.
    pub label: u64,
    /// Mixed-tree border node this bottom hangs under.
    pub parent: NodeId,
    /// Child slot within `parent`.
    pub idx_in_parent: u8,
}

impl BtmM {
    fn new(label: u64) -> Self {
        Self {
            weights: WBitsVec::with_capacity(4, BTM_B),
            m2s: WBitsVec::with_capacity(4, BTM_B),
            label,
            parent: NONE,
            idx_in_parent: 0,
        }
    }

    /// Number of runs stored.
    #[inline]
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    /// Whether the bottom holds no runs.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Total weight of the stored runs.
    pub fn total_weight(&self) -> u64 {
        self.weights.iter().sum()
    }

    /// Slot containing offset `pos`; on return `pos` is the residual
    /// within that run. Zero-weight runs (the sentinel) are skipped.
    pub fn search_slot(&self, pos: &mut u64) -> usize {
        let mut i = 0usize;
        loop {
            let w = self.weights.read(i);
            if *pos < w {
                return i;
            }
            *pos -= w;
            i += 1;
        }
    }

    fn heap_bytes(&self) -> usize {
        self.weights.heap_bytes() + self.m2s.heap_bytes()
    }
}

/// Arena of mixed bottoms.
#[derive(Default)]
pub struct MixedArena {
    btms: BlockVec<BtmM, 512>,
}

impl MixedArena {
    /// Allocate a fresh bottom with the given label.
    pub fn alloc(&mut self, label: u64) -> u32 {
        self.btms.alloc(BtmM::new(label))
    }

    /// Borrow bottom `b`.
    #[inline]
    pub fn get(&self, b: u32) -> &BtmM {
        self.btms.get(b)
    }

    /// Mutably borrow bottom `b`.
    #[inline]
    pub fn get_mut(&mut self, b: u32) -> &mut BtmM {
        self.btms.get_mut(b)
    }

    /// Number of allocated bottoms.
    pub fn len(&self) -> usize {
        self.btms.len()
    }

    /// Whether the arena holds no bottoms.
    pub fn is_empty(&self) -> bool {
        self.btms.is_empty()
    }

    /// Weight of the run at slot index `i`.
    #[inline]
    pub fn weight_at(&self, i: u64) -> u64 {
        self.get(btm_of(i)).weights.read(slot_of(i))
    }

    /// Label of the bottom owning slot index `i`.
    #[inline]
    pub fn label_at(&self, i: u64) -> u64 {
        self.get(btm_of(i)).label
    }

    /// Cross-link of the run at slot index `i`.
    #[inline]
    pub fn m2s_at(&self, i: u64) -> u64 {
        self.get(btm_of(i)).m2s.read(slot_of(i))
    }

    /// Approximate heap memory usage in bytes.
    pub fn heap_bytes(&self) -> usize {
        self.btms.iter().map(|b| b.heap_bytes()).sum::<usize>()
            + self.btms.len() * std::mem::size_of::<BtmM>()
    }
}

impl LeafLinks for MixedArena {
    fn set_link(&mut self, leaf: u32, parent: NodeId, idx: u8) {
        let b = self.btms.get_mut(leaf);
        b.parent = parent;
        b.idx_in_parent = idx;
    }
    fn link(&self, leaf: u32) -> (NodeId, u8) {
        let b = self.btms.get(leaf);
        (b.parent, b.idx_in_parent)
    }
}

/// A separated-tree bottom: back-links for one character's runs.
pub struct BtmS {
    /// Cross-links: mixed slot index per entry (`idxS2M`).
    pub s2m: WBitsVec,
    /// Alphabet entry (character) this bottom belongs to.
    pub entry: u32,
    /// Separated-tree border node this bottom hangs under.
    pub parent: NodeId,
    /// Child slot within `parent`.
    pub idx_in_parent: u8,
}

impl BtmS {
    fn new(entry: u32) -> Self {
        Self {
            s2m: WBitsVec::with_capacity(4, BTM_B),
            entry,
            parent: NONE,
            idx_in_parent: 0,
        }
    }

    /// Number of entries stored.
    #[inline]
    pub fn len(&self) -> usize {
        self.s2m.len()
    }

    /// Whether the bottom holds no entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.s2m.is_empty()
    }
}

/// Arena of separated bottoms.
#[derive(Default)]
pub struct SepArena {
    btms: BlockVec<BtmS, 1024>,
}

impl SepArena {
    /// Allocate a fresh bottom owned by alphabet entry `entry`.
    pub fn alloc(&mut self, entry: u32) -> u32 {
        self.btms.alloc(BtmS::new(entry))
    }

    /// Borrow bottom `b`.
    #[inline]
    pub fn get(&self, b: u32) -> &BtmS {
        self.btms.get(b)
    }

    /// Mutably borrow bottom `b`.
    #[inline]
    pub fn get_mut(&mut self, b: u32) -> &mut BtmS {
        self.btms.get_mut(b)
    }

    /// Number of allocated bottoms.
    pub fn len(&self) -> usize {
        self.btms.len()
    }

    /// Whether the arena holds no bottoms.
    pub fn is_empty(&self) -> bool {
        self.btms.is_empty()
    }

    /// Alphabet entry owning the bottom of slot index `i`.
    #[inline]
    pub fn entry_at(&self, i: u64) -> u32 {
        self.get(btm_of(i)).entry
    }

    /// Back-link of the entry at slot index `i`.
    #[inline]
    pub fn s2m_at(&self, i: u64) -> u64 {
        self.get(btm_of(i)).s2m.read(slot_of(i))
    }

    /// Overwrite the back-link at slot index `i`.
    #[inline]
    pub fn set_s2m(&mut self, i: u64, m: u64) {
        self.get_mut(btm_of(i)).s2m.write(slot_of(i), m);
    }

    /// Approximate heap memory usage in bytes.
    pub fn heap_bytes(&self) -> usize {
        self.btms.iter().map(|b| b.s2m.heap_bytes()).sum::<usize>()
            + self.btms.len() * std::mem::size_of::<BtmS>()
    }
}

impl LeafLinks for SepArena {
    fn set_link(&mut self, leaf: u32, parent: NodeId, idx: u8) {
        let b = self.btms.get_mut(leaf);
        b.parent = parent;
        b.idx_in_parent = idx;
    }
    fn link(&self, leaf: u32) -> (NodeId, u8) {
        let b = self.btms.get(leaf);
        (b.parent, b.idx_in_parent)
    }
}
