//! Dynamic run-length encoded string with rank, select and insert.
//!
//! The string is held as three coupled partial-sum B+trees:
//!
//! - the **mixed tree** orders runs by text position; its bottoms are
//!   [`BtmM`](crate::bottoms::BtmM) arena slots holding packed weights
//!   and cross-links;
//! - one **separated tree** per character lists that character's runs in
//!   BWT order; its bottoms hold packed back-links into mixed slots;
//! - the **alphabet tree** orders the separated trees by character code
//!   and aggregates their weights, so F-column positions ("total rank")
//!   fall out of a single partial-sum ascent.
//!
//! Runs and separated entries point at each other through arena slot
//! indices (`idxM`/`idxS`), never owning pointers, so the cyclic
//! structure stays plain data. Every mutation that shifts or moves
//! entries rewrites the reverse links of whatever moved.
//!
//! The first mixed bottom and the first separated bottom hold a shared
//! weight-0 sentinel run under a dummy alphabet entry. The sentinel is a
//! valid predecessor for every insertion, which removes all
//! "insert at front" special cases; weight-based searches skip it for
//! free.

use crate::bottoms::{btm_of, idx, slot_of, MixedArena, SepArena, BTM_B, BTM_HALF};
use crate::btree::{LeafLinks, NodeId, PsumTree, NONE};
use crate::tra;

/// Sentinel for "no alphabet entry".
const NO_ENTRY: u32 = u32::MAX;

/// Character code of the dummy alphabet entry (never matches a `u8`).
const DUMMY_CH: u16 = u16::MAX;

/// One character's separated tree plus its alphabet-tree back-link.
struct CharEntry {
    ch: u16,
    septree: PsumTree,
    parent: NodeId,
    idx_in_parent: u8,
}

/// Arena of alphabet entries; leaf links for the alphabet tree.
#[derive(Default)]
struct Entries(Vec<CharEntry>);

impl LeafLinks for Entries {
    fn set_link(&mut self, leaf: u32, parent: NodeId, idx: u8) {
        let e = &mut self.0[leaf as usize];
        e.parent = parent;
        e.idx_in_parent = idx;
    }
    fn link(&self, leaf: u32) -> (NodeId, u8) {
        let e = &self.0[leaf as usize];
        (e.parent, e.idx_in_parent)
    }
}

/// The alphabet tree with a direct character-to-entry map.
struct Alphabet {
    entries: Entries,
    tree: PsumTree,
    map: [u32; 256],
}

/// Dynamic run-length encoded string over `u8` symbols.
pub struct DynRle {
    btmm: MixedArena,
    btms: SepArena,
    mixed: PsumTree,
    alpha: Alphabet,
}

impl DynRle {
    /// Create an empty string (sentinel bottoms only).
    pub fn new() -> Self {
        let mut btmm = MixedArena::default();
        let mut btms = SepArena::default();
        let mb = btmm.alloc(0);
        let sb = btms.alloc(0);
        btmm.get_mut(mb).weights.push(0);
        btmm.get_mut(mb).m2s.push(idx(sb, 0));
        btms.get_mut(sb).s2m.push(idx(mb, 0));
        let mixed = PsumTree::new(mb, 0, &mut btmm);
        let mut entries = Entries::default();
        let septree = PsumTree::new(sb, 0, &mut btms);
        entries.0.push(CharEntry {
            ch: DUMMY_CH,
            septree,
            parent: NONE,
            idx_in_parent: 0,
        });
        let tree = PsumTree::new(0, 0, &mut entries);
        Self {
            btmm,
            btms,
            mixed,
            alpha: Alphabet {
                entries,
                tree,
                map: [NO_ENTRY; 256],
            },
        }
    }

    /// Total length of the represented text.
    #[inline]
    pub fn sum_of_weight(&self) -> u64 {
        self.mixed.total()
    }

    /// Number of occurrences of `ch` in the text.
    pub fn sum_of_weight_ch(&self, ch: u8) -> u64 {
        match self.alpha.map[ch as usize] {
            NO_ENTRY => 0,
            e => self.alpha.entries.0[e as usize].septree.total(),
        }
    }

    /// Whether `ch` occurs in the text.
    #[inline]
    pub fn has_char(&self, ch: u8) -> bool {
        self.alpha.map[ch as usize] != NO_ENTRY
    }

    /// Character of the run at `idx_m`.
    #[inline]
    pub fn char_from_idx_m(&self, idx_m: u64) -> u8 {
        self.char_of_entry(self.entry_of_run(idx_m))
    }

    /// Weight of the run at `idx_m`.
    #[inline]
    pub fn weight_from_idx_m(&self, idx_m: u64) -> u64 {
        self.btmm.weight_at(idx_m)
    }

    /// Run containing text position `pos`; on return `pos` holds the
    /// offset within that run. `None` past the end of the text.
    pub fn search_pos_m(&self, pos: &mut u64) -> Option<u64> {
        let b = self.mixed.search_pos(pos)?;
        let slot = self.btmm.get(b).search_slot(pos);
        Some(idx(b, slot))
    }

    /// Run before `idx_m` in text order (the sentinel counts).
    pub fn prev_idx_m(&self, idx_m: u64) -> Option<u64> {
        let (b, s) = (btm_of(idx_m), slot_of(idx_m));
        if s > 0 {
            return Some(idx(b, s - 1));
        }
        let pb = self.mixed.prev_leaf(b, &self.btmm)?;
        Some(idx(pb, self.btmm.get(pb).len() - 1))
    }

    /// Run after `idx_m` in text order.
    pub fn next_idx_m(&self, idx_m: u64) -> Option<u64> {
        let (b, s) = (btm_of(idx_m), slot_of(idx_m));
        if s + 1 < self.btmm.get(b).len() {
            return Some(idx(b, s + 1));
        }
        let nb = self.mixed.next_leaf(b, &self.btmm)?;
        Some(idx(nb, 0))
    }

    /// Entry before `idx_s` within its character's separated tree.
    pub fn prev_idx_s(&self, idx_s: u64) -> Option<u64> {
        let (sb, s) = (btm_of(idx_s), slot_of(idx_s));
        if s > 0 {
            return Some(idx(sb, s - 1));
        }
        let e = self.btms.get(sb).entry;
        let psb = self.alpha.entries.0[e as usize]
            .septree
            .prev_leaf(sb, &self.btms)?;
        Some(idx(psb, self.btms.get(psb).len() - 1))
    }

    /// Entry after `idx_s` within its character's separated tree.
    pub fn next_idx_s(&self, idx_s: u64) -> Option<u64> {
        let (sb, s) = (btm_of(idx_s), slot_of(idx_s));
        if s + 1 < self.btms.get(sb).len() {
            return Some(idx(sb, s + 1));
        }
        let e = self.btms.get(sb).entry;
        let nsb = self.alpha.entries.0[e as usize]
            .septree
            .next_leaf(sb, &self.btms)?;
        Some(idx(nsb, 0))
    }

    /// First separated entry of `ch` in BWT order.
    pub fn first_idx_s(&self, ch: u8) -> Option<u64> {
        match self.alpha.map[ch as usize] {
            NO_ENTRY => None,
            e => {
                let sb = self.alpha.entries.0[e as usize].septree.first_leaf();
                Some(idx(sb, 0))
            }
        }
    }

    /// Iterate the present characters in code order with their total
    /// weights (the separated-tree roots of the alphabet tree).
    pub fn chars(&self) -> impl Iterator<Item = (u8, u64)> + '_ {
        // Leaf 0 is the dummy entry; real characters follow in order.
        let mut cur = self.alpha.tree.next_leaf(0, &self.alpha.entries);
        std::iter::from_fn(move || {
            let e = cur?;
            cur = self.alpha.tree.next_leaf(e, &self.alpha.entries);
            let entry = &self.alpha.entries.0[e as usize];
            Some((entry.ch as u8, entry.septree.total()))
        })
    }

    /// Iterate the runs in text order as `(char, weight)` pairs.
    pub fn runs(&self) -> impl Iterator<Item = (u8, u64)> + '_ {
        let mut cur = self.next_idx_m(idx(self.mixed.first_leaf(), 0));
        std::iter::from_fn(move || {
            let m = cur?;
            let ch = self.char_from_idx_m(m);
            let w = self.weight_from_idx_m(m);
            cur = self.next_idx_m(m);
            Some((ch, w))
        })
    }

    /// Number of runs (sentinel excluded).
    pub fn num_runs(&self) -> u64 {
        let mut n = 0u64;
        let mut leaf = Some(self.mixed.first_leaf());
        while let Some(b) = leaf {
            n += self.btmm.get(b).len() as u64;
            leaf = self.mixed.next_leaf(b, &self.btmm);
        }
        n - 1
    }

    /// Occurrences of `ch` in `T[0..=pos]`; with `calc_total`, adds the
    /// number of occurrences of every character smaller than `ch` (the
    /// F-column position). `None` when `pos` is past the end.
    pub fn rank(&self, ch: u8, pos: u64, calc_total: bool) -> Option<u64> {
        let mut rel = pos;
        let idx_m = self.search_pos_m(&mut rel)?;
        Some(self.rank_at(ch, idx_m, rel, calc_total))
    }

    /// [`rank`](Self::rank) with the position already decomposed into a
    /// run and an in-run offset.
    pub fn rank_at(&self, ch: u8, idx_m: u64, rel: u64, calc_total: bool) -> u64 {
        let e = self.alpha.map[ch as usize];
        if e == NO_ENTRY {
            return if calc_total {
                self.total_weight_lt_absent(ch)
            } else {
                0
            };
        }
        let own = self.entry_of_run(idx_m) == e;
        let (idx_s, base, upto) = if own {
            let s = self.btmm.m2s_at(idx_m);
            (Some(s), rel + 1, slot_of(s))
        } else {
            match self.pred_idx_s(e, idx_m) {
                Some(s) => (Some(s), 0, slot_of(s) + 1),
                None => (None, 0, 0),
            }
        };
        let mut r = base;
        if let Some(s) = idx_s {
            let sb = btm_of(s);
            for j in 0..upto {
                r += self.btmm.weight_at(self.btms.get(sb).s2m.read(j));
            }
            r += self.alpha.entries.0[e as usize]
                .septree
                .psum_of(sb, &self.btms);
        }
        if calc_total {
            r += self.alpha.tree.psum_of(e, &self.alpha.entries);
        }
        r
    }

    /// Total weight of every character strictly smaller than `ch`, valid
    /// whether or not `ch` occurs.
    pub fn total_weight_lt(&self, ch: u8) -> u64 {
        match self.alpha.map[ch as usize] {
            NO_ENTRY => self.total_weight_lt_absent(ch),
            e => self.alpha.tree.psum_of(e, &self.alpha.entries),
        }
    }

    fn total_weight_lt_absent(&self, ch: u8) -> u64 {
        for c in (0..ch).rev() {
            let e = self.alpha.map[c as usize];
            if e != NO_ENTRY {
                return self.alpha.tree.psum_of(e, &self.alpha.entries)
                    + self.alpha.tree.leaf_weight(e, &self.alpha.entries);
            }
        }
        0
    }

    /// Text position of the `rank`-th occurrence of `ch` (`rank >= 1`),
    /// or `None` when `ch` has fewer occurrences.
    pub fn select(&self, ch: u8, rank: u64) -> Option<u64> {
        if rank == 0 {
            return None;
        }
        match self.alpha.map[ch as usize] {
            NO_ENTRY => None,
            e => self.select_in_entry(e, rank),
        }
    }

    /// Text position holding the `rank`-th symbol in F-column order
    /// (`rank >= 1`), found through the alphabet tree.
    pub fn select_total(&self, rank: u64) -> Option<u64> {
        if rank == 0 {
            return None;
        }
        let mut rr = rank - 1;
        let e = self.alpha.tree.search_pos(&mut rr)?;
        self.select_in_entry(e, rr + 1)
    }

    fn select_in_entry(&self, e: u32, rank: u64) -> Option<u64> {
        let st = &self.alpha.entries.0[e as usize].septree;
        let mut rr = rank - 1;
        let sb = st.search_pos(&mut rr)?;
        let len = self.btms.get(sb).len();
        for j in 0..len {
            let m = self.btms.get(sb).s2m.read(j);
            let w = self.btmm.weight_at(m);
            if rr < w {
                return Some(self.text_pos_of(m) + rr);
            }
            rr -= w;
        }
        unreachable!("separated-tree weights cover the residual rank")
    }

    /// Text position of the first symbol of the run at `idx_m`.
    pub fn text_pos_of(&self, idx_m: u64) -> u64 {
        let b = btm_of(idx_m);
        let mut p = self.mixed.psum_of(b, &self.btmm);
        for j in 0..slot_of(idx_m) {
            p += self.btmm.get(b).weights.read(j);
        }
        p
    }

    /// Insert `ch` repeated `weight` times at text position `pos`,
    /// merging into an adjacent equal-character run where possible.
    /// Returns the run now holding the inserted symbols; `pos` becomes
    /// the offset of the first of them within that run.
    pub fn insert_run(&mut self, ch: u8, weight: u64, pos: &mut u64) -> u64 {
        debug_assert!(*pos <= self.sum_of_weight());
        debug_assert!(weight >= 1);
        if *pos == self.sum_of_weight() {
            return self.push_back_run(ch, weight, pos);
        }
        let mut rel = *pos;
        let b = self
            .mixed
            .search_pos(&mut rel)
            .expect("position below total weight");
        let slot = self.btmm.get(b).search_slot(&mut rel);
        let idx_m = idx(b, slot);
        let cur_e = self.entry_of_run(idx_m);
        let e_req = self.alpha.map[ch as usize];
        if e_req != NO_ENTRY && cur_e == e_req {
            self.change_weight(idx_m, weight as i64);
            *pos = rel;
            return idx_m;
        }
        if rel == 0 {
            let prev = self
                .prev_idx_m(idx_m)
                .expect("sentinel precedes every run");
            if e_req != NO_ENTRY && self.entry_of_run(prev) == e_req {
                let old_w = self.weight_from_idx_m(prev);
                self.change_weight(prev, weight as i64);
                *pos = old_w;
                return prev;
            }
            let new_m = self.insert_new_run_after(prev, ch, weight);
            *pos = 0;
            return new_m;
        }
        // Split: shrink the hit run to `rel`, then lay down the new run
        // and the displaced tail.
        let w0 = self.weight_from_idx_m(idx_m);
        let tail_w = w0 - rel;
        let cur_ch = self.char_of_entry(cur_e);
        self.change_weight(idx_m, -(tail_w as i64));
        let new_m = self.insert_new_run_after(idx_m, ch, weight);
        self.insert_new_run_after(new_m, cur_ch, tail_w);
        *pos = 0;
        new_m
    }

    /// Append `ch` repeated `weight` times at the end of the text,
    /// merging with the last run when the characters match.
    pub fn push_back_run(&mut self, ch: u8, weight: u64, pos: &mut u64) -> u64 {
        let last = self.last_idx_m();
        let e_req = self.alpha.map[ch as usize];
        if e_req != NO_ENTRY && self.entry_of_run(last) == e_req {
            let old_w = self.weight_from_idx_m(last);
            self.change_weight(last, weight as i64);
            *pos = old_w;
            return last;
        }
        let m = self.insert_new_run_after(last, ch, weight);
        *pos = 0;
        m
    }

    /// Append without the merge check, always creating a fresh run.
    pub fn push_back_run_without_merge(&mut self, ch: u8, weight: u64, pos: &mut u64) -> u64 {
        let last = self.last_idx_m();
        let m = self.insert_new_run_after(last, ch, weight);
        *pos = 0;
        m
    }

    /// Place one `ch` immediately after the run `idx_m`, preferring to
    /// grow `idx_m` itself or the following run when characters match.
    pub fn insert_run_after(&mut self, idx_m: u64, ch: u8) -> u64 {
        let e_req = self.alpha.map[ch as usize];
        if e_req != NO_ENTRY {
            if self.entry_of_run(idx_m) == e_req {
                self.change_weight(idx_m, 1);
                return idx_m;
            }
            if let Some(next) = self.next_idx_m(idx_m) {
                if self.entry_of_run(next) == e_req {
                    self.change_weight(next, 1);
                    return next;
                }
            }
        }
        self.insert_new_run_after(idx_m, ch, 1)
    }

    /// Adjust the weight of the run at `idx_m` by `delta`, updating the
    /// partial sums of all three trees.
    pub fn change_weight(&mut self, idx_m: u64, delta: i64) {
        let b = btm_of(idx_m);
        let slot = slot_of(idx_m);
        let old = self.btmm.get(b).weights.read(slot);
        debug_assert!(delta >= 0 || old >= delta.unsigned_abs());
        let new = old.wrapping_add(delta as u64);
        self.btmm.get_mut(b).weights.write(slot, new);
        self.mixed.add_weight(b, delta, &self.btmm);
        let s = self.btmm.m2s_at(idx_m);
        let sb = btm_of(s);
        let e = self.btms.get(sb).entry;
        self.alpha.entries.0[e as usize]
            .septree
            .add_weight(sb, delta, &self.btms);
        let Alphabet { entries, tree, .. } = &mut self.alpha;
        tree.add_weight(e, delta, entries);
    }

    /// Approximate heap memory usage in bytes.
    pub fn heap_bytes(&self) -> usize {
        let strees: usize = self
            .alpha
            .entries
            .0
            .iter()
            .map(|e| e.septree.heap_bytes())
            .sum();
        self.btmm.heap_bytes()
            + self.btms.heap_bytes()
            + self.mixed.heap_bytes()
            + self.alpha.tree.heap_bytes()
            + strees
            + std::mem::size_of_val(&self.alpha.map)
    }

    fn last_idx_m(&self) -> u64 {
        let b = self.mixed.last_leaf();
        idx(b, self.btmm.get(b).len() - 1)
    }

    #[inline]
    fn entry_of_run(&self, idx_m: u64) -> u32 {
        self.btms.entry_at(self.btmm.m2s_at(idx_m))
    }

    #[inline]
    fn char_of_entry(&self, e: u32) -> u8 {
        self.alpha.entries.0[e as usize].ch as u8
    }

    /// Rewrite the reverse links of the mixed slots `from..` in `b`.
    fn fix_links_m(&mut self, b: u32, from: usize) {
        let len = self.btmm.get(b).len();
        for j in from..len {
            let s = self.btmm.get(b).m2s.read(j);
            self.btms.set_s2m(s, idx(b, j));
        }
    }

    /// Rewrite the reverse links of the separated slots `from..` in `sb`.
    fn fix_links_s(&mut self, sb: u32, from: usize) {
        let len = self.btms.get(sb).len();
        for j in from..len {
            let m = self.btms.get(sb).s2m.read(j);
            self.btmm
                .get_mut(btm_of(m))
                .m2s
                .write(slot_of(m), idx(sb, j));
        }
    }

    /// Split a full mixed bottom, moving the upper half of its runs to a
    /// fresh bottom that is spliced in after it and labelled.
    fn split_btm_m(&mut self, b: u32) -> u32 {
        let w_tail = self.btmm.get_mut(b).weights.split_off(BTM_HALF);
        let l_tail = self.btmm.get_mut(b).m2s.split_off(BTM_HALF);
        let moved: u64 = w_tail.iter().sum();
        let nb = self.btmm.alloc(0);
        self.btmm.get_mut(nb).weights = w_tail;
        self.btmm.get_mut(nb).m2s = l_tail;
        self.mixed.add_weight(b, -(moved as i64), &self.btmm);
        self.mixed.insert_leaf_after(b, nb, moved, &mut self.btmm);
        self.fix_links_m(nb, 0);
        self.assign_label(b, nb);
        nb
    }

    /// Give `new_b` a label strictly between its neighbours', respreading
    /// a window of labels when the neighbourhood is saturated (§ tag
    /// range allocation).
    fn assign_label(&mut self, prev_b: u32, new_b: u32) {
        let prev_label = self.btmm.get(prev_b).label;
        let next_label = match self.mixed.next_leaf(new_b, &self.btmm) {
            Some(nb) => self.btmm.get(nb).label,
            None => tra::LABEL_END,
        };
        if let Some(mid) = tra::midpoint(prev_label, next_label) {
            self.btmm.get_mut(new_b).label = mid;
            return;
        }
        // Saturated: temporarily duplicate the predecessor's label so the
        // window walk sees the new bottom, then widen until the density
        // schedule admits a respread.
        self.btmm.get_mut(new_b).label = prev_label;
        let code = tra::tra_code(self.btmm.len() as u64);
        for l in 1..=tra::LABEL_BITS {
            let start = tra::window_start(prev_label, l);
            let end = start + (1u64 << l);
            let mut first = new_b;
            while let Some(p) = self.mixed.prev_leaf(first, &self.btmm) {
                if self.btmm.get(p).label >= start {
                    first = p;
                } else {
                    break;
                }
            }
            let mut members = vec![first];
            let mut cur = first;
            while let Some(nx) = self.mixed.next_leaf(cur, &self.btmm) {
                if self.btmm.get(nx).label < end {
                    members.push(nx);
                    cur = nx;
                } else {
                    break;
                }
            }
            let n = members.len() as u64;
            if n < tra::overflow_num(l, code) || l == tra::LABEL_BITS {
                for (b, lab) in members.iter().zip(tra::spread(start, l, n)) {
                    self.btmm.get_mut(*b).label = lab;
                }
                return;
            }
        }
        unreachable!("the full label space always admits a respread")
    }

    /// Split a full separated bottom of entry `e`, mirroring
    /// [`split_btm_m`] with weights read through the back-links.
    fn split_btm_s(&mut self, e: u32, sb: u32) -> u32 {
        let len = self.btms.get(sb).len();
        let mut moved = 0u64;
        for j in BTM_HALF..len {
            moved += self.btmm.weight_at(self.btms.get(sb).s2m.read(j));
        }
        let tail = self.btms.get_mut(sb).s2m.split_off(BTM_HALF);
        let nsb = self.btms.alloc(e);
        self.btms.get_mut(nsb).s2m = tail;
        self.alpha.entries.0[e as usize]
            .septree
            .add_weight(sb, -(moved as i64), &self.btms);
        self.alpha.entries.0[e as usize]
            .septree
            .insert_leaf_after(sb, nsb, moved, &mut self.btms);
        self.fix_links_s(nsb, 0);
        nsb
    }

    /// Open a zero-weight slot right after `prev_idx_m`, splitting the
    /// bottom first when it is full. The slot's cross-link is a
    /// placeholder until the caller wires it.
    fn make_space_m(&mut self, prev_idx_m: u64) -> u64 {
        let mut b = btm_of(prev_idx_m);
        let mut slot = slot_of(prev_idx_m) + 1;
        if self.btmm.get(b).len() == BTM_B {
            let nb = self.split_btm_m(b);
            if slot > BTM_HALF {
                b = nb;
                slot -= BTM_HALF;
            }
        }
        self.btmm.get_mut(b).weights.insert(slot, 0);
        self.btmm.get_mut(b).m2s.insert(slot, 0);
        self.fix_links_m(b, slot + 1);
        idx(b, slot)
    }

    /// Open a slot in entry `e`'s separated tree after `pred` (or at the
    /// very front when there is no predecessor).
    fn make_space_s(&mut self, e: u32, pred: Option<u64>) -> u64 {
        let (mut sb, mut slot) = match pred {
            Some(p) => (btm_of(p), slot_of(p) + 1),
            None => (self.alpha.entries.0[e as usize].septree.first_leaf(), 0),
        };
        if self.btms.get(sb).len() == BTM_B {
            let nsb = self.split_btm_s(e, sb);
            if slot > BTM_HALF {
                sb = nsb;
                slot -= BTM_HALF;
            }
        }
        self.btms.get_mut(sb).s2m.insert(slot, 0);
        self.fix_links_s(sb, slot + 1);
        idx(sb, slot)
    }

    /// Graft a separated tree for the previously unseen `ch` into the
    /// alphabet tree at its ordered position.
    fn setup_new_stree(&mut self, ch: u8) -> u32 {
        let mut pred = 0u32; // dummy entry
        for c in (0..ch).rev() {
            let e = self.alpha.map[c as usize];
            if e != NO_ENTRY {
                pred = e;
                break;
            }
        }
        let e = self.alpha.entries.0.len() as u32;
        let sb = self.btms.alloc(e);
        let septree = PsumTree::new(sb, 0, &mut self.btms);
        self.alpha.entries.0.push(CharEntry {
            ch: ch as u16,
            septree,
            parent: NONE,
            idx_in_parent: 0,
        });
        let Alphabet { entries, tree, map } = &mut self.alpha;
        tree.insert_leaf_after(pred, e, 0, entries);
        map[ch as usize] = e;
        e
    }

    /// Predecessor slot in entry `e`'s separated tree for a run sitting
    /// at `idx_m`: first a scan back through the run's own bottom, then a
    /// label predecessor search over the tree's bottoms.
    fn pred_idx_s(&self, e: u32, idx_m: u64) -> Option<u64> {
        let b = btm_of(idx_m);
        let tslot = slot_of(idx_m);
        for j in (0..tslot).rev() {
            let s = self.btmm.get(b).m2s.read(j);
            if self.btms.entry_at(s) == e {
                return Some(s);
            }
        }
        let label = self.btmm.get(b).label;
        let st = &self.alpha.entries.0[e as usize].septree;
        // Last bottom whose first entry's owner label precedes ours.
        let (mut lo, mut hi) = (0u32, st.num_leaves());
        while lo < hi {
            let mid = (lo + hi) / 2;
            let sb = st.nth_leaf(mid).expect("mid below leaf count");
            let first = self.btms.get(sb).s2m.read(0);
            if self.btmm.label_at(first) < label {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        if lo == 0 {
            return None;
        }
        let sb = st.nth_leaf(lo - 1).expect("lo below leaf count");
        let len = self.btms.get(sb).len();
        for j in (0..len).rev() {
            let m = self.btms.get(sb).s2m.read(j);
            if self.btmm.label_at(m) < label {
                return Some(idx(sb, j));
            }
        }
        unreachable!("first entry of the chosen bottom precedes the label")
    }

    /// Allocate a run `ch^weight` right after `prev_idx_m` (no merge
    /// checks): open the mixed slot, find or create the separated tree,
    /// locate the predecessor entry, open the separated slot, cross-link,
    /// then account the weight in all three trees.
    fn insert_new_run_after(&mut self, prev_idx_m: u64, ch: u8, weight: u64) -> u64 {
        let new_m = self.make_space_m(prev_idx_m);
        // A freshly grafted tree has one empty bottom and no predecessor.
        let (e, pred) = match self.alpha.map[ch as usize] {
            NO_ENTRY => (self.setup_new_stree(ch), None),
            e => (e, self.pred_idx_s(e, new_m)),
        };
        let new_s = self.make_space_s(e, pred);
        self.btmm
            .get_mut(btm_of(new_m))
            .m2s
            .write(slot_of(new_m), new_s);
        self.btms.set_s2m(new_s, new_m);
        self.change_weight(new_m, weight as i64);
        new_m
    }

    /// Walk every structural invariant; panics on the first violation.
    /// Quadratic in places — a diagnostic, not an operation.
    pub fn check_integrity(&self) {
        // Mixed walk: cross-links, labels, weights, alphabet membership.
        let mut leaf = Some(self.mixed.first_leaf());
        let mut last_label = None;
        let mut total = 0u64;
        let mut first = true;
        while let Some(b) = leaf {
            let bm = self.btmm.get(b);
            if let Some(l) = last_label {
                assert!(bm.label > l, "labels must increase in text order");
            }
            last_label = Some(bm.label);
            assert!(bm.len() >= 1, "bottoms are never empty");
            assert_eq!(
                self.mixed.leaf_weight(b, &self.btmm),
                bm.total_weight(),
                "mixed partial sums track bottom weights"
            );
            for j in 0..bm.len() {
                let m = idx(b, j);
                let s = bm.m2s.read(j);
                assert_eq!(self.btms.s2m_at(s), m, "cross-links are mutual");
                let w = bm.weights.read(j);
                if first && j == 0 {
                    assert_eq!(w, 0, "sentinel run has weight zero");
                } else {
                    assert!(w >= 1, "runs have positive weight");
                }
                total += w;
            }
            first = false;
            leaf = self.mixed.next_leaf(b, &self.btmm);
        }
        assert_eq!(total, self.mixed.total(), "mixed tree total");
        assert_eq!(total, self.alpha.tree.total(), "alphabet tree total");
        // Separated walks: sortedness by owner label, per-bottom weights.
        for (e, entry) in self.alpha.entries.0.iter().enumerate() {
            let mut leaf = Some(entry.septree.first_leaf());
            let mut last: Option<(u64, usize)> = None;
            let mut sum = 0u64;
            while let Some(sb) = leaf {
                let sbm = self.btms.get(sb);
                assert_eq!(sbm.entry as usize, e, "bottom belongs to its tree");
                let mut bw = 0u64;
                for j in 0..sbm.len() {
                    let m = sbm.s2m.read(j);
                    assert_eq!(
                        self.btmm.m2s_at(m),
                        idx(sb, j),
                        "cross-links are mutual"
                    );
                    let key = (self.btmm.label_at(m), slot_of(m));
                    if let Some(k) = last {
                        assert!(k < key, "separated entries sorted by owner label");
                    }
                    last = Some(key);
                    bw += self.btmm.weight_at(m);
                }
                assert_eq!(
                    entry.septree.leaf_weight(sb, &self.btms),
                    bw,
                    "separated partial sums track entry weights"
                );
                sum += bw;
                leaf = entry.septree.next_leaf(sb, &self.btms);
            }
            assert_eq!(
                self.alpha.tree.leaf_weight(e as u32, &self.alpha.entries),
                sum,
                "alphabet weight tracks separated total"
            );
        }
    }
}

impl Default for DynRle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Expanded-text mirror of the structure.
    struct Naive(Vec<u8>);

    impl Naive {
        fn insert(&mut self, ch: u8, weight: u64, pos: u64) {
            for k in 0..weight {
                self.0.insert(pos as usize + k as usize, ch);
            }
        }
        fn rank(&self, ch: u8, pos: u64) -> u64 {
            self.0[..=pos as usize].iter().filter(|&&c| c == ch).count() as u64
        }
        fn lt(&self, ch: u8) -> u64 {
            self.0.iter().filter(|&&c| c < ch).count() as u64
        }
        fn select(&self, ch: u8, rank: u64) -> Option<u64> {
            self.0
                .iter()
                .enumerate()
                .filter(|(_, &c)| c == ch)
                .nth(rank as usize - 1)
                .map(|(i, _)| i as u64)
        }
    }

    fn check_against(d: &DynRle, n: &Naive) {
        d.check_integrity();
        assert_eq!(d.sum_of_weight(), n.0.len() as u64);
        for ch in [b'a', b'b', b'c', b'z', 1u8] {
            assert_eq!(
                d.sum_of_weight_ch(ch),
                n.0.iter().filter(|&&c| c == ch).count() as u64
            );
            for pos in 0..n.0.len() as u64 {
                assert_eq!(
                    d.rank(ch, pos, false),
                    Some(n.rank(ch, pos)),
                    "rank({}, {})",
                    ch,
                    pos
                );
                assert_eq!(
                    d.rank(ch, pos, true),
                    Some(n.rank(ch, pos) + n.lt(ch)),
                    "total rank({}, {})",
                    ch,
                    pos
                );
            }
            let occ = d.sum_of_weight_ch(ch);
            for r in 1..=occ {
                assert_eq!(d.select(ch, r), n.select(ch, r));
            }
            assert_eq!(d.select(ch, occ + 1), None);
        }
        for r in 1..=n.0.len() as u64 {
            // Total-rank select agrees with the sorted text.
            let mut sorted = n.0.clone();
            sorted.sort_unstable();
            let ch = sorted[r as usize - 1];
            let before = sorted[..r as usize - 1].iter().filter(|&&c| c == ch).count() as u64;
            assert_eq!(d.select_total(r), n.select(ch, before + 1));
        }
    }

    #[test]
    fn test_push_back_and_merge() {
        let mut d = DynRle::new();
        let mut naive = Naive(Vec::new());
        for &ch in b"aaabbbaacc" {
            let mut pos = d.sum_of_weight();
            naive.insert(ch, 1, pos);
            d.insert_run(ch, 1, &mut pos);
        }
        assert_eq!(d.num_runs(), 4);
        let runs: Vec<(u8, u64)> = d.runs().collect();
        assert_eq!(runs, vec![(b'a', 3), (b'b', 3), (b'a', 2), (b'c', 2)]);
        check_against(&d, &naive);
    }

    #[test]
    fn test_insert_in_middle_splits_run() {
        let mut d = DynRle::new();
        let mut naive = Naive(Vec::new());
        let mut pos = 0u64;
        d.insert_run(b'a', 6, &mut pos);
        naive.insert(b'a', 6, 0);
        let mut pos = 3u64;
        let m = d.insert_run(b'b', 1, &mut pos);
        naive.insert(b'b', 1, 3);
        assert_eq!(pos, 0);
        assert_eq!(d.char_from_idx_m(m), b'b');
        assert_eq!(d.num_runs(), 3);
        check_against(&d, &naive);
        // Merging back into the left half.
        let mut pos = 3u64;
        d.insert_run(b'a', 2, &mut pos);
        naive.insert(b'a', 2, 3);
        assert_eq!(pos, 3);
        assert_eq!(d.num_runs(), 3);
        check_against(&d, &naive);
    }

    #[test]
    fn test_insert_at_run_boundary_merges_left() {
        let mut d = DynRle::new();
        let mut naive = Naive(Vec::new());
        let mut pos = 0u64;
        d.insert_run(b'a', 2, &mut pos);
        naive.insert(b'a', 2, 0);
        let mut pos = 2u64;
        d.insert_run(b'b', 2, &mut pos);
        naive.insert(b'b', 2, 2);
        // Position 2 is the boundary: an 'a' must extend the left run.
        let mut pos = 2u64;
        let m = d.insert_run(b'a', 1, &mut pos);
        naive.insert(b'a', 1, 2);
        assert_eq!(pos, 2);
        assert_eq!(d.char_from_idx_m(m), b'a');
        assert_eq!(d.num_runs(), 2);
        check_against(&d, &naive);
    }

    #[test]
    fn test_many_runs_force_bottom_splits() {
        let mut d = DynRle::new();
        let mut naive = Naive(Vec::new());
        // 150 singleton runs of cycling characters: no merges, several
        // bottom splits, label assignments on every split.
        for i in 0..150u64 {
            let ch = b'a' + (i % 3) as u8;
            let mut pos = d.sum_of_weight();
            naive.insert(ch, 1, pos);
            d.insert_run(ch, 1, &mut pos);
        }
        assert_eq!(d.num_runs(), 150);
        check_against(&d, &naive);
    }

    #[test]
    fn test_front_insertions_exercise_label_respread() {
        let mut d = DynRle::new();
        // Repeated insertion near the front keeps splitting the same
        // bottom; after ~60 splits the midpoint labels are exhausted and
        // the window respread must kick in.
        for i in 0..1200u64 {
            let ch = b'a' + (i % 2) as u8;
            let mut pos = 0u64;
            d.insert_run(ch, 1, &mut pos);
            if i % 200 == 199 {
                d.check_integrity();
            }
        }
        assert_eq!(d.sum_of_weight(), 1200);
        assert_eq!(d.num_runs(), 1200);
        d.check_integrity();
        // The text alternates b a b a ...; spot-check rank and select.
        assert_eq!(d.rank(b'b', 0, false), Some(1));
        assert_eq!(d.rank(b'a', 1199, false), Some(600));
        assert_eq!(d.rank(b'b', 1199, false), Some(600));
        assert_eq!(d.select(b'a', 600), Some(1199));
        assert_eq!(d.select(b'b', 1), Some(0));
    }

    #[test]
    fn test_insert_run_after_prefers_neighbours() {
        let mut d = DynRle::new();
        let mut pos = 0u64;
        d.insert_run(b'a', 2, &mut pos);
        let mut pos = 2u64;
        let mb = d.insert_run(b'b', 2, &mut pos);
        // Growing after the 'b' run with 'b' merges in place.
        let m = d.insert_run_after(mb, b'b');
        assert_eq!(m, mb);
        assert_eq!(d.weight_from_idx_m(mb), 3);
        assert_eq!(d.num_runs(), 2);
        // 'c' after 'a' (with a 'b' next) allocates a fresh run.
        let mut p0 = 0u64;
        let ma = d.search_pos_m(&mut p0).unwrap();
        let mc = d.insert_run_after(ma, b'c');
        assert_eq!(d.char_from_idx_m(mc), b'c');
        assert_eq!(d.num_runs(), 3);
        let runs: Vec<(u8, u64)> = d.runs().collect();
        assert_eq!(runs, vec![(b'a', 2), (b'c', 1), (b'b', 3)]);
        d.check_integrity();
    }

    #[test]
    fn test_separated_iteration_covers_each_char() {
        let mut d = DynRle::new();
        for &ch in b"abcabcaabbcc" {
            let mut pos = d.sum_of_weight();
            d.insert_run(ch, 1, &mut pos);
        }
        let chars: Vec<(u8, u64)> = d.chars().collect();
        assert_eq!(chars, vec![(b'a', 4), (b'b', 4), (b'c', 4)]);
        for ch in [b'a', b'b', b'c'] {
            // Walk the separated entries forward; weights must add up to
            // the character's total and back-links must agree.
            let mut sum = 0u64;
            let mut cur = d.first_idx_s(ch);
            let mut last = None;
            while let Some(s) = cur {
                sum += d.weight_from_idx_m(d.btms.s2m_at(s));
                assert_eq!(d.prev_idx_s(s), last);
                last = Some(s);
                cur = d.next_idx_s(s);
            }
            assert_eq!(sum, d.sum_of_weight_ch(ch));
        }
        assert_eq!(d.first_idx_s(b'z'), None);
    }

    #[test]
    fn test_unknown_char_queries() {
        let mut d = DynRle::new();
        let mut pos = 0u64;
        d.insert_run(b'm', 4, &mut pos);
        assert_eq!(d.rank(b'z', 2, false), Some(0));
        assert_eq!(d.rank(b'z', 2, true), Some(4));
        assert_eq!(d.rank(b'a', 2, true), Some(0));
        assert_eq!(d.select(b'z', 1), None);
        assert_eq!(d.rank(b'm', 9, false), None);
        assert_eq!(d.total_weight_lt(b'z'), 4);
        assert_eq!(d.total_weight_lt(b'a'), 0);
    }

    #[test]
    fn test_random_positions_against_naive() {
        // Deterministic pseudo-random insertion positions.
        let mut d = DynRle::new();
        let mut naive = Naive(Vec::new());
        let mut state = 0x2545F4914F6CDD1Du64;
        for i in 0..120u64 {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            let ch = b'a' + (state % 4) as u8;
            let at = if d.sum_of_weight() == 0 {
                0
            } else {
                state.rotate_left(17) % (d.sum_of_weight() + 1)
            };
            let mut pos = at;
            naive.insert(ch, 1, at);
            d.insert_run(ch, 1, &mut pos);
            if i % 30 == 29 {
                check_against(&d, &naive);
            }
        }
        check_against(&d, &naive);
    }
}
