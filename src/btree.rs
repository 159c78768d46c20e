//! Partial-sum B+trees over externally owned leaves.
//!
//! A [`PsumTree`] is the internal-node machinery shared by the three
//! coupled trees of the run-length string: the mixed tree (runs in text
//! order), each per-character separated tree, and the alphabet tree.
//! Leaves are *not* owned by the tree — they are arena slots (bottom
//! nodes) identified by plain `u32` ids, and each leaf arena stores its
//! own parent back-link via the [`LeafLinks`] trait. The tree itself
//! only records, per child slot, the subtree weight and the subtree
//! leaf count.
//!
//! # Operations
//!
//! - `search_pos`: descend by partial sums, $O(B \log_B n)$, leaving the
//!   residual offset in the query position.
//! - `psum_of`: total weight strictly before a leaf, by ascending the
//!   parent links.
//! - `add_weight`: the `changePSumFrom` role — adjust one leaf's weight
//!   and every ancestor on the way to the root.
//! - `insert_leaf_after`: splice a new leaf next to an existing one,
//!   splitting full nodes half-and-half up to the root. A root split
//!   allocates a fresh root; the `PsumTree` handle itself plays the
//!   super-root role, so holders of the tree never observe the change.
//! - `prev_leaf` / `next_leaf`: sibling navigation; `next_leaf` lands in
//!   $O(1)$ after the ascent through the cached leftmost-leaf jump.
//! - `nth_leaf`: leaf-order access through the per-child leaf counts.

/// Index of an internal node within its tree's arena.
pub type NodeId = u32;

/// Sentinel for "no node" (roots have no parent).
pub const NONE: NodeId = u32::MAX;

/// Maximum number of children per internal node.
pub const ARITY: usize = 32;

/// Storage of parent back-links for a leaf arena.
///
/// The tree calls `set_link` whenever a leaf changes parent node or slot
/// (insertions shift siblings, splits relocate half of them).
pub trait LeafLinks {
    /// Record that `leaf` now sits under `parent` at child slot `idx`.
    fn set_link(&mut self, leaf: u32, parent: NodeId, idx: u8);
    /// Return the recorded `(parent, idx)` of `leaf`.
    fn link(&self, leaf: u32) -> (NodeId, u8);
}

struct Node {
    /// Child node ids, or leaf ids at border nodes.
    children: Vec<u32>,
    /// Subtree weight per child.
    weights: Vec<u64>,
    /// Subtree leaf count per child.
    counts: Vec<u32>,
    parent: NodeId,
    idx_in_parent: u8,
    /// Whether the children are leaves.
    border: bool,
    /// Leftmost leaf in this subtree (direct jump).
    leftmost: u32,
}

/// A partial-sum B+tree over externally owned leaves.
pub struct PsumTree {
    nodes: Vec<Node>,
    root: NodeId,
    total: u64,
    num_leaves: u32,
}

impl PsumTree {
    /// Create a tree holding the single leaf `leaf` of weight `weight`.
    pub fn new<L: LeafLinks>(leaf: u32, weight: u64, links: &mut L) -> Self {
        let root = Node {
            children: vec![leaf],
            weights: vec![weight],
            counts: vec![1],
            parent: NONE,
            idx_in_parent: 0,
            border: true,
            leftmost: leaf,
        };
        links.set_link(leaf, 0, 0);
        Self {
            nodes: vec![root],
            root: 0,
            total: weight,
            num_leaves: 1,
        }
    }

    /// Total weight of all leaves.
    #[inline]
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Number of leaves.
    #[inline]
    pub fn num_leaves(&self) -> u32 {
        self.num_leaves
    }

    /// Find the leaf containing position `pos`; on return `pos` holds the
    /// residual offset within that leaf. `None` if `pos` is at or beyond
    /// the total weight.
    pub fn search_pos(&self, pos: &mut u64) -> Option<u32> {
        if *pos >= self.total {
            return None;
        }
        let mut cur = self.root;
        loop {
            let n = &self.nodes[cur as usize];
            let mut i = 0usize;
            while *pos >= n.weights[i] {
                *pos -= n.weights[i];
                i += 1;
            }
            if n.border {
                return Some(n.children[i]);
            }
            cur = n.children[i];
        }
    }

    /// Leaf in position `k` of leaf order.
    pub fn nth_leaf(&self, k: u32) -> Option<u32> {
        if k >= self.num_leaves {
            return None;
        }
        let mut k = k;
        let mut cur = self.root;
        loop {
            let n = &self.nodes[cur as usize];
            let mut i = 0usize;
            while k >= n.counts[i] {
                k -= n.counts[i];
                i += 1;
            }
            if n.border {
                return Some(n.children[i]);
            }
            cur = n.children[i];
        }
    }

    /// Total weight of all leaves strictly before `leaf`.
    pub fn psum_of<L: LeafLinks>(&self, leaf: u32, links: &L) -> u64 {
        let (mut node, i) = links.link(leaf);
        let mut sum: u64 = self.nodes[node as usize].weights[..i as usize].iter().sum();
        while self.nodes[node as usize].parent != NONE {
            let i = self.nodes[node as usize].idx_in_parent as usize;
            let p = self.nodes[node as usize].parent;
            sum += self.nodes[p as usize].weights[..i].iter().sum::<u64>();
            node = p;
        }
        sum
    }

    /// Weight currently recorded for `leaf`.
    pub fn leaf_weight<L: LeafLinks>(&self, leaf: u32, links: &L) -> u64 {
        let (node, i) = links.link(leaf);
        self.nodes[node as usize].weights[i as usize]
    }

    /// Add `delta` to the weight of `leaf` and every ancestor slot.
    pub fn add_weight<L: LeafLinks>(&mut self, leaf: u32, delta: i64, links: &L) {
        let (mut node, mut i) = links.link(leaf);
        loop {
            let w = &mut self.nodes[node as usize].weights[i as usize];
            debug_assert!(delta >= 0 || *w >= delta.unsigned_abs());
            *w = w.wrapping_add(delta as u64);
            let n = &self.nodes[node as usize];
            if n.parent == NONE {
                break;
            }
            i = n.idx_in_parent;
            node = n.parent;
        }
        self.total = self.total.wrapping_add(delta as u64);
    }

    /// Insert `new_leaf` with weight `weight` immediately after `after`.
    pub fn insert_leaf_after<L: LeafLinks>(
        &mut self,
        after: u32,
        new_leaf: u32,
        weight: u64,
        links: &mut L,
    ) {
        let (node, i) = links.link(after);
        self.insert_child(node, i as usize + 1, new_leaf, weight, 1, links);
        self.bubble_add(node, weight as i64, 1);
        self.total += weight;
        self.num_leaves += 1;
        self.split_if_full(node, links);
    }

    /// First leaf in leaf order.
    pub fn first_leaf(&self) -> u32 {
        self.nodes[self.root as usize].leftmost
    }

    /// Last leaf in leaf order.
    pub fn last_leaf(&self) -> u32 {
        let mut cur = self.root;
        loop {
            let n = &self.nodes[cur as usize];
            let last = n.children.len() - 1;
            if n.border {
                return n.children[last];
            }
            cur = n.children[last];
        }
    }

    /// Leaf immediately before `leaf`, if any.
    pub fn prev_leaf<L: LeafLinks>(&self, leaf: u32, links: &L) -> Option<u32> {
        let (mut node, mut i) = links.link(leaf);
        while i == 0 {
            let n = &self.nodes[node as usize];
            if n.parent == NONE {
                return None;
            }
            i = n.idx_in_parent;
            node = n.parent;
        }
        let mut cur = self.nodes[node as usize].children[i as usize - 1];
        if self.nodes[node as usize].border {
            return Some(cur);
        }
        loop {
            let n = &self.nodes[cur as usize];
            let last = n.children.len() - 1;
            if n.border {
                return Some(n.children[last]);
            }
            cur = n.children[last];
        }
    }

    /// Leaf immediately after `leaf`, if any.
    pub fn next_leaf<L: LeafLinks>(&self, leaf: u32, links: &L) -> Option<u32> {
        let (mut node, mut i) = links.link(leaf);
        loop {
            let n = &self.nodes[node as usize];
            if (i as usize) + 1 < n.children.len() {
                let c = n.children[i as usize + 1];
                return Some(if n.border {
                    c
                } else {
                    self.nodes[c as usize].leftmost
                });
            }
            if n.parent == NONE {
                return None;
            }
            i = n.idx_in_parent;
            node = n.parent;
        }
    }

    /// Approximate heap memory usage in bytes.
    pub fn heap_bytes(&self) -> usize {
        let per_node: usize = self
            .nodes
            .iter()
            .map(|n| n.children.capacity() * 4 + n.weights.capacity() * 8 + n.counts.capacity() * 4)
            .sum();
        self.nodes.capacity() * std::mem::size_of::<Node>() + per_node
    }

    /// Insert a child at `at` in `node` without propagating sums upward.
    fn insert_child<L: LeafLinks>(
        &mut self,
        node: NodeId,
        at: usize,
        child: u32,
        weight: u64,
        count: u32,
        links: &mut L,
    ) {
        debug_assert!(at >= 1, "children are only ever inserted after a sibling");
        {
            let n = &mut self.nodes[node as usize];
            n.children.insert(at, child);
            n.weights.insert(at, weight);
            n.counts.insert(at, count);
        }
        let border = self.nodes[node as usize].border;
        let len = self.nodes[node as usize].children.len();
        for j in at..len {
            let c = self.nodes[node as usize].children[j];
            if border {
                links.set_link(c, node, j as u8);
            } else {
                let cn = &mut self.nodes[c as usize];
                cn.parent = node;
                cn.idx_in_parent = j as u8;
            }
        }
    }

    /// Add `dw`/`dc` to every ancestor slot above `node`.
    fn bubble_add(&mut self, mut node: NodeId, dw: i64, dc: i64) {
        while self.nodes[node as usize].parent != NONE {
            let i = self.nodes[node as usize].idx_in_parent as usize;
            let p = self.nodes[node as usize].parent;
            let pn = &mut self.nodes[p as usize];
            pn.weights[i] = pn.weights[i].wrapping_add(dw as u64);
            pn.counts[i] = (pn.counts[i] as i64 + dc) as u32;
            node = p;
        }
    }

    fn split_if_full<L: LeafLinks>(&mut self, mut node: NodeId, links: &mut L) {
        while self.nodes[node as usize].children.len() > ARITY {
            match self.split_node(node, links) {
                Some(parent) => node = parent,
                None => break,
            }
        }
    }

    /// Split an overfull node half-and-half; returns the parent that
    /// received the new sibling, or `None` if a new root was made.
    fn split_node<L: LeafLinks>(&mut self, nid: NodeId, links: &mut L) -> Option<NodeId> {
        let mid = (ARITY + 1) / 2;
        let right_children = self.nodes[nid as usize].children.split_off(mid);
        let right_weights = self.nodes[nid as usize].weights.split_off(mid);
        let right_counts = self.nodes[nid as usize].counts.split_off(mid);
        let border = self.nodes[nid as usize].border;
        let rw: u64 = right_weights.iter().sum();
        let rc: u32 = right_counts.iter().sum();
        let lw: u64 = self.nodes[nid as usize].weights.iter().sum();
        let lc: u32 = self.nodes[nid as usize].counts.iter().sum();
        let leftmost = if border {
            right_children[0]
        } else {
            self.nodes[right_children[0] as usize].leftmost
        };
        let new_id = self.nodes.len() as NodeId;
        self.nodes.push(Node {
            children: right_children,
            weights: right_weights,
            counts: right_counts,
            parent: NONE,
            idx_in_parent: 0,
            border,
            leftmost,
        });
        let moved = self.nodes[new_id as usize].children.len();
        for j in 0..moved {
            let c = self.nodes[new_id as usize].children[j];
            if border {
                links.set_link(c, new_id, j as u8);
            } else {
                let cn = &mut self.nodes[c as usize];
                cn.parent = new_id;
                cn.idx_in_parent = j as u8;
            }
        }
        let parent = self.nodes[nid as usize].parent;
        if parent == NONE {
            let lm = self.nodes[nid as usize].leftmost;
            let root_id = self.nodes.len() as NodeId;
            self.nodes.push(Node {
                children: vec![nid, new_id],
                weights: vec![lw, rw],
                counts: vec![lc, rc],
                parent: NONE,
                idx_in_parent: 0,
                border: false,
                leftmost: lm,
            });
            self.nodes[nid as usize].parent = root_id;
            self.nodes[nid as usize].idx_in_parent = 0;
            self.nodes[new_id as usize].parent = root_id;
            self.nodes[new_id as usize].idx_in_parent = 1;
            self.root = root_id;
            None
        } else {
            let i = self.nodes[nid as usize].idx_in_parent as usize;
            {
                let pn = &mut self.nodes[parent as usize];
                pn.weights[i] = lw;
                pn.counts[i] = lc;
            }
            self.insert_child(parent, i + 1, new_id, rw, rc, links);
            Some(parent)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct VecLinks(Vec<(NodeId, u8)>);

    impl VecLinks {
        fn with_capacity(n: usize) -> Self {
            VecLinks(vec![(NONE, 0); n])
        }
    }

    impl LeafLinks for VecLinks {
        fn set_link(&mut self, leaf: u32, parent: NodeId, idx: u8) {
            self.0[leaf as usize] = (parent, idx);
        }
        fn link(&self, leaf: u32) -> (NodeId, u8) {
            self.0[leaf as usize]
        }
    }

    /// Build a tree of leaves 0..n in order, leaf i weighing i + 1.
    fn build(n: u32) -> (PsumTree, VecLinks) {
        let mut links = VecLinks::with_capacity(n as usize);
        let mut t = PsumTree::new(0, 1, &mut links);
        for i in 1..n {
            t.insert_leaf_after(i - 1, i, i as u64 + 1, &mut links);
        }
        (t, links)
    }

    #[test]
    fn test_search_pos_and_psum() {
        let n = 300u32;
        let (t, links) = build(n);
        let total: u64 = (1..=n as u64).sum();
        assert_eq!(t.total(), total);
        assert_eq!(t.num_leaves(), n);

        let mut expected_psum = 0u64;
        for i in 0..n {
            assert_eq!(t.psum_of(i, &links), expected_psum);
            assert_eq!(t.leaf_weight(i, &links), i as u64 + 1);
            // Probe the first and last position of every leaf.
            let mut p = expected_psum;
            assert_eq!(t.search_pos(&mut p), Some(i));
            assert_eq!(p, 0);
            let mut p = expected_psum + i as u64;
            assert_eq!(t.search_pos(&mut p), Some(i));
            assert_eq!(p, i as u64);
            expected_psum += i as u64 + 1;
        }
        let mut p = total;
        assert_eq!(t.search_pos(&mut p), None);
    }

    #[test]
    fn test_leaf_navigation() {
        let n = 200u32;
        let (t, links) = build(n);
        assert_eq!(t.first_leaf(), 0);
        assert_eq!(t.last_leaf(), n - 1);
        for i in 0..n {
            assert_eq!(t.nth_leaf(i), Some(i));
            let prev = if i == 0 { None } else { Some(i - 1) };
            let next = if i == n - 1 { None } else { Some(i + 1) };
            assert_eq!(t.prev_leaf(i, &links), prev);
            assert_eq!(t.next_leaf(i, &links), next);
        }
        assert_eq!(t.nth_leaf(n), None);
    }

    #[test]
    fn test_add_weight() {
        let (mut t, links) = build(50);
        let before = t.total();
        t.add_weight(10, 7, &links);
        assert_eq!(t.total(), before + 7);
        assert_eq!(t.leaf_weight(10, &links), 11 + 7);
        assert_eq!(t.psum_of(11, &links), t.psum_of(10, &links) + 18);
        t.add_weight(10, -7, &links);
        assert_eq!(t.total(), before);
    }

    #[test]
    fn test_insert_in_middle() {
        // Interleave insertions after a fixed leaf so shifts and splits
        // happen away from the tail.
        let mut links = VecLinks::with_capacity(600);
        let mut t = PsumTree::new(0, 5, &mut links);
        for i in 1..600u32 {
            t.insert_leaf_after(0, i, 1, &mut links);
        }
        assert_eq!(t.num_leaves(), 600);
        assert_eq!(t.total(), 5 + 599);
        // Leaf order is 0, 599, 598, ..., 1.
        assert_eq!(t.first_leaf(), 0);
        assert_eq!(t.next_leaf(0, &links), Some(599));
        assert_eq!(t.last_leaf(), 1);
        assert_eq!(t.psum_of(599, &links), 5);
        assert_eq!(t.psum_of(1, &links), 5 + 598);
        let mut p = 4u64;
        assert_eq!(t.search_pos(&mut p), Some(0));
        let mut p = 5u64;
        assert_eq!(t.search_pos(&mut p), Some(599));
    }

    #[test]
    fn test_zero_weight_leaf_is_skipped() {
        let mut links = VecLinks::with_capacity(3);
        let mut t = PsumTree::new(0, 0, &mut links);
        t.insert_leaf_after(0, 1, 4, &mut links);
        t.insert_leaf_after(1, 2, 2, &mut links);
        let mut p = 0u64;
        assert_eq!(t.search_pos(&mut p), Some(1));
        let mut p = 4u64;
        assert_eq!(t.search_pos(&mut p), Some(2));
        assert_eq!(t.psum_of(1, &links), 0);
    }
}
