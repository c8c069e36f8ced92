//! Search tree with per-worker node allocators.
//!
//! Nodes live in fixed-capacity pools, one per worker; only the owning
//! worker appends to its pool, so node storage is never moved or resized
//! and references stay valid for the lifetime of the tree.
//!
//! The tree is shared between workers without locks. The publication
//! contract: a writer fills the child run (moves, priors) first, then
//! stores `first_child`, then `nu_children` last with Release ordering;
//! readers load `nu_children` with Acquire before following `first_child`.
//! Statistics counters are relaxed atomics and tolerate torn reads (see
//! `stats`). Two workers may race to expand the same leaf; the loser's
//! child run is orphaned, which leaks pool space until the next clear but
//! never corrupts the tree.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use crate::board::Point;
use crate::constants::NULL_MOVE;
use crate::stats::{AtomicStatistics, AtomicWeightedStatistics};

/// Identifier of a tree node: allocator id in the high byte, offset into
/// the allocator in the low 24 bits. The root lives outside every
/// allocator and has a reserved id.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct NodeId(u32);

impl NodeId {
    pub const ROOT: NodeId = NodeId(0xFFFF_FFFE);
    const NONE_BITS: u32 = 0xFFFF_FFFF;

    fn pack(allocator: usize, offset: usize) -> NodeId {
        debug_assert!(allocator < 0xFE, "too many allocators");
        debug_assert!(offset < (1 << 24), "allocator offset overflow");
        NodeId(((allocator as u32) << 24) | offset as u32)
    }

    fn allocator(self) -> usize {
        (self.0 >> 24) as usize
    }

    fn offset(self) -> usize {
        (self.0 & 0x00FF_FFFF) as usize
    }
}

fn move_bits(mv: Point) -> u32 {
    if mv == NULL_MOVE {
        u32::MAX
    } else {
        mv as u32
    }
}

/// Node of the search tree. All fields are atomics; the shape (move and
/// child links) is immutable after publication, the statistics are updated
/// concurrently.
#[derive(Default)]
pub struct UctNode {
    mv: AtomicU32,
    stats: AtomicStatistics,
    rave: AtomicWeightedStatistics,
    pos_count: AtomicU32,
    first_child: AtomicU32,
    nu_children: AtomicU32,
}

impl UctNode {
    fn reset(&self, mv: Point) {
        self.mv.store(move_bits(mv), Ordering::Relaxed);
        self.stats.clear();
        self.rave.clear();
        self.pos_count.store(0, Ordering::Relaxed);
        self.nu_children.store(0, Ordering::Relaxed);
        self.first_child.store(NodeId::NONE_BITS, Ordering::Relaxed);
    }

    /// The move that led from the parent to this node.
    pub fn mv(&self) -> Point {
        let bits = self.mv.load(Ordering::Relaxed);
        if bits == u32::MAX {
            NULL_MOVE
        } else {
            bits as usize
        }
    }

    pub fn add_game_result(&self, eval: f32) {
        self.stats.add(eval);
    }

    /// Number of times the move leading here was chosen.
    pub fn move_count(&self) -> u32 {
        self.stats.count()
    }

    pub fn has_mean(&self) -> bool {
        self.stats.is_defined()
    }

    /// Average game result, from the perspective of the player to move at
    /// the parent.
    pub fn mean(&self) -> f32 {
        self.stats.mean()
    }

    pub fn initialize_value(&self, value: f32, count: u32) {
        self.stats.initialize(value, count);
    }

    pub fn add_rave_value(&self, value: f32, weight: f32) {
        self.rave.add_weighted(value, weight);
    }

    pub fn rave_count(&self) -> f32 {
        self.rave.count()
    }

    pub fn has_rave_value(&self) -> bool {
        self.rave.is_defined()
    }

    pub fn rave_value(&self) -> f32 {
        self.rave.mean()
    }

    pub fn initialize_rave_value(&self, value: f32, count: f32) {
        self.rave.initialize(value, count);
    }

    /// Sum of children move counts, maintained for display and move
    /// selection. May lag under lock-free races.
    pub fn pos_count(&self) -> u32 {
        self.pos_count.load(Ordering::Relaxed)
    }

    pub fn inc_pos_count(&self) {
        self.pos_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_pos_count(&self, value: u32) {
        self.pos_count.store(value, Ordering::Relaxed);
    }

    pub fn has_children(&self) -> bool {
        self.nu_children.load(Ordering::Acquire) > 0
    }

    pub fn nu_children(&self) -> u32 {
        self.nu_children.load(Ordering::Acquire)
    }

    fn first_child(&self) -> NodeId {
        NodeId(self.first_child.load(Ordering::Acquire))
    }

    /// Publish a child run. Must be called after the child nodes are
    /// fully initialized; `first_child` is stored before `nu_children`.
    fn publish_children(&self, first: NodeId, nu: u32) {
        self.first_child.store(first.0, Ordering::Release);
        self.nu_children.store(nu, Ordering::Release);
    }

    /// Copy statistics and move from another node, leaving the child links
    /// untouched.
    fn copy_data_from(&self, other: &UctNode) {
        self.mv.store(other.mv.load(Ordering::Relaxed), Ordering::Relaxed);
        self.stats.copy_from(&other.stats);
        self.rave.copy_from(&other.rave);
        self.pos_count
            .store(other.pos_count.load(Ordering::Relaxed), Ordering::Relaxed);
    }
}

/// Fixed-capacity node pool owned by one worker.
pub struct NodeAllocator {
    nodes: Box<[UctNode]>,
    len: AtomicUsize,
}

impl NodeAllocator {
    fn new(capacity: usize) -> NodeAllocator {
        NodeAllocator {
            nodes: (0..capacity).map(|_| UctNode::default()).collect(),
            len: AtomicUsize::new(0),
        }
    }

    fn clear(&self) {
        self.len.store(0, Ordering::Relaxed);
    }

    pub fn capacity(&self) -> usize {
        self.nodes.len()
    }

    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn has_capacity(&self, n: usize) -> bool {
        self.len() + n <= self.capacity()
    }

    fn node(&self, offset: usize) -> &UctNode {
        &self.nodes[offset]
    }

    /// Claim a contiguous run of `n` reset nodes. Only the owning worker
    /// may call this. Requires `has_capacity(n)`.
    fn claim(&self, n: usize) -> usize {
        let offset = self.len();
        debug_assert!(offset + n <= self.capacity());
        for i in offset..offset + n {
            self.nodes[i].reset(NULL_MOVE);
        }
        self.len.store(offset + n, Ordering::Relaxed);
        offset
    }
}

/// The search tree: a root node plus one allocator per worker.
pub struct UctTree {
    root: UctNode,
    allocators: Vec<NodeAllocator>,
    max_nodes: usize,
}

impl UctTree {
    /// Create a tree for `nu_allocators` workers with a total capacity of
    /// `max_nodes` nodes, split evenly between the allocators.
    pub fn new(nu_allocators: usize, max_nodes: usize) -> UctTree {
        assert!(nu_allocators > 0);
        let per_allocator = max_nodes / nu_allocators;
        let mut tree = UctTree {
            root: UctNode::default(),
            allocators: (0..nu_allocators)
                .map(|_| NodeAllocator::new(per_allocator))
                .collect(),
            max_nodes,
        };
        tree.clear();
        tree
    }

    pub fn clear(&mut self) {
        for alloc in &self.allocators {
            alloc.clear();
        }
        self.root.reset(NULL_MOVE);
    }

    pub fn max_nodes(&self) -> usize {
        self.max_nodes
    }

    pub fn nu_allocators(&self) -> usize {
        self.allocators.len()
    }

    /// Total number of nodes, including the root.
    pub fn nu_nodes(&self) -> usize {
        1 + self.allocators.iter().map(|a| a.len()).sum::<usize>()
    }

    pub fn root(&self) -> &UctNode {
        &self.root
    }

    pub fn node(&self, id: NodeId) -> &UctNode {
        if id == NodeId::ROOT {
            &self.root
        } else {
            self.allocators[id.allocator()].node(id.offset())
        }
    }

    pub fn has_capacity(&self, allocator_id: usize, n: usize) -> bool {
        self.allocators[allocator_id].has_capacity(n)
    }

    /// Children of a node as `(id, node)` pairs. Loads the child count
    /// before the child link, matching the publication order.
    pub fn children(&self, id: NodeId) -> impl Iterator<Item = (NodeId, &UctNode)> + '_ {
        let node = self.node(id);
        let nu = node.nu_children() as usize;
        let first = node.first_child();
        (0..nu).map(move |i| {
            let child = NodeId::pack(first.allocator(), first.offset() + i);
            (child, self.node(child))
        })
    }

    /// Child of `id` whose move is `mv`, if present.
    pub fn child_with_move(&self, id: NodeId, mv: Point) -> Option<NodeId> {
        self.children(id).find(|(_, c)| c.mv() == mv).map(|(i, _)| i)
    }

    /// Create `moves.len()` children of `parent` in the given allocator.
    ///
    /// `init` is called for each child after its move is set and before
    /// the run is published, to apply prior values. Returns false without
    /// changes when the allocator lacks capacity.
    pub fn create_children<F>(
        &self,
        allocator_id: usize,
        parent: NodeId,
        moves: &[Point],
        init: F,
    ) -> bool
    where
        F: Fn(usize, &UctNode),
    {
        debug_assert!(!moves.is_empty());
        let alloc = &self.allocators[allocator_id];
        if !alloc.has_capacity(moves.len()) {
            return false;
        }
        let offset = alloc.claim(moves.len());
        for (i, &mv) in moves.iter().enumerate() {
            let child = alloc.node(offset + i);
            child.reset(mv);
            init(i, child);
        }
        self.node(parent)
            .publish_children(NodeId::pack(allocator_id, offset), moves.len() as u32);
        true
    }

    /// Rebuild the child run of `node` keeping only `allowed` moves.
    ///
    /// New children shallow-copy statistics and keep their descend
    /// pointers; the old run is abandoned until the next clear. Requires
    /// capacity for the surviving children in the given allocator.
    pub fn apply_filter(&self, allocator_id: usize, node: NodeId, allowed: &[Point]) {
        if !self.node(node).has_children() {
            return;
        }
        let survivors: Vec<NodeId> = self
            .children(node)
            .filter(|(_, c)| allowed.contains(&c.mv()))
            .map(|(id, _)| id)
            .collect();
        let alloc = &self.allocators[allocator_id];
        if !alloc.has_capacity(survivors.len()) {
            log::warn!("apply_filter: allocator {allocator_id} full, filter not applied");
            return;
        }
        let offset = alloc.claim(survivors.len());
        for (i, &src_id) in survivors.iter().enumerate() {
            let src = self.node(src_id);
            let dst = alloc.node(offset + i);
            dst.copy_data_from(src);
            let nu = src.nu_children();
            if nu > 0 {
                dst.publish_children(src.first_child(), nu);
            }
        }
        self.node(node)
            .publish_children(NodeId::pack(allocator_id, offset), survivors.len() as u32);
    }

    /// Copy the subtree rooted at `node` into `target` (cleared first),
    /// cycling through the target's allocators round-robin. A branch is
    /// truncated when a target allocator is full or the time budget runs
    /// out; truncated nodes keep their data but get `pos_count` zeroed to
    /// signal discarded statistics.
    pub fn extract_subtree(&self, target: &mut UctTree, node: NodeId, max_time: Duration) {
        target.clear();
        let deadline = Instant::now() + max_time;
        let mut allocator_id = 0usize;
        let mut abort = false;
        self.copy_subtree(
            target,
            NodeId::ROOT,
            node,
            &mut allocator_id,
            &mut abort,
            deadline,
        );
    }

    fn copy_subtree(
        &self,
        target: &UctTree,
        target_id: NodeId,
        source_id: NodeId,
        current_allocator: &mut usize,
        abort: &mut bool,
        deadline: Instant,
    ) {
        let src = self.node(source_id);
        let dst = target.node(target_id);
        dst.copy_data_from(src);
        if !src.has_children() {
            return;
        }
        let nu = src.nu_children() as usize;
        if !*abort {
            if !target.has_capacity(*current_allocator, nu) {
                log::debug!("extract_subtree: truncated (allocator capacity)");
                *abort = true;
            } else if Instant::now() >= deadline {
                log::debug!("extract_subtree: truncated (time)");
                *abort = true;
            }
        }
        if *abort {
            dst.set_pos_count(0);
            return;
        }
        let allocator_id = *current_allocator;
        let alloc = &target.allocators[allocator_id];
        let offset = alloc.claim(nu);
        dst.publish_children(NodeId::pack(allocator_id, offset), nu as u32);
        for (i, (child_id, _)) in self.children(source_id).enumerate() {
            // Cycle to spread the copy over the target's allocators.
            *current_allocator = (*current_allocator + 1) % target.nu_allocators();
            self.copy_subtree(
                target,
                NodeId::pack(allocator_id, offset + i),
                child_id,
                current_allocator,
                abort,
                deadline,
            );
        }
    }

    /// Diagnostic: walk the tree and verify every child run lies inside
    /// its allocator. An out-of-bounds link means the tree is corrupt;
    /// continuing would corrupt results, so this aborts the process.
    pub fn check_consistency(&self) {
        self.check_node(NodeId::ROOT);
    }

    fn check_node(&self, id: NodeId) {
        let node = self.node(id);
        let nu = node.nu_children() as usize;
        if nu == 0 {
            return;
        }
        let first = node.first_child();
        let alloc_id = first.allocator();
        assert!(
            alloc_id < self.allocators.len()
                && first.offset() + nu <= self.allocators[alloc_id].len(),
            "tree inconsistency: child run {:?}+{} outside allocator",
            first,
            nu
        );
        for (child_id, _) in self.children(id) {
            self.check_node(child_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::PASS;

    fn no_init(_: usize, _: &UctNode) {}

    #[test]
    fn test_create_and_iterate_children() {
        let tree = UctTree::new(2, 1000);
        assert!(tree.create_children(0, NodeId::ROOT, &[10, 11, PASS], no_init));
        assert!(tree.root().has_children());
        let moves: Vec<Point> = tree
            .children(NodeId::ROOT)
            .map(|(_, c)| c.mv())
            .collect();
        assert_eq!(moves, vec![10, 11, PASS]);
        assert_eq!(tree.nu_nodes(), 4);
    }

    #[test]
    fn test_capacity_exhaustion_is_reported() {
        let tree = UctTree::new(1, 2);
        assert!(!tree.create_children(0, NodeId::ROOT, &[1, 2, 3], no_init));
        assert!(!tree.root().has_children());
        assert!(tree.create_children(0, NodeId::ROOT, &[1, 2], no_init));
    }

    #[test]
    fn test_game_result_updates() {
        let tree = UctTree::new(1, 100);
        tree.create_children(0, NodeId::ROOT, &[10, 11], no_init);
        let (child, _) = tree.children(NodeId::ROOT).next().unwrap();
        tree.node(child).add_game_result(1.0);
        tree.node(child).add_game_result(0.0);
        tree.root().inc_pos_count();
        tree.root().inc_pos_count();
        assert_eq!(tree.node(child).move_count(), 2);
        assert!((tree.node(child).mean() - 0.5).abs() < 1e-6);
        assert_eq!(tree.root().pos_count(), 2);
    }

    #[test]
    fn test_apply_filter_keeps_allowed() {
        let tree = UctTree::new(1, 100);
        tree.create_children(0, NodeId::ROOT, &[10, 11, 12], no_init);
        for (_, c) in tree.children(NodeId::ROOT) {
            c.add_game_result(1.0);
        }
        tree.apply_filter(0, NodeId::ROOT, &[11]);
        let kept: Vec<Point> = tree.children(NodeId::ROOT).map(|(_, c)| c.mv()).collect();
        assert_eq!(kept, vec![11]);
        let (_, kept_node) = tree.children(NodeId::ROOT).next().unwrap();
        assert_eq!(kept_node.move_count(), 1);
    }

    #[test]
    fn test_extract_subtree_preserves_statistics() {
        let tree = UctTree::new(2, 1000);
        tree.create_children(0, NodeId::ROOT, &[10, 11], no_init);
        let (child, _) = tree.children(NodeId::ROOT).next().unwrap();
        tree.node(child).add_game_result(1.0);
        tree.create_children(1, child, &[20, 21], no_init);
        for (_, c) in tree.children(child) {
            c.add_game_result(0.0);
        }
        let mut target = UctTree::new(2, 1000);
        tree.extract_subtree(&mut target, child, Duration::from_secs(10));
        assert_eq!(target.root().mv(), 10);
        assert_eq!(target.root().move_count(), 1);
        let grandchildren: Vec<Point> =
            target.children(NodeId::ROOT).map(|(_, c)| c.mv()).collect();
        assert_eq!(grandchildren, vec![20, 21]);
        target.check_consistency();
    }

    #[test]
    fn test_extract_subtree_truncates_on_capacity() {
        let tree = UctTree::new(1, 100);
        tree.create_children(0, NodeId::ROOT, &[10, 11, 12, 13], no_init);
        tree.root().set_pos_count(4);
        // Target too small for the child run: root is copied, children cut.
        let mut target = UctTree::new(1, 2);
        tree.extract_subtree(&mut target, NodeId::ROOT, Duration::from_secs(10));
        assert!(!target.root().has_children());
        assert_eq!(target.root().pos_count(), 0);
    }

    #[test]
    fn test_clear_resets() {
        let mut tree = UctTree::new(1, 100);
        tree.create_children(0, NodeId::ROOT, &[10], no_init);
        tree.root().add_game_result(1.0);
        tree.clear();
        assert!(!tree.root().has_children());
        assert_eq!(tree.root().move_count(), 0);
        assert_eq!(tree.nu_nodes(), 1);
    }
}
