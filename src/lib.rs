//! An intrusive height-balanced (AVL) search tree with finger search,
//! logarithmic concatenation (join) and splitting.
//#![no_std]

// Conventions used in comments:
// - The height of a node `x` is denoted `h(x)`. A missing child stands for an
//   external leaf of height -1, so a leaf node has height 0.
// - The balance pair of `x` is (h(x) - h(left(x)), h(x) - h(right(x))).
//
// The fundamental invariants of the tree are:
// 1. Search order: every key in `x`'s left subtree is less than `x`'s key,
//    which is less than every key in `x`'s right subtree.
// 2. Every stored height satisfies h(x) = 1 + max(h(left(x)), h(right(x))).
// 3. Every balance pair is (1,1), (1,2) or (2,1).
//
// Mutations restore (2) and (3) with a bottom-up wave of promotions (height
// +1), demotions (height -1) and rotations, dispatched on the balance pair of
// each junction along the way. The wave stops once two consecutive junctions
// are found balanced; a rotation can still disturb junctions further up, so
// it resets that streak.

use core::{
    borrow::Borrow,
    cell::UnsafeCell,
    cmp::Ordering,
    marker::PhantomPinned,
    mem::{self, ManuallyDrop},
    ops::Not,
    pin::Pin,
    ptr::NonNull,
};

use cordyceps::Linked;

mod debug;
mod iter;
pub mod map;
#[cfg(any(test, feature = "model"))]
pub mod model;
#[cfg(test)]
mod tests;

pub use iter::Iter;
pub use map::AvlMap;

pub trait TreeNode<L>: Linked<L> {
    type Key: Ord;

    fn key(&self) -> &Self::Key;
}

/// An intrusive AVL tree.
///
/// Nodes are linked through a [`Links`] struct embedded in the element type.
/// Besides the usual ordered-map operations, the tree tracks its extrema so
/// that *finger* searches and insertions anchored at the maximum are cheap
/// for keys near it, and supports concatenating two key-disjoint trees
/// ([`join`]) and splitting a tree around an element ([`split_at`]) in time
/// proportional to tree height rather than size.
///
/// [`join`]: AvlTree::join
/// [`split_at`]: AvlTree::split_at
pub struct AvlTree<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    root: Link<T>,
    min: Link<T>,
    max: Link<T>,
    len: usize,
}

pub struct Links<T: ?Sized> {
    inner: UnsafeCell<LinksInner<T>>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Dir {
    Left = 0,
    Right = 1,
}

impl Not for Dir {
    type Output = Dir;

    fn not(self) -> Self::Output {
        match self {
            Dir::Left => Dir::Right,
            Dir::Right => Dir::Left,
        }
    }
}

#[repr(C)]
struct LinksInner<T: ?Sized> {
    parent: Link<T>,
    children: [Link<T>; 2],
    height: i8,
    _unpin: PhantomPinned,
}

pub(crate) type Link<T> = Option<NonNull<T>>;

/// Path and rebalancing counters reported by [`AvlTree::insert`] and
/// [`AvlTree::finger_insert`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct InsertMetrics {
    /// Edges walked from the starting node to the new node, before any
    /// rebalancing.
    pub edges: usize,
    /// Number of height promotions performed while restoring balance.
    pub promotes: usize,
}

impl<T> AvlTree<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    /// Returns a new empty tree.
    pub const fn new() -> AvlTree<T> {
        AvlTree {
            root: None,
            min: None,
            max: None,
            len: 0,
        }
    }

    /// Returns `true` if the tree contains no elements.
    pub const fn is_empty(&self) -> bool {
        let empty = self.len() == 0;

        if cfg!(debug_assertions) {
            // Can't use assert_eq!() in const fn.
            assert!(empty == self.root.is_none());
        }

        empty
    }

    /// Returns the number of elements in the tree.
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns an iterator over the elements of the tree in key order.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter::new(self)
    }

    /// Returns the minimum element of the tree.
    pub fn first(&self) -> Option<Pin<&T>> {
        self.min.map(|node| unsafe { Pin::new_unchecked(node.as_ref()) })
    }

    /// Returns the maximum element of the tree.
    pub fn last(&self) -> Option<Pin<&T>> {
        self.max.map(|node| unsafe { Pin::new_unchecked(node.as_ref()) })
    }

    /// Returns the element at the root of the tree.
    pub fn root(&self) -> Option<Pin<&T>> {
        self.root.map(|node| unsafe { Pin::new_unchecked(node.as_ref()) })
    }

    #[doc(hidden)]
    pub fn assert_invariants(&self) {
        let count = match self.root {
            Some(root) => unsafe {
                assert!(
                    T::links(root).as_ref().parent().is_none(),
                    "root node has a parent"
                );
                self.assert_invariants_at(root)
            },
            None => 0,
        };

        assert_eq!(count, self.len, "stored len does not match the reachable node count");
        assert_eq!(self.min, Self::leftmost(self.root), "min does not point at the leftmost node");
        assert_eq!(self.max, Self::rightmost(self.root), "max does not point at the rightmost node");

        let mut iter = self.iter();
        if let Some(first) = iter.next() {
            let mut prev = first.key();
            for node in iter {
                assert!(prev < node.key(), "in-order traversal is not strictly increasing");
                prev = node.key();
            }
        }
    }

    // Recomputes heights from scratch below `node`, checking the ordering,
    // height and balance invariants on the way back up. Returns the number of
    // nodes in the subtree.
    unsafe fn assert_invariants_at(&self, node: NonNull<T>) -> usize {
        unsafe {
            let mut count = 1;

            for dir in [Dir::Left, Dir::Right] {
                if let Some(child) = T::links(node).as_ref().child(dir) {
                    match dir {
                        Dir::Left => assert!(
                            child.as_ref().key() < node.as_ref().key(),
                            "left child key out of order"
                        ),
                        Dir::Right => assert!(
                            child.as_ref().key() > node.as_ref().key(),
                            "right child key out of order"
                        ),
                    }

                    let parent = T::links(child)
                        .as_ref()
                        .parent()
                        .expect("child parent pointer not set");
                    assert_eq!(node, parent);

                    count += self.assert_invariants_at(child);
                }
            }

            let links = T::links(node).as_ref();
            let expected = self.height_of(links.left()).max(self.height_of(links.right())) + 1;
            assert_eq!(links.height(), expected, "stored height is stale");

            assert!(
                matches!(self.balance(node), (1, 1) | (1, 2) | (2, 1)),
                "node violates the balance invariant"
            );

            count
        }
    }

    /// Returns a reference to the node corresponding to `key`.
    pub fn get<Q>(&self, key: &Q) -> Option<Pin<&T>>
    where
        T::Key: Borrow<Q> + Ord,
        Q: Ord + ?Sized,
    {
        let ptr = self.get_raw(key)?;
        unsafe { Some(Pin::new_unchecked(ptr.as_ref())) }
    }

    /// Returns a mutable reference to the node corresponding to `key`.
    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<Pin<&mut T>>
    where
        T::Key: Borrow<Q> + Ord,
        Q: Ord + ?Sized,
    {
        let ptr = self.get_raw(key)?;
        unsafe { Some(Pin::new_unchecked(&mut *ptr.as_ptr())) }
    }

    /// Returns `true` if the tree contains a node corresponding to `key`.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        T::Key: Borrow<Q> + Ord,
        Q: Ord + ?Sized,
    {
        self.get_raw(key).is_some()
    }

    pub(crate) fn get_raw<Q>(&self, key: &Q) -> Link<T>
    where
        T::Key: Borrow<Q> + Ord,
        Q: Ord + ?Sized,
    {
        self.search_from(self.root, key).0
    }

    /// Searches for `key` from the root down.
    ///
    /// Returns the matching node, if any, together with the number of nodes
    /// visited on the search path: edges traversed plus one on a hit, the
    /// plain edge count on a miss.
    ///
    /// This operation completes in _O(log(n))_ time.
    pub fn search<Q>(&self, key: &Q) -> (Option<Pin<&T>>, usize)
    where
        T::Key: Borrow<Q> + Ord,
        Q: Ord + ?Sized,
    {
        let (node, edges) = self.search_from(self.root, key);
        (node.map(|ptr| unsafe { Pin::new_unchecked(ptr.as_ref()) }), edges)
    }

    /// Searches for `key` starting from the maximum element.
    ///
    /// The search first climbs the parent chain from the maximum to the
    /// lowest ancestor whose subtree is guaranteed to contain `key` if it is
    /// present at all, then descends normally. The reported count is the
    /// climb edge count plus the descent count of [`search`].
    ///
    /// Keys near the maximum are found in time logarithmic in their rank
    /// distance from it. The climb is bounded only by the root, so for far
    /// keys the cost degrades to an ordinary search plus the climb; this is
    /// the intended tradeoff for recency-biased workloads, not a defect.
    ///
    /// [`search`]: AvlTree::search
    pub fn finger_search<Q>(&self, key: &Q) -> (Option<Pin<&T>>, usize)
    where
        T::Key: Borrow<Q> + Ord,
        Q: Ord + ?Sized,
    {
        let Some(max) = self.max else {
            return (None, 0);
        };

        let (start, climbed) = self.finger_start(max, key);
        let (node, edges) = self.search_from(Some(start), key);

        (
            node.map(|ptr| unsafe { Pin::new_unchecked(ptr.as_ref()) }),
            climbed + edges,
        )
    }

    // Root-down search below `start`, counting descents.
    fn search_from<Q>(&self, start: Link<T>, key: &Q) -> (Link<T>, usize)
    where
        T::Key: Borrow<Q> + Ord,
        Q: Ord + ?Sized,
    {
        let mut edges = 0;
        let mut opt_cur = start;

        while let Some(cur) = opt_cur {
            unsafe {
                match key.cmp(cur.as_ref().key().borrow()) {
                    Ordering::Less => opt_cur = T::links(cur).as_ref().left(),
                    Ordering::Equal => return (Some(cur), edges + 1),
                    Ordering::Greater => opt_cur = T::links(cur).as_ref().right(),
                }
            }

            edges += 1;
        }

        (None, edges)
    }

    // Climbs from `from` to the lowest ancestor whose key still bounds `key`
    // from above, i.e. the root of the smallest subtree on the max-finger
    // path that can contain `key`. Returns the node and the climb edge count.
    fn finger_start<Q>(&self, from: NonNull<T>, key: &Q) -> (NonNull<T>, usize)
    where
        T::Key: Borrow<Q> + Ord,
        Q: Ord + ?Sized,
    {
        let mut cur = from;
        let mut edges = 0;

        unsafe {
            while let Some(parent) = T::links(cur).as_ref().parent() {
                if parent.as_ref().key().borrow() < key {
                    break;
                }

                cur = parent;
                edges += 1;
            }
        }

        (cur, edges)
    }

    /// Inserts an item into the tree.
    ///
    /// On success, reports the depth of the new node and the number of
    /// promotions the rebalancing wave performed. If an item with an equal
    /// key is already present, the tree is left untouched and the rejected
    /// item is handed back.
    ///
    /// This operation completes in _O(log(n))_ time.
    pub fn insert(&mut self, item: T::Handle) -> Result<InsertMetrics, T::Handle> {
        let ptr = T::into_ptr(item);

        let Some(root) = self.root else {
            self.insert_root(ptr);
            return Ok(InsertMetrics { edges: 0, promotes: 0 });
        };

        match self.insert_at(root, ptr) {
            Ok(metrics) => {
                unsafe { self.update_extrema(ptr) };
                self.len += 1;
                Ok(metrics)
            }
            Err(ptr) => Err(unsafe { T::from_ptr(ptr) }),
        }
    }

    /// Inserts an item into the tree, locating the attachment point from the
    /// maximum element rather than the root.
    ///
    /// The reported edge count includes the climb from the maximum; see
    /// [`finger_search`] for the cost model.
    ///
    /// [`finger_search`]: AvlTree::finger_search
    pub fn finger_insert(&mut self, item: T::Handle) -> Result<InsertMetrics, T::Handle> {
        let Some(max) = self.max else {
            return self.insert(item);
        };

        let ptr = T::into_ptr(item);
        let (start, climbed) = self.finger_start(max, unsafe { ptr.as_ref().key() });

        match self.insert_at(start, ptr) {
            Ok(metrics) => {
                unsafe { self.update_extrema(ptr) };
                self.len += 1;
                Ok(InsertMetrics {
                    edges: metrics.edges + climbed,
                    promotes: metrics.promotes,
                })
            }
            Err(ptr) => Err(unsafe { T::from_ptr(ptr) }),
        }
    }

    fn insert_root(&mut self, ptr: NonNull<T>) {
        unsafe { Self::clear_links(ptr) };
        self.root = Some(ptr);
        self.min = Some(ptr);
        self.max = Some(ptr);
        self.len += 1;
    }

    // Attaches `ptr` as a leaf in the subtree under `start` and restores the
    // balance invariant. `len` and the extremum pointers are the caller's
    // job. On a key collision the tree is untouched and `ptr` is returned.
    fn insert_at(&mut self, start: NonNull<T>, ptr: NonNull<T>) -> Result<InsertMetrics, NonNull<T>> {
        unsafe { Self::clear_links(ptr) };

        let mut edges = 0;
        let mut parent_was_leaf = false;
        let mut attached_to = None;
        let mut opt_parent = Some(start);

        // Descend, looking for the attachment point.
        while let Some(parent) = opt_parent {
            let ordering = unsafe { ptr.as_ref().key().cmp(parent.as_ref().key()) };

            let dir = match ordering {
                Ordering::Less => Dir::Left,
                Ordering::Equal => return Err(ptr),
                Ordering::Greater => Dir::Right,
            };

            unsafe {
                let parent_links = T::links(parent).as_mut();
                match parent_links.child(dir) {
                    // Descend.
                    Some(child) => {
                        opt_parent = Some(child);
                        edges += 1;
                    }

                    // Attach `ptr` as a child.
                    None => {
                        parent_was_leaf = parent_links.is_leaf();
                        parent_links.set_child(dir, Some(ptr));
                        T::links(ptr).as_mut().set_parent(Some(parent));
                        attached_to = Some(parent);
                        edges += 1;
                        break;
                    }
                }
            }
        }

        let mut promotes = 0;
        if parent_was_leaf {
            // The parent was a leaf and now carries a child of equal height,
            // which violates the balance invariant. Promote it and let the
            // wave run upward.
            let parent = attached_to.expect("attachment point was recorded");
            unsafe { self.promote(parent) };
            promotes = 1 + self.rebalance_inserted(parent);
        }

        Ok(InsertMetrics { edges, promotes })
    }

    // Runs the post-insertion promote/rotate wave from `from` toward the
    // root. Returns the number of promotions performed.
    fn rebalance_inserted(&mut self, from: NonNull<T>) -> usize {
        let mut promotes = 0;
        let mut balanced_run = 0;
        let mut cur = Some(from);

        while let Some(node) = cur {
            if balanced_run >= 2 {
                break;
            }

            unsafe {
                match self.balance(node) {
                    (1, 1) | (1, 2) | (2, 1) => balanced_run += 1,

                    (0, 1) | (1, 0) => {
                        self.promote(node);
                        promotes += 1;
                    }

                    (0, 2) => {
                        let child = T::links(node).as_ref().left().expect("0-deficit child is real");
                        match self.balance(child) {
                            (1, 2) | (1, 1) => self.rotate(node, Dir::Right),
                            (2, 1) => {
                                self.rotate(child, Dir::Left);
                                self.rotate(node, Dir::Right);
                            }
                            other => unreachable!("insert rebalance: left child is {other:?}"),
                        }
                    }

                    (2, 0) => {
                        let child = T::links(node).as_ref().right().expect("0-deficit child is real");
                        match self.balance(child) {
                            (2, 1) | (1, 1) => self.rotate(node, Dir::Left),
                            (1, 2) => {
                                self.rotate(child, Dir::Right);
                                self.rotate(node, Dir::Left);
                            }
                            other => unreachable!("insert rebalance: right child is {other:?}"),
                        }
                    }

                    other => unreachable!("insert rebalance: junction is {other:?}"),
                }

                // After a rotation this is the node that took `node`'s place,
                // so the climb continues from the right spot either way.
                cur = T::links(node).as_ref().parent();
            }
        }

        promotes
    }

    /// Removes an arbitrary node from the tree, returning its handle.
    ///
    /// # Safety
    ///
    /// It is the caller's responsibility to ensure that `node` is an element
    /// of `self`, and not any other tree.
    pub unsafe fn remove_at(&mut self, node: NonNull<T>) -> T::Handle {
        unsafe {
            // Whole-tree-of-one special case.
            if self.len == 1 {
                debug_assert_eq!(self.root, Some(node));
                self.root = None;
                self.min = None;
                self.max = None;
                self.len = 0;
                Self::clear_links(node);
                return T::from_ptr(node);
            }

            // An extremum being removed always has an in-tree neighbor here.
            if self.max == Some(node) {
                self.max = Self::predecessor(node);
            }
            if self.min == Some(node) {
                self.min = Self::successor(node);
            }
            self.len -= 1;

            let left = T::links(node).as_ref().left();
            let right = T::links(node).as_ref().right();

            if left.is_some() && right.is_some() {
                // Remove the in-order successor from its own (leaf or unary)
                // position first, then move it into `node`'s slot so that the
                // successor's node identity survives for external references.
                let successor = Self::successor(node).expect("interior node has a successor");
                let successor_parent = T::links(successor).as_ref().parent();

                self.remove_leaf_or_unary(successor);
                self.rebalance_removed(successor_parent);

                // Re-read everything: the rebalance may have rotated `node`.
                let parent = T::links(node).as_ref().parent();
                let left = T::links(node).as_ref().left();
                let right = T::links(node).as_ref().right();
                let height = T::links(node).as_ref().height();

                let links = T::links(successor).as_mut();
                links.set_parent(parent);
                links.set_left(left);
                links.set_right(right);
                links.set_height(height);

                self.maybe_set_parent(left, Some(successor));
                self.maybe_set_parent(right, Some(successor));
                self.replace_child_or_set_root(parent, node, Some(successor));

                self.rebalance_removed(parent);
            } else {
                let parent = T::links(node).as_ref().parent();
                self.remove_leaf_or_unary(node);
                self.rebalance_removed(parent);
            }

            Self::clear_links(node);
            T::from_ptr(node)
        }
    }

    // Detaches a node with at most one real child and applies the local
    // demote rule. Rebalancing above the detachment point is the caller's
    // job.
    unsafe fn remove_leaf_or_unary(&mut self, node: NonNull<T>) {
        unsafe {
            let left = T::links(node).as_ref().left();
            let right = T::links(node).as_ref().right();
            debug_assert!(left.is_none() || right.is_none());

            let child = left.or(right);

            let Some(parent) = T::links(node).as_ref().parent() else {
                // Unary root; its child steps up. (A leaf root is the
                // single-element case handled before dispatch.)
                self.root = child;
                self.maybe_set_parent(child, None);
                return;
            };

            let balance = self.balance(parent);
            let dir = self.which_child(parent, Some(node));

            T::links(parent).as_mut().set_child(dir, child);
            self.maybe_set_parent(child, Some(parent));

            // Removing from under the 1-deficit side of a (1,2) or (2,1)
            // parent leaves both its subtrees two below it; pull it down.
            match (dir, balance) {
                (Dir::Left, (1, 2)) | (Dir::Right, (2, 1)) => self.demote(parent),
                _ => {}
            }
        }
    }

    // Runs the post-removal demote/rotate wave from `from` toward the root.
    fn rebalance_removed(&mut self, from: Link<T>) {
        let mut balanced_run = 0;
        let mut cur = from;

        while let Some(node) = cur {
            if balanced_run >= 2 {
                break;
            }

            unsafe {
                match self.balance(node) {
                    (1, 1) | (1, 2) | (2, 1) => balanced_run += 1,

                    // A 2,2 junction only needs its height pulled down; the
                    // streak is left alone.
                    (2, 2) => self.demote(node),

                    (3, 1) => {
                        let child = T::links(node).as_ref().right().expect("1-deficit child is real");
                        match self.balance(child) {
                            (1, 1) | (2, 1) => self.rotate(node, Dir::Left),
                            (1, 2) => {
                                self.rotate(child, Dir::Right);
                                self.rotate(node, Dir::Left);
                            }
                            other => unreachable!("delete rebalance: right child is {other:?}"),
                        }
                        balanced_run = 0;
                    }

                    (1, 3) => {
                        let child = T::links(node).as_ref().left().expect("1-deficit child is real");
                        match self.balance(child) {
                            (1, 1) | (1, 2) => self.rotate(node, Dir::Right),
                            (2, 1) => {
                                self.rotate(child, Dir::Left);
                                self.rotate(node, Dir::Right);
                            }
                            other => unreachable!("delete rebalance: left child is {other:?}"),
                        }
                        balanced_run = 0;
                    }

                    other => unreachable!("delete rebalance: junction is {other:?}"),
                }

                cur = T::links(node).as_ref().parent();
            }
        }
    }

    /// Removes and returns the minimum element of the tree.
    pub fn pop_first(&mut self) -> Option<T::Handle> {
        let first = self.min?;
        Some(unsafe { self.remove_at(first) })
    }

    /// Removes and returns the maximum element of the tree.
    pub fn pop_last(&mut self) -> Option<T::Handle> {
        let last = self.max?;
        Some(unsafe { self.remove_at(last) })
    }

    /// Concatenates `other` and a separating item into `self`.
    ///
    /// One of the two trees must hold only keys less than the separator's
    /// and the other only keys greater; either orientation is accepted. The
    /// concatenation costs _O(|h(self) - h(other)| + 1)_ amortized.
    ///
    /// # Panics
    ///
    /// Panics if the key ranges of `self` and `other` are not strictly
    /// separated by the separator's key.
    pub fn join(&mut self, other: AvlTree<T>, separator: T::Handle) {
        let sep = T::into_ptr(separator);
        let (other_root, other_min, other_max, other_len) = other.into_parts();

        unsafe {
            {
                let key = sep.as_ref().key();

                let separated = match (self.min, self.max, other_min, other_max) {
                    (Some(self_min), Some(self_max), Some(other_min), Some(other_max)) => {
                        (self_max.as_ref().key() < key && key < other_min.as_ref().key())
                            || (other_max.as_ref().key() < key && key < self_min.as_ref().key())
                    }
                    (Some(self_min), Some(self_max), None, None) => {
                        key < self_min.as_ref().key() || key > self_max.as_ref().key()
                    }
                    (None, None, Some(other_min), Some(other_max)) => {
                        key < other_min.as_ref().key() || key > other_max.as_ref().key()
                    }
                    (None, None, None, None) => true,
                    _ => unreachable!("extremum pointers out of sync"),
                };

                assert!(separated, "join: separator key does not separate the two key ranges");
            }

            // Settle the resulting extrema while both sides are still intact.
            let mut new_min = sep;
            let mut new_max = sep;
            for candidate in [self.min, self.max, other_min, other_max].into_iter().flatten() {
                if candidate.as_ref().key() < new_min.as_ref().key() {
                    new_min = candidate;
                }
                if candidate.as_ref().key() > new_max.as_ref().key() {
                    new_max = candidate;
                }
            }
            let new_len = self.len + other_len + 1;

            self.join_trees(other_root, sep);

            self.min = Some(new_min);
            self.max = Some(new_max);
            self.len = new_len;
        }
    }

    // Concatenates the tree rooted at `other_root` into `self` around the
    // separator node `sep`, whose key must lie strictly between the two key
    // ranges. Only `self.root` is maintained; `len` and the extremum
    // pointers are the caller's job.
    fn join_trees(&mut self, other_root: Link<T>, sep: NonNull<T>) {
        unsafe {
            Self::clear_links(sep);

            let (self_root, other_root) = match (self.root, other_root) {
                (None, None) => {
                    self.root = Some(sep);
                    return;
                }
                (None, Some(other)) => {
                    self.root = Some(other);
                    if self.insert_at(other, sep).is_err() {
                        unreachable!("separator key collides with the joined tree");
                    }
                    return;
                }
                (Some(this), None) => {
                    if self.insert_at(this, sep).is_err() {
                        unreachable!("separator key collides with the joined tree");
                    }
                    return;
                }
                (Some(this), Some(other)) => (this, other),
            };

            // Orient by key: which root holds the smaller keys.
            let (left_root, right_root) = if self_root.as_ref().key() < other_root.as_ref().key() {
                (self_root, other_root)
            } else {
                (other_root, self_root)
            };

            let left_height = T::links(left_root).as_ref().height();
            let right_height = T::links(right_root).as_ref().height();

            if right_height >= left_height {
                // Descend the left spine of the taller (right) tree to the
                // first node no taller than the left tree, and splice `sep`
                // in above it.
                let mut parent = None;
                let mut spot = Some(right_root);
                while let Some(node) = spot {
                    if T::links(node).as_ref().height() <= left_height {
                        break;
                    }
                    parent = Some(node);
                    spot = T::links(node).as_ref().left();
                }

                T::links(sep).as_mut().set_left(Some(left_root));
                T::links(left_root).as_mut().set_parent(Some(sep));
                T::links(sep).as_mut().set_right(spot);
                self.maybe_set_parent(spot, Some(sep));
                T::links(sep).as_mut().set_height(left_height + 1);

                match parent {
                    Some(parent) => {
                        T::links(parent).as_mut().set_left(Some(sep));
                        T::links(sep).as_mut().set_parent(Some(parent));
                        self.root = Some(right_root);
                    }
                    // Equal heights: the separator becomes the new root.
                    None => self.root = Some(sep),
                }

                self.rebalance_inserted(sep);
            } else {
                // Mirror image, descending the right spine of the left tree.
                // The left tree is strictly taller, so the descent takes at
                // least one step and the splice point has a real parent.
                let mut parent = None;
                let mut spot = Some(left_root);
                while let Some(node) = spot {
                    if T::links(node).as_ref().height() <= right_height {
                        break;
                    }
                    parent = Some(node);
                    spot = T::links(node).as_ref().right();
                }

                let parent = parent.expect("left tree is strictly taller");

                T::links(sep).as_mut().set_left(spot);
                self.maybe_set_parent(spot, Some(sep));
                T::links(sep).as_mut().set_right(Some(right_root));
                T::links(right_root).as_mut().set_parent(Some(sep));
                T::links(sep).as_mut().set_height(right_height + 1);

                T::links(parent).as_mut().set_right(Some(sep));
                T::links(sep).as_mut().set_parent(Some(parent));
                self.root = Some(left_root);

                self.rebalance_inserted(parent);
            }
        }
    }

    /// Splits the tree around `node`, returning the tree of all keys less
    /// than `node`'s key, the tree of all keys greater, and `node`'s own
    /// handle. `self` is consumed.
    ///
    /// The structural surgery performs a telescoping sequence of joins along
    /// the ancestor path and is proportional to the tree height; restoring
    /// the element counts of the results adds one counting pass.
    ///
    /// # Safety
    ///
    /// It is the caller's responsibility to ensure that `node` is an element
    /// of `self`, and not any other tree.
    pub unsafe fn split_at(self, node: NonNull<T>) -> (AvlTree<T>, AvlTree<T>, T::Handle) {
        let (root, orig_min, orig_max, total) = self.into_parts();
        debug_assert!(root.is_some());

        let mut left = AvlTree::new();
        let mut right = AvlTree::new();

        unsafe {
            left.root = T::links(node).as_ref().left();
            left.maybe_set_parent(left.root, None);
            right.root = T::links(node).as_ref().right();
            right.maybe_set_parent(right.root, None);

            let mut ancestor = T::links(node).as_ref().parent();
            Self::clear_links(node);

            // Fold each ancestor, along with the subtree hanging away from
            // the split path, into the side its key belongs to. The ancestor
            // itself becomes the separator, so no nodes are allocated.
            while let Some(current) = ancestor {
                ancestor = T::links(current).as_ref().parent();

                if current.as_ref().key() < node.as_ref().key() {
                    let sub = T::links(current).as_ref().left();
                    left.maybe_set_parent(sub, None);
                    left.join_trees(sub, current);
                } else {
                    let sub = T::links(current).as_ref().right();
                    right.maybe_set_parent(sub, None);
                    right.join_trees(sub, current);
                }
            }

            // The side that keeps the original extremum reuses it; the other
            // bound of each side is found by descent.
            if left.root.is_some() {
                left.min = orig_min;
                left.max = Self::rightmost(left.root);
            }
            if right.root.is_some() {
                right.min = Self::leftmost(right.root);
                right.max = orig_max;
            }

            // Nodes carry no subtree sizes, so one side is counted and the
            // other derived.
            left.len = Self::count(left.root);
            right.len = total - left.len - 1;

            (left, right, T::from_ptr(node))
        }
    }

    /// Returns the in-order successor of `node`, or `None` if `node` holds
    /// the maximum key.
    ///
    /// # Safety
    ///
    /// `node` must be an element of a live tree.
    pub unsafe fn successor(node: NonNull<T>) -> Link<T> {
        unsafe {
            if let Some(right) = T::links(node).as_ref().right() {
                let mut cur = right;
                while let Some(left) = T::links(cur).as_ref().left() {
                    cur = left;
                }
                return Some(cur);
            }

            // No right subtree: the successor is the first ancestor reached
            // from a left child.
            let mut cur = node;
            while let Some(parent) = T::links(cur).as_ref().parent() {
                if T::links(parent).as_ref().right() == Some(cur) {
                    cur = parent;
                } else {
                    return Some(parent);
                }
            }

            None
        }
    }

    /// Returns the in-order predecessor of `node`, or `None` if `node` holds
    /// the minimum key.
    ///
    /// # Safety
    ///
    /// `node` must be an element of a live tree.
    pub unsafe fn predecessor(node: NonNull<T>) -> Link<T> {
        unsafe {
            if let Some(left) = T::links(node).as_ref().left() {
                let mut cur = left;
                while let Some(right) = T::links(cur).as_ref().right() {
                    cur = right;
                }
                return Some(cur);
            }

            let mut cur = node;
            while let Some(parent) = T::links(cur).as_ref().parent() {
                if T::links(parent).as_ref().left() == Some(cur) {
                    cur = parent;
                } else {
                    return Some(parent);
                }
            }

            None
        }
    }

    /// Clears the tree, removing all elements.
    pub fn clear(&mut self) {
        let mut opt_cur = self.root;

        while let Some(cur) = opt_cur {
            unsafe {
                // Descend to the minimum node.
                let (cur, parent) = self.min_in_subtree(cur);
                let parent = parent.or_else(|| T::links(cur).as_ref().parent());

                let right = T::links(cur).as_ref().right();

                // Elevate the node's right child (which may be missing).
                self.replace_child_or_set_root(parent, cur, right);
                self.maybe_set_parent(right, parent);

                // Drop the node.
                drop(T::from_ptr(cur));
                self.len -= 1;

                // If the node had no right child, climb to the parent. If the
                // node had no parent, the tree is empty.
                opt_cur = right.or(parent);
            }
        }

        self.min = None;
        self.max = None;

        debug_assert!(self.root.is_none());
        debug_assert_eq!(self.len(), 0);
    }

    // Support methods ========================================================

    // Returns the minimum node in the subtree.
    //
    // If the subtree root is not the minimum, also returns the minimum node's
    // parent.
    #[inline]
    unsafe fn min_in_subtree(&self, root: NonNull<T>) -> (NonNull<T>, Option<NonNull<T>>) {
        let mut parent = None;
        let mut cur = root;

        while let Some(left) = unsafe { T::links(cur).as_ref().left() } {
            parent = Some(cur);
            cur = left;
        }

        (cur, parent)
    }

    fn leftmost(link: Link<T>) -> Link<T> {
        let mut cur = link?;

        unsafe {
            while let Some(left) = T::links(cur).as_ref().left() {
                cur = left;
            }
        }

        Some(cur)
    }

    fn rightmost(link: Link<T>) -> Link<T> {
        let mut cur = link?;

        unsafe {
            while let Some(right) = T::links(cur).as_ref().right() {
                cur = right;
            }
        }

        Some(cur)
    }

    fn count(link: Link<T>) -> usize {
        match link {
            Some(node) => unsafe {
                1 + Self::count(T::links(node).as_ref().left())
                    + Self::count(T::links(node).as_ref().right())
            },
            None => 0,
        }
    }

    // Dismantles the tree object without dropping its nodes.
    fn into_parts(self) -> (Link<T>, Link<T>, Link<T>, usize) {
        let this = ManuallyDrop::new(self);
        (this.root, this.min, this.max, this.len)
    }

    // Resets a detached node's links to the freestanding-leaf state.
    unsafe fn clear_links(node: NonNull<T>) {
        unsafe {
            let links = T::links(node).as_mut();
            links.set_parent(None);
            links.set_left(None);
            links.set_right(None);
            links.set_height(0);
        }
    }

    unsafe fn maybe_set_parent(&mut self, opt_node: Link<T>, parent: Link<T>) {
        let Some(node) = opt_node else {
            return;
        };

        unsafe { T::links(node).as_mut().set_parent(parent) };
    }

    #[inline]
    unsafe fn replace_child_or_set_root(
        &mut self,
        parent: Link<T>,
        old_child: NonNull<T>,
        new_child: Link<T>,
    ) {
        match parent {
            Some(parent) => unsafe { self.replace_child(parent, old_child, new_child) },
            None => self.root = new_child,
        }
    }

    // Replaces the child pointer of `parent` pointing at `old_child` with
    // `new_child`.
    //
    // `new_child`'s parent pointer is not updated.
    //
    // # Safety
    //
    // The caller must ensure that `old_child` is a child node of `parent`.
    unsafe fn replace_child(
        &mut self,
        parent: NonNull<T>,
        old_child: NonNull<T>,
        new_child: Link<T>,
    ) {
        unsafe {
            if T::links(parent).as_ref().child(Dir::Left) == Some(old_child) {
                T::links(parent).as_mut().set_child(Dir::Left, new_child);
            } else {
                debug_assert_eq!(
                    T::links(parent).as_ref().child(Dir::Right),
                    Some(old_child),
                    "`old_child` must be a child of `parent`"
                );
                T::links(parent).as_mut().set_child(Dir::Right, new_child);
            }
        }
    }

    // Rotates the junction at `down` in direction `dir`, lifting the child on
    // the opposite side into its place, then recomputes both pivots' heights
    // from their children.
    fn rotate(&mut self, down: NonNull<T>, dir: Dir) {
        unsafe {
            let up = T::links(down)
                .as_ref()
                .child(!dir)
                .expect("rotation pivot must be a real child");
            let across = T::links(up).as_ref().child(dir);

            T::links(down).as_mut().set_child(!dir, across);
            self.maybe_set_parent(across, Some(down));

            T::links(up).as_mut().set_child(dir, Some(down));
            let parent = T::links(down).as_mut().set_parent(Some(up));
            T::links(up).as_mut().set_parent(parent);

            self.replace_child_or_set_root(parent, down, Some(up));

            self.fix_height(down);
            self.fix_height(up);
        }
    }

    #[inline]
    unsafe fn fix_height(&mut self, node: NonNull<T>) {
        unsafe {
            let left = self.height_of(T::links(node).as_ref().left());
            let right = self.height_of(T::links(node).as_ref().right());
            T::links(node).as_mut().set_height(left.max(right) + 1);
        }
    }

    #[inline]
    unsafe fn promote(&mut self, node: NonNull<T>) {
        unsafe {
            let inner = T::links(node).as_mut().inner.get_mut();
            inner.height = inner.height.checked_add(1).unwrap();
        }
    }

    #[inline]
    unsafe fn demote(&mut self, node: NonNull<T>) {
        unsafe {
            let inner = T::links(node).as_mut().inner.get_mut();
            inner.height = inner.height.checked_sub(1).unwrap();
        }
    }

    // Returns the height of the pointed-to node, or -1 for a missing child
    // (the external leaf).
    unsafe fn height_of(&self, node: Link<T>) -> i8 {
        node.map(|n| unsafe { T::links(n).as_ref().height() }).unwrap_or(-1)
    }

    // Returns the balance pair (h(node) - h(left), h(node) - h(right)).
    unsafe fn balance(&self, node: NonNull<T>) -> (i8, i8) {
        unsafe {
            let links = T::links(node).as_ref();
            let height = links.height();
            (
                height - self.height_of(links.left()),
                height - self.height_of(links.right()),
            )
        }
    }

    // Accounts for a newly linked node in the extremum pointers.
    unsafe fn update_extrema(&mut self, node: NonNull<T>) {
        unsafe {
            let key = node.as_ref().key();
            if self.min.map_or(true, |min| key < min.as_ref().key()) {
                self.min = Some(node);
            }
            if self.max.map_or(true, |max| key > max.as_ref().key()) {
                self.max = Some(node);
            }
        }
    }

    pub(crate) unsafe fn which_child(&self, parent: NonNull<T>, child: Link<T>) -> Dir {
        if unsafe { T::links(parent).as_ref().left() } == child {
            Dir::Left
        } else {
            Dir::Right
        }
    }
}

impl<T> Drop for AvlTree<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    fn drop(&mut self) {
        self.clear();
    }
}

impl<T: ?Sized> Links<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inner: UnsafeCell::new(LinksInner {
                parent: None,
                children: [None; 2],
                height: 0,
                _unpin: PhantomPinned,
            }),
        }
    }

    #[inline]
    pub(crate) fn is_leaf(&self) -> bool {
        self.left().is_none() && self.right().is_none()
    }

    #[inline]
    pub(crate) fn height(&self) -> i8 {
        unsafe { (*self.inner.get()).height }
    }

    #[inline]
    pub(crate) fn parent(&self) -> Link<T> {
        unsafe { (*self.inner.get()).parent }
    }

    #[inline]
    pub(crate) fn child(&self, dir: Dir) -> Link<T> {
        unsafe { (*self.inner.get()).children[dir as usize] }
    }

    #[inline]
    pub(crate) fn left(&self) -> Link<T> {
        self.child(Dir::Left)
    }

    #[inline]
    pub(crate) fn right(&self) -> Link<T> {
        self.child(Dir::Right)
    }

    #[inline]
    fn set_parent(&mut self, parent: Link<T>) -> Link<T> {
        mem::replace(&mut self.inner.get_mut().parent, parent)
    }

    #[inline]
    fn set_child(&mut self, dir: Dir, child: Link<T>) -> Link<T> {
        mem::replace(&mut self.inner.get_mut().children[dir as usize], child)
    }

    #[inline]
    fn set_left(&mut self, left: Link<T>) -> Link<T> {
        self.set_child(Dir::Left, left)
    }

    #[inline]
    fn set_right(&mut self, right: Link<T>) -> Link<T> {
        self.set_child(Dir::Right, right)
    }

    #[inline]
    fn set_height(&mut self, height: i8) {
        self.inner.get_mut().height = height;
    }
}
